use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use rivulet_core::driver::LogDriver;
use rivulet_core::error::LogError;
use rivulet_core::log::LogPartition;
use rivulet_core::name::Name;

mod frames;

const META_FILE: &str = "meta.json";
const OFFSETS_FILE: &str = "offsets.bin";

#[derive(Debug, Serialize, Deserialize)]
struct LogMeta {
    urn: String,
    partitions: u32,
}

/// File-structured log backend.
///
/// Layout: one directory per log under the root, holding `meta.json`
/// (urn + partition count), one `p<N>.log` frame file per partition and
/// `offsets.bin` with the committed positions of every consumer group.
/// Partition files carry `[u64 offset][u32 len][u32 crc][bytes]` frames;
/// recovery rebuilds the in-memory byte index by scanning each file and
/// stops at the first damaged frame.
#[derive(Debug)]
pub struct FileLogDriver {
    root: PathBuf,
    logs: DashMap<Name, Arc<FileLog>>,
}

#[derive(Debug)]
struct FileLog {
    dir: PathBuf,
    partitions: Vec<FilePartition>,
    // committed positions per group, persisted as a whole on every commit
    groups: Mutex<HashMap<Name, HashMap<u32, u64>>>,
}

#[derive(Debug)]
struct FilePartition {
    path: PathBuf,
    state: Mutex<PartitionState>,
}

#[derive(Debug)]
struct PartitionState {
    // byte position of each frame, the vector index is the record offset
    index: Vec<u64>,
    end_pos: u64,
    writer: Option<File>,
    reader: Option<File>,
}

impl FileLogDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            logs: DashMap::new(),
        }
    }

    fn log_dir(&self, name: &Name) -> PathBuf {
        self.root.join(name.id())
    }

    async fn open_log(&self, name: &Name) -> Result<Arc<FileLog>, LogError> {
        if let Some(log) = self.logs.get(name) {
            return Ok(log.clone());
        }
        let dir = self.log_dir(name);
        let meta = read_meta(&dir.join(META_FILE))
            .await?
            .ok_or_else(|| LogError::UnknownLog(name.clone()))?;
        let mut partitions = Vec::with_capacity(meta.partitions as usize);
        for p in 0..meta.partitions {
            let path = dir.join(format!("p{}.log", p));
            let (index, end_pos) = frames::scan(&path).await?;
            partitions.push(FilePartition {
                path,
                state: Mutex::new(PartitionState {
                    index,
                    end_pos,
                    writer: None,
                    reader: None,
                }),
            });
        }
        let groups = read_offsets(&dir.join(OFFSETS_FILE)).await?;
        let log = Arc::new(FileLog {
            dir,
            partitions,
            groups: Mutex::new(groups),
        });
        Ok(self
            .logs
            .entry(name.clone())
            .or_insert(log)
            .value()
            .clone())
    }

    fn partition_of<'a>(
        &self,
        log: &'a FileLog,
        partition: &LogPartition,
    ) -> Result<&'a FilePartition, LogError> {
        log.partitions
            .get(partition.partition as usize)
            .ok_or_else(|| LogError::InvalidPartition {
                name: partition.name.clone(),
                partition: partition.partition,
            })
    }
}

#[async_trait]
impl LogDriver for FileLogDriver {
    async fn create_if_not_exists(&self, name: &Name, partitions: u32) -> Result<bool, LogError> {
        let dir = self.log_dir(name);
        let meta_path = dir.join(META_FILE);
        if read_meta(&meta_path).await?.is_some() {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LogError::Io(format!("create log dir failed: {}", e)))?;
        let meta = LogMeta {
            urn: name.urn().to_string(),
            partitions,
        };
        let bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| LogError::Io(format!("meta serialize failed: {}", e)))?;
        tokio::fs::write(&meta_path, bytes)
            .await
            .map_err(|e| LogError::Io(format!("write meta failed: {}", e)))?;
        info!(
            target = "log_file",
            log = %name,
            partitions,
            dir = %dir.display(),
            "created log"
        );
        Ok(true)
    }

    async fn exists(&self, name: &Name) -> bool {
        if self.logs.contains_key(name) {
            return true;
        }
        tokio::fs::try_exists(self.log_dir(name).join(META_FILE))
            .await
            .unwrap_or(false)
    }

    async fn partitions(&self, name: &Name) -> Result<u32, LogError> {
        let log = self.open_log(name).await?;
        Ok(log.partitions.len() as u32)
    }

    async fn append(&self, partition: &LogPartition, payload: &[u8]) -> Result<u64, LogError> {
        let log = self.open_log(&partition.name).await?;
        let part = self.partition_of(&log, partition)?;
        let mut state = part.state.lock().await;
        let offset = state.index.len() as u64;
        let frame = frames::encode_frame(offset, payload);
        if state.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&part.path)
                .await
                .map_err(|e| LogError::Io(format!("open partition file failed: {}", e)))?;
            state.writer = Some(file);
        }
        let pos = state.end_pos;
        let writer = state.writer.as_mut().ok_or(LogError::Closed)?;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| LogError::Io(format!("append frame failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| LogError::Io(format!("flush partition file failed: {}", e)))?;
        state.index.push(pos);
        state.end_pos = pos + frame.len() as u64;
        Ok(offset)
    }

    async fn read_from(
        &self,
        partition: &LogPartition,
        offset: u64,
    ) -> Result<Option<(u64, Vec<u8>)>, LogError> {
        let log = self.open_log(&partition.name).await?;
        let part = self.partition_of(&log, partition)?;
        let mut state = part.state.lock().await;
        let pos = match state.index.get(offset as usize) {
            Some(pos) => *pos,
            None => return Ok(None),
        };
        if state.reader.is_none() {
            let file = File::open(&part.path)
                .await
                .map_err(|e| LogError::Io(format!("open partition file failed: {}", e)))?;
            state.reader = Some(file);
        }
        let reader = state.reader.as_mut().ok_or(LogError::Closed)?;
        let (frame_offset, payload) = frames::read_at(reader, pos).await?;
        Ok(Some((frame_offset, payload)))
    }

    async fn end_offset(&self, partition: &LogPartition) -> Result<u64, LogError> {
        let log = self.open_log(&partition.name).await?;
        let part = self.partition_of(&log, partition)?;
        let state = part.state.lock().await;
        Ok(state.index.len() as u64)
    }

    async fn committed(
        &self,
        group: &Name,
        partition: &LogPartition,
    ) -> Result<Option<u64>, LogError> {
        let log = self.open_log(&partition.name).await?;
        let groups = log.groups.lock().await;
        Ok(groups
            .get(group)
            .and_then(|positions| positions.get(&partition.partition))
            .copied())
    }

    async fn commit(
        &self,
        group: &Name,
        partition: &LogPartition,
        offset: u64,
    ) -> Result<(), LogError> {
        let log = self.open_log(&partition.name).await?;
        self.partition_of(&log, partition)?;
        let mut groups = log.groups.lock().await;
        groups
            .entry(group.clone())
            .or_default()
            .insert(partition.partition, offset);
        write_offsets(&log.dir.join(OFFSETS_FILE), &groups).await?;
        debug!(
            target = "log_file",
            log = %partition.name,
            partition = partition.partition,
            group = %group,
            offset,
            "committed position"
        );
        Ok(())
    }

    async fn reset(&self, group: &Name, partition: &LogPartition) -> Result<(), LogError> {
        let log = self.open_log(&partition.name).await?;
        let mut groups = log.groups.lock().await;
        if let Some(positions) = groups.get_mut(group) {
            positions.remove(&partition.partition);
        }
        write_offsets(&log.dir.join(OFFSETS_FILE), &groups).await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Name>, LogError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(LogError::Io(format!("read log root failed: {}", e))),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LogError::Io(format!("read log root failed: {}", e)))?
        {
            if let Some(meta) = read_meta(&entry.path().join(META_FILE)).await? {
                names.push(Name::of_urn(meta.urn));
            }
        }
        Ok(names)
    }

    async fn list_consumer_groups(&self, name: &Name) -> Result<Vec<Name>, LogError> {
        let log = self.open_log(name).await?;
        let groups = log.groups.lock().await;
        Ok(groups.keys().cloned().collect())
    }

    async fn close(&self) -> Result<(), LogError> {
        // snapshot first, a map guard must not be held across an await
        let logs: Vec<Arc<FileLog>> = self.logs.iter().map(|entry| entry.value().clone()).collect();
        for log in logs {
            for part in &log.partitions {
                let mut state = part.state.lock().await;
                if let Some(mut writer) = state.writer.take() {
                    writer
                        .flush()
                        .await
                        .map_err(|e| LogError::Io(format!("flush on close failed: {}", e)))?;
                }
                state.reader = None;
            }
        }
        self.logs.clear();
        Ok(())
    }
}

async fn read_meta(path: &Path) -> Result<Option<LogMeta>, LogError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let meta = serde_json::from_slice(&bytes)
                .map_err(|e| LogError::Io(format!("meta parse failed: {}", e)))?;
            Ok(Some(meta))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LogError::Io(format!("read meta failed: {}", e))),
    }
}

async fn read_offsets(path: &Path) -> Result<HashMap<Name, HashMap<u32, u64>>, LogError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            bincode::deserialize(&bytes).map_err(|e| LogError::Io(format!("offsets parse failed: {}", e)))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(LogError::Io(format!("read offsets failed: {}", e))),
    }
}

// Atomic write via tmp file then rename so a crash never leaves a torn
// offsets file behind.
async fn write_offsets(
    path: &Path,
    offsets: &HashMap<Name, HashMap<u32, u64>>,
) -> Result<(), LogError> {
    let bytes =
        bincode::serialize(offsets).map_err(|e| LogError::Io(format!("offsets serialize failed: {}", e)))?;
    let tmp = path.with_extension("bin.tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .await
        .map_err(|e| LogError::Io(format!("open offsets tmp failed: {}", e)))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| LogError::Io(format!("write offsets failed: {}", e)))?;
    file.flush()
        .await
        .map_err(|e| LogError::Io(format!("flush offsets failed: {}", e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| LogError::Io(format!("rename offsets failed: {}", e)))?;
    Ok(())
}
