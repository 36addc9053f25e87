use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use rivulet_core::driver::LogDriver;
use rivulet_core::error::LogError;
use rivulet_core::log::LogPartition;
use rivulet_core::name::Name;

/// Volatile in-memory log backend.
///
/// Partitions are plain payload vectors, so offsets are the vector index.
/// Committed positions live in per-group maps. Nothing survives the driver,
/// which makes this the backend of choice for tests and short-lived
/// topologies.
#[derive(Debug, Default)]
pub struct MemoryLogDriver {
    logs: DashMap<Name, Arc<MemLog>>,
}

#[derive(Debug)]
struct MemLog {
    partitions: Vec<RwLock<Vec<Vec<u8>>>>,
    // committed position per group and partition
    groups: DashMap<Name, DashMap<u32, u64>>,
}

impl MemoryLogDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, name: &Name) -> Result<Arc<MemLog>, LogError> {
        self.logs
            .get(name)
            .map(|log| log.clone())
            .ok_or_else(|| LogError::UnknownLog(name.clone()))
    }

    fn partition_index(log: &MemLog, partition: &LogPartition) -> Result<usize, LogError> {
        let index = partition.partition as usize;
        if index >= log.partitions.len() {
            return Err(LogError::InvalidPartition {
                name: partition.name.clone(),
                partition: partition.partition,
            });
        }
        Ok(index)
    }
}

#[async_trait]
impl LogDriver for MemoryLogDriver {
    async fn create_if_not_exists(&self, name: &Name, partitions: u32) -> Result<bool, LogError> {
        match self.logs.entry(name.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(MemLog {
                    partitions: (0..partitions).map(|_| RwLock::new(Vec::new())).collect(),
                    groups: DashMap::new(),
                }));
                Ok(true)
            }
        }
    }

    async fn exists(&self, name: &Name) -> bool {
        self.logs.contains_key(name)
    }

    async fn partitions(&self, name: &Name) -> Result<u32, LogError> {
        Ok(self.log(name)?.partitions.len() as u32)
    }

    async fn append(&self, partition: &LogPartition, payload: &[u8]) -> Result<u64, LogError> {
        let log = self.log(&partition.name)?;
        let index = Self::partition_index(&log, partition)?;
        let mut records = log.partitions[index].write().await;
        records.push(payload.to_vec());
        Ok(records.len() as u64 - 1)
    }

    async fn read_from(
        &self,
        partition: &LogPartition,
        offset: u64,
    ) -> Result<Option<(u64, Vec<u8>)>, LogError> {
        let log = self.log(&partition.name)?;
        let index = Self::partition_index(&log, partition)?;
        let records = log.partitions[index].read().await;
        Ok(records
            .get(offset as usize)
            .map(|payload| (offset, payload.clone())))
    }

    async fn end_offset(&self, partition: &LogPartition) -> Result<u64, LogError> {
        let log = self.log(&partition.name)?;
        let index = Self::partition_index(&log, partition)?;
        let len = log.partitions[index].read().await.len();
        Ok(len as u64)
    }

    async fn committed(
        &self,
        group: &Name,
        partition: &LogPartition,
    ) -> Result<Option<u64>, LogError> {
        let log = self.log(&partition.name)?;
        Ok(log
            .groups
            .get(group)
            .and_then(|positions| positions.get(&partition.partition).map(|p| *p)))
    }

    async fn commit(
        &self,
        group: &Name,
        partition: &LogPartition,
        offset: u64,
    ) -> Result<(), LogError> {
        let log = self.log(&partition.name)?;
        Self::partition_index(&log, partition)?;
        log.groups
            .entry(group.clone())
            .or_default()
            .insert(partition.partition, offset);
        Ok(())
    }

    async fn reset(&self, group: &Name, partition: &LogPartition) -> Result<(), LogError> {
        let log = self.log(&partition.name)?;
        if let Some(positions) = log.groups.get(group) {
            positions.remove(&partition.partition);
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Name>, LogError> {
        Ok(self.logs.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn list_consumer_groups(&self, name: &Name) -> Result<Vec<Name>, LogError> {
        let log = self.log(name)?;
        Ok(log.groups.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn close(&self) -> Result<(), LogError> {
        Ok(())
    }
}
