use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use rivulet_core::codec::{default_codec, Codec};
use rivulet_core::driver::LogDriver;
use rivulet_core::error::LogError;
use rivulet_core::log::{Latency, LogLag, LogPartition};
use rivulet_core::name::Name;
use rivulet_core::watermark::now_ms;

use crate::appender::LogAppender;
use crate::tailer::LogTailer;

pub(crate) struct ManagerInner {
    pub(crate) driver: Arc<dyn LogDriver>,
    // codec name of the first writer or reader per log, later handles must match
    pub(crate) codecs: DashMap<Name, String>,
    // exclusive (group, partition) ownership of open tailers
    pub(crate) open_tailers: DashMap<(Name, LogPartition), ()>,
    pub(crate) closed: AtomicBool,
}

impl fmt::Debug for ManagerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogManager")
            .field("driver", &self.driver)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ManagerInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Entry point to a log backend: creates logs, appenders and tailers and
/// answers lag and latency queries.
///
/// The manager enforces the cross-handle rules the backend itself cannot
/// see: one codec per log, one open tailer per `(group, partition)`, and
/// close propagation to every handle it created.
#[derive(Debug, Clone)]
pub struct LogManager {
    inner: Arc<ManagerInner>,
}

impl LogManager {
    pub fn new(driver: Arc<dyn LogDriver>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                driver,
                codecs: DashMap::new(),
                open_tailers: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub async fn create_if_not_exists(&self, name: &Name, partitions: u32) -> Result<bool, LogError> {
        self.ensure_open()?;
        self.inner.driver.create_if_not_exists(name, partitions).await
    }

    pub async fn exists(&self, name: &Name) -> bool {
        self.inner.driver.exists(name).await
    }

    /// Partition count of a log.
    pub async fn size(&self, name: &Name) -> Result<u32, LogError> {
        self.inner.driver.partitions(name).await
    }

    pub async fn get_appender<M>(&self, name: &Name) -> Result<LogAppender<M>, LogError>
    where
        M: Serialize + DeserializeOwned + 'static,
    {
        self.get_appender_with_codec(name, default_codec()).await
    }

    pub async fn get_appender_with_codec<M>(
        &self,
        name: &Name,
        codec: Arc<dyn Codec<M>>,
    ) -> Result<LogAppender<M>, LogError>
    where
        M: Serialize + DeserializeOwned,
    {
        self.ensure_open()?;
        if !self.inner.driver.exists(name).await {
            return Err(LogError::UnknownLog(name.clone()));
        }
        self.check_codec(name, codec.name())?;
        let partitions = self.inner.driver.partitions(name).await?;
        Ok(LogAppender::new(
            self.inner.clone(),
            name.clone(),
            partitions,
            codec,
        ))
    }

    pub async fn create_tailer<M>(
        &self,
        group: &Name,
        partition: LogPartition,
    ) -> Result<LogTailer<M>, LogError>
    where
        M: Serialize + DeserializeOwned + 'static,
    {
        self.create_partitions_tailer(group, vec![partition], default_codec())
            .await
    }

    pub async fn create_tailer_with_codec<M>(
        &self,
        group: &Name,
        partition: LogPartition,
        codec: Arc<dyn Codec<M>>,
    ) -> Result<LogTailer<M>, LogError>
    where
        M: Serialize + DeserializeOwned,
    {
        self.create_partitions_tailer(group, vec![partition], codec)
            .await
    }

    /// Tailer over every partition of a log.
    pub async fn create_stream_tailer<M>(
        &self,
        group: &Name,
        name: &Name,
    ) -> Result<LogTailer<M>, LogError>
    where
        M: Serialize + DeserializeOwned + 'static,
    {
        self.create_stream_tailer_with_codec(group, name, default_codec())
            .await
    }

    pub async fn create_stream_tailer_with_codec<M>(
        &self,
        group: &Name,
        name: &Name,
        codec: Arc<dyn Codec<M>>,
    ) -> Result<LogTailer<M>, LogError>
    where
        M: Serialize + DeserializeOwned,
    {
        let partitions = self.inner.driver.partitions(name).await?;
        let assignments = (0..partitions)
            .map(|p| LogPartition::of(name.clone(), p))
            .collect();
        self.create_partitions_tailer(group, assignments, codec).await
    }

    /// The general form: a tailer over an explicit partition assignment,
    /// possibly spanning several logs.
    pub async fn create_partitions_tailer<M>(
        &self,
        group: &Name,
        partitions: Vec<LogPartition>,
        codec: Arc<dyn Codec<M>>,
    ) -> Result<LogTailer<M>, LogError>
    where
        M: Serialize + DeserializeOwned,
    {
        self.ensure_open()?;
        for partition in &partitions {
            let count = self.inner.driver.partitions(&partition.name).await?;
            if partition.partition >= count {
                return Err(LogError::InvalidPartition {
                    name: partition.name.clone(),
                    partition: partition.partition,
                });
            }
            self.check_codec(&partition.name, codec.name())?;
        }
        // claim every partition before building the tailer, rolling back on
        // conflict so a failed claim leaves nothing registered
        let mut claimed = Vec::with_capacity(partitions.len());
        for partition in &partitions {
            let key = (group.clone(), partition.clone());
            if self.inner.open_tailers.insert(key.clone(), ()).is_some() {
                for key in claimed {
                    self.inner.open_tailers.remove(&key);
                }
                return Err(LogError::TailerConflict {
                    group: group.clone(),
                    partition: partition.clone(),
                });
            }
            claimed.push(key);
        }
        let mut cursors = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let committed = self
                .inner
                .driver
                .committed(group, &partition)
                .await?
                .unwrap_or(0);
            cursors.push((partition, committed));
        }
        debug!(
            target = "log",
            group = %group,
            assignments = cursors.len(),
            "created tailer"
        );
        Ok(LogTailer::new(
            self.inner.clone(),
            group.clone(),
            cursors,
            codec,
        ))
    }

    pub async fn get_lag(&self, name: &Name, group: &Name) -> Result<LogLag, LogError> {
        let lags = self.get_lag_per_partition(name, group).await?;
        Ok(LogLag::aggregate(lags))
    }

    pub async fn get_lag_per_partition(
        &self,
        name: &Name,
        group: &Name,
    ) -> Result<Vec<LogLag>, LogError> {
        let partitions = self.inner.driver.partitions(name).await?;
        let mut lags = Vec::with_capacity(partitions as usize);
        for p in 0..partitions {
            let partition = LogPartition::of(name.clone(), p);
            let upper = self.inner.driver.end_offset(&partition).await?;
            let lower = self
                .inner
                .driver
                .committed(group, &partition)
                .await?
                .unwrap_or(0);
            lags.push(LogLag::new(lower, upper));
        }
        Ok(lags)
    }

    /// Latency of a group on a log, aggregated across partitions.
    pub async fn get_latency<M>(
        &self,
        name: &Name,
        group: &Name,
        codec: Arc<dyn Codec<M>>,
        watermark_of: impl Fn(&M) -> u64,
        key_of: impl Fn(&M) -> String,
    ) -> Result<Latency, LogError>
    where
        M: Serialize + DeserializeOwned,
    {
        let latencies = self
            .get_latency_per_partition(name, group, codec, watermark_of, key_of)
            .await?;
        Ok(Latency::of(&latencies))
    }

    /// Per-partition latency: decodes the record at each partition's last
    /// committed position to recover its watermark timestamp and key.
    pub async fn get_latency_per_partition<M>(
        &self,
        name: &Name,
        group: &Name,
        codec: Arc<dyn Codec<M>>,
        watermark_of: impl Fn(&M) -> u64,
        key_of: impl Fn(&M) -> String,
    ) -> Result<Vec<Latency>, LogError>
    where
        M: Serialize + DeserializeOwned,
    {
        let partitions = self.inner.driver.partitions(name).await?;
        let now = now_ms();
        let mut latencies = Vec::with_capacity(partitions as usize);
        for p in 0..partitions {
            let partition = LogPartition::of(name.clone(), p);
            let upper = self.inner.driver.end_offset(&partition).await?;
            let committed = self
                .inner
                .driver
                .committed(group, &partition)
                .await?
                .unwrap_or(0);
            let lag = LogLag::new(committed, upper);
            let (lower, key) = if committed > 0 {
                match self.inner.driver.read_from(&partition, committed - 1).await? {
                    Some((_, payload)) => {
                        let message = codec.decode(&payload)?;
                        (watermark_of(&message), Some(key_of(&message)))
                    }
                    None => (0, None),
                }
            } else {
                (0, None)
            };
            latencies.push(Latency::new(lower, now, lag, key));
        }
        Ok(latencies)
    }

    pub async fn list_all(&self) -> Result<Vec<Name>, LogError> {
        self.inner.driver.list_all().await
    }

    pub async fn list_consumer_groups(&self, name: &Name) -> Result<Vec<Name>, LogError> {
        self.inner.driver.list_consumer_groups(name).await
    }

    pub fn closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Close the backend; every appender and tailer created by this manager
    /// becomes unusable.
    pub async fn close(&self) -> Result<(), LogError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.open_tailers.clear();
        self.inner.driver.close().await
    }

    fn ensure_open(&self) -> Result<(), LogError> {
        if self.inner.is_closed() {
            return Err(LogError::Closed);
        }
        Ok(())
    }

    fn check_codec(&self, name: &Name, codec_name: &str) -> Result<(), LogError> {
        let existing = self
            .inner
            .codecs
            .entry(name.clone())
            .or_insert_with(|| codec_name.to_string());
        if existing.value() != codec_name {
            return Err(LogError::CodecMismatch {
                name: name.clone(),
                existing: existing.value().clone(),
                requested: codec_name.to_string(),
            });
        }
        Ok(())
    }
}
