use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use rivulet_core::codec::Codec;
use rivulet_core::error::LogError;
use rivulet_core::log::{LogOffset, LogPartition};
use rivulet_core::name::Name;

use crate::manager::ManagerInner;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Write handle for one log.
///
/// Appends are durable per the backend contract before returning and never
/// reorder within a partition.
pub struct LogAppender<M>
where
    M: Serialize + DeserializeOwned,
{
    manager: Arc<ManagerInner>,
    name: Name,
    partitions: u32,
    codec: Arc<dyn Codec<M>>,
}

impl<M> fmt::Debug for LogAppender<M>
where
    M: Serialize + DeserializeOwned,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogAppender")
            .field("name", &self.name)
            .field("partitions", &self.partitions)
            .field("codec", &self.codec.name())
            .finish()
    }
}

impl<M> LogAppender<M>
where
    M: Serialize + DeserializeOwned,
{
    pub(crate) fn new(
        manager: Arc<ManagerInner>,
        name: Name,
        partitions: u32,
        codec: Arc<dyn Codec<M>>,
    ) -> Self {
        Self {
            manager,
            name,
            partitions,
            codec,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Partition count.
    pub fn size(&self) -> u32 {
        self.partitions
    }

    pub fn codec(&self) -> &Arc<dyn Codec<M>> {
        &self.codec
    }

    pub fn closed(&self) -> bool {
        self.manager.is_closed()
    }

    pub async fn append(&self, partition: u32, message: &M) -> Result<LogOffset, LogError> {
        if self.closed() {
            return Err(LogError::Closed);
        }
        if partition >= self.partitions {
            return Err(LogError::InvalidPartition {
                name: self.name.clone(),
                partition,
            });
        }
        let payload = self.codec.encode(message)?;
        let target = LogPartition::of(self.name.clone(), partition);
        let offset = self.manager.driver.append(&target, &payload).await?;
        Ok(LogOffset::of(target, offset))
    }

    /// Append routed by key hash, keeping all records of one key in one
    /// partition.
    pub async fn append_by_key(&self, key: &str, message: &M) -> Result<LogOffset, LogError> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let partition = (hasher.finish() % self.partitions as u64) as u32;
        self.append(partition, message).await
    }

    /// Wait until the group's committed position has passed `offset`, false
    /// on timeout.
    pub async fn wait_for(
        &self,
        offset: &LogOffset,
        group: &Name,
        timeout: Duration,
    ) -> Result<bool, LogError> {
        let deadline = Instant::now() + timeout;
        loop {
            let committed = self
                .manager
                .driver
                .committed(group, &offset.partition)
                .await?
                .unwrap_or(0);
            if committed > offset.offset {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline - Instant::now())).await;
        }
    }
}
