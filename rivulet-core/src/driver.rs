use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::LogError;
use crate::log::LogPartition;
use crate::name::Name;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileConfig {
    pub dir: PathBuf,
}

/// Backend selection, resolved by `rivulet_log::create_log_driver`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum LogConfig {
    #[serde(rename = "inmemory")]
    InMemory,
    #[serde(rename = "file")]
    File(FileConfig),
}

/// Storage contract every log backend implements.
///
/// The runtime depends only on this trait: payloads are opaque bytes,
/// offsets are dense per-partition sequence numbers starting at 0, and
/// committed positions are stored per `(group, partition)`. A committed
/// position is the offset of the next record to deliver, so lag is
/// `end_offset - committed`. Appends must be durable per the backend's
/// contract before returning and never reorder within a partition.
#[async_trait]
pub trait LogDriver: Send + Sync + fmt::Debug {
    /// Create a log with the given partition count, returns false when it
    /// already exists (the existing partition count wins).
    async fn create_if_not_exists(&self, name: &Name, partitions: u32) -> Result<bool, LogError>;

    async fn exists(&self, name: &Name) -> bool;

    /// Partition count of an existing log.
    async fn partitions(&self, name: &Name) -> Result<u32, LogError>;

    /// Append a payload, returning its offset.
    async fn append(&self, partition: &LogPartition, payload: &[u8]) -> Result<u64, LogError>;

    /// First record at or after `offset`, or `None` when the partition end
    /// is reached. Non-blocking.
    async fn read_from(
        &self,
        partition: &LogPartition,
        offset: u64,
    ) -> Result<Option<(u64, Vec<u8>)>, LogError>;

    /// Offset the next append will get.
    async fn end_offset(&self, partition: &LogPartition) -> Result<u64, LogError>;

    async fn committed(
        &self,
        group: &Name,
        partition: &LogPartition,
    ) -> Result<Option<u64>, LogError>;

    async fn commit(
        &self,
        group: &Name,
        partition: &LogPartition,
        offset: u64,
    ) -> Result<(), LogError>;

    /// Drop the group's committed position on a partition.
    async fn reset(&self, group: &Name, partition: &LogPartition) -> Result<(), LogError>;

    async fn list_all(&self) -> Result<Vec<Name>, LogError>;

    async fn list_consumer_groups(&self, name: &Name) -> Result<Vec<Name>, LogError>;

    async fn close(&self) -> Result<(), LogError>;
}
