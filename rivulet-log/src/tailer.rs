use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use rivulet_core::codec::Codec;
use rivulet_core::error::LogError;
use rivulet_core::log::{LogOffset, LogPartition, LogRecord};
use rivulet_core::name::Name;

use crate::manager::ManagerInner;

const READ_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct Cursor {
    partition: LogPartition,
    // next offset to deliver, also the position persisted by commit()
    next: u64,
}

/// Read handle of a consumer group over an assigned set of partitions.
///
/// A tailer owns its partitions exclusively within the group for as long as
/// it is open. Reading round-robins across the assignment; committing
/// persists the current read position of every assigned partition, which is
/// the unit of at-least-once delivery.
pub struct LogTailer<M>
where
    M: Serialize + DeserializeOwned,
{
    manager: Arc<ManagerInner>,
    group: Name,
    cursors: Vec<Cursor>,
    rotation: usize,
    codec: Arc<dyn Codec<M>>,
    closed: bool,
}

impl<M> fmt::Debug for LogTailer<M>
where
    M: Serialize + DeserializeOwned,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogTailer")
            .field("group", &self.group)
            .field("assignments", &self.cursors.len())
            .field("codec", &self.codec.name())
            .field("closed", &self.closed)
            .finish()
    }
}

impl<M> LogTailer<M>
where
    M: Serialize + DeserializeOwned,
{
    pub(crate) fn new(
        manager: Arc<ManagerInner>,
        group: Name,
        cursors: Vec<(LogPartition, u64)>,
        codec: Arc<dyn Codec<M>>,
    ) -> Self {
        Self {
            manager,
            group,
            cursors: cursors
                .into_iter()
                .map(|(partition, next)| Cursor { partition, next })
                .collect(),
            rotation: 0,
            codec,
            closed: false,
        }
    }

    pub fn group(&self) -> &Name {
        &self.group
    }

    pub fn assignments(&self) -> Vec<LogPartition> {
        self.cursors.iter().map(|c| c.partition.clone()).collect()
    }

    pub fn codec(&self) -> &Arc<dyn Codec<M>> {
        &self.codec
    }

    pub fn closed(&self) -> bool {
        self.closed || self.manager.is_closed()
    }

    /// Read the next record across the assignment, blocking up to `timeout`.
    /// Returns `None` on timeout, an empty log is not an error.
    pub async fn read(&mut self, timeout: Duration) -> Result<Option<LogRecord<M>>, LogError> {
        if self.closed() {
            return Err(LogError::Closed);
        }
        let deadline = Instant::now() + timeout;
        loop {
            for turn in 0..self.cursors.len() {
                let index = (self.rotation + turn) % self.cursors.len();
                let cursor = &self.cursors[index];
                if let Some((offset, payload)) = self
                    .manager
                    .driver
                    .read_from(&cursor.partition, cursor.next)
                    .await?
                {
                    let message = self.codec.decode(&payload)?;
                    let partition = cursor.partition.clone();
                    self.cursors[index].next = offset + 1;
                    // move fairness past the partition that just delivered
                    self.rotation = (index + 1) % self.cursors.len();
                    return Ok(Some(LogRecord::new(
                        message,
                        LogOffset::of(partition, offset),
                    )));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(READ_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// True when every assigned partition has been read up to its end.
    pub async fn at_end(&self) -> Result<bool, LogError> {
        for cursor in &self.cursors {
            if self.manager.driver.end_offset(&cursor.partition).await? > cursor.next {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reposition to the beginning of every assigned partition, without
    /// committing.
    pub fn to_start(&mut self) {
        for cursor in &mut self.cursors {
            cursor.next = 0;
        }
    }

    /// Reposition past the last appended record of every assigned partition.
    pub async fn to_end(&mut self) -> Result<(), LogError> {
        for cursor in &mut self.cursors {
            cursor.next = self.manager.driver.end_offset(&cursor.partition).await?;
        }
        Ok(())
    }

    /// Reposition to the group's last committed position.
    pub async fn to_last_committed(&mut self) -> Result<(), LogError> {
        for cursor in &mut self.cursors {
            cursor.next = self
                .manager
                .driver
                .committed(&self.group, &cursor.partition)
                .await?
                .unwrap_or(0);
        }
        Ok(())
    }

    /// Reposition one assigned partition to an explicit offset.
    pub fn seek(&mut self, offset: &LogOffset) -> Result<(), LogError> {
        match self
            .cursors
            .iter_mut()
            .find(|c| c.partition == offset.partition)
        {
            Some(cursor) => {
                cursor.next = offset.offset;
                Ok(())
            }
            None => Err(LogError::UnassignedPartition(offset.partition.clone())),
        }
    }

    /// Persist the current read position of every assigned partition.
    /// Idempotent.
    pub async fn commit(&mut self) -> Result<(), LogError> {
        if self.closed() {
            return Err(LogError::Closed);
        }
        for cursor in &self.cursors {
            self.manager
                .driver
                .commit(&self.group, &cursor.partition, cursor.next)
                .await?;
        }
        Ok(())
    }

    /// Persist the current read position of one assigned partition.
    pub async fn commit_partition(&mut self, partition: &LogPartition) -> Result<(), LogError> {
        let cursor = self
            .cursors
            .iter()
            .find(|c| &c.partition == partition)
            .ok_or_else(|| LogError::UnassignedPartition(partition.clone()))?;
        self.manager
            .driver
            .commit(&self.group, &cursor.partition, cursor.next)
            .await
    }

    /// Forget the group's committed positions and rewind to the start.
    pub async fn reset(&mut self) -> Result<(), LogError> {
        for cursor in &mut self.cursors {
            self.manager
                .driver
                .reset(&self.group, &cursor.partition)
                .await?;
            cursor.next = 0;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.release();
        }
    }

    fn release(&self) {
        for cursor in &self.cursors {
            self.manager
                .open_tailers
                .remove(&(self.group.clone(), cursor.partition.clone()));
        }
    }
}

impl<M> Drop for LogTailer<M>
where
    M: Serialize + DeserializeOwned,
{
    fn drop(&mut self) {
        if !self.closed {
            self.release();
        }
    }
}
