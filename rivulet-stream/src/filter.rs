use std::fmt;
use std::sync::Arc;

use rivulet_core::record::Record;

/// Transform or drop hook applied on the way into and out of a stream.
///
/// Filters never mutate a record, they return a new one, or `None` to drop
/// it. A dropped record is invisible to every tailer of the stream.
pub trait RecordFilter: Send + Sync + fmt::Debug {
    fn before_append(&self, record: Record) -> Option<Record> {
        Some(record)
    }

    fn after_read(&self, record: Record) -> Option<Record> {
        Some(record)
    }
}

/// Filters of one stream, applied in registration order.
#[derive(Debug, Clone, Default)]
pub struct RecordFilterChain {
    filters: Vec<Arc<dyn RecordFilter>>,
}

impl RecordFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, filter: Arc<dyn RecordFilter>) {
        self.filters.push(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn before_append(&self, record: Record) -> Option<Record> {
        let mut current = record;
        for filter in &self.filters {
            current = filter.before_append(current)?;
        }
        Some(current)
    }

    pub fn after_read(&self, record: Record) -> Option<Record> {
        let mut current = record;
        for filter in &self.filters {
            current = filter.after_read(current)?;
        }
        Some(current)
    }
}
