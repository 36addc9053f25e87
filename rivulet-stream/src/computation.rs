use async_trait::async_trait;
use std::collections::BTreeMap;

use rivulet_core::record::Record;
use rivulet_core::watermark::Watermark;

use crate::policy::ComputationError;

/// Declared identity and arity of a computation.
///
/// A computation declares positional slots (`i1..iN`, `o1..oN`); the
/// topology rewrites them to concrete stream names when it is built. The
/// metadata never changes afterwards: `process_record` only sees input
/// streams listed here and may only produce to the listed outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputationMetadata {
    pub name: String,
    pub input_streams: Vec<String>,
    pub output_streams: Vec<String>,
}

impl ComputationMetadata {
    /// Metadata with positional slot names, the usual way to declare arity.
    pub fn new(name: impl Into<String>, inputs: u32, outputs: u32) -> Self {
        Self {
            name: name.into(),
            input_streams: (1..=inputs).map(|i| format!("i{}", i)).collect(),
            output_streams: (1..=outputs).map(|o| format!("o{}", o)).collect(),
        }
    }

    pub fn with_streams(
        name: impl Into<String>,
        input_streams: Vec<String>,
        output_streams: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            input_streams,
            output_streams,
        }
    }
}

/// A unit of processing logic wired into a topology.
///
/// Lifecycle: `init` exactly once before any delivery, then `process_record`
/// / `process_timer` interleaved but never concurrently on one instance,
/// `destroy` at the end. Records can be redelivered after a crash, so
/// callbacks should be safe to re-invoke.
#[async_trait]
pub trait Computation: Send {
    fn metadata(&self) -> ComputationMetadata;

    async fn init(&mut self, _context: &mut ComputationContext) {}

    async fn process_record(
        &mut self,
        context: &mut ComputationContext,
        input_stream: &str,
        record: Record,
    ) -> Result<(), ComputationError>;

    async fn process_timer(
        &mut self,
        _context: &mut ComputationContext,
        _key: &str,
        _time_ms: u64,
    ) -> Result<(), ComputationError> {
        Ok(())
    }

    /// Invoked before each retry attempt of a failed callback.
    async fn process_retry(
        &mut self,
        _context: &mut ComputationContext,
        _failure: &ComputationError,
    ) {
    }

    /// Invoked once the retry policy is exhausted, before the runner skips
    /// or aborts.
    async fn process_failure(&mut self, _context: &mut ComputationContext) {}

    async fn destroy(&mut self) {}
}

/// Per-instance bridge between a computation and its runner.
///
/// Produced records are buffered and only appended downstream once the
/// current callback returns without error, so a failed callback has no
/// observable output. Checkpointing is explicit: the consumed offsets are
/// committed after the callback only when `ask_for_checkpoint` was called.
#[derive(Debug)]
pub struct ComputationContext {
    metadata: ComputationMetadata,
    produced: Vec<(String, Record)>,
    timers: BTreeMap<String, u64>,
    checkpoint_requested: bool,
    source_low_watermark: u64,
}

impl ComputationContext {
    pub(crate) fn new(metadata: ComputationMetadata) -> Self {
        Self {
            metadata,
            produced: Vec::new(),
            timers: BTreeMap::new(),
            checkpoint_requested: false,
            source_low_watermark: 0,
        }
    }

    pub fn metadata(&self) -> &ComputationMetadata {
        &self.metadata
    }

    /// Buffer a record for a declared output stream.
    pub fn produce_record(&mut self, output_stream: &str, record: Record) {
        self.produced.push((output_stream.to_string(), record));
    }

    /// Arm (or re-arm) the timer registered under `key`; at most one timer
    /// per key is pending at a time.
    pub fn set_timer(&mut self, key: &str, due_ms: u64) {
        self.timers.insert(key.to_string(), due_ms);
    }

    pub fn cancel_timer(&mut self, key: &str) {
        self.timers.remove(key);
    }

    pub fn timers(&self) -> &BTreeMap<String, u64> {
        &self.timers
    }

    /// Request a commit of the consumed offsets once the current callback
    /// completes successfully.
    pub fn ask_for_checkpoint(&mut self) {
        self.checkpoint_requested = true;
    }

    /// Report the minimum watermark fully processed by a pure producer.
    pub fn set_source_low_watermark(&mut self, watermark: Watermark) {
        self.source_low_watermark = watermark.value();
    }

    pub(crate) fn take_produced(&mut self) -> Vec<(String, Record)> {
        std::mem::take(&mut self.produced)
    }

    pub(crate) fn clear_produced(&mut self) {
        self.produced.clear();
    }

    pub(crate) fn checkpoint_requested(&self) -> bool {
        self.checkpoint_requested
    }

    pub(crate) fn clear_checkpoint_request(&mut self) {
        self.checkpoint_requested = false;
    }

    pub(crate) fn source_low_watermark(&self) -> u64 {
        self.source_low_watermark
    }

    /// Remove and return the timers due at `now_ms`, oldest first.
    pub(crate) fn take_due_timers(&mut self, now_ms: u64) -> Vec<(String, u64)> {
        let due: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, time)| **time <= now_ms)
            .map(|(key, _)| key.clone())
            .collect();
        due.into_iter()
            .map(|key| {
                let time = self.timers.remove(&key).unwrap_or(0);
                (key, time)
            })
            .collect()
    }
}
