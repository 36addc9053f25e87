use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rivulet_core::record::Record;
use rivulet_core::watermark::now_ms;

use crate::computation::{Computation, ComputationContext, ComputationMetadata};
use crate::policy::{ComputationError, ComputationPolicy};

const BATCH_TIMER_KEY: &str = "_batch";

/// Batch-oriented processing logic: records of one input stream are
/// accumulated and handed over as a whole.
#[async_trait]
pub trait BatchComputation: Send {
    fn metadata(&self) -> ComputationMetadata;

    async fn batch_init(&mut self, _context: &mut ComputationContext) {}

    /// Process one accumulated batch. Failing fails the whole batch: the
    /// runner's policy retries or drops it as a unit.
    async fn process_batch(
        &mut self,
        context: &mut ComputationContext,
        input_stream: &str,
        records: &[Record],
    ) -> Result<(), ComputationError>;

    /// Invoked when a batch is dropped after the retry policy gave up.
    async fn batch_failure(
        &mut self,
        _context: &mut ComputationContext,
        _input_stream: &str,
        _records: &[Record],
    ) {
    }

    async fn batch_destroy(&mut self) {}
}

/// Adapter running a `BatchComputation` as a regular `Computation`.
///
/// A batch is flushed when it reaches the policy's capacity, when the batch
/// timer (armed in `init`, re-armed after every flush) fires past the
/// threshold, or when a record arrives on a different input stream than the
/// accumulated batch. A failed flush keeps the batch so a runner retry
/// re-attempts it whole; when retries are exhausted the batch is dropped
/// and counted.
pub struct Batched<B> {
    inner: B,
    capacity: usize,
    threshold_ms: u64,
    batch: Vec<Record>,
    current_input: Option<String>,
    // set when a flush failed, so the retried callback re-attempts the same
    // batch instead of buffering its record twice
    pending_flush: bool,
    // whether the failed flush already contains the retried record: true
    // for a capacity flush, false for a stream-switch flush
    pending_covers_trigger: bool,
    flushed: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl<B: BatchComputation> Batched<B> {
    pub fn new(inner: B, policy: &ComputationPolicy) -> Self {
        Self::with_counters(
            inner,
            policy,
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicU64::new(0)),
        )
    }

    /// Injectable success/failure counters, mostly for tests.
    pub fn with_counters(
        inner: B,
        policy: &ComputationPolicy,
        flushed: Arc<AtomicU64>,
        failures: Arc<AtomicU64>,
    ) -> Self {
        Self {
            inner,
            capacity: policy.batch_capacity(),
            threshold_ms: policy.batch_threshold().as_millis() as u64,
            batch: Vec::new(),
            current_input: None,
            pending_flush: false,
            pending_covers_trigger: false,
            flushed,
            failures,
        }
    }

    pub fn flushed_count(&self) -> u64 {
        self.flushed.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    async fn flush(&mut self, context: &mut ComputationContext) -> Result<(), ComputationError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let input = self.current_input.clone().unwrap_or_default();
        match self.inner.process_batch(context, &input, &self.batch).await {
            Ok(()) => {
                self.batch.clear();
                self.pending_flush = false;
                self.flushed.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(e) => {
                self.pending_flush = true;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<B: BatchComputation> Computation for Batched<B> {
    fn metadata(&self) -> ComputationMetadata {
        self.inner.metadata()
    }

    async fn init(&mut self, context: &mut ComputationContext) {
        self.inner.batch_init(context).await;
        context.set_timer(BATCH_TIMER_KEY, now_ms() + self.threshold_ms);
    }

    async fn process_record(
        &mut self,
        context: &mut ComputationContext,
        input_stream: &str,
        record: Record,
    ) -> Result<(), ComputationError> {
        if self.pending_flush {
            // retry of a failed flush before anything else
            self.flush(context).await?;
            if self.pending_covers_trigger {
                // the retried record is part of the flushed batch
                return Ok(());
            }
        }
        if let Some(current) = &self.current_input {
            if current != input_stream && !self.batch.is_empty() {
                // a different input stream forces a flush to preserve
                // per-stream ordering
                if let Err(e) = self.flush(context).await {
                    self.pending_covers_trigger = false;
                    return Err(e);
                }
            }
        }
        self.current_input = Some(input_stream.to_string());
        self.batch.push(record);
        if self.batch.len() >= self.capacity {
            if let Err(e) = self.flush(context).await {
                self.pending_covers_trigger = true;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn process_timer(
        &mut self,
        context: &mut ComputationContext,
        key: &str,
        _time_ms: u64,
    ) -> Result<(), ComputationError> {
        if key != BATCH_TIMER_KEY {
            return Ok(());
        }
        let result = self.flush(context).await;
        context.set_timer(BATCH_TIMER_KEY, now_ms() + self.threshold_ms);
        result
    }

    async fn process_failure(&mut self, context: &mut ComputationContext) {
        // the batch is dropped as a unit once the policy gave up
        let records = std::mem::take(&mut self.batch);
        let input = self.current_input.clone().unwrap_or_default();
        self.pending_flush = false;
        self.pending_covers_trigger = false;
        self.failures.fetch_add(1, Ordering::AcqRel);
        self.inner.batch_failure(context, &input, &records).await;
    }

    async fn destroy(&mut self) {
        self.inner.batch_destroy().await;
    }
}
