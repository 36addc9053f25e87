#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rivulet_core::log::LogPartition;
use rivulet_core::name::Name;
use rivulet_core::record::Record;
use rivulet_core::watermark::{now_ms, Watermark};
use rivulet_log::LogManager;
use rivulet_stream::{
    BatchComputation, Computation, ComputationContext, ComputationError, ComputationMetadata,
};

pub const OUTPUT_STREAM: &str = "output";

const GENERATE_TIMER: &str = "generate";
const SUM_TIMER: &str = "sum";

/// Record generator: emits `records` records in timed batches, the last one
/// carrying the target timestamp as watermark, then reports its source low
/// watermark and stops re-arming.
pub struct Source {
    name: String,
    records: u32,
    batch_size: u32,
    interval_ms: u64,
    target_timestamp: u64,
    emitted: u32,
}

impl Source {
    pub fn new(name: &str, records: u32, batch_size: u32, target_timestamp: u64) -> Self {
        Self {
            name: name.to_string(),
            records,
            batch_size: batch_size.max(1),
            interval_ms: 5,
            target_timestamp,
            emitted: 0,
        }
    }
}

#[async_trait]
impl Computation for Source {
    fn metadata(&self) -> ComputationMetadata {
        ComputationMetadata::new(self.name.clone(), 0, 1)
    }

    async fn init(&mut self, context: &mut ComputationContext) {
        context.set_timer(GENERATE_TIMER, now_ms());
    }

    async fn process_record(
        &mut self,
        _context: &mut ComputationContext,
        _input_stream: &str,
        _record: Record,
    ) -> Result<(), ComputationError> {
        Ok(())
    }

    async fn process_timer(
        &mut self,
        context: &mut ComputationContext,
        key: &str,
        _time_ms: u64,
    ) -> Result<(), ComputationError> {
        if key != GENERATE_TIMER {
            return Ok(());
        }
        let output = context.metadata().output_streams[0].clone();
        let end = (self.emitted + self.batch_size).min(self.records);
        while self.emitted < end {
            self.emitted += 1;
            // watermarks walk up to the target timestamp on the last record
            let timestamp = self.target_timestamp - (self.records - self.emitted) as u64;
            let record = Record::new(
                format!("record{}", self.emitted),
                Vec::new(),
                Watermark::of_timestamp(timestamp),
            );
            context.produce_record(&output, record);
        }
        if self.emitted < self.records {
            context.set_timer(GENERATE_TIMER, now_ms() + self.interval_ms);
        } else {
            context
                .set_source_low_watermark(Watermark::of_timestamp(self.target_timestamp).completed());
        }
        Ok(())
    }
}

/// Forwards every record to every declared output and checkpoints each one.
pub struct Forward {
    name: String,
    inputs: u32,
    outputs: u32,
}

impl Forward {
    pub fn new(name: &str, inputs: u32, outputs: u32) -> Self {
        Self {
            name: name.to_string(),
            inputs,
            outputs,
        }
    }
}

#[async_trait]
impl Computation for Forward {
    fn metadata(&self) -> ComputationMetadata {
        ComputationMetadata::new(self.name.clone(), self.inputs, self.outputs)
    }

    async fn process_record(
        &mut self,
        context: &mut ComputationContext,
        _input_stream: &str,
        record: Record,
    ) -> Result<(), ComputationError> {
        for output in context.metadata().output_streams.clone() {
            context.produce_record(&output, record.clone());
        }
        context.ask_for_checkpoint();
        Ok(())
    }
}

/// Forwards with an artificial per-record delay, to exercise drain under a
/// slow consumer.
pub struct SlowForward {
    inner: Forward,
    delay_ms: u64,
}

impl SlowForward {
    pub fn new(name: &str, inputs: u32, outputs: u32, delay_ms: u64) -> Self {
        Self {
            inner: Forward::new(name, inputs, outputs),
            delay_ms,
        }
    }
}

#[async_trait]
impl Computation for SlowForward {
    fn metadata(&self) -> ComputationMetadata {
        self.inner.metadata()
    }

    async fn process_record(
        &mut self,
        context: &mut ComputationContext,
        input_stream: &str,
        record: Record,
    ) -> Result<(), ComputationError> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        self.inner.process_record(context, input_stream, record).await
    }
}

/// Counts incoming records and emits the count as a record key on a
/// periodic timer; the checkpoint rides on the timer so an interrupted
/// count is re-delivered rather than lost.
pub struct Counter {
    name: String,
    interval_ms: u64,
    count: u64,
}

impl Counter {
    pub fn new(name: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            interval_ms: interval.as_millis() as u64,
            count: 0,
        }
    }
}

#[async_trait]
impl Computation for Counter {
    fn metadata(&self) -> ComputationMetadata {
        ComputationMetadata::new(self.name.clone(), 1, 1)
    }

    async fn init(&mut self, context: &mut ComputationContext) {
        context.set_timer(SUM_TIMER, now_ms() + self.interval_ms);
    }

    async fn process_record(
        &mut self,
        _context: &mut ComputationContext,
        _input_stream: &str,
        _record: Record,
    ) -> Result<(), ComputationError> {
        self.count += 1;
        Ok(())
    }

    async fn process_timer(
        &mut self,
        context: &mut ComputationContext,
        key: &str,
        _time_ms: u64,
    ) -> Result<(), ComputationError> {
        if key != SUM_TIMER {
            return Ok(());
        }
        if self.count > 0 {
            let output = context.metadata().output_streams[0].clone();
            context.produce_record(&output, Record::of(self.count.to_string(), Vec::new()));
            self.count = 0;
            context.ask_for_checkpoint();
        }
        context.set_timer(SUM_TIMER, now_ms() + self.interval_ms);
        Ok(())
    }
}

/// Forward that fails while the injected countdown is positive.
pub struct FailingForward {
    inner: Forward,
    remaining_failures: Arc<AtomicU32>,
}

impl FailingForward {
    pub fn new(name: &str, remaining_failures: Arc<AtomicU32>) -> Self {
        Self {
            inner: Forward::new(name, 1, 1),
            remaining_failures,
        }
    }
}

#[async_trait]
impl Computation for FailingForward {
    fn metadata(&self) -> ComputationMetadata {
        self.inner.metadata()
    }

    async fn process_record(
        &mut self,
        context: &mut ComputationContext,
        input_stream: &str,
        record: Record,
    ) -> Result<(), ComputationError> {
        if self.remaining_failures.load(Ordering::Acquire) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::AcqRel);
            return Err(ComputationError::state("injected failure"));
        }
        self.inner.process_record(context, input_stream, record).await
    }
}

/// Batch forward whose flush fails while the injected countdown is positive.
pub struct FailingBatchForward {
    name: String,
    remaining_failures: Arc<AtomicU32>,
}

impl FailingBatchForward {
    pub fn new(name: &str, remaining_failures: Arc<AtomicU32>) -> Self {
        Self {
            name: name.to_string(),
            remaining_failures,
        }
    }
}

#[async_trait]
impl BatchComputation for FailingBatchForward {
    fn metadata(&self) -> ComputationMetadata {
        ComputationMetadata::new(self.name.clone(), 1, 1)
    }

    async fn process_batch(
        &mut self,
        context: &mut ComputationContext,
        _input_stream: &str,
        records: &[Record],
    ) -> Result<(), ComputationError> {
        if self.remaining_failures.load(Ordering::Acquire) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::AcqRel);
            return Err(ComputationError::state("injected batch failure"));
        }
        let output = context.metadata().output_streams[0].clone();
        for record in records {
            context.produce_record(&output, record.clone());
        }
        context.ask_for_checkpoint();
        Ok(())
    }
}

/// Emits one record per flushed batch, keyed `input:len`, for asserting
/// when and how batches were cut.
pub struct BatchRecorder {
    name: String,
    inputs: u32,
}

impl BatchRecorder {
    pub fn new(name: &str, inputs: u32) -> Self {
        Self {
            name: name.to_string(),
            inputs,
        }
    }
}

#[async_trait]
impl BatchComputation for BatchRecorder {
    fn metadata(&self) -> ComputationMetadata {
        ComputationMetadata::new(self.name.clone(), self.inputs, 1)
    }

    async fn process_batch(
        &mut self,
        context: &mut ComputationContext,
        input_stream: &str,
        records: &[Record],
    ) -> Result<(), ComputationError> {
        let output = context.metadata().output_streams[0].clone();
        context.produce_record(
            &output,
            Record::of(format!("{}:{}", input_stream, records.len()), Vec::new()),
        );
        context.ask_for_checkpoint();
        Ok(())
    }
}

/// Sum of the integer keys written to a stream, the way counter output is
/// folded back into a total.
pub async fn read_counter_sum(manager: &LogManager, stream: &str) -> u64 {
    let name = Name::of_urn(stream);
    let group = Name::of_urn("test/results");
    let partitions = manager.size(&name).await.expect("size");
    let mut sum = 0;
    for p in 0..partitions {
        let mut tailer = manager
            .create_tailer::<Record>(&group, LogPartition::of(name.clone(), p))
            .await
            .expect("tailer");
        tailer.to_start();
        while let Some(record) = tailer
            .read(Duration::from_millis(500))
            .await
            .expect("read")
        {
            sum += record.message.key.parse::<u64>().unwrap_or(0);
        }
    }
    sum
}

/// Keys of every record in a stream, in partition order.
pub async fn read_keys(manager: &LogManager, stream: &str) -> Vec<String> {
    let name = Name::of_urn(stream);
    let group = Name::of_urn("test/results");
    let partitions = manager.size(&name).await.expect("size");
    let mut keys = Vec::new();
    for p in 0..partitions {
        let mut tailer = manager
            .create_tailer::<Record>(&group, LogPartition::of(name.clone(), p))
            .await
            .expect("tailer");
        tailer.to_start();
        while let Some(record) = tailer
            .read(Duration::from_millis(500))
            .await
            .expect("read")
        {
            keys.push(record.message.key.clone());
        }
    }
    keys
}

pub async fn count_records(manager: &LogManager, stream: &str) -> u64 {
    read_keys(manager, stream).await.len() as u64
}
