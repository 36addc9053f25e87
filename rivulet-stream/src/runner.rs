use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use rivulet_core::codec::Codec;
use rivulet_core::error::LogError;
use rivulet_core::log::LogPartition;
use rivulet_core::name::Name;
use rivulet_core::record::Record;
use rivulet_core::watermark::{now_ms, Watermark};
use rivulet_log::LogTailer;

use crate::computation::{Computation, ComputationContext, ComputationMetadata};
use crate::error::StreamError;
use crate::manager::StreamManager;
use crate::policy::ComputationPolicy;
use crate::topology::ComputationSupplier;

const READ_TIMEOUT: Duration = Duration::from_millis(25);
// a drain waits at least this long without reads before a runner may exit,
// leaving room for periodic timers to flush their tail output
const DRAIN_QUIET: Duration = Duration::from_millis(500);

/// Shared stop signals of one processor.
#[derive(Debug, Default)]
pub(crate) struct ControlFlags {
    pub(crate) drain: AtomicBool,
    pub(crate) shutdown: AtomicBool,
}

/// Observable state of one worker instance.
#[derive(Debug)]
pub(crate) struct RunnerState {
    pub(crate) instance: u32,
    pub(crate) assigned: AtomicBool,
    pub(crate) finished: AtomicBool,
    pub(crate) aborted: AtomicBool,
    pub(crate) low_watermark: AtomicU64,
    pub(crate) processed: AtomicU64,
    pub(crate) failures: AtomicU64,
}

impl RunnerState {
    pub(crate) fn new(instance: u32) -> Self {
        Self {
            instance,
            assigned: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            low_watermark: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    fn update_low_watermark(&self, candidate: u64) {
        self.low_watermark.fetch_max(candidate, Ordering::AcqRel);
    }
}

enum Call<'a> {
    Record { stream: &'a str, record: &'a Record },
    Timer { key: &'a str, time_ms: u64 },
}

enum Invocation {
    Ok,
    Skipped,
    Abort,
}

/// One worker instance: owns a disjoint partition subset of the
/// computation's input streams and drives the callback loop.
pub(crate) struct Runner {
    pub(crate) manager: StreamManager,
    pub(crate) supplier: ComputationSupplier,
    pub(crate) metadata: ComputationMetadata,
    pub(crate) policy: ComputationPolicy,
    pub(crate) codec: Arc<dyn Codec<Record>>,
    pub(crate) assignments: Vec<LogPartition>,
    pub(crate) state: Arc<RunnerState>,
    pub(crate) control: Arc<ControlFlags>,
}

impl Runner {
    pub(crate) async fn run(self) {
        let group = Name::of_urn(&self.metadata.name);
        let mut computation = (self.supplier)();
        let mut context = ComputationContext::new(self.metadata.clone());
        let mut tailer: Option<LogTailer<Record>> = if self.assignments.is_empty() {
            None
        } else {
            match self
                .manager
                .log_manager()
                .create_partitions_tailer::<Record>(
                    &group,
                    self.assignments.clone(),
                    self.codec.clone(),
                )
                .await
            {
                Ok(tailer) => Some(tailer),
                Err(e) => {
                    error!(
                        target = "processor",
                        computation = %self.metadata.name,
                        instance = self.state.instance,
                        error = %e,
                        "cannot create tailer, worker aborted"
                    );
                    self.state.aborted.store(true, Ordering::Release);
                    self.state.finished.store(true, Ordering::Release);
                    return;
                }
            }
        };
        self.state.assigned.store(true, Ordering::Release);
        debug!(
            target = "processor",
            computation = %self.metadata.name,
            instance = self.state.instance,
            partitions = self.assignments.len(),
            "worker assigned"
        );

        computation.init(&mut context).await;
        if let Err(e) = self.flush_outputs(&mut context).await {
            error!(
                target = "processor",
                computation = %self.metadata.name,
                error = %e,
                "flush after init failed, worker aborted"
            );
            self.state.aborted.store(true, Ordering::Release);
            self.finish(computation, tailer).await;
            return;
        }

        let quiet = DRAIN_QUIET.max(self.policy.batch_threshold() * 2);
        let mut last_activity = Instant::now();
        let mut failure_ordinal: u32 = 0;
        // highest watermark processed since the last commit; folded into the
        // observable low watermark only once the offsets are committed
        let mut pending_watermark: u64 = 0;

        'main: loop {
            if self.control.shutdown.load(Ordering::Acquire) {
                break;
            }
            for (key, time_ms) in context.take_due_timers(now_ms()) {
                let call = Call::Timer {
                    key: key.as_str(),
                    time_ms,
                };
                match self
                    .invoke(
                        &mut computation,
                        &mut context,
                        call,
                        &mut tailer,
                        &mut failure_ordinal,
                        &mut pending_watermark,
                    )
                    .await
                {
                    Invocation::Ok | Invocation::Skipped => {}
                    Invocation::Abort => break 'main,
                }
            }
            let read = match tailer.as_mut() {
                Some(t) => Some(t.read(READ_TIMEOUT).await),
                None => None,
            };
            match read {
                Some(Ok(Some(log_record))) => {
                    last_activity = Instant::now();
                    let stream = log_record.offset.partition.name.urn().to_string();
                    let record = match self.manager.after_read(&stream, log_record.message) {
                        Some(record) => record,
                        // dropped by an after-read filter
                        None => continue,
                    };
                    let call = Call::Record {
                        stream: &stream,
                        record: &record,
                    };
                    match self
                        .invoke(
                            &mut computation,
                            &mut context,
                            call,
                            &mut tailer,
                            &mut failure_ordinal,
                            &mut pending_watermark,
                        )
                        .await
                    {
                        Invocation::Ok | Invocation::Skipped => {}
                        Invocation::Abort => break 'main,
                    }
                }
                Some(Ok(None)) => {
                    if self.control.drain.load(Ordering::Acquire)
                        && last_activity.elapsed() >= quiet
                        && self.at_end(&tailer).await
                    {
                        break;
                    }
                }
                Some(Err(LogError::Codec(e))) => {
                    error!(
                        target = "processor",
                        computation = %self.metadata.name,
                        error = %e,
                        "undecodable input, worker aborted"
                    );
                    self.state.aborted.store(true, Ordering::Release);
                    break;
                }
                Some(Err(e)) => {
                    warn!(
                        target = "processor",
                        computation = %self.metadata.name,
                        error = %e,
                        "read failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                None => {
                    // pure source, timers drive everything
                    if self.control.drain.load(Ordering::Acquire) && context.timers().is_empty() {
                        break;
                    }
                    tokio::time::sleep(READ_TIMEOUT).await;
                }
            }
        }

        let clean_exit = !self.control.shutdown.load(Ordering::Acquire)
            && !self.state.aborted.load(Ordering::Acquire);
        if clean_exit {
            // drained: persist the consumed positions so a restart does not
            // replay work that was fully processed
            if let Some(t) = tailer.as_mut() {
                match t.commit().await {
                    Ok(()) => self.state.update_low_watermark(pending_watermark),
                    Err(e) => warn!(
                        target = "processor",
                        computation = %self.metadata.name,
                        error = %e,
                        "final commit failed"
                    ),
                }
            }
        }
        self.finish(computation, tailer).await;
    }

    async fn finish(
        &self,
        mut computation: Box<dyn Computation>,
        tailer: Option<LogTailer<Record>>,
    ) {
        computation.destroy().await;
        if let Some(mut t) = tailer {
            t.close();
        }
        self.state.finished.store(true, Ordering::Release);
        debug!(
            target = "processor",
            computation = %self.metadata.name,
            instance = self.state.instance,
            "worker stopped"
        );
    }

    async fn at_end(&self, tailer: &Option<LogTailer<Record>>) -> bool {
        match tailer {
            Some(t) => t.at_end().await.unwrap_or(true),
            None => true,
        }
    }

    /// Run one callback under the retry policy, then flush its output and
    /// honor its checkpoint request. Returns how the worker should proceed.
    async fn invoke(
        &self,
        computation: &mut Box<dyn Computation>,
        context: &mut ComputationContext,
        call: Call<'_>,
        tailer: &mut Option<LogTailer<Record>>,
        failure_ordinal: &mut u32,
        pending_watermark: &mut u64,
    ) -> Invocation {
        let retry = self.policy.retry_policy();
        let mut attempt = 0u32;
        let failure = loop {
            // a failed attempt must leave no observable output behind
            context.clear_produced();
            let result = match &call {
                Call::Record { stream, record } => {
                    computation
                        .process_record(context, stream, (*record).clone())
                        .await
                }
                Call::Timer { key, time_ms } => {
                    computation.process_timer(context, key, *time_ms).await
                }
            };
            match result {
                Ok(()) => break None,
                Err(e) => {
                    if attempt < retry.max_retries() && retry.accepts(e.kind()) {
                        attempt += 1;
                        warn!(
                            target = "processor",
                            computation = %self.metadata.name,
                            attempt,
                            error = %e,
                            "callback failed, retrying"
                        );
                        computation.process_retry(context, &e).await;
                        tokio::time::sleep(retry.delay_for(attempt)).await;
                        continue;
                    }
                    break Some(e);
                }
            }
        };
        match failure {
            None => {
                if let Err(e) = self.flush_outputs(context).await {
                    error!(
                        target = "processor",
                        computation = %self.metadata.name,
                        error = %e,
                        "flush failed, worker aborted"
                    );
                    self.state.aborted.store(true, Ordering::Release);
                    return Invocation::Abort;
                }
                if let Call::Record { record, .. } = &call {
                    self.state.processed.fetch_add(1, Ordering::AcqRel);
                    *pending_watermark = (*pending_watermark)
                        .max(Watermark::of_value(record.watermark).completed().value());
                }
                if context.checkpoint_requested() {
                    context.clear_checkpoint_request();
                    if let Some(t) = tailer.as_mut() {
                        if let Err(e) = t.commit().await {
                            error!(
                                target = "processor",
                                computation = %self.metadata.name,
                                error = %e,
                                "checkpoint commit failed, worker aborted"
                            );
                            self.state.aborted.store(true, Ordering::Release);
                            return Invocation::Abort;
                        }
                    }
                    // offsets are durable, the processed watermarks become
                    // part of the observable progress
                    self.state.update_low_watermark(*pending_watermark);
                }
                let source_watermark = context.source_low_watermark();
                if source_watermark > 0 {
                    self.state.update_low_watermark(source_watermark);
                }
                Invocation::Ok
            }
            Some(e) => {
                self.state.failures.fetch_add(1, Ordering::AcqRel);
                *failure_ordinal += 1;
                context.clear_produced();
                computation.process_failure(context).await;
                let skip = self.policy.continue_on_failure()
                    || *failure_ordinal <= self.policy.skip_first_failures();
                if skip {
                    warn!(
                        target = "processor",
                        computation = %self.metadata.name,
                        error = %e,
                        failure = *failure_ordinal,
                        "failure skipped, committing past it"
                    );
                    context.clear_checkpoint_request();
                    if let Some(t) = tailer.as_mut() {
                        if t.commit().await.is_err() {
                            self.state.aborted.store(true, Ordering::Release);
                            return Invocation::Abort;
                        }
                        self.state.update_low_watermark(*pending_watermark);
                    }
                    Invocation::Skipped
                } else {
                    error!(
                        target = "processor",
                        computation = %self.metadata.name,
                        instance = self.state.instance,
                        error = %e,
                        "failure exhausted the retry policy, worker aborted"
                    );
                    self.state.aborted.store(true, Ordering::Release);
                    Invocation::Abort
                }
            }
        }
    }

    /// Append buffered output records, applying before-append filters, only
    /// to streams the computation declared.
    async fn flush_outputs(&self, context: &mut ComputationContext) -> Result<(), StreamError> {
        for (stream, record) in context.take_produced() {
            if !self.metadata.output_streams.contains(&stream) {
                return Err(StreamError::InvalidTopology(format!(
                    "computation {} produced to undeclared stream {}",
                    self.metadata.name, stream
                )));
            }
            self.manager.append(&stream, record).await?;
        }
        Ok(())
    }
}
