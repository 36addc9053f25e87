use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use rivulet_core::log::{Latency, LogLag, LogPartition};
use rivulet_core::name::Name;
use rivulet_core::record::Record;
use rivulet_core::watermark::Watermark;

use crate::error::StreamError;
use crate::manager::StreamManager;
use crate::runner::{ControlFlags, Runner, RunnerState};
use crate::settings::Settings;
use crate::topology::Topology;

const ASSIGNMENT_POLL: Duration = Duration::from_millis(10);
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Lifecycle of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Created,
    Started,
    Draining,
    Drained,
    /// Every worker stopped on its own, by abort or zero concurrency.
    Terminated,
    Stopped,
}

const STATE_CREATED: u8 = 0;
const STATE_STARTED: u8 = 1;
const STATE_DRAINING: u8 = 2;
const STATE_DRAINED: u8 = 3;
const STATE_STOPPED: u8 = 4;

#[derive(Debug)]
struct ComputationPool {
    name: String,
    runners: Vec<Arc<RunnerState>>,
}

/// The execution engine of one registered topology.
///
/// `start` spawns `concurrency` workers per computation, each owning a
/// disjoint partition subset of its input streams (partition index modulo
/// worker count). Progress is observable at any time through lag, the
/// global low watermark and per-computation latency.
#[derive(Clone)]
pub struct StreamProcessor {
    inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
    manager: StreamManager,
    topology: Topology,
    settings: Settings,
    control: Arc<ControlFlags>,
    state: AtomicU8,
    pools: Mutex<Vec<ComputationPool>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for StreamProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamProcessor")
            .field("state", &self.state())
            .field("computations", &self.inner.topology.computation_names())
            .finish_non_exhaustive()
    }
}

impl StreamProcessor {
    pub(crate) fn new(manager: StreamManager, topology: Topology, settings: Settings) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                manager,
                topology,
                settings,
                control: Arc::new(ControlFlags::default()),
                state: AtomicU8::new(STATE_CREATED),
                pools: Mutex::new(Vec::new()),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the workers. A computation configured with zero concurrency is
    /// registered but never runs: records addressed to it pile up as lag
    /// until the concurrency is raised on a later start.
    pub fn start(&self) -> Result<(), StreamError> {
        if self
            .inner
            .state
            .compare_exchange(
                STATE_CREATED,
                STATE_STARTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(StreamError::AlreadyStarted);
        }
        let mut pools = Vec::new();
        let mut handles = Vec::new();
        for name in self.inner.topology.computation_names() {
            let metadata = self
                .inner
                .topology
                .metadata(&name)
                .ok_or_else(|| StreamError::UnknownComputation(name.clone()))?
                .clone();
            let supplier = self
                .inner
                .topology
                .supplier(&name)
                .ok_or_else(|| StreamError::UnknownComputation(name.clone()))?;
            let concurrency = self.inner.settings.concurrency(&name);
            let policy = self.inner.settings.policy(&name);
            // all inputs share one codec, validated at registration
            let codec = match metadata.input_streams.first() {
                Some(stream) => self.inner.settings.codec(stream),
                None => self.inner.settings.codec(&name),
            };
            info!(
                target = "processor",
                computation = %name,
                concurrency,
                "starting computation pool"
            );
            let mut runners = Vec::new();
            for instance in 0..concurrency {
                let assignments =
                    assign_partitions(&metadata.input_streams, instance, concurrency, &self.inner.settings);
                let state = Arc::new(RunnerState::new(instance));
                runners.push(state.clone());
                let runner = Runner {
                    manager: self.inner.manager.clone(),
                    supplier: supplier.clone(),
                    metadata: metadata.clone(),
                    policy: policy.clone(),
                    codec: codec.clone(),
                    assignments,
                    state,
                    control: self.inner.control.clone(),
                };
                handles.push(tokio::spawn(runner.run()));
            }
            pools.push(ComputationPool { name, runners });
        }
        *self.inner.pools.lock().expect("pools lock") = pools;
        self.inner
            .handles
            .lock()
            .expect("handles lock")
            .extend(handles);
        Ok(())
    }

    /// Block until every worker has been handed its partitions, false on
    /// timeout.
    pub async fn wait_for_assignments(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let ready = self
                .runner_states()
                .iter()
                .all(|r| r.assigned.load(Ordering::Acquire) || r.finished.load(Ordering::Acquire));
            if ready {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(ASSIGNMENT_POLL).await;
        }
    }

    /// Minimum watermark fully processed across all workers, 0 while no
    /// worker has reported yet. Monotonically non-decreasing absent
    /// reassignment.
    pub fn get_low_watermark(&self) -> u64 {
        self.runner_states()
            .iter()
            .map(|r| r.low_watermark.load(Ordering::Acquire))
            .filter(|wm| *wm > 0)
            .min()
            .unwrap_or(0)
    }

    pub fn get_low_watermark_for(&self, computation: &str) -> Option<u64> {
        let pools = self.inner.pools.lock().expect("pools lock");
        pools.iter().find(|p| p.name == computation).map(|pool| {
            pool.runners
                .iter()
                .map(|r| r.low_watermark.load(Ordering::Acquire))
                .filter(|wm| *wm > 0)
                .min()
                .unwrap_or(0)
        })
    }

    /// True once the global low watermark has passed the watermark derived
    /// from `timestamp_ms`.
    pub fn is_done(&self, timestamp_ms: u64) -> bool {
        Watermark::of_value(self.get_low_watermark()).is_done(timestamp_ms)
    }

    /// Wait until no stream in the topology has pending records, then stop
    /// every worker cleanly. False on timeout, without stopping.
    pub async fn drain_and_stop(&self, timeout: Duration) -> Result<bool, StreamError> {
        self.inner.control.drain.store(true, Ordering::Release);
        self.inner
            .state
            .store(STATE_DRAINING, Ordering::Release);
        let deadline = Instant::now() + timeout;
        loop {
            if self
                .runner_states()
                .iter()
                .all(|r| r.finished.load(Ordering::Acquire))
            {
                break;
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
        let handles: Vec<JoinHandle<()>> =
            self.inner.handles.lock().expect("handles lock").drain(..).collect();
        futures::future::join_all(handles).await;
        self.inner.state.store(STATE_DRAINED, Ordering::Release);
        info!(target = "processor", "drained and stopped");
        Ok(true)
    }

    /// Immediate stop, abandoning in-flight uncommitted work. Safe because
    /// redelivery after restart is expected.
    pub async fn shutdown(&self) {
        self.inner.control.shutdown.store(true, Ordering::Release);
        let handles: Vec<JoinHandle<()>> =
            self.inner.handles.lock().expect("handles lock").drain(..).collect();
        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .is_err()
            {
                abort.abort();
            }
        }
        self.inner.state.store(STATE_STOPPED, Ordering::Release);
        info!(target = "processor", "shutdown complete");
    }

    /// Stop after the in-flight callback, without draining.
    pub async fn stop(&self) {
        self.inner.control.shutdown.store(true, Ordering::Release);
        let handles: Vec<JoinHandle<()>> =
            self.inner.handles.lock().expect("handles lock").drain(..).collect();
        futures::future::join_all(handles).await;
        self.inner.state.store(STATE_STOPPED, Ordering::Release);
    }

    /// True when every worker has stopped, including the degenerate case of
    /// an all-zero-concurrency processor that never ran.
    pub fn is_terminated(&self) -> bool {
        self.runner_states()
            .iter()
            .all(|r| r.finished.load(Ordering::Acquire))
    }

    pub fn state(&self) -> ProcessorState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_CREATED => ProcessorState::Created,
            STATE_STARTED => {
                if self.is_terminated() {
                    ProcessorState::Terminated
                } else {
                    ProcessorState::Started
                }
            }
            STATE_DRAINING => ProcessorState::Draining,
            STATE_DRAINED => ProcessorState::Drained,
            _ => ProcessorState::Stopped,
        }
    }

    /// Age of the computation's last committed record, aggregated over its
    /// input streams; zero once it is fully caught up.
    pub async fn get_latency(&self, computation: &str) -> Result<Latency, StreamError> {
        let metadata = self
            .inner
            .topology
            .metadata(computation)
            .ok_or_else(|| StreamError::UnknownComputation(computation.to_string()))?;
        if metadata.input_streams.is_empty() {
            return Ok(Latency::new(0, 0, LogLag::default(), None));
        }
        let group = Name::of_urn(computation);
        let mut latencies = Vec::with_capacity(metadata.input_streams.len());
        for stream in &metadata.input_streams {
            let codec = self.inner.settings.codec(stream);
            let latency = self
                .inner
                .manager
                .log_manager()
                .get_latency(
                    &Name::of_urn(stream),
                    &group,
                    codec,
                    |record: &Record| Watermark::of_value(record.watermark).timestamp(),
                    |record: &Record| record.key.clone(),
                )
                .await?;
            latencies.push(latency);
        }
        Ok(Latency::of(&latencies))
    }

    pub fn get_processed_count(&self, computation: &str) -> u64 {
        self.pool_sum(computation, |r| r.processed.load(Ordering::Acquire))
    }

    pub fn get_failure_count(&self, computation: &str) -> u64 {
        self.pool_sum(computation, |r| r.failures.load(Ordering::Acquire))
    }

    fn pool_sum(&self, computation: &str, value: impl Fn(&RunnerState) -> u64) -> u64 {
        let pools = self.inner.pools.lock().expect("pools lock");
        pools
            .iter()
            .filter(|p| p.name == computation)
            .flat_map(|p| p.runners.iter())
            .map(|r| value(r))
            .sum()
    }

    fn runner_states(&self) -> Vec<Arc<RunnerState>> {
        let pools = self.inner.pools.lock().expect("pools lock");
        pools
            .iter()
            .flat_map(|p| p.runners.iter().cloned())
            .collect()
    }
}

/// Round-robin partition ownership: worker `instance` of `concurrency` gets
/// every partition whose index is congruent to it, for each input stream.
fn assign_partitions(
    input_streams: &[String],
    instance: u32,
    concurrency: u32,
    settings: &Settings,
) -> Vec<LogPartition> {
    let mut assignments = Vec::new();
    for stream in input_streams {
        let partitions = settings.partitions(stream);
        for p in 0..partitions {
            if p % concurrency == instance {
                assignments.push(LogPartition::of(Name::of_urn(stream), p));
            }
        }
    }
    assignments
}
