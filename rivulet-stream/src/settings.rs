use std::collections::HashMap;
use std::sync::Arc;

use rivulet_core::codec::{Codec, NoCodec};
use rivulet_core::record::Record;

use crate::filter::{RecordFilter, RecordFilterChain};
use crate::policy::ComputationPolicy;

/// Runtime configuration of a topology: per-computation concurrency and
/// policy, per-stream partition count, codec and filter chain, each with a
/// default.
///
/// Settings are assembled by the caller and become read-only once handed to
/// a processor registration.
#[derive(Debug, Clone)]
pub struct Settings {
    default_concurrency: u32,
    default_partitions: u32,
    default_codec: Arc<dyn Codec<Record>>,
    default_policy: ComputationPolicy,
    concurrencies: HashMap<String, u32>,
    partitions: HashMap<String, u32>,
    codecs: HashMap<String, Arc<dyn Codec<Record>>>,
    policies: HashMap<String, ComputationPolicy>,
    filters: HashMap<String, RecordFilterChain>,
}

impl Settings {
    pub fn new(default_concurrency: u32, default_partitions: u32) -> Self {
        Self {
            default_concurrency,
            default_partitions: default_partitions.max(1),
            default_codec: Arc::new(NoCodec),
            default_policy: ComputationPolicy::default(),
            concurrencies: HashMap::new(),
            partitions: HashMap::new(),
            codecs: HashMap::new(),
            policies: HashMap::new(),
            filters: HashMap::new(),
        }
    }

    pub fn with_default_codec(mut self, codec: Arc<dyn Codec<Record>>) -> Self {
        self.default_codec = codec;
        self
    }

    pub fn with_default_policy(mut self, policy: ComputationPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_concurrency(mut self, computation: &str, concurrency: u32) -> Self {
        self.concurrencies.insert(computation.to_string(), concurrency);
        self
    }

    pub fn with_partitions(mut self, stream: &str, partitions: u32) -> Self {
        self.partitions.insert(stream.to_string(), partitions.max(1));
        self
    }

    pub fn with_codec(mut self, stream: &str, codec: Arc<dyn Codec<Record>>) -> Self {
        self.codecs.insert(stream.to_string(), codec);
        self
    }

    pub fn with_policy(mut self, computation: &str, policy: ComputationPolicy) -> Self {
        self.policies.insert(computation.to_string(), policy);
        self
    }

    /// Append a filter to the stream's chain, keeping registration order.
    pub fn with_filter(mut self, stream: &str, filter: Arc<dyn RecordFilter>) -> Self {
        self.filters
            .entry(stream.to_string())
            .or_default()
            .add(filter);
        self
    }

    pub fn concurrency(&self, computation: &str) -> u32 {
        self.concurrencies
            .get(computation)
            .copied()
            .unwrap_or(self.default_concurrency)
    }

    pub fn partitions(&self, stream: &str) -> u32 {
        self.partitions
            .get(stream)
            .copied()
            .unwrap_or(self.default_partitions)
    }

    pub fn codec(&self, stream: &str) -> Arc<dyn Codec<Record>> {
        self.codecs
            .get(stream)
            .cloned()
            .unwrap_or_else(|| self.default_codec.clone())
    }

    pub fn policy(&self, computation: &str) -> ComputationPolicy {
        self.policies
            .get(computation)
            .cloned()
            .unwrap_or_else(|| self.default_policy.clone())
    }

    pub fn filters(&self, stream: &str) -> RecordFilterChain {
        self.filters.get(stream).cloned().unwrap_or_default()
    }
}
