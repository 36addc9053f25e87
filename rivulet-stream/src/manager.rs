use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use rivulet_core::codec::Codec;
use rivulet_core::log::LogOffset;
use rivulet_core::name::Name;
use rivulet_core::record::Record;
use rivulet_log::{LogAppender, LogManager};

use crate::error::StreamError;
use crate::filter::RecordFilterChain;
use crate::processor::StreamProcessor;
use crate::settings::Settings;
use crate::topology::Topology;

#[derive(Debug, Clone)]
struct Registration {
    topology: Topology,
    settings: Settings,
}

/// Facade wiring topologies onto a log backend.
///
/// Registering a processor creates every stream log with its configured
/// partition count and pins the stream's codec and filter chain; processors
/// can then be (re)created from the registration, which is how a stopped
/// topology resumes from its committed offsets.
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<StreamManagerInner>,
}

struct StreamManagerInner {
    log_manager: LogManager,
    registrations: DashMap<String, Registration>,
    codecs: DashMap<String, Arc<dyn Codec<Record>>>,
    filters: DashMap<String, RecordFilterChain>,
    appenders: DashMap<String, Arc<LogAppender<Record>>>,
}

impl fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamManager")
            .field("registrations", &self.inner.registrations.len())
            .finish_non_exhaustive()
    }
}

impl StreamManager {
    pub fn new(log_manager: LogManager) -> Self {
        Self {
            inner: Arc::new(StreamManagerInner {
                log_manager,
                registrations: DashMap::new(),
                codecs: DashMap::new(),
                filters: DashMap::new(),
                appenders: DashMap::new(),
            }),
        }
    }

    pub fn log_manager(&self) -> &LogManager {
        &self.inner.log_manager
    }

    /// Create the topology's streams and remember the registration.
    ///
    /// Fails fast on configuration errors, in particular when two input
    /// streams of one computation resolve to different codecs.
    pub async fn register(
        &self,
        processor: &str,
        topology: Topology,
        settings: Settings,
    ) -> Result<(), StreamError> {
        validate_input_codecs(&topology, &settings)?;
        for stream in topology.streams() {
            let partitions = settings.partitions(&stream);
            self.inner
                .log_manager
                .create_if_not_exists(&Name::of_urn(&stream), partitions)
                .await?;
            self.inner.codecs.insert(stream.clone(), settings.codec(&stream));
            let chain = settings.filters(&stream);
            if !chain.is_empty() {
                self.inner.filters.insert(stream.clone(), chain);
            }
        }
        info!(
            target = "stream",
            processor,
            computations = topology.computation_names().len(),
            streams = topology.streams().len(),
            "registered processor topology"
        );
        self.inner.registrations.insert(
            processor.to_string(),
            Registration { topology, settings },
        );
        Ok(())
    }

    /// Build a processor from a previous registration.
    pub fn create_processor(&self, processor: &str) -> Result<StreamProcessor, StreamError> {
        let registration = self
            .inner
            .registrations
            .get(processor)
            .ok_or_else(|| StreamError::UnknownProcessor(processor.to_string()))?;
        Ok(StreamProcessor::new(
            self.clone(),
            registration.topology.clone(),
            registration.settings.clone(),
        ))
    }

    pub async fn register_and_create_processor(
        &self,
        processor: &str,
        topology: Topology,
        settings: Settings,
    ) -> Result<StreamProcessor, StreamError> {
        self.register(processor, topology, settings).await?;
        self.create_processor(processor)
    }

    /// External producer entry point: run the stream's before-append filter
    /// chain, then append with key-hash partitioning. Returns `None` when a
    /// filter dropped the record.
    pub async fn append(
        &self,
        stream: &str,
        record: Record,
    ) -> Result<Option<LogOffset>, StreamError> {
        let record = match self.inner.filters.get(stream) {
            Some(chain) => match chain.before_append(record) {
                Some(record) => record,
                None => return Ok(None),
            },
            None => record,
        };
        let appender = self.appender_for(stream).await?;
        let key = record.key.clone();
        let offset = appender.append_by_key(&key, &record).await?;
        Ok(Some(offset))
    }

    pub(crate) async fn appender_for(
        &self,
        stream: &str,
    ) -> Result<Arc<LogAppender<Record>>, StreamError> {
        if let Some(appender) = self.inner.appenders.get(stream) {
            return Ok(appender.clone());
        }
        let codec = self
            .inner
            .codecs
            .get(stream)
            .map(|codec| codec.clone())
            .ok_or_else(|| StreamError::UnknownStream(stream.to_string()))?;
        let appender = Arc::new(
            self.inner
                .log_manager
                .get_appender_with_codec(&Name::of_urn(stream), codec)
                .await?,
        );
        Ok(self
            .inner
            .appenders
            .entry(stream.to_string())
            .or_insert(appender)
            .clone())
    }

    /// Run the stream's after-read filter chain, `None` drops the record.
    pub(crate) fn after_read(&self, stream: &str, record: Record) -> Option<Record> {
        match self.inner.filters.get(stream) {
            Some(chain) => chain.after_read(record),
            None => Some(record),
        }
    }
}

/// All input streams of one computation must share a single codec.
fn validate_input_codecs(topology: &Topology, settings: &Settings) -> Result<(), StreamError> {
    for name in topology.computation_names() {
        let Some(metadata) = topology.metadata(&name) else {
            continue;
        };
        let mut expected: Option<&'static str> = None;
        for stream in &metadata.input_streams {
            let codec_name = settings.codec(stream).name();
            match expected {
                None => expected = Some(codec_name),
                Some(previous) if previous == codec_name => {}
                Some(previous) => {
                    return Err(StreamError::CodecConflict {
                        computation: name.clone(),
                        stream: stream.clone(),
                        codec: codec_name.to_string(),
                        expected: previous.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}
