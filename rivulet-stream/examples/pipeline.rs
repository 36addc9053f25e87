//! Minimal topology wiring: an external producer feeds a word-length
//! computation whose output is tailed back from the log.
//!
//! Run with: cargo run --example pipeline

use async_trait::async_trait;
use std::time::Duration;

use rivulet_core::driver::LogConfig;
use rivulet_core::log::LogPartition;
use rivulet_core::name::Name;
use rivulet_core::record::Record;
use rivulet_log::open_manager;
use rivulet_stream::{
    Computation, ComputationContext, ComputationError, ComputationMetadata, Settings,
    StreamManager, Topology,
};

struct WordLength;

#[async_trait]
impl Computation for WordLength {
    fn metadata(&self) -> ComputationMetadata {
        ComputationMetadata::new("WORD_LENGTH", 1, 1)
    }

    async fn process_record(
        &mut self,
        context: &mut ComputationContext,
        _input_stream: &str,
        record: Record,
    ) -> Result<(), ComputationError> {
        let output = context.metadata().output_streams[0].clone();
        let length = record.key.len().to_string();
        context.produce_record(&output, Record::of(length, record.data.clone()));
        context.ask_for_checkpoint();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let log_manager = open_manager(&LogConfig::InMemory)?;
    let stream_manager = StreamManager::new(log_manager.clone());

    let topology = Topology::builder()
        .add_computation(|| Box::new(WordLength), vec!["i1:words", "o1:lengths"])
        .build()?;
    let processor = stream_manager
        .register_and_create_processor("demo", topology, Settings::new(1, 1))
        .await?;
    processor.start()?;
    processor.wait_for_assignments(Duration::from_secs(10)).await;

    for word in ["stream", "computation", "log"] {
        stream_manager
            .append("words", Record::of(word, Vec::new()))
            .await?;
    }
    processor.drain_and_stop(Duration::from_secs(30)).await?;

    let mut tailer = log_manager
        .create_tailer::<Record>(
            &Name::of_urn("demo/reader"),
            LogPartition::of(Name::of_urn("lengths"), 0),
        )
        .await?;
    while let Some(record) = tailer.read(Duration::from_millis(200)).await? {
        println!("word length: {}", record.message.key);
    }
    Ok(())
}
