mod appender;
mod file;
mod manager;
mod mem;
mod tailer;

pub use appender::LogAppender;
pub use file::FileLogDriver;
pub use manager::LogManager;
pub use mem::MemoryLogDriver;
pub use tailer::LogTailer;

use std::sync::Arc;

use rivulet_core::driver::{LogConfig, LogDriver};
use rivulet_core::error::LogError;

/// Build the backend selected by the configuration.
pub fn create_log_driver(config: &LogConfig) -> Result<Arc<dyn LogDriver>, LogError> {
    match config {
        LogConfig::InMemory => Ok(Arc::new(MemoryLogDriver::new())),
        LogConfig::File(file_config) => Ok(Arc::new(FileLogDriver::new(file_config.dir.clone()))),
    }
}

/// Open a manager over the backend selected by the configuration.
pub fn open_manager(config: &LogConfig) -> Result<LogManager, LogError> {
    Ok(LogManager::new(create_log_driver(config)?))
}
