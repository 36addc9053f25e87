use thiserror::Error;

use rivulet_core::error::LogError;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("codec conflict for computation {computation}: input {stream} uses codec '{codec}' but its other inputs use '{expected}'")]
    CodecConflict {
        computation: String,
        stream: String,
        codec: String,
        expected: String,
    },

    #[error("unknown computation: {0}")]
    UnknownComputation(String),

    #[error("unknown stream: {0}")]
    UnknownStream(String),

    #[error("no processor registered under '{0}'")]
    UnknownProcessor(String),

    #[error("processor already started")]
    AlreadyStarted,

    #[error(transparent)]
    Log(#[from] LogError),
}
