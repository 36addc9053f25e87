use thiserror::Error;

use crate::log::LogPartition;
use crate::name::Name;

pub type Result<T> = std::result::Result<T, LogError>;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("unknown log: {0}")]
    UnknownLog(Name),

    #[error("invalid partition {partition} for log {name}")]
    InvalidPartition { name: Name, partition: u32 },

    #[error("codec mismatch on {name}: log uses '{existing}', requested '{requested}'")]
    CodecMismatch {
        name: Name,
        existing: String,
        requested: String,
    },

    #[error("group {group} already has an open tailer on {partition}")]
    TailerConflict { group: Name, partition: LogPartition },

    #[error("partition {0} is not assigned to this tailer")]
    UnassignedPartition(LogPartition),

    #[error("log handle is closed")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}
