use serde::{Deserialize, Serialize};

use crate::watermark::Watermark;

/// The unit of data flowing through streams.
///
/// A record is immutable once appended to a log; filters that rewrite a
/// record build a new one instead of mutating in place. The watermark
/// defaults to the creation time when not set explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    // Routing key, also used for key-hash partitioning on append
    pub key: String,
    // Opaque payload, empty when the record carries only its key
    pub data: Vec<u8>,
    // Packed watermark value, see `Watermark`
    pub watermark: u64,
}

impl Record {
    /// Record stamped with a watermark derived from the current time.
    pub fn of(key: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            data,
            watermark: Watermark::of_now().value(),
        }
    }

    pub fn new(key: impl Into<String>, data: Vec<u8>, watermark: Watermark) -> Self {
        Self {
            key: key.into(),
            data,
            watermark: watermark.value(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn watermark(&self) -> Watermark {
        Watermark::of_value(self.watermark)
    }

    /// Copy of this record carrying a different key.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: self.data.clone(),
            watermark: self.watermark,
        }
    }
}
