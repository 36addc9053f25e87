use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

// 64-bit layout: [timestamp ms: 46][sequence: 16][completed: 1]
const COMPLETED_BIT: u64 = 1;
const SEQUENCE_SHIFT: u32 = 1;
const SEQUENCE_MASK: u64 = 0xFFFF;
const TIMESTAMP_SHIFT: u32 = 17;

/// Monotonic ordering and progress token derived from event time.
///
/// A watermark packs a millisecond timestamp, a sequence to disambiguate
/// records sharing a timestamp, and a completed bit set once the record has
/// been fully processed. Value 0 means unset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Watermark {
    value: u64,
}

impl Watermark {
    pub const ZERO: Watermark = Watermark { value: 0 };

    pub fn of_value(value: u64) -> Self {
        Self { value }
    }

    pub fn of_timestamp(timestamp_ms: u64) -> Self {
        Self::of_timestamp_seq(timestamp_ms, 0)
    }

    pub fn of_timestamp_seq(timestamp_ms: u64, sequence: u16) -> Self {
        Self {
            value: (timestamp_ms << TIMESTAMP_SHIFT) | ((sequence as u64) << SEQUENCE_SHIFT),
        }
    }

    pub fn of_now() -> Self {
        Self::of_timestamp(now_ms())
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn timestamp(&self) -> u64 {
        self.value >> TIMESTAMP_SHIFT
    }

    pub fn sequence(&self) -> u16 {
        ((self.value >> SEQUENCE_SHIFT) & SEQUENCE_MASK) as u16
    }

    pub fn is_completed(&self) -> bool {
        self.value & COMPLETED_BIT == COMPLETED_BIT
    }

    /// Same watermark with the completed bit set.
    pub fn completed(self) -> Self {
        Self {
            value: self.value | COMPLETED_BIT,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.value == 0
    }

    /// True once this watermark is completed and has reached `timestamp_ms`.
    pub fn is_done(&self, timestamp_ms: u64) -> bool {
        self.is_completed() && self.timestamp() >= timestamp_ms
    }
}

impl Display for Watermark {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wm:{}:{}{}",
            self.timestamp(),
            self.sequence(),
            if self.is_completed() { ":done" } else { "" }
        )
    }
}

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
