//! Error types and result definitions for the tuya-ble-timer crate.
//! Absent timer values are modelled as `Option::None`, never as an error.

use thiserror::Error;

/// Represents all possible errors raised while encoding or dispatching a timer record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// A day token did not match any of the seven canonical names
    #[error("Invalid day token: '{0}'")]
    InvalidDay(String),

    /// A numeric field does not fit its encodable range
    #[error("{field} out of range: {value} (max {max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// The datapoint store rejected a write
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Failed to decode base64 or JSON data
    #[error("Decode error: {0}")]
    Decode(String),

    /// A datapoint value had a different kind than expected
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// The serialized writer queue has no free slot
    #[error("Timer write queue is full")]
    QueueFull,

    /// The serialized writer task has stopped
    #[error("Timer write queue is closed")]
    QueueClosed,

    /// No runtime was available to run background writes
    #[error("No async runtime available for timer writes")]
    NoRuntime,
}

/// A specialized Result type for timer operations.
pub type Result<T> = std::result::Result<T, TimerError>;

impl From<base64::DecodeError> for TimerError {
    fn from(err: base64::DecodeError) -> Self {
        TimerError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for TimerError {
    fn from(err: serde_json::Error) -> Self {
        TimerError::Decode(err.to_string())
    }
}

impl TimerError {
    pub fn code(&self) -> u32 {
        match self {
            TimerError::InvalidDay(_) => ERR_INVALID_DAY,
            TimerError::OutOfRange { .. } => ERR_RANGE,
            TimerError::WriteFailed(_) => ERR_WRITE,
            TimerError::Decode(_) => ERR_PAYLOAD,
            TimerError::TypeMismatch { .. } => ERR_PAYLOAD,
            TimerError::QueueFull => ERR_QUEUE,
            TimerError::QueueClosed => ERR_QUEUE,
            TimerError::NoRuntime => ERR_QUEUE,
        }
    }
}

// Timer error response codes
define_error_codes! {
    ERR_SUCCESS = 0 => "Success",
    ERR_RANGE = 903 => "Specified Value Out of Range",
    ERR_PAYLOAD = 904 => "Unexpected Datapoint Payload",
    ERR_WRITE = 920 => "Datapoint Write Failed",
    ERR_INVALID_DAY = 921 => "Unknown Weekday Token",
    ERR_QUEUE = 922 => "Timer Write Queue Unavailable",
}
