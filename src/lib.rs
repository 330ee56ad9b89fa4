//! # tuya-ble-timer
//!
//! Weekly valve timer support for Tuya BLE irrigation controllers.
//! The timer is programmed through one raw datapoint holding a fixed 14-byte record;
//! this crate encodes, decodes and edits that record and dispatches writes through
//! a host-provided datapoint store.
//!
//! ## Quick Start
//!
//! ```rust
//! use tuya_ble_timer::timer::{self, Validation};
//!
//! let raw = timer::encode_parts(7, 0, 30, ["mon", "wed", "fri"], true, Validation::Strict).unwrap();
//! assert_eq!(raw[6], 0x2A);
//! let record = timer::decode(&raw).unwrap();
//! assert_eq!((record.hour, record.minute), (7, 0));
//! ```
//!
#[macro_use]
mod macros;
pub mod controller;
pub mod datapoint;
pub mod error;
pub mod registry;
pub mod store;
pub mod timer;

pub use controller::{Timer, TimerBuilder, TimerConfig};
pub use datapoint::{DpId, DpType, DpValue, TIMER_DP_ID};
pub use error::TimerError;
pub use store::{DatapointStore, MemoryStore, TaskSubmitter, TokioSubmitter};
pub use timer::{DaySet, TimerEdit, TimerField, TimerRecord, Validation, Weekday};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
