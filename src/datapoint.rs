//! Typed Tuya datapoint values.
//! A datapoint carries one of a closed set of value kinds; raw buffers travel as base64 in JSON.

use crate::error::{Result, TimerError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Datapoint identifier as reported by the device.
pub type DpId = u8;

/// Datapoint holding the weekly valve timer record.
pub const TIMER_DP_ID: DpId = 17;

/// Tuya BLE datapoint type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DpType {
    Raw = 0,
    Bool = 1,
    Value = 2,
    String = 3,
    Enum = 4,
    Bitmap = 5,
}

impl DpType {
    pub fn name(self) -> &'static str {
        match self {
            DpType::Raw => "raw",
            DpType::Bool => "bool",
            DpType::Value => "value",
            DpType::String => "string",
            DpType::Enum => "enum",
            DpType::Bitmap => "bitmap",
        }
    }
}

impl TryFrom<u8> for DpType {
    type Error = TimerError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(DpType::Raw),
            1 => Ok(DpType::Bool),
            2 => Ok(DpType::Value),
            3 => Ok(DpType::String),
            4 => Ok(DpType::Enum),
            5 => Ok(DpType::Bitmap),
            other => Err(TimerError::Decode(format!("Unknown datapoint type {}", other))),
        }
    }
}

/// Current value of a single datapoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DpValue {
    Bool(bool),
    Value(i32),
    String(String),
    Enum(u32),
    Bitmap(u32),
    Raw(Vec<u8>),
}

impl DpValue {
    /// Type tag of this value.
    pub fn kind(&self) -> DpType {
        match self {
            DpValue::Bool(_) => DpType::Bool,
            DpValue::Value(_) => DpType::Value,
            DpValue::String(_) => DpType::String,
            DpValue::Enum(_) => DpType::Enum,
            DpValue::Bitmap(_) => DpType::Bitmap,
            DpValue::Raw(_) => DpType::Raw,
        }
    }

    /// Returns the byte buffer when this is a raw datapoint.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            DpValue::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Converts into the JSON shape used in Tuya `dps` payloads.
    pub fn to_json(&self) -> Value {
        match self {
            DpValue::Bool(b) => Value::Bool(*b),
            DpValue::Value(v) => Value::from(*v),
            DpValue::String(s) => Value::String(s.clone()),
            DpValue::Enum(e) => Value::from(*e),
            DpValue::Bitmap(b) => Value::from(*b),
            DpValue::Raw(bytes) => Value::String(BASE64.encode(bytes)),
        }
    }

    /// Parses a JSON `dps` entry, using the declared type to tell raw base64 apart from strings.
    pub fn from_json(kind: DpType, value: &Value) -> Result<Self> {
        let mismatch = || TimerError::TypeMismatch {
            expected: kind.name(),
            found: value.to_string(),
        };
        match kind {
            DpType::Bool => value.as_bool().map(DpValue::Bool).ok_or_else(mismatch),
            DpType::Value => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(DpValue::Value)
                .ok_or_else(mismatch),
            DpType::String => value
                .as_str()
                .map(|s| DpValue::String(s.to_string()))
                .ok_or_else(mismatch),
            DpType::Enum | DpType::Bitmap => {
                let v = value
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(mismatch)?;
                Ok(if kind == DpType::Enum {
                    DpValue::Enum(v)
                } else {
                    DpValue::Bitmap(v)
                })
            }
            DpType::Raw => {
                let text = value.as_str().ok_or_else(mismatch)?;
                Ok(DpValue::Raw(BASE64.decode(text)?))
            }
        }
    }
}

impl fmt::Display for DpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpValue::Raw(bytes) => write!(f, "raw({})", hex::encode(bytes)),
            DpValue::String(s) => write!(f, "{:?}", s),
            DpValue::Bool(b) => write!(f, "{}", b),
            DpValue::Value(v) => write!(f, "{}", v),
            DpValue::Enum(v) | DpValue::Bitmap(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for DpValue {
    fn from(b: bool) -> Self {
        DpValue::Bool(b)
    }
}

impl From<i32> for DpValue {
    fn from(v: i32) -> Self {
        DpValue::Value(v)
    }
}

impl From<Vec<u8>> for DpValue {
    fn from(bytes: Vec<u8>) -> Self {
        DpValue::Raw(bytes)
    }
}

impl From<&str> for DpValue {
    fn from(s: &str) -> Self {
        DpValue::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_travels_as_base64() {
        let value = DpValue::Raw(vec![0x01, 0x01, 0x01, 0xB8]);
        assert_eq!(value.to_json(), json!("AQEBuA=="));
        let back = DpValue::from_json(DpType::Raw, &json!("AQEBuA==")).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn declared_type_drives_parsing() {
        assert_eq!(
            DpValue::from_json(DpType::Bool, &json!(true)).unwrap(),
            DpValue::Bool(true)
        );
        assert_eq!(
            DpValue::from_json(DpType::Value, &json!(-5)).unwrap(),
            DpValue::Value(-5)
        );
        assert_eq!(
            DpValue::from_json(DpType::Enum, &json!(2)).unwrap(),
            DpValue::Enum(2)
        );
        assert_eq!(
            DpValue::from_json(DpType::String, &json!("AQE=")).unwrap(),
            DpValue::String("AQE=".into())
        );
    }

    #[test]
    fn mismatched_json_is_rejected() {
        let err = DpValue::from_json(DpType::Bool, &json!("yes")).unwrap_err();
        assert!(matches!(err, TimerError::TypeMismatch { expected: "bool", .. }));
        assert!(DpValue::from_json(DpType::Raw, &json!("%%%")).is_err());
        assert!(DpValue::from_json(DpType::Value, &json!(u64::MAX)).is_err());
    }

    #[test]
    fn only_raw_exposes_bytes() {
        assert_eq!(DpValue::Raw(vec![1, 2]).as_raw(), Some(&[1u8, 2][..]));
        assert_eq!(DpValue::String("\u{1}\u{2}".into()).as_raw(), None);
        assert_eq!(DpValue::Bool(true).kind(), DpType::Bool);
        assert_eq!(DpType::try_from(0).unwrap(), DpType::Raw);
        assert!(DpType::try_from(9).is_err());
    }

    #[test]
    fn raw_display_is_hex() {
        assert_eq!(DpValue::Raw(vec![0xE9, 0x06]).to_string(), "raw(e906)");
    }
}
