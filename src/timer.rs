//! Weekly valve timer record codec.
//!
//! The timer of Tuya BLE irrigation controllers is programmed through a single raw
//! datapoint carrying a fixed 14-byte record:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0..2   | 2    | header `01 01` |
//! | 2..4   | 2    | start, minutes since midnight (BE) |
//! | 4..6   | 2    | duration in minutes (BE) |
//! | 6      | 1    | day mask, bit 0 = sun .. bit 6 = sat |
//! | 7      | 1    | `64` |
//! | 8      | 1    | enabled flag |
//! | 9..14  | 5    | trailer `07 E9 06 14 01` |
//!
//! Encoding always rebuilds the constant bytes from this layout.

use crate::datapoint::DpValue;
use crate::error::{Result, TimerError};
use byteorder::{BigEndian, ByteOrder};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of an encoded timer record.
pub const TIMER_RECORD_LEN: usize = 14;

const HEADER: [u8; 2] = [0x01, 0x01];
const MARKER: u8 = 0x64;
const TRAILER: [u8; 5] = [0x07, 0xE9, 0x06, 0x14, 0x01];

const OFFSET_START: usize = 2;
const OFFSET_DURATION: usize = 4;
const OFFSET_DAYS: usize = 6;
const OFFSET_MARKER: usize = 7;
const OFFSET_ENABLED: usize = 8;
const OFFSET_TRAILER: usize = 9;

const MAX_HOUR: u32 = 23;
const MAX_MINUTE: u32 = 59;
const DAY_MASK_BITS: u8 = 0x7F;

/// An encoded timer record.
pub type TimerBytes = [u8; TIMER_RECORD_LEN];

define_weekday! {
    Sun = (0, "sun"),
    Mon = (1, "mon"),
    Tue = (2, "tue"),
    Wed = (3, "wed"),
    Thu = (4, "thu"),
    Fri = (5, "fri"),
    Sat = (6, "sat"),
}

impl Weekday {
    /// Matches a day token case-insensitively on its first three letters,
    /// so `"Monday"`, `"MON"` and `"mon"` all resolve to [`Weekday::Mon`].
    pub fn from_token(token: &str) -> Result<Self> {
        let prefix: String = token.chars().take(3).flat_map(char::to_lowercase).collect();
        Self::from_canonical(&prefix).ok_or_else(|| TimerError::InvalidDay(token.to_string()))
    }
}

impl FromStr for Weekday {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_token(s)
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// How strictly input is checked before it is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    /// Reject unknown day tokens and hours/minutes outside the clock range.
    #[default]
    Strict,
    /// Drop unknown day tokens and accept any start time that still fits the 16-bit field.
    Lenient,
}

/// Set of active weekdays, stored as the wire day mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);
    pub const EVERY_DAY: DaySet = DaySet(DAY_MASK_BITS);

    /// Builds a set from a wire mask. The unused high bit is ignored.
    pub fn from_mask(mask: u8) -> Self {
        DaySet(mask & DAY_MASK_BITS)
    }

    pub fn mask(self) -> u8 {
        self.0
    }

    /// Parses day tokens. Duplicates collapse and order is irrelevant.
    pub fn from_tokens<I, S>(tokens: I, validation: Validation) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut days = DaySet::EMPTY;
        for token in tokens {
            let token = token.as_ref();
            match (Weekday::from_token(token), validation) {
                (Ok(day), _) => days.insert(day),
                (Err(e), Validation::Strict) => return Err(e),
                (Err(_), Validation::Lenient) => {
                    warn!("Ignoring unknown day token '{}' in timer schedule", token);
                }
            }
        }
        Ok(days)
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.bit()) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.bit();
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !(1 << day.bit());
    }

    pub fn set(&mut self, day: Weekday, active: bool) {
        if active {
            self.insert(day);
        } else {
            self.remove(day);
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Active days in mask bit order (sun..sat).
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        Weekday::ALL.into_iter().filter(move |day| self.contains(*day))
    }
}

impl FromIterator<Weekday> for DaySet {
    fn from_iter<T: IntoIterator<Item = Weekday>>(iter: T) -> Self {
        let mut days = DaySet::EMPTY;
        for day in iter {
            days.insert(day);
        }
        days
    }
}

impl From<Vec<Weekday>> for DaySet {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<DaySet> for Vec<Weekday> {
    fn from(days: DaySet) -> Self {
        days.iter().collect()
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let tokens: Vec<&str> = self.iter().map(Weekday::token).collect();
        f.write_str(&tokens.join(","))
    }
}

/// Logical content of the timer datapoint.
///
/// `hour` is wider than a clock hour because decoding passes start values of
/// 1440 minutes or more straight through (e.g. 1500 minutes decodes as 25:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerRecord {
    pub hour: u16,
    pub minute: u16,
    pub duration_minutes: u16,
    pub active_days: DaySet,
    pub enabled: bool,
}

impl TimerRecord {
    /// Encodes with [`Validation::Strict`].
    pub fn encode(&self) -> Result<TimerBytes> {
        encode(self, Validation::Strict)
    }

    /// Applies a single edit in memory.
    pub fn apply(&mut self, edit: TimerEdit) -> Result<()> {
        match edit {
            TimerEdit::Field(field, value) => {
                let value = u16::try_from(value).map_err(|_| TimerError::OutOfRange {
                    field: field.name(),
                    value,
                    max: u16::MAX as u32,
                })?;
                match field {
                    TimerField::Hour => self.hour = value,
                    TimerField::Minute => self.minute = value,
                    TimerField::Duration => self.duration_minutes = value,
                }
            }
            TimerEdit::Day(day, active) => self.active_days.set(day, active),
            TimerEdit::Enabled(enabled) => self.enabled = enabled,
        }
        Ok(())
    }
}

impl fmt::Display for TimerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02} for {} min on {} [{}]",
            self.hour,
            self.minute,
            self.duration_minutes,
            self.active_days,
            if self.enabled { "on" } else { "off" }
        )
    }
}

/// Scalar fields that can be edited individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerField {
    Hour,
    Minute,
    Duration,
}

impl TimerField {
    pub fn name(self) -> &'static str {
        match self {
            TimerField::Hour => "hour",
            TimerField::Minute => "minute",
            TimerField::Duration => "duration",
        }
    }

    /// Reads this field from a record.
    pub fn get(self, record: &TimerRecord) -> u16 {
        match self {
            TimerField::Hour => record.hour,
            TimerField::Minute => record.minute,
            TimerField::Duration => record.duration_minutes,
        }
    }
}

impl FromStr for TimerField {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hour" => Ok(TimerField::Hour),
            "minute" => Ok(TimerField::Minute),
            "duration" => Ok(TimerField::Duration),
            other => Err(TimerError::Decode(format!("Unknown timer field '{}'", other))),
        }
    }
}

/// One read-modify-write change to a timer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEdit {
    Field(TimerField, u32),
    Day(Weekday, bool),
    Enabled(bool),
}

fn check_range(field: &'static str, value: u32, max: u32) -> Result<()> {
    if value > max {
        return Err(TimerError::OutOfRange { field, value, max });
    }
    Ok(())
}

/// Encodes a record into its 14-byte wire form.
///
/// Values never wrap: a start time or duration that does not fit 16 bits is
/// rejected in every mode, and [`Validation::Strict`] also enforces the clock range.
pub fn encode(record: &TimerRecord, validation: Validation) -> Result<TimerBytes> {
    let hour = record.hour as u32;
    let minute = record.minute as u32;
    if validation == Validation::Strict {
        check_range("hour", hour, MAX_HOUR)?;
        check_range("minute", minute, MAX_MINUTE)?;
    }
    let total_minutes = hour * 60 + minute;
    check_range("start", total_minutes, u16::MAX as u32)?;

    let mut raw = [0u8; TIMER_RECORD_LEN];
    raw[..OFFSET_START].copy_from_slice(&HEADER);
    BigEndian::write_u16(&mut raw[OFFSET_START..OFFSET_DURATION], total_minutes as u16);
    BigEndian::write_u16(&mut raw[OFFSET_DURATION..OFFSET_DAYS], record.duration_minutes);
    raw[OFFSET_DAYS] = record.active_days.mask();
    raw[OFFSET_MARKER] = MARKER;
    raw[OFFSET_ENABLED] = u8::from(record.enabled);
    raw[OFFSET_TRAILER..].copy_from_slice(&TRAILER);
    Ok(raw)
}

/// Encodes loosely typed parts, parsing the day tokens according to `validation`.
pub fn encode_parts<I, S>(
    hour: u32,
    minute: u32,
    duration_minutes: u32,
    days: I,
    enabled: bool,
    validation: Validation,
) -> Result<TimerBytes>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let narrow = |field: &'static str, value: u32| {
        u16::try_from(value).map_err(|_| TimerError::OutOfRange {
            field,
            value,
            max: u16::MAX as u32,
        })
    };
    let record = TimerRecord {
        hour: narrow("hour", hour)?,
        minute: narrow("minute", minute)?,
        duration_minutes: narrow("duration", duration_minutes)?,
        active_days: DaySet::from_tokens(days, validation)?,
        enabled,
    };
    encode(&record, validation)
}

/// Decodes a raw buffer. Anything shorter than a full record means "not configured yet".
pub fn decode(raw: &[u8]) -> Option<TimerRecord> {
    if raw.len() < TIMER_RECORD_LEN {
        return None;
    }
    let total_minutes = BigEndian::read_u16(&raw[OFFSET_START..OFFSET_DURATION]);
    Some(TimerRecord {
        hour: total_minutes / 60,
        minute: total_minutes % 60,
        duration_minutes: BigEndian::read_u16(&raw[OFFSET_DURATION..OFFSET_DAYS]),
        active_days: DaySet::from_mask(raw[OFFSET_DAYS]),
        enabled: raw[OFFSET_ENABLED] == 0x01,
    })
}

/// Decodes a datapoint value. Missing and non-raw values are treated as absent.
pub fn decode_value(value: Option<&DpValue>) -> Option<TimerRecord> {
    match value {
        Some(DpValue::Raw(bytes)) => decode(bytes),
        Some(_) | None => None,
    }
}

/// Decodes `current`, applies `edit` and re-encodes the full record.
///
/// Returns `Ok(None)` when `current` does not hold a decodable record.
pub fn apply_edit(
    current: &[u8],
    edit: TimerEdit,
    validation: Validation,
) -> Result<Option<TimerBytes>> {
    let Some(mut record) = decode(current) else {
        return Ok(None);
    };
    record.apply(edit)?;
    encode(&record, validation).map(Some)
}

/// Replaces one scalar field of the encoded record.
pub fn set_field(
    current: &[u8],
    field: TimerField,
    value: u32,
    validation: Validation,
) -> Result<Option<TimerBytes>> {
    apply_edit(current, TimerEdit::Field(field, value), validation)
}

/// Adds or removes one day of the encoded record.
pub fn set_day(
    current: &[u8],
    day: Weekday,
    active: bool,
    validation: Validation,
) -> Result<Option<TimerBytes>> {
    apply_edit(current, TimerEdit::Day(day, active), validation)
}

/// Arms or disarms the whole schedule of the encoded record.
pub fn set_enabled(
    current: &[u8],
    enabled: bool,
    validation: Validation,
) -> Result<Option<TimerBytes>> {
    apply_edit(current, TimerEdit::Enabled(enabled), validation)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: TimerBytes = [
        0x01, 0x01, 0x01, 0xA4, 0x00, 0x1E, 0x2A, 0x64, 0x01, 0x07, 0xE9, 0x06, 0x14, 0x01,
    ];

    fn record(
        hour: u16,
        minute: u16,
        duration: u16,
        days: &[Weekday],
        enabled: bool,
    ) -> TimerRecord {
        TimerRecord {
            hour,
            minute,
            duration_minutes: duration,
            active_days: days.iter().copied().collect(),
            enabled,
        }
    }

    #[test]
    fn encodes_known_schedule() {
        let raw = encode_parts(7, 0, 30, ["mon", "wed", "fri"], true, Validation::Strict).unwrap();
        assert_eq!(raw, SAMPLE);
    }

    #[test]
    fn decodes_known_schedule() {
        let decoded = decode(&SAMPLE).unwrap();
        assert_eq!(
            decoded,
            record(7, 0, 30, &[Weekday::Mon, Weekday::Wed, Weekday::Fri], true)
        );
        assert_eq!(decoded.to_string(), "07:00 for 30 min on mon,wed,fri [on]");
    }

    #[test]
    fn start_bytes_are_minutes_since_midnight() {
        let mut bytes = SAMPLE;
        bytes[OFFSET_START] = 0x01;
        bytes[OFFSET_START + 1] = 0xB8;
        let decoded = decode(&bytes).unwrap();
        assert_eq!((decoded.hour, decoded.minute), (7, 20));
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn day_bits_follow_sunday_first_order() {
        let mon = record(0, 0, 1, &[Weekday::Mon], false).encode().unwrap();
        assert_eq!(mon[OFFSET_DAYS], 0x02);
        let weekend = record(0, 0, 1, &[Weekday::Sun, Weekday::Sat], false)
            .encode()
            .unwrap();
        assert_eq!(weekend[OFFSET_DAYS], 0x41);
        for (i, day) in Weekday::ALL.iter().enumerate() {
            assert_eq!(day.bit() as usize, i);
        }
    }

    #[test]
    fn round_trips_every_day_mask() {
        for mask in 0..=DAY_MASK_BITS {
            let samples = [(0, 0, 0), (7, 0, 30), (23, 59, 1439), (12, 5, u16::MAX)];
            for (hour, minute, duration) in samples {
                for enabled in [true, false] {
                    let original = TimerRecord {
                        hour,
                        minute,
                        duration_minutes: duration,
                        active_days: DaySet::from_mask(mask),
                        enabled,
                    };
                    let raw = original.encode().unwrap();
                    assert_eq!(raw.len(), TIMER_RECORD_LEN);
                    assert_eq!(decode(&raw), Some(original));
                }
            }
        }
    }

    #[test]
    fn short_buffers_are_absent() {
        for len in 0..TIMER_RECORD_LEN {
            assert_eq!(decode(&SAMPLE[..len]), None);
        }
        assert_eq!(decode_value(None), None);
        assert_eq!(decode_value(Some(&DpValue::Raw(Vec::new()))), None);
        assert_eq!(decode_value(Some(&DpValue::String("x".repeat(14)))), None);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut long = SAMPLE.to_vec();
        long.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(decode(&long), decode(&SAMPLE));
    }

    #[test]
    fn enabled_requires_exact_flag() {
        let mut raw = SAMPLE;
        raw[OFFSET_ENABLED] = 0x02;
        assert!(!decode(&raw).unwrap().enabled);
        raw[OFFSET_ENABLED] = 0x00;
        assert!(!decode(&raw).unwrap().enabled);
    }

    #[test]
    fn start_past_midnight_passes_through() {
        let mut raw = SAMPLE;
        BigEndian::write_u16(&mut raw[OFFSET_START..OFFSET_DURATION], 1500);
        let decoded = decode(&raw).unwrap();
        assert_eq!((decoded.hour, decoded.minute), (25, 0));
        assert!(matches!(
            decoded.encode(),
            Err(TimerError::OutOfRange { field: "hour", .. })
        ));
        assert_eq!(encode(&decoded, Validation::Lenient).unwrap(), raw);
    }

    #[test]
    fn day_tokens_are_normalized() {
        assert_eq!(Weekday::from_token("Monday").unwrap(), Weekday::Mon);
        assert_eq!(Weekday::from_token("SAT").unwrap(), Weekday::Sat);
        assert_eq!("thursday".parse::<Weekday>().unwrap(), Weekday::Thu);
        assert!(matches!(Weekday::from_token("mo"), Err(TimerError::InvalidDay(_))));
        assert!(Weekday::from_token("").is_err());
    }

    #[test]
    fn duplicate_tokens_collapse() {
        let days = DaySet::from_tokens(["mon", "Mon", "monday"], Validation::Strict).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days.mask(), 0x02);
    }

    #[test]
    fn strict_rejects_unknown_day() {
        let err = encode_parts(7, 0, 30, ["mon", "funday"], true, Validation::Strict).unwrap_err();
        assert_eq!(err, TimerError::InvalidDay("funday".into()));
    }

    #[test]
    fn lenient_drops_unknown_day() {
        let raw = encode_parts(7, 0, 30, ["mon", "xyz", "wed", "fri"], true, Validation::Lenient)
            .unwrap();
        assert_eq!(raw, SAMPLE);
    }

    #[test]
    fn oversized_values_are_rejected() {
        assert!(matches!(
            encode_parts(24, 0, 30, ["mon"], true, Validation::Strict),
            Err(TimerError::OutOfRange { field: "hour", value: 24, max: 23 })
        ));
        assert!(matches!(
            encode_parts(7, 60, 30, ["mon"], true, Validation::Strict),
            Err(TimerError::OutOfRange { field: "minute", .. })
        ));
        assert!(matches!(
            encode_parts(7, 0, 70_000, ["mon"], true, Validation::Lenient),
            Err(TimerError::OutOfRange { field: "duration", .. })
        ));
        assert!(matches!(
            encode_parts(1100, 0, 30, ["mon"], true, Validation::Lenient),
            Err(TimerError::OutOfRange { field: "start", .. })
        ));
    }

    #[test]
    fn set_field_preserves_other_fields() {
        let current = record(6, 30, 45, &[Weekday::Mon, Weekday::Wed], true)
            .encode()
            .unwrap();
        let updated = set_field(&current, TimerField::Minute, 15, Validation::Strict)
            .unwrap()
            .unwrap();
        assert_eq!(
            decode(&updated).unwrap(),
            record(6, 15, 45, &[Weekday::Mon, Weekday::Wed], true)
        );
    }

    #[test]
    fn set_day_toggles_single_bit() {
        let added = set_day(&SAMPLE, Weekday::Sun, true, Validation::Strict)
            .unwrap()
            .unwrap();
        assert_eq!(added[OFFSET_DAYS], 0x2B);
        let removed = set_day(&added, Weekday::Wed, false, Validation::Strict)
            .unwrap()
            .unwrap();
        assert_eq!(removed[OFFSET_DAYS], 0x23);
        let mut expected = SAMPLE;
        expected[OFFSET_DAYS] = 0x23;
        assert_eq!(removed, expected);
    }

    #[test]
    fn set_enabled_flips_flag_only() {
        let off = set_enabled(&SAMPLE, false, Validation::Strict).unwrap().unwrap();
        let mut expected = SAMPLE;
        expected[OFFSET_ENABLED] = 0x00;
        assert_eq!(off, expected);
    }

    #[test]
    fn edits_on_absent_value_are_no_ops() {
        assert_eq!(set_field(&[], TimerField::Hour, 5, Validation::Strict), Ok(None));
        assert_eq!(set_day(&SAMPLE[..13], Weekday::Mon, true, Validation::Strict), Ok(None));
    }

    #[test]
    fn edits_rebuild_constant_bytes() {
        let mut variant = SAMPLE;
        variant[OFFSET_MARKER] = 0x32;
        variant[12] = 0x15;
        let updated = set_field(&variant, TimerField::Duration, 30, Validation::Strict)
            .unwrap()
            .unwrap();
        assert_eq!(updated, SAMPLE);
    }

    #[test]
    fn edit_values_must_fit_field() {
        let err =
            set_field(&SAMPLE, TimerField::Duration, 65_536, Validation::Lenient).unwrap_err();
        assert!(matches!(err, TimerError::OutOfRange { field: "duration", .. }));
        let err = set_field(&SAMPLE, TimerField::Hour, 24, Validation::Strict).unwrap_err();
        assert!(matches!(err, TimerError::OutOfRange { field: "hour", .. }));
    }

    #[test]
    fn day_set_serializes_as_tokens() {
        let days: DaySet = [Weekday::Sat, Weekday::Mon].into_iter().collect();
        assert_eq!(serde_json::to_string(&days).unwrap(), r#"["mon","sat"]"#);
        let back: DaySet = serde_json::from_str(r#"["sat","mon","mon"]"#).unwrap();
        assert_eq!(back, days);
        assert_eq!(DaySet::EMPTY.to_string(), "none");
    }

    #[test]
    fn field_names_parse() {
        assert_eq!("duration".parse::<TimerField>().unwrap(), TimerField::Duration);
        assert!("seconds".parse::<TimerField>().is_err());
        let decoded = decode(&SAMPLE).unwrap();
        assert_eq!(TimerField::Duration.get(&decoded), 30);
    }
}
