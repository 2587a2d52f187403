//! # Frame Parser
//!
//! Decodes one text line from the sensor board into readings.
//!
//! A frame is a run of `<letters><digits>:<digits>` groups, e.g.
//! `GAS01:346HUM01:47TEMP01:23`. Anything between groups is noise and is
//! dropped, so partial garbage from the serial line never fails a frame.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::warn;

use super::collection::ReadingCollection;
use super::kind::SensorKind;
use super::reading::SensorReading;

/// Reading group: uppercase kind letters, index digits, `:`, value digits
const READING_PATTERN: &str = r"([A-Z]+)(\d+):(\d+)";

fn reading_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(READING_PATTERN).expect("reading pattern is a valid regex"))
}

/// Lazily scan `line` for readings, left to right
///
/// All readings share the timestamp `at`. Groups whose value does not fit
/// an `i64` are skipped.
pub fn readings<'a>(line: &'a str, at: DateTime<Utc>) -> impl Iterator<Item = SensorReading> + 'a {
    reading_regex()
        .captures_iter(line)
        .filter_map(move |caps| reading_from_captures(&caps, at))
}

fn reading_from_captures(caps: &Captures<'_>, at: DateTime<Utc>) -> Option<SensorReading> {
    let code = caps.get(1)?.as_str();
    let index = caps.get(2)?.as_str();
    let raw_value = caps.get(3)?.as_str();

    match raw_value.parse::<i64>() {
        Ok(value) => Some(SensorReading::new(SensorKind::from_code(code), index, value, at)),
        Err(e) => {
            warn!("Skipping {}{}: value {} out of range: {}", code, index, raw_value, e);
            None
        }
    }
}

/// Parse a frame, stamping readings with the current time
///
/// # Examples
///
/// ```
/// use sensor_uplink::sensor::parse_frame;
///
/// let readings = parse_frame("GAS01:346HUM01:47TEMP01:23");
/// assert_eq!(readings.len(), 3);
/// assert!(parse_frame("no readings here").is_empty());
/// ```
pub fn parse_frame(line: &str) -> ReadingCollection {
    parse_frame_at(line, Utc::now())
}

/// Parse a frame with an explicit timestamp
pub fn parse_frame_at(line: &str, at: DateTime<Utc>) -> ReadingCollection {
    readings(line, at).collect()
}
