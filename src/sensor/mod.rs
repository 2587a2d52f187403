//! # Sensor Module
//!
//! Decoding of the sensor board's text frames into structured readings.
//!
//! This module handles:
//! - Sensor kind codes and their fixed measurement units
//! - Scanning a frame line for `<KIND><index>:<value>` groups
//! - Collecting readings and converting them to store documents

pub mod kind;
pub mod reading;
pub mod parser;
pub mod collection;

pub use collection::ReadingCollection;
pub use kind::{SensorKind, UNKNOWN_UNIT};
pub use parser::{parse_frame, parse_frame_at, readings};
pub use reading::{OwnerRef, ReadingDocument, SensorReading};
