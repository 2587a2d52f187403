//! # Sensor Readings
//!
//! The decoded reading and the document shape it is buffered and stored as.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::kind::SensorKind;

/// Installation (incubator) a reading was sampled from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub id: String,
    pub name: String,
}

/// One decoded `<kind><index>:<value>` group
///
/// Immutable once built; the unit is always derived from the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    kind: SensorKind,
    index: String,
    value: i64,
    recorded_at: DateTime<Utc>,
}

impl SensorReading {
    /// Create a reading
    ///
    /// `index` is kept as text so that "01" and "1" stay distinct.
    pub fn new(kind: SensorKind, index: impl Into<String>, value: i64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            index: index.into(),
            value,
            recorded_at,
        }
    }

    pub fn kind(&self) -> &SensorKind {
        &self.kind
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn unit(&self) -> &'static str {
        self.kind.unit()
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Build the store document for this reading
    pub fn to_document(&self, owner_ref: Option<&OwnerRef>) -> ReadingDocument {
        ReadingDocument {
            kind: self.kind.code().to_string(),
            index: self.index.clone(),
            value: self.value,
            unit: self.unit().to_string(),
            recorded_at: self.recorded_at,
            owner_ref: owner_ref.cloned(),
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Kind: {} Index: {} Value: {} Unit: {}",
            self.kind, self.index, self.value, self.unit()
        )
    }
}

/// Transport form of a reading
///
/// This is the record written to the local buffer and inserted into the
/// remote store. Downstream readers rely on these field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingDocument {
    pub kind: String,
    pub index: String,
    pub value: i64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_ref: Option<OwnerRef>,
}
