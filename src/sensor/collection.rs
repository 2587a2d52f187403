//! # Reading Collection
//!
//! Ordered readings of one frame and their transport form.

use std::fmt;

use super::reading::{OwnerRef, ReadingDocument, SensorReading};

/// Readings decoded from one frame, in wire order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingCollection {
    readings: Vec<SensorReading>,
}

impl ReadingCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading at the end
    pub fn push(&mut self, reading: SensorReading) {
        self.readings.push(reading);
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SensorReading> {
        self.readings.iter()
    }

    /// Convert every reading to its store document
    ///
    /// Always returns a list, even for a single reading; the caller picks
    /// single or batch insert from its length. `owner_ref` is attached to
    /// every document.
    pub fn to_transport_form(&self, owner_ref: Option<&OwnerRef>) -> Vec<ReadingDocument> {
        self.readings
            .iter()
            .map(|reading| reading.to_document(owner_ref))
            .collect()
    }
}

impl FromIterator<SensorReading> for ReadingCollection {
    fn from_iter<I: IntoIterator<Item = SensorReading>>(iter: I) -> Self {
        Self {
            readings: iter.into_iter().collect(),
        }
    }
}

impl Extend<SensorReading> for ReadingCollection {
    fn extend<I: IntoIterator<Item = SensorReading>>(&mut self, iter: I) {
        self.readings.extend(iter);
    }
}

impl IntoIterator for ReadingCollection {
    type Item = SensorReading;
    type IntoIter = std::vec::IntoIter<SensorReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReadingCollection {
    type Item = &'a SensorReading;
    type IntoIter = std::slice::Iter<'a, SensorReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

impl fmt::Display for ReadingCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for reading in &self.readings {
            writeln!(f, "{}", reading)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::kind::SensorKind;
    use crate::sensor::parser::parse_frame_at;
    use chrono::{DateTime, TimeZone, Utc};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_single_reading_is_still_a_list() {
        let collection = parse_frame_at("TEMP01:23", at());
        let docs = collection.to_transport_form(None);

        assert_eq!(docs.len(), 1);
        let json = serde_json::to_value(&docs).unwrap();
        assert!(json.is_array());
    }

    #[test]
    fn test_empty_collection_has_empty_transport_form() {
        let collection = ReadingCollection::new();
        assert!(collection.to_transport_form(None).is_empty());
    }

    #[test]
    fn test_owner_ref_attached_to_every_document() {
        let owner = OwnerRef {
            id: "inc-7".to_string(),
            name: "North room".to_string(),
        };
        let collection = parse_frame_at("GAS01:346HUM01:47TEMP01:23", at());
        let docs = collection.to_transport_form(Some(&owner));

        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d.owner_ref.as_ref() == Some(&owner)));
    }

    #[test]
    fn test_transport_form_survives_json_round_trip() {
        let collection = parse_frame_at("GAS01:346HUM001:47TEMP1:23", at());
        let docs = collection.to_transport_form(None);

        let text = serde_json::to_string_pretty(&docs).unwrap();
        let decoded: Vec<ReadingDocument> = serde_json::from_str(&text).unwrap();

        assert_eq!(decoded.len(), 3);
        let fields: Vec<_> = decoded
            .iter()
            .map(|d| (d.kind.as_str(), d.index.as_str(), d.value, d.unit.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![("GAS", "01", 346, "PPM"), ("HUM", "001", 47, "%"), ("TEMP", "1", 23, "°C")]
        );
    }

    #[test]
    fn test_push_and_extend_keep_order() {
        let mut collection = ReadingCollection::new();
        collection.push(SensorReading::new(SensorKind::Light, "01", 5, at()));
        collection.extend(parse_frame_at("SON01:2", at()));

        let codes: Vec<_> = collection.iter().map(|r| r.kind().code().to_string()).collect();
        assert_eq!(codes, vec!["LUZ", "SON"]);
    }

    #[test]
    fn test_display_lists_one_reading_per_line() {
        let collection = parse_frame_at("GAS01:346HUM01:47", at());
        let text = collection.to_string();

        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("Kind: GAS Index: 01 Value: 346 Unit: PPM"));
    }
}
