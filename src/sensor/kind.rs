//! # Sensor Kinds and Units
//!
//! Kind codes emitted by the sensor board and the unit each one reports in.

use std::fmt;

/// Gas concentration code
pub const KIND_GAS: &str = "GAS";

/// Relative humidity code
pub const KIND_HUMIDITY: &str = "HUM";

/// Temperature code
pub const KIND_TEMPERATURE: &str = "TEMP";

/// Water level code
pub const KIND_WATER_LEVEL: &str = "AGU";

/// Sound code
pub const KIND_SOUND: &str = "SON";

/// Light code
pub const KIND_LIGHT: &str = "LUZ";

/// Unit reported for any kind outside the fixed table
pub const UNKNOWN_UNIT: &str = "Unknown";

/// Sensor category, identified on the wire by its letter code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Gas,
    Humidity,
    Temperature,
    WaterLevel,
    Sound,
    Light,
    /// Any letter run the board sent that is not in the table
    Other(String),
}

impl SensorKind {
    /// Map a wire code to a kind
    ///
    /// Matching is exact and case-sensitive. Unrecognized codes are kept
    /// verbatim in [`SensorKind::Other`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sensor_uplink::sensor::SensorKind;
    ///
    /// assert_eq!(SensorKind::from_code("TEMP"), SensorKind::Temperature);
    /// assert_eq!(SensorKind::from_code("CO"), SensorKind::Other("CO".to_string()));
    /// ```
    pub fn from_code(code: &str) -> Self {
        match code {
            KIND_GAS => Self::Gas,
            KIND_HUMIDITY => Self::Humidity,
            KIND_TEMPERATURE => Self::Temperature,
            KIND_WATER_LEVEL => Self::WaterLevel,
            KIND_SOUND => Self::Sound,
            KIND_LIGHT => Self::Light,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire code of this kind
    pub fn code(&self) -> &str {
        match self {
            Self::Gas => KIND_GAS,
            Self::Humidity => KIND_HUMIDITY,
            Self::Temperature => KIND_TEMPERATURE,
            Self::WaterLevel => KIND_WATER_LEVEL,
            Self::Sound => KIND_SOUND,
            Self::Light => KIND_LIGHT,
            Self::Other(code) => code,
        }
    }

    /// Unit the board reports this kind in
    ///
    /// Total: every kind has a unit, unknown kinds get [`UNKNOWN_UNIT`].
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Gas => "PPM",
            Self::Humidity => "%",
            Self::Temperature => "°C",
            Self::WaterLevel => "PPM",
            Self::Sound => "cm",
            Self::Light => "lx",
            Self::Other(_) => UNKNOWN_UNIT,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_round_trip() {
        for code in [
            KIND_GAS,
            KIND_HUMIDITY,
            KIND_TEMPERATURE,
            KIND_WATER_LEVEL,
            KIND_SOUND,
            KIND_LIGHT,
        ] {
            let kind = SensorKind::from_code(code);
            assert!(!matches!(kind, SensorKind::Other(_)), "{} should be a known kind", code);
            assert_eq!(kind.code(), code);
        }
    }

    #[test]
    fn test_unit_table() {
        assert_eq!(SensorKind::Gas.unit(), "PPM");
        assert_eq!(SensorKind::Humidity.unit(), "%");
        assert_eq!(SensorKind::Temperature.unit(), "°C");
        assert_eq!(SensorKind::WaterLevel.unit(), "PPM");
        assert_eq!(SensorKind::Sound.unit(), "cm");
        assert_eq!(SensorKind::Light.unit(), "lx");
    }

    #[test]
    fn test_unknown_kind_maps_to_sentinel() {
        for code in ["CO", "X", "gas", "TEMPERATURE", ""] {
            let kind = SensorKind::from_code(code);
            assert_eq!(kind, SensorKind::Other(code.to_string()));
            assert_eq!(kind.unit(), UNKNOWN_UNIT);
            assert_eq!(kind.code(), code);
        }
    }

    #[test]
    fn test_display_uses_wire_code() {
        assert_eq!(SensorKind::WaterLevel.to_string(), "AGU");
        assert_eq!(SensorKind::Other("PH".to_string()).to_string(), "PH");
    }
}
