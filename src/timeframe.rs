//! Bar resolutions supported by the engine

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Duration represented by one bar.
///
/// Ordered shortest to longest, so `BTreeMap<Timeframe, _>` iterates from the
/// noisiest resolution to the most reliable one.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1m")]
    #[strum(serialize = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    #[strum(serialize = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    #[strum(serialize = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    #[strum(serialize = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    #[strum(serialize = "1h")]
    OneHour,
}

impl Timeframe {
    pub const fn seconds(self) -> u64 {
        match self {
            Timeframe::OneMinute => 60,
            Timeframe::FiveMinutes => 300,
            Timeframe::FifteenMinutes => 900,
            Timeframe::ThirtyMinutes => 1_800,
            Timeframe::OneHour => 3_600,
        }
    }

    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds() as i64)
    }

    /// Confidence multiplier applied by the scorer. Short bars carry less information.
    pub const fn reliability(self) -> f64 {
        match self {
            Timeframe::OneMinute => 0.8,
            Timeframe::FiveMinutes => 0.9,
            Timeframe::FifteenMinutes => 1.0,
            Timeframe::ThirtyMinutes => 1.1,
            Timeframe::OneHour => 1.2,
        }
    }

    /// Scalping detectors only run on the two shortest resolutions.
    #[inline]
    pub fn is_scalping(self) -> bool {
        matches!(self, Timeframe::OneMinute | Timeframe::FiveMinutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_reliability_increases_with_duration() {
        let all: Vec<Timeframe> = Timeframe::iter().collect();
        assert!(all.windows(2).all(|w| w[0].seconds() < w[1].seconds()));
        assert!(all.windows(2).all(|w| w[0].reliability() < w[1].reliability()));
        assert_eq!(Timeframe::OneMinute.reliability(), 0.8);
        assert_eq!(Timeframe::OneHour.reliability(), 1.2);
    }

    #[test]
    fn test_scalping_eligibility() {
        assert!(Timeframe::OneMinute.is_scalping());
        assert!(Timeframe::FiveMinutes.is_scalping());
        assert!(!Timeframe::FifteenMinutes.is_scalping());
        assert!(!Timeframe::OneHour.is_scalping());
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(Timeframe::FifteenMinutes.to_string(), "15m");
        assert_eq!("1h".parse::<Timeframe>().unwrap(), Timeframe::OneHour);
        let json = serde_json::to_string(&Timeframe::FiveMinutes).unwrap();
        assert_eq!(json, "\"5m\"");
    }
}
