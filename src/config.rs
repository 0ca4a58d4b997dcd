//! Engine configuration
//!
//! Every section deserializes with defaults, so a host only needs to spell out
//! the values it changes:
//!
//! ```rust
//! use confluence::EngineConfig;
//!
//! let config: EngineConfig = serde_json::from_str(r#"{ "signals": { "ttl_secs": 900 } }"#).unwrap();
//! assert_eq!(config.signals.ttl_secs, 900);
//! assert_eq!(config.signals.min_confidence, 0.6);
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{EngineError, PatternType, Result};

// ============================================================
// SECTIONS
// ============================================================

/// Confidence scorer thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Detections at or below this confidence are dropped
    pub noise_floor: f64,
    /// Scored confidence never exceeds this value
    pub confidence_ceiling: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            noise_floor: 0.3,
            confidence_ceiling: 0.95,
        }
    }
}

/// Cross-timeframe boost parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceConfig {
    pub bonus_per_occurrence: f64,
    pub max_bonus: f64,
    pub success_rate_bump: f64,
    pub success_rate_cap: f64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            bonus_per_occurrence: 0.1,
            max_bonus: 0.3,
            success_rate_bump: 0.05,
            success_rate_cap: 0.95,
        }
    }
}

/// Signal gate and lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Only detections strictly above this confidence become signals
    pub min_confidence: f64,
    /// Seconds between the detection timestamp and signal expiry
    pub ttl_secs: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            ttl_secs: 1_800,
        }
    }
}

// ============================================================
// ENGINE CONFIG
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub confluence: ConfluenceConfig,
    pub signals: SignalConfig,
    /// Report only these patterns when set
    pub pattern_filter: Option<BTreeSet<PatternType>>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let floor = self.scoring.noise_floor;
        let ceiling = self.scoring.confidence_ceiling;
        let gate = self.signals.min_confidence;

        check_unit("scoring.noise_floor", floor)?;
        check_unit("scoring.confidence_ceiling", ceiling)?;
        check_unit("signals.min_confidence", gate)?;
        check_unit("confluence.bonus_per_occurrence", self.confluence.bonus_per_occurrence)?;
        check_unit("confluence.max_bonus", self.confluence.max_bonus)?;
        check_unit("confluence.success_rate_bump", self.confluence.success_rate_bump)?;
        check_unit("confluence.success_rate_cap", self.confluence.success_rate_cap)?;

        if ceiling <= floor {
            return Err(EngineError::InvalidConfig(format!(
                "confidence_ceiling ({ceiling}) must exceed noise_floor ({floor})"
            )));
        }
        if gate <= floor {
            return Err(EngineError::InvalidConfig(format!(
                "signals.min_confidence ({gate}) must exceed noise_floor ({floor})"
            )));
        }
        if self.signals.ttl_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "signals.ttl_secs must be > 0".to_string(),
            ));
        }
        if matches!(&self.pattern_filter, Some(filter) if filter.is_empty()) {
            return Err(EngineError::InvalidConfig(
                "pattern_filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<()> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(EngineError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring.noise_floor, 0.3);
        assert_eq!(config.scoring.confidence_ceiling, 0.95);
        assert_eq!(config.signals.ttl_secs, 1_800);
        assert!(config.pattern_filter.is_none());
    }

    #[test]
    fn test_gate_below_floor_rejected() {
        let mut config = EngineConfig::default();
        config.signals.min_confidence = 0.2;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_out_of_unit_range_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.confidence_ceiling = 1.5;
        assert!(matches!(
            config.validate(),
            Err(EngineError::OutOfRange {
                field: "scoring.confidence_ceiling",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "scoring": { "noise_floor": 0.25 }, "pattern_filter": ["hammer", "doji"] }"#,
        )
        .unwrap();
        assert_eq!(config.scoring.noise_floor, 0.25);
        assert_eq!(config.scoring.confidence_ceiling, 0.95);
        let filter = config.pattern_filter.unwrap();
        assert!(filter.contains(&PatternType::Hammer));
        assert_eq!(filter.len(), 2);
    }
}
