//! Tunable detector parameters
//!
//! Detectors that implement [`ParameterizedDetector`] describe their knobs with
//! [`ParamMeta`]. Values supplied by a host are checked against that metadata
//! before a detector is built, and [`ParameterizedDetector::grid`] sweeps every
//! combination for calibration runs.
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use confluence::params::ParameterizedDetector;
//! use confluence::prelude::*;
//!
//! let mut params = HashMap::new();
//! params.insert("volume_multiplier", 3.0);
//! let detector = RangeBreakoutDetector::with_params(&params).unwrap();
//! assert_eq!(detector.volume_multiplier, 3.0);
//!
//! params.insert("volume_multiplier", 9.0);
//! assert!(RangeBreakoutDetector::with_params(&params).is_err());
//!
//! let sweep = RangeBreakoutDetector::grid().unwrap();
//! assert!(sweep.iter().all(|d| d.validate_config().is_ok()));
//! ```

use std::collections::HashMap;

use crate::{EngineError, Period, Ratio, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// 0.0..=1.0
    Ratio,
    /// Positive integer
    Period,
    /// Positive multiplier or level, may exceed 1.0
    Factor,
}

#[derive(Debug, Clone)]
pub struct ParamMeta {
    pub name: &'static str,
    pub param_type: ParamType,
    pub default: f64,
    /// (min, max, step)
    pub range: (f64, f64, f64),
    pub description: &'static str,
}

impl ParamMeta {
    /// Values from `min` to `max` in `step` increments, both ends included
    pub fn generate_grid(&self) -> Vec<f64> {
        let (min, max, step) = self.range;
        if step <= 0.0 || max < min {
            return vec![min];
        }
        let count = ((max - min) / step + 1e-9).floor() as usize;
        (0..=count).map(|i| (min + step * i as f64).min(max)).collect()
    }

    pub fn validate(&self, value: f64) -> Result<()> {
        let (min, max, _) = self.range;
        if value < min || value > max {
            return Err(EngineError::OutOfRange { field: self.name, value, min, max });
        }
        match self.param_type {
            ParamType::Ratio => Ratio::new(value).map(|_| ()),
            ParamType::Period if value < 1.0 || value.fract() != 0.0 => {
                Err(EngineError::InvalidValue("Period must be a positive integer"))
            }
            ParamType::Factor if value <= 0.0 || !value.is_finite() => {
                Err(EngineError::InvalidValue("Factor must be positive and finite"))
            }
            _ => Ok(()),
        }
    }
}

/// Reject names the metadata does not know and values outside their range
pub fn check_params(meta: &[ParamMeta], params: &HashMap<&str, f64>) -> Result<()> {
    for (&key, &value) in params {
        let param = meta
            .iter()
            .find(|p| p.name == key)
            .ok_or_else(|| EngineError::InvalidConfig(format!("unknown parameter `{key}`")))?;
        param.validate(value)?;
    }
    Ok(())
}

pub trait ParameterizedDetector: Sized {
    fn param_meta() -> &'static [ParamMeta];

    /// Build from values already checked against [`Self::param_meta`].
    /// Missing parameters take their defaults.
    fn from_params(params: &HashMap<&str, f64>) -> Result<Self>;

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(Self::param_meta(), params)?;
        Self::from_params(params)
    }

    /// One detector per combination of the parameter grids
    fn grid() -> Result<Vec<Self>> {
        let mut combos: Vec<HashMap<&'static str, f64>> = vec![HashMap::new()];
        for meta in Self::param_meta() {
            let values = meta.generate_grid();
            combos = combos
                .iter()
                .flat_map(|base| {
                    values.iter().map(move |&v| {
                        let mut combo = base.clone();
                        combo.insert(meta.name, v);
                        combo
                    })
                })
                .collect();
        }
        combos.iter().map(|combo| Self::with_params(combo)).collect()
    }
}

pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
    Ratio::new(params.get(key).copied().unwrap_or(default))
}

pub fn get_factor(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
    let value = params.get(key).copied().unwrap_or(default);
    if value <= 0.0 || !value.is_finite() {
        return Err(EngineError::InvalidValue("Factor must be positive and finite"));
    }
    Ok(value)
}

pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
    let value = params.get(key).copied().unwrap_or(default as f64);
    Period::new(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{HeadAndShouldersDetector, RangeBreakoutDetector, RsiDetector};
    use crate::PatternDetector;

    fn shoulder_tolerance() -> ParamMeta {
        ParamMeta {
            name: "shoulder_tolerance",
            param_type: ParamType::Ratio,
            default: 0.03,
            range: (0.01, 0.06, 0.01),
            description: "",
        }
    }

    #[test]
    fn test_grid_stays_inside_range() {
        let meta = shoulder_tolerance();
        let grid = meta.generate_grid();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid[5], 0.06);
        assert!(grid.iter().all(|&v| meta.validate(v).is_ok()));
    }

    #[test]
    fn test_validate_by_type() {
        let lookback = ParamMeta {
            name: "lookback",
            param_type: ParamType::Period,
            default: 15.0,
            range: (10.0, 30.0, 5.0),
            description: "",
        };
        assert!(lookback.validate(20.0).is_ok());
        assert!(lookback.validate(12.5).is_err());
        assert!(lookback.validate(35.0).is_err());
        assert!(shoulder_tolerance().validate(0.005).is_err());
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let mut params = HashMap::new();
        params.insert("shoulder_tolerence", 0.02);
        let err = HeadAndShouldersDetector::with_params(&params).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut params = HashMap::new();
        params.insert("lookback", 200.0);
        assert!(matches!(
            HeadAndShouldersDetector::with_params(&params),
            Err(EngineError::OutOfRange { field: "lookback", .. })
        ));
    }

    #[test]
    fn test_grid_sweep() {
        // 5 lookbacks x 7 multipliers x 5 stop fractions
        let sweep = RangeBreakoutDetector::grid().unwrap();
        assert_eq!(sweep.len(), 175);
        assert!(sweep.iter().all(|d| d.validate_config().is_ok()));

        let rsi = RsiDetector::grid().unwrap();
        assert!(rsi.iter().all(|d| d.oversold < d.overbought));
    }

    #[test]
    fn test_defaults_match_detector_defaults() {
        let built = RangeBreakoutDetector::with_params(&HashMap::new()).unwrap();
        let default = RangeBreakoutDetector::default();
        assert_eq!(built.lookback.get(), default.lookback.get());
        assert_eq!(built.volume_multiplier, default.volume_multiplier);
        assert_eq!(built.stop_fraction.get(), default.stop_fraction.get());
    }
}
