//! Options-flavoured detectors read from the underlying's bars alone
//!
//! No option chain data is available here, so each setup is inferred from its
//! footprint on the underlying: strike gravity for pins and squeezes, realized
//! range for volatility regimes.

use super::helpers::{clamp_unit, matched, max_of, mean_of, min_of, volume_ratio};
use crate::{
    indicators, Direction, EngineError, MarketContext, OHLCVExt, PatternDetector, PatternFamily,
    PatternMatch, PatternType, Period, Ratio, Result, OHLCV,
};

impl_with_defaults!(
    GammaSqueezeDetector,
    IvCrushDetector,
    PinRiskDetector,
    VolatilityExpansionDetector,
);

/// Strike at or below `price`
#[inline]
fn strike_below(price: f64, step: f64) -> f64 {
    (price / step).floor() * step
}

fn validate_step(step: f64) -> Result<()> {
    if !step.is_finite() || step <= 0.0 {
        return Err(EngineError::OutOfRange {
            field: "strike_step",
            value: step,
            min: f64::EPSILON,
            max: f64::MAX,
        });
    }
    Ok(())
}

// ============================================================
// GAMMA SQUEEZE
// ============================================================

/// Accelerating move through a strike on heavy volume. Dealer hedging chases
/// the move toward the next strike.
#[derive(Debug, Clone, Copy)]
pub struct GammaSqueezeDetector {
    pub strike_step: f64,
    /// Consecutive accelerating bars, the latest included
    pub accel_bars: Period,
    pub volume_multiplier: f64,
}

impl Default for GammaSqueezeDetector {
    fn default() -> Self {
        Self {
            strike_step: 50.0,
            accel_bars: Period::new_const(3),
            volume_multiplier: 2.0,
        }
    }
}

impl PatternDetector for GammaSqueezeDetector {
    fn name(&self) -> &'static str {
        "gamma_squeeze"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Options
    }

    fn min_bars(&self) -> usize {
        self.accel_bars.get() + 10
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let k = self.accel_bars.get();
        let changes: Vec<f64> = ctx.closes[n - 1 - k..]
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect();
        let direction = if changes.iter().all(|&c| c > 0.0) {
            Direction::Bullish
        } else if changes.iter().all(|&c| c < 0.0) {
            Direction::Bearish
        } else {
            return None;
        };
        let accelerating = changes.windows(2).all(|w| w[1].abs() > w[0].abs());
        let ratio = volume_ratio(ctx)?;
        if !accelerating || ratio < self.volume_multiplier {
            return None;
        }

        // the latest bar must carry the close through a strike
        let step = self.strike_step;
        let prev = ctx.closes[n - 2];
        let close = ctx.closes[n - 1];
        let (crossed, target) = match direction {
            Direction::Bullish => {
                let strike = strike_below(close, step);
                (prev < strike, strike + step)
            }
            _ => {
                let strike = strike_below(close, step) + step;
                (prev > strike, strike - step)
            }
        };
        if !crossed {
            return None;
        }
        let stop = match direction {
            Direction::Bullish => min_of(&ctx.lows[n - 1 - k..]),
            _ => max_of(&ctx.highs[n - 1 - k..]),
        };

        matched(
            PatternType::GammaSqueeze,
            direction,
            0.55 + (0.05 * ratio).min(0.25),
            close,
            (target, stop),
        )
    }

    fn validate_config(&self) -> Result<()> {
        validate_step(self.strike_step)
    }
}

// ============================================================
// IV CRUSH
// ============================================================

/// Volatility spike followed by a collapse in realized range
#[derive(Debug, Clone, Copy)]
pub struct IvCrushDetector {
    /// Quiet bars at the end of the window
    pub calm_bars: Period,
    /// Bars before the calm searched for the spike
    pub spike_bars: Period,
    /// Spike range over the baseline range
    pub spike_multiplier: f64,
    /// Calm range over the spike range
    pub crush_ratio: Ratio,
}

impl Default for IvCrushDetector {
    fn default() -> Self {
        Self {
            calm_bars: Period::new_const(3),
            spike_bars: Period::new_const(7),
            spike_multiplier: 2.5,
            crush_ratio: Ratio::new_const(0.4),
        }
    }
}

impl PatternDetector for IvCrushDetector {
    fn name(&self) -> &'static str {
        "iv_crush"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Options
    }

    fn min_bars(&self) -> usize {
        self.calm_bars.get() + self.spike_bars.get() + 20
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() || bars.len() != n {
            return None;
        }
        let ranges: Vec<f64> = bars.iter().map(|b| b.range()).collect();
        let calm_start = n - self.calm_bars.get();
        let spike_start = calm_start - self.spike_bars.get();

        let calm = mean_of(&ranges[calm_start..])?;
        let spike = max_of(&ranges[spike_start..calm_start]);
        let baseline = mean_of(&ranges[..spike_start])?;
        if baseline <= 0.0 || spike < baseline * self.spike_multiplier {
            return None;
        }
        if calm > spike * self.crush_ratio.get() {
            return None;
        }
        let close = ctx.last_close()?;

        matched(
            PatternType::IvCrush,
            Direction::Neutral,
            clamp_unit(0.5 + 0.3 * (1.0 - calm / spike)),
            close,
            (max_of(&ctx.highs[calm_start..]), min_of(&ctx.lows[calm_start..])),
        )
    }
}

// ============================================================
// PIN RISK
// ============================================================

/// Price compressing around a strike: expiry pinning
#[derive(Debug, Clone, Copy)]
pub struct PinRiskDetector {
    pub strike_step: f64,
    /// Bars that must all close near the strike
    pub pin_bars: Period,
    /// Maximum distance from the strike, relative to price
    pub tolerance: Ratio,
    /// Pin-window range over the prior range
    pub compression: Ratio,
}

impl Default for PinRiskDetector {
    fn default() -> Self {
        Self {
            strike_step: 50.0,
            pin_bars: Period::new_const(5),
            tolerance: Ratio::new_const(0.002),
            compression: Ratio::new_const(0.6),
        }
    }
}

impl PatternDetector for PinRiskDetector {
    fn name(&self) -> &'static str {
        "pin_risk"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Options
    }

    fn min_bars(&self) -> usize {
        self.pin_bars.get() + 10
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() || bars.len() != n {
            return None;
        }
        let close = ctx.last_close()?;
        if close <= 0.0 {
            return None;
        }
        let step = self.strike_step;
        let strike = (close / step).round() * step;
        let band = close * self.tolerance.get();
        let start = n - self.pin_bars.get();
        if ctx.closes[start..].iter().any(|c| (c - strike).abs() > band) {
            return None;
        }

        let ranges: Vec<f64> = bars.iter().map(|b| b.range()).collect();
        let pinned = mean_of(&ranges[start..])?;
        let prior = mean_of(&ranges[..start])?;
        if prior <= 0.0 || pinned > prior * self.compression.get() {
            return None;
        }
        let closeness = 1.0 - (close - strike).abs() / band.max(f64::EPSILON);

        matched(
            PatternType::PinRisk,
            Direction::Neutral,
            0.5 + 0.2 * closeness + 0.1 * (1.0 - pinned / prior),
            close,
            (max_of(&ctx.highs[start..]), min_of(&ctx.lows[start..])),
        )
    }

    fn validate_config(&self) -> Result<()> {
        validate_step(self.strike_step)
    }
}

// ============================================================
// VOLATILITY EXPANSION
// ============================================================

/// ATR jumping off its recent level with a wide latest bar
#[derive(Debug, Clone, Copy)]
pub struct VolatilityExpansionDetector {
    pub atr_period: Period,
    /// Bars back for the ATR comparison
    pub lag: Period,
    pub atr_multiplier: f64,
    pub range_multiplier: f64,
}

impl Default for VolatilityExpansionDetector {
    fn default() -> Self {
        Self {
            atr_period: Period::new_const(14),
            lag: Period::new_const(5),
            atr_multiplier: 1.3,
            range_multiplier: 2.0,
        }
    }
}

impl PatternDetector for VolatilityExpansionDetector {
    fn name(&self) -> &'static str {
        "volatility_expansion"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Options
    }

    fn min_bars(&self) -> usize {
        self.atr_period.get() + self.lag.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() || bars.len() != n {
            return None;
        }
        let series =
            indicators::atr_series(&ctx.highs, &ctx.lows, &ctx.closes, self.atr_period.get());
        let lag = self.lag.get();
        let now = *series.last()?;
        let before = *series.get(series.len().checked_sub(lag + 1)?)?;
        let last = &bars[n - 1];
        if before <= 0.0
            || now < before * self.atr_multiplier
            || last.range() < ctx.avg_range * self.range_multiplier
        {
            return None;
        }
        let direction = if last.is_bullish() {
            Direction::Bullish
        } else if last.is_bearish() {
            Direction::Bearish
        } else {
            return None;
        };
        let close = last.close();
        let sign = direction.sign();

        matched(
            PatternType::VolatilityExpansion,
            direction,
            0.5 + (0.2 * (now / before - 1.0)).min(0.3),
            close,
            (close + sign * 2.0 * now, close - sign * now),
        )
    }
}
