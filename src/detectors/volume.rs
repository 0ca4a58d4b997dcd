//! Volume detectors: breakouts, divergences, accumulation/distribution, climaxes
//!
//! Levels are volatility based: two ATRs of target, one ATR of stop. Windows too
//! short for an ATR fall back to the average bar range.

use super::helpers::{clamp_unit, matched, max_of, min_of, volume_ratio, window_before};
use crate::{
    indicators, Direction, EngineError, MarketContext, OHLCVExt, PatternDetector, PatternFamily,
    PatternMatch, PatternType, Period, Result, OHLCV,
};

impl_with_defaults!(
    VolumeBreakoutDetector,
    VolumeDivergenceDetector,
    AccumulationDistributionDetector,
    VolumeClimaxDetector,
);

/// (target, stop) around `price` from the context's volatility
fn atr_levels(ctx: &MarketContext, price: f64, direction: Direction) -> Option<(f64, f64)> {
    let unit = ctx.atr.unwrap_or(ctx.avg_range);
    if unit.is_nan() || unit <= 0.0 {
        return None;
    }
    let sign = direction.sign();
    Some((price + sign * 2.0 * unit, price - sign * unit))
}

// ============================================================
// VOLUME BREAKOUT
// ============================================================

/// Close beyond the trailing closing range on a volume spike
#[derive(Debug, Clone, Copy)]
pub struct VolumeBreakoutDetector {
    pub lookback: Period,
    pub volume_multiplier: f64,
}

impl Default for VolumeBreakoutDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            volume_multiplier: 2.5,
        }
    }
}

impl PatternDetector for VolumeBreakoutDetector {
    fn name(&self) -> &'static str {
        "volume_breakout"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Volume
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let ratio = volume_ratio(ctx)?;
        if ratio <= self.volume_multiplier {
            return None;
        }
        let prior = window_before(&ctx.closes, 1, self.lookback.get())?;
        let close = ctx.last_close()?;
        let direction = if close > max_of(prior) {
            Direction::Bullish
        } else if close < min_of(prior) {
            Direction::Bearish
        } else {
            return None;
        };

        matched(
            PatternType::VolumeBreakout,
            direction,
            0.5 + 0.05 * ratio,
            close,
            atr_levels(ctx, close, direction)?,
        )
    }

    fn validate_config(&self) -> Result<()> {
        if !self.volume_multiplier.is_finite() || self.volume_multiplier < 1.0 {
            return Err(EngineError::OutOfRange {
                field: "volume_multiplier",
                value: self.volume_multiplier,
                min: 1.0,
                max: f64::MAX,
            });
        }
        Ok(())
    }
}

// ============================================================
// VOLUME DIVERGENCE
// ============================================================

/// New closing extreme on declining volume: the move lacks participation
#[derive(Debug, Clone, Copy)]
pub struct VolumeDivergenceDetector {
    pub lookback: Period,
}

impl Default for VolumeDivergenceDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
        }
    }
}

impl PatternDetector for VolumeDivergenceDetector {
    fn name(&self) -> &'static str {
        "volume_divergence"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Volume
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let lookback = self.lookback.get();
        let prior = window_before(&ctx.closes, 1, lookback)?;
        let volumes = window_before(&ctx.volumes, 0, lookback + 1)?;
        let close = ctx.last_close()?;
        let mean_volume = volumes.iter().sum::<f64>() / volumes.len() as f64;
        if mean_volume <= 0.0 {
            return None;
        }

        let fit = indicators::linear_regression(volumes)?;
        // slope per bar relative to the mean volume
        let decline = -fit.slope / mean_volume;
        let last_volume = *volumes.last()?;
        if decline <= 0.01 || last_volume >= mean_volume {
            return None;
        }

        // fading volume into a new high warns of a top, into a new low of a bottom
        let direction = if close > max_of(prior) {
            Direction::Bearish
        } else if close < min_of(prior) {
            Direction::Bullish
        } else {
            return None;
        };

        matched(
            PatternType::VolumeDivergence,
            direction,
            0.5 + (decline * 10.0).min(0.3),
            close,
            atr_levels(ctx, close, direction)?,
        )
    }
}

// ============================================================
// ACCUMULATION / DISTRIBUTION
// ============================================================

/// A/D line trending against a flat or opposing price trend
#[derive(Debug, Clone, Copy)]
pub struct AccumulationDistributionDetector {
    pub lookback: Period,
    /// Price slope per bar, relative to price, still counted as flat
    pub flat_slope: f64,
    /// Minimum A/D slope per bar, relative to the mean volume
    pub min_flow: f64,
}

impl Default for AccumulationDistributionDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            flat_slope: 0.001,
            min_flow: 0.1,
        }
    }
}

impl PatternDetector for AccumulationDistributionDetector {
    fn name(&self) -> &'static str {
        "accumulation_distribution"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Volume
    }

    fn min_bars(&self) -> usize {
        self.lookback.get()
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let start = n - self.lookback.get();
        let line = indicators::accumulation_distribution(
            &ctx.highs[start..],
            &ctx.lows[start..],
            &ctx.closes[start..],
            &ctx.volumes[start..],
        );
        let volumes = &ctx.volumes[start..];
        let mean_volume = volumes.iter().sum::<f64>() / volumes.len() as f64;
        let close = ctx.last_close()?;
        if mean_volume <= 0.0 || close <= 0.0 {
            return None;
        }

        let flow = indicators::linear_regression(&line)?.slope / mean_volume;
        let drift = indicators::linear_regression(&ctx.closes[start..])?.slope / close;

        let (pattern, direction) = if flow >= self.min_flow && drift <= self.flat_slope {
            (PatternType::Accumulation, Direction::Bullish)
        } else if flow <= -self.min_flow && drift >= -self.flat_slope {
            (PatternType::Distribution, Direction::Bearish)
        } else {
            return None;
        };

        matched(
            pattern,
            direction,
            0.5 + (flow.abs() - self.min_flow).min(0.3),
            close,
            atr_levels(ctx, close, direction)?,
        )
    }
}

// ============================================================
// VOLUME CLIMAX
// ============================================================

/// Exhaustion bar at the end of a trend: extreme volume and range, closing off the extreme
#[derive(Debug, Clone, Copy)]
pub struct VolumeClimaxDetector {
    pub volume_multiplier: f64,
    pub range_multiplier: f64,
}

impl Default for VolumeClimaxDetector {
    fn default() -> Self {
        Self {
            volume_multiplier: 3.0,
            range_multiplier: 2.0,
        }
    }
}

impl PatternDetector for VolumeClimaxDetector {
    fn name(&self) -> &'static str {
        "volume_climax"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Volume
    }

    fn min_bars(&self) -> usize {
        16
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() || bars.len() != n {
            return None;
        }
        let ratio = volume_ratio(ctx)?;
        let last = &bars[n - 1];
        let range = last.range();
        if ratio < self.volume_multiplier
            || ctx.avg_range <= 0.0
            || range < ctx.avg_range * self.range_multiplier
        {
            return None;
        }

        // selling climax closes in the upper half after a decline, buying climax the reverse
        let position = (last.close() - last.low()) / range;
        let trend = ctx.trend_before(1);
        let (direction, stop) = if trend.is_down() && position >= 0.5 {
            (Direction::Bullish, last.low())
        } else if trend.is_up() && position <= 0.5 {
            (Direction::Bearish, last.high())
        } else {
            return None;
        };
        let close = last.close();
        let risk = (close - stop).abs().max(f64::EPSILON);

        matched(
            PatternType::VolumeClimax,
            direction,
            clamp_unit(0.5 + 0.05 * ratio),
            close,
            (close + direction.sign() * 2.0 * risk, stop),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bar, ContextProvider, DefaultContextProvider, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, o: f64, h: f64, l: f64, c: f64, v: u64) -> Bar {
        let t0 = Utc.with_ymd_and_hms(2024, 8, 1, 9, 30, 0).unwrap();
        Bar::new(o, h, l, c, v, t0 + Duration::minutes(15 * i))
    }

    fn run<D: PatternDetector>(detector: &D, bars: &[Bar]) -> Option<PatternMatch> {
        let ctx = DefaultContextProvider::default().compute(bars, Timeframe::FifteenMinutes);
        detector.detect(bars, &ctx)
    }

    /// Alternating closes between 99 and 101
    fn choppy(n: usize, volume: u64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = if i % 2 == 0 { 99.0 } else { 101.0 };
                bar(i as i64, 100.0, 101.5, 98.5, c, volume)
            })
            .collect()
    }

    #[test]
    fn test_volume_breakout() {
        let mut bars = choppy(25, 1_000);
        bars.push(bar(25, 101.0, 104.5, 100.8, 104.0, 4_000));
        let m = run(&VolumeBreakoutDetector::default(), &bars).unwrap();
        assert_eq!(m.pattern, PatternType::VolumeBreakout);
        assert_eq!(m.direction, Direction::Bullish);
        assert!(m.target_price > 104.0 && m.stop_loss < 104.0);
    }

    #[test]
    fn test_volume_breakout_needs_spike() {
        let mut bars = choppy(25, 1_000);
        bars.push(bar(25, 101.0, 104.5, 100.8, 104.0, 1_500));
        assert!(run(&VolumeBreakoutDetector::default(), &bars).is_none());
    }

    #[test]
    fn test_volume_divergence_on_new_high() {
        let bars: Vec<Bar> = (0..21)
            .map(|i| {
                let c = 100.0 + 0.2 * i as f64;
                bar(i, c - 0.1, c + 0.3, c - 0.3, c, 3_000 - 100 * i as u64)
            })
            .collect();
        let m = run(&VolumeDivergenceDetector::default(), &bars).unwrap();
        assert_eq!(m.pattern, PatternType::VolumeDivergence);
        assert_eq!(m.direction, Direction::Bearish);
    }

    #[test]
    fn test_accumulation_on_flat_price() {
        // closes near the high on every bar while price goes nowhere
        let bars: Vec<Bar> = (0..20)
            .map(|i| {
                let base = if i % 2 == 0 { 100.0 } else { 100.4 };
                bar(i, base, base + 1.0, base - 1.0, base + 0.9, 1_000)
            })
            .collect();
        let m = run(&AccumulationDistributionDetector::default(), &bars).unwrap();
        assert_eq!(m.pattern, PatternType::Accumulation);
        assert_eq!(m.direction, Direction::Bullish);
    }

    #[test]
    fn test_selling_climax() {
        let mut bars: Vec<Bar> = (0..20)
            .map(|i| {
                let c = 120.0 - i as f64;
                bar(i, c + 0.5, c + 0.8, c - 0.3, c, 1_000)
            })
            .collect();
        // wide bar, huge volume, closes well off the low
        bars.push(bar(20, 100.5, 100.8, 96.0, 99.5, 5_000));
        let m = run(&VolumeClimaxDetector::default(), &bars).unwrap();
        assert_eq!(m.pattern, PatternType::VolumeClimax);
        assert_eq!(m.direction, Direction::Bullish);
        assert_eq!(m.stop_loss, 96.0);
        assert!((m.target_price - (99.5 + 2.0 * 3.5)).abs() < 1e-9);
    }
}
