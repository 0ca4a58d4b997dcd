//! Breakout detectors: ranges, triangles, flags and pennants, wedges, channels,
//! support and resistance
//!
//! Every detector looks for a structure in the bars before the latest one and
//! reports a breakout when the latest bar leaves it. Targets project the
//! structure's height from the breakout level.

use std::collections::HashMap;

use super::helpers::{
    boundary_lines, max_of, matched, mean_of, measured_move, min_of, relative_diff, volume_ratio,
};
use crate::{
    indicators,
    params::{get_factor, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
    Direction, EngineError, MarketContext, PatternDetector, PatternFamily, PatternMatch,
    PatternType, Period, Ratio, Result, OHLCV,
};

impl_with_defaults!(
    RangeBreakoutDetector,
    TriangleDetector,
    FlagDetector,
    WedgeDetector,
    ChannelBreakoutDetector,
    SupportResistanceDetector,
);

/// Slopes within this fraction of price per bar count as flat
const FLAT_SLOPE: f64 = 0.0005;

/// Small confidence bonus for breakouts on above-average volume
fn volume_bonus(ctx: &MarketContext) -> f64 {
    match volume_ratio(ctx) {
        Some(r) if r > 1.5 => 0.1,
        _ => 0.0,
    }
}

// ============================================================
// RANGE BREAKOUT
// ============================================================

/// Latest bar breaks the high/low of the trailing bars on heavy volume
#[derive(Debug, Clone, Copy)]
pub struct RangeBreakoutDetector {
    /// Trailing bars forming the range
    pub lookback: Period,
    /// Latest volume must exceed this multiple of the trailing average
    pub volume_multiplier: f64,
    /// Stop distance behind the level, as a fraction of the range height
    pub stop_fraction: Ratio,
}

impl Default for RangeBreakoutDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(15),
            volume_multiplier: 2.0,
            stop_fraction: Ratio::new_const(0.2),
        }
    }
}

impl PatternDetector for RangeBreakoutDetector {
    fn name(&self) -> &'static str {
        "range_breakout"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Breakout
    }

    fn min_bars(&self) -> usize {
        15
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let lookback = self.lookback.get().min(n - 1);
        let start = n - 1 - lookback;
        let range_high = max_of(&ctx.highs[start..n - 1]);
        let range_low = min_of(&ctx.lows[start..n - 1]);
        let height = range_high - range_low;
        let avg_volume = mean_of(&ctx.volumes[start..n - 1])?;
        if height <= 0.0 || avg_volume <= 0.0 {
            return None;
        }

        let ratio = ctx.volumes[n - 1] / avg_volume;
        if ratio <= self.volume_multiplier {
            return None;
        }
        let (direction, level) = if ctx.highs[n - 1] > range_high {
            (Direction::Bullish, range_high)
        } else if ctx.lows[n - 1] < range_low {
            (Direction::Bearish, range_low)
        } else {
            return None;
        };

        matched(
            PatternType::RangeBreakout,
            direction,
            (0.5 + 0.1 * ratio).min(1.0),
            level,
            measured_move(level, height, direction, self.stop_fraction.get()),
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
// TRIANGLES
// ============================================================

/// Ascending, descending and symmetrical triangles from swing trend lines
#[derive(Debug, Clone, Copy)]
pub struct TriangleDetector {
    pub lookback: Period,
    /// Bars on each side of a swing point
    pub swing_distance: Period,
}

impl Default for TriangleDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(30),
            swing_distance: Period::new_const(2),
        }
    }
}

impl PatternDetector for TriangleDetector {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Breakout
    }

    fn min_bars(&self) -> usize {
        20
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let lookback = self.lookback.get().min(n - 1);
        let start = n - 1 - lookback;
        let b = boundary_lines(
            &ctx.highs[start..n - 1],
            &ctx.lows[start..n - 1],
            self.swing_distance.get(),
        )?;
        let price = mean_of(&ctx.closes[start..n - 1])?;
        if price <= 0.0 {
            return None;
        }
        let upper_slope = b.upper.slope / price;
        let lower_slope = b.lower.slope / price;

        let x_end = lookback as f64;
        let upper_end = b.upper.value_at(x_end);
        let lower_end = b.lower.value_at(x_end);
        let height = b.width_at(b.start as f64);
        if upper_end <= lower_end || height <= 0.0 {
            return None;
        }

        let close = ctx.closes[n - 1];
        let upper_flat = upper_slope.abs() <= FLAT_SLOPE;
        let lower_flat = lower_slope.abs() <= FLAT_SLOPE;
        let (pattern, direction) = if upper_flat && lower_slope > FLAT_SLOPE {
            (PatternType::AscendingTriangle, Direction::Bullish)
        } else if lower_flat && upper_slope < -FLAT_SLOPE {
            (PatternType::DescendingTriangle, Direction::Bearish)
        } else if upper_slope < -FLAT_SLOPE && lower_slope > FLAT_SLOPE {
            let direction = if close > upper_end {
                Direction::Bullish
            } else {
                Direction::Bearish
            };
            (PatternType::SymmetricalTriangle, direction)
        } else {
            return None;
        };

        let (level, stop) = match direction {
            Direction::Bullish if close > upper_end => (upper_end, lower_end),
            Direction::Bearish if close < lower_end => (lower_end, upper_end),
            _ => return None,
        };
        let (target, _) = measured_move(level, height, direction, 0.0);

        matched(
            pattern,
            direction,
            0.55 + 0.2 * b.fit_quality() + volume_bonus(ctx),
            level,
            (target, stop),
        )
    }
}

// ============================================================
// FLAGS & PENNANTS
// ============================================================

/// Sharp pole, tight counter-trend consolidation, breakout in the pole's direction
#[derive(Debug, Clone, Copy)]
pub struct FlagDetector {
    pub pole_bars: Period,
    pub flag_bars: Period,
    /// Minimum pole move as a fraction of its starting price
    pub min_pole_move: Ratio,
    /// Maximum flag range as a fraction of the pole height
    pub max_retrace: Ratio,
}

impl Default for FlagDetector {
    fn default() -> Self {
        Self {
            pole_bars: Period::new_const(5),
            flag_bars: Period::new_const(7),
            min_pole_move: Ratio::new_const(0.03),
            max_retrace: Ratio::new_const(0.5),
        }
    }
}

impl PatternDetector for FlagDetector {
    fn name(&self) -> &'static str {
        "flag"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Breakout
    }

    fn min_bars(&self) -> usize {
        self.pole_bars.get() + self.flag_bars.get() + 1
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let flag_start = n - 1 - self.flag_bars.get();
        let pole_start = flag_start - self.pole_bars.get();

        let pole_open = ctx.closes[pole_start];
        let pole_close = ctx.closes[flag_start - 1];
        if pole_open <= 0.0 {
            return None;
        }
        let pole_move = pole_close - pole_open;
        let pole_height = pole_move.abs();
        if pole_height / pole_open < self.min_pole_move.get() {
            return None;
        }
        let direction = if pole_move > 0.0 {
            Direction::Bullish
        } else {
            Direction::Bearish
        };

        let flag_highs = &ctx.highs[flag_start..n - 1];
        let flag_lows = &ctx.lows[flag_start..n - 1];
        let flag_high = max_of(flag_highs);
        let flag_low = min_of(flag_lows);
        let retrace = (flag_high - flag_low) / pole_height;
        if retrace > self.max_retrace.get() {
            return None;
        }

        let close = ctx.closes[n - 1];
        let level = match direction {
            Direction::Bullish if close > flag_high => flag_high,
            Direction::Bearish if close < flag_low => flag_low,
            _ => return None,
        };

        let high_slope = indicators::linear_regression(flag_highs)?.slope;
        let low_slope = indicators::linear_regression(flag_lows)?.slope;
        let pattern = if high_slope < 0.0 && low_slope > 0.0 {
            PatternType::Pennant
        } else {
            match direction {
                // flag drifts against the pole
                Direction::Bullish if high_slope <= 0.0 => PatternType::BullFlag,
                Direction::Bearish if low_slope >= 0.0 => PatternType::BearFlag,
                _ => return None,
            }
        };

        let stop = match direction {
            Direction::Bullish => flag_low,
            _ => flag_high,
        };
        let (target, _) = measured_move(level, pole_height, direction, 0.0);
        let tightness = 1.0 - retrace / self.max_retrace.get();

        matched(
            pattern,
            direction,
            0.6 + 0.2 * tightness + volume_bonus(ctx),
            level,
            (target, stop),
        )
    }

    fn validate_config(&self) -> Result<()> {
        if self.max_retrace.get() <= 0.0 {
            return Err(EngineError::InvalidValue("max_retrace must be > 0"));
        }
        Ok(())
    }
}

// ============================================================
// WEDGES
// ============================================================

/// Converging trend lines sloping the same way; breaks against the slope
#[derive(Debug, Clone, Copy)]
pub struct WedgeDetector {
    pub lookback: Period,
    pub swing_distance: Period,
}

impl Default for WedgeDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(25),
            swing_distance: Period::new_const(2),
        }
    }
}

impl PatternDetector for WedgeDetector {
    fn name(&self) -> &'static str {
        "wedge"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Breakout
    }

    fn min_bars(&self) -> usize {
        20
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let lookback = self.lookback.get().min(n - 1);
        let start = n - 1 - lookback;
        let b = boundary_lines(
            &ctx.highs[start..n - 1],
            &ctx.lows[start..n - 1],
            self.swing_distance.get(),
        )?;
        let price = mean_of(&ctx.closes[start..n - 1])?;
        if price <= 0.0 {
            return None;
        }
        let upper_slope = b.upper.slope / price;
        let lower_slope = b.lower.slope / price;

        let x_end = lookback as f64;
        let upper_end = b.upper.value_at(x_end);
        let lower_end = b.lower.value_at(x_end);
        let height = b.width_at(b.start as f64);
        if upper_end <= lower_end || height <= b.width_at(x_end) {
            return None;
        }

        let close = ctx.closes[n - 1];
        let (pattern, direction, level, stop) =
            if lower_slope > upper_slope && upper_slope > FLAT_SLOPE && close < lower_end {
                (PatternType::RisingWedge, Direction::Bearish, lower_end, upper_end)
            } else if upper_slope < lower_slope && lower_slope < -FLAT_SLOPE && close > upper_end {
                (PatternType::FallingWedge, Direction::Bullish, upper_end, lower_end)
            } else {
                return None;
            };
        let (target, _) = measured_move(level, height, direction, 0.0);

        matched(
            pattern,
            direction,
            0.55 + 0.25 * b.fit_quality() + volume_bonus(ctx),
            level,
            (target, stop),
        )
    }
}

// ============================================================
// CHANNEL
// ============================================================

/// Close leaves a regression channel enclosing the trailing highs and lows
#[derive(Debug, Clone, Copy)]
pub struct ChannelBreakoutDetector {
    pub lookback: Period,
}

impl Default for ChannelBreakoutDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
        }
    }
}

impl PatternDetector for ChannelBreakoutDetector {
    fn name(&self) -> &'static str {
        "channel_breakout"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Breakout
    }

    fn min_bars(&self) -> usize {
        self.lookback.get().max(10) + 1
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let lookback = self.lookback.get().min(n - 1);
        let start = n - 1 - lookback;
        let line = indicators::linear_regression(&ctx.closes[start..n - 1])?;

        let (mut above, mut below) = (0.0_f64, 0.0_f64);
        for i in 0..lookback {
            let mid = line.value_at(i as f64);
            above = above.max(ctx.highs[start + i] - mid);
            below = below.max(mid - ctx.lows[start + i]);
        }
        let height = above + below;
        if height <= 0.0 {
            return None;
        }

        let mid_end = line.value_at(lookback as f64);
        let upper_end = mid_end + above;
        let lower_end = mid_end - below;
        let close = ctx.closes[n - 1];
        let (direction, level) = if close > upper_end {
            (Direction::Bullish, upper_end)
        } else if close < lower_end {
            (Direction::Bearish, lower_end)
        } else {
            return None;
        };

        matched(
            PatternType::ChannelBreakout,
            direction,
            0.5 + 0.3 * line.r_squared.clamp(0.0, 1.0) + volume_bonus(ctx),
            level,
            measured_move(level, height, direction, 0.5),
        )
    }
}

// ============================================================
// SUPPORT & RESISTANCE
// ============================================================

/// Close through a level touched by at least two swing points that had held until now
#[derive(Debug, Clone, Copy)]
pub struct SupportResistanceDetector {
    pub lookback: Period,
    pub swing_distance: Period,
    /// Swing prices within this relative distance belong to one level
    pub tolerance: Ratio,
}

impl Default for SupportResistanceDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(40),
            swing_distance: Period::new_const(3),
            tolerance: Ratio::new_const(0.005),
        }
    }
}

impl SupportResistanceDetector {
    /// Most-touched level among `pivots`, with its touch count
    fn strongest_level(&self, values: &[f64], pivots: &[usize]) -> Option<(f64, usize)> {
        pivots
            .iter()
            .map(|&p| {
                let cluster: Vec<f64> = pivots
                    .iter()
                    .map(|&q| values[q])
                    .filter(|&v| relative_diff(v, values[p]) <= self.tolerance.get())
                    .collect();
                (mean_of(&cluster).unwrap_or(values[p]), cluster.len())
            })
            .filter(|&(_, touches)| touches >= 2)
            .max_by_key(|&(_, touches)| touches)
    }
}

impl PatternDetector for SupportResistanceDetector {
    fn name(&self) -> &'static str {
        "support_resistance"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Breakout
    }

    fn min_bars(&self) -> usize {
        30
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let lookback = self.lookback.get().min(n - 1);
        let start = n - 1 - lookback;
        let highs = &ctx.highs[start..n - 1];
        let lows = &ctx.lows[start..n - 1];
        let closes = &ctx.closes[start..n - 1];
        let distance = self.swing_distance.get();
        let close = ctx.closes[n - 1];
        let height = max_of(highs) - min_of(lows);
        if height <= 0.0 {
            return None;
        }

        let peaks = indicators::find_peaks(highs, distance);
        if let Some((level, touches)) = self.strongest_level(highs, &peaks) {
            if close > level && max_of(closes) <= level {
                return matched(
                    PatternType::ResistanceBreak,
                    Direction::Bullish,
                    (0.5 + 0.1 * touches as f64).min(0.8) + volume_bonus(ctx),
                    level,
                    measured_move(level, level - min_of(lows), Direction::Bullish, 0.2),
                );
            }
        }

        let troughs = indicators::find_troughs(lows, distance);
        let (level, touches) = self.strongest_level(lows, &troughs)?;
        if close < level && min_of(closes) >= level {
            return matched(
                PatternType::SupportBreak,
                Direction::Bearish,
                (0.5 + 0.1 * touches as f64).min(0.8) + volume_bonus(ctx),
                level,
                measured_move(level, max_of(highs) - level, Direction::Bearish, 0.2),
            );
        }
        None
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static RANGE_BREAKOUT_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "lookback",
        param_type: ParamType::Period,
        default: 15.0,
        range: (10.0, 30.0, 5.0),
        description: "Trailing bars forming the range",
    },
    ParamMeta {
        name: "volume_multiplier",
        param_type: ParamType::Factor,
        default: 2.0,
        range: (1.0, 4.0, 0.5),
        description: "Breakout volume over trailing average volume",
    },
    ParamMeta {
        name: "stop_fraction",
        param_type: ParamType::Ratio,
        default: 0.2,
        range: (0.1, 0.5, 0.1),
        description: "Stop distance behind the level as a fraction of the range",
    },
];

static FLAG_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "pole_bars",
        param_type: ParamType::Period,
        default: 5.0,
        range: (3.0, 10.0, 1.0),
        description: "Bars in the pole",
    },
    ParamMeta {
        name: "flag_bars",
        param_type: ParamType::Period,
        default: 7.0,
        range: (4.0, 15.0, 1.0),
        description: "Bars in the consolidation",
    },
    ParamMeta {
        name: "min_pole_move",
        param_type: ParamType::Ratio,
        default: 0.03,
        range: (0.01, 0.1, 0.01),
        description: "Minimum pole move relative to its start",
    },
    ParamMeta {
        name: "max_retrace",
        param_type: ParamType::Ratio,
        default: 0.5,
        range: (0.2, 0.8, 0.1),
        description: "Maximum flag range relative to the pole height",
    },
];

impl ParameterizedDetector for RangeBreakoutDetector {
    fn param_meta() -> &'static [ParamMeta] {
        RANGE_BREAKOUT_PARAMS
    }

    fn from_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, "lookback", 15)?,
            volume_multiplier: get_factor(params, "volume_multiplier", 2.0)?,
            stop_fraction: get_ratio(params, "stop_fraction", 0.2)?,
        })
    }
}

impl ParameterizedDetector for FlagDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FLAG_PARAMS
    }

    fn from_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            pole_bars: get_period(params, "pole_bars", 5)?,
            flag_bars: get_period(params, "flag_bars", 7)?,
            min_pole_move: get_ratio(params, "min_pole_move", 0.03)?,
            max_retrace: get_ratio(params, "max_retrace", 0.5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bar, ContextProvider, DefaultContextProvider, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from(rows: &[(f64, f64, f64, f64, u64)]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 2, 5, 9, 15, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c, v))| Bar::new(o, h, l, c, v, t0 + Duration::minutes(i as i64)))
            .collect()
    }

    fn run<D: PatternDetector>(detector: &D, bars: &[Bar]) -> Option<PatternMatch> {
        let ctx = DefaultContextProvider::default().compute(bars, Timeframe::FifteenMinutes);
        detector.detect(bars, &ctx)
    }

    fn range_window() -> Vec<(f64, f64, f64, f64, u64)> {
        (0..15)
            .map(|i| {
                let o = if i % 2 == 0 { 93.0 } else { 97.0 };
                (o, 100.0, 90.0, 95.0, 1_000)
            })
            .collect()
    }

    #[test]
    fn test_range_breakout_bullish() {
        let mut rows = range_window();
        rows.push((99.0, 105.0, 98.5, 104.0, 3_000));
        let m = run(&RangeBreakoutDetector::default(), &bars_from(&rows)).unwrap();
        assert_eq!(m.pattern, PatternType::RangeBreakout);
        assert_eq!(m.direction, Direction::Bullish);
        assert!((m.entry_price - 100.0).abs() < 1e-9);
        assert!((m.target_price - 110.0).abs() < 1e-9);
        assert!((m.stop_loss - 98.0).abs() < 1e-9);
        assert!((m.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_range_breakout_bearish_and_volume_gate() {
        let mut rows = range_window();
        rows.push((91.0, 91.5, 85.0, 86.0, 2_500));
        let m = run(&RangeBreakoutDetector::default(), &bars_from(&rows)).unwrap();
        assert_eq!(m.direction, Direction::Bearish);
        assert!((m.target_price - 80.0).abs() < 1e-9);
        assert!((m.stop_loss - 92.0).abs() < 1e-9);

        let mut quiet = range_window();
        quiet.push((99.0, 105.0, 98.5, 104.0, 2_000));
        assert!(run(&RangeBreakoutDetector::default(), &bars_from(&quiet)).is_none());
    }

    #[test]
    fn test_range_breakout_needs_fifteen_bars() {
        let mut rows = range_window();
        rows.truncate(13);
        rows.push((99.0, 105.0, 98.5, 104.0, 3_000));
        assert!(run(&RangeBreakoutDetector::default(), &bars_from(&rows)).is_none());
    }

    #[test]
    fn test_bull_flag() {
        let mut rows = Vec::new();
        // flat base
        for _ in 0..5 {
            rows.push((100.0, 100.5, 99.5, 100.0, 1_000));
        }
        // pole: 100 -> 110
        for i in 1..=5 {
            let c = 100.0 + 2.0 * i as f64;
            rows.push((c - 2.0, c + 0.2, c - 2.2, c, 1_500));
        }
        // flag drifting lower inside 109..111
        for i in 0..7 {
            let top = 111.0 - 0.2 * i as f64;
            rows.push((top - 0.5, top, top - 1.5, top - 1.0, 800));
        }
        rows.push((110.0, 113.0, 109.8, 112.5, 2_500));

        let m = run(&FlagDetector::default(), &bars_from(&rows)).unwrap();
        assert_eq!(m.pattern, PatternType::BullFlag);
        assert_eq!(m.direction, Direction::Bullish);
        assert!((m.entry_price - 111.0).abs() < 1e-9);
        assert!(m.target_price > m.entry_price && m.stop_loss < m.entry_price);
    }

    #[test]
    fn test_channel_breakout_up() {
        let mut rows: Vec<_> = (0..20)
            .map(|i| {
                let mid = 100.0 + 0.5 * i as f64 + if i % 2 == 0 { 1.0 } else { -1.0 };
                (mid, mid + 0.5, mid - 0.5, mid, 1_000)
            })
            .collect();
        rows.push((111.0, 116.0, 110.5, 115.5, 1_000));
        let m = run(&ChannelBreakoutDetector::default(), &bars_from(&rows)).unwrap();
        assert_eq!(m.pattern, PatternType::ChannelBreakout);
        assert_eq!(m.direction, Direction::Bullish);
    }

    #[test]
    fn test_params_round_trip() {
        let mut params = HashMap::new();
        params.insert("lookback", 20.0);
        let d = RangeBreakoutDetector::with_params(&params).unwrap();
        assert_eq!(d.lookback.get(), 20);
        assert_eq!(d.volume_multiplier, 2.0);
        assert!(d.validate_config().is_ok());

        params.insert("stop_fraction", 1.5);
        assert!(RangeBreakoutDetector::with_params(&params).is_err());
        assert!(RANGE_BREAKOUT_PARAMS.iter().all(|p| p.validate(p.default).is_ok()));
    }

    #[test]
    fn test_short_windows_never_panic() {
        let rows = range_window();
        for len in 0..rows.len() {
            let bars = bars_from(&rows[..len]);
            assert!(run(&RangeBreakoutDetector::default(), &bars).is_none());
            assert!(run(&TriangleDetector::default(), &bars).is_none());
            assert!(run(&FlagDetector::default(), &bars).is_none());
            assert!(run(&WedgeDetector::default(), &bars).is_none());
            assert!(run(&SupportResistanceDetector::default(), &bars).is_none());
        }
    }
}
