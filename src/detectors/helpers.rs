//! Shared thresholds, candle classifiers and target/stop projections

use crate::{
    indicators::{self, Swing, TrendLine},
    Direction, MarketContext, PatternMatch, PatternType, Trend,
};

// ============================================================
// CANDLE THRESHOLDS
// ============================================================

/// Body is doji-like: body <= avg_range * DOJI_FACTOR
pub const DOJI_FACTOR: f64 = 0.1;
/// Body is short: body < avg_body * SHORT_FACTOR
pub const BODY_SHORT_FACTOR: f64 = 1.0;
/// Body is long: body > avg_body * LONG_FACTOR
pub const BODY_LONG_FACTOR: f64 = 1.0;
/// Shadow is very long: shadow > body * SHADOW_VERYLONG_FACTOR
pub const SHADOW_VERYLONG_FACTOR: f64 = 2.0;
/// Shadow very short: shadow < avg_range * SHADOW_VERYSHORT_FACTOR
pub const SHADOW_VERYSHORT_FACTOR: f64 = 0.1;
/// Prices within avg_range * EQUAL_FACTOR count as equal
pub const EQUAL_FACTOR: f64 = 0.05;

// Fallback ratio-based thresholds (when the averages are not meaningful)
pub const DOJI_RATIO: f64 = 0.1;
pub const BODY_SHORT_RATIO: f64 = 0.3;
pub const BODY_LONG_RATIO: f64 = 0.7;
pub const SHADOW_SHORT_RATIO: f64 = 0.1;

// ============================================================
// CANDLE CLASSIFIERS
// ============================================================

/// Zero body is always a doji.
#[inline]
pub fn is_doji(body: f64, avg_range: f64, range: f64) -> bool {
    if body <= 0.0 {
        return true;
    }
    if avg_range > 0.0 {
        body <= avg_range * DOJI_FACTOR
    } else {
        range > 0.0 && body / range <= DOJI_RATIO
    }
}

#[inline]
pub fn is_body_short(body: f64, avg_body: f64, range: f64) -> bool {
    if avg_body > 0.0 {
        body < avg_body * BODY_SHORT_FACTOR
    } else {
        range > 0.0 && body / range <= BODY_SHORT_RATIO
    }
}

#[inline]
pub fn is_body_long(body: f64, avg_body: f64, range: f64) -> bool {
    if avg_body > 0.0 {
        body > avg_body * BODY_LONG_FACTOR
    } else {
        range > 0.0 && body / range >= BODY_LONG_RATIO
    }
}

#[inline]
pub fn is_shadow_very_short(shadow: f64, avg_range: f64, range: f64) -> bool {
    if avg_range > 0.0 {
        shadow < avg_range * SHADOW_VERYSHORT_FACTOR
    } else {
        range > 0.0 && shadow / range <= SHADOW_SHORT_RATIO
    }
}

/// Prices equal within a fraction of the average range
#[inline]
pub fn is_equal(a: f64, b: f64, avg_range: f64) -> bool {
    (a - b).abs() <= avg_range * EQUAL_FACTOR
}

// ============================================================
// WINDOW HELPERS
// ============================================================

#[inline]
pub fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::MIN, f64::max)
}

#[inline]
pub fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::MAX, f64::min)
}

#[inline]
pub fn mean_of(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Last `n` values, or `None` when the series is shorter
#[inline]
pub fn tail(values: &[f64], n: usize) -> Option<&[f64]> {
    values.len().checked_sub(n).map(|start| &values[start..])
}

/// `n` values ending `skip` values before the end
#[inline]
pub fn window_before(values: &[f64], skip: usize, n: usize) -> Option<&[f64]> {
    let end = values.len().checked_sub(skip)?;
    let start = end.checked_sub(n)?;
    Some(&values[start..end])
}

/// Relative difference of two prices against their mean
#[inline]
pub fn relative_diff(a: f64, b: f64) -> f64 {
    let mean = (a.abs() + b.abs()) / 2.0;
    if mean <= f64::EPSILON {
        0.0
    } else {
        (a - b).abs() / mean
    }
}

/// Last bar's volume over the trailing average volume
#[inline]
pub fn volume_ratio(ctx: &MarketContext) -> Option<f64> {
    let last = *ctx.volumes.last()?;
    (ctx.avg_volume > 0.0).then(|| last / ctx.avg_volume)
}

/// Upper line through swing highs and lower line through swing lows of a window
#[derive(Debug, Clone, Copy)]
pub struct Boundaries {
    pub upper: TrendLine,
    pub lower: TrendLine,
    /// First swing index; the pattern starts here
    pub start: usize,
    pub touches: usize,
}

impl Boundaries {
    pub fn width_at(&self, x: f64) -> f64 {
        self.upper.value_at(x) - self.lower.value_at(x)
    }

    pub fn fit_quality(&self) -> f64 {
        clamp_unit((self.upper.r_squared + self.lower.r_squared) / 2.0)
    }
}

/// Needs at least two swing highs and two swing lows.
pub fn boundary_lines(highs: &[f64], lows: &[f64], distance: usize) -> Option<Boundaries> {
    let peaks = indicators::find_peaks(highs, distance);
    let troughs = indicators::find_troughs(lows, distance);
    if peaks.len() < 2 || troughs.len() < 2 {
        return None;
    }
    let upper_points: Vec<(f64, f64)> = peaks.iter().map(|&i| (i as f64, highs[i])).collect();
    let lower_points: Vec<(f64, f64)> = troughs.iter().map(|&i| (i as f64, lows[i])).collect();
    Some(Boundaries {
        upper: indicators::fit_line(&upper_points)?,
        lower: indicators::fit_line(&lower_points)?,
        start: peaks[0].min(troughs[0]),
        touches: peaks.len() + troughs.len(),
    })
}

/// Zig-zag of the last `lookback` bars, with indices into the full window
pub fn window_swings(ctx: &MarketContext, lookback: usize, distance: usize) -> Vec<Swing> {
    let n = ctx.len();
    let start = n - lookback.min(n);
    indicators::zigzag(&ctx.highs[start..], &ctx.lows[start..], distance)
        .into_iter()
        .map(|s| Swing {
            index: s.index + start,
            ..s
        })
        .collect()
}

/// Extra confidence when the move into a candlestick pattern is strong
#[inline]
pub fn trend_bonus(trend: Trend) -> f64 {
    match trend {
        Trend::StrongUp | Trend::StrongDown => 0.1,
        _ => 0.0,
    }
}

#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================
// TARGET / STOP PROJECTIONS
// ============================================================

/// Breakout levels: target is the pattern height projected from the level,
/// stop sits `stop_fraction` of the height back on the other side.
#[inline]
pub fn measured_move(level: f64, height: f64, direction: Direction, stop_fraction: f64) -> (f64, f64) {
    let sign = direction.sign();
    (level + sign * height, level - sign * height * stop_fraction)
}

/// Reversal levels: extreme mirrored past the neckline, stop at the extreme.
#[inline]
pub fn reversal_projection(neckline: f64, extreme: f64) -> (f64, f64) {
    (2.0 * neckline - extreme, extreme)
}

/// Fixed percentage offsets from the current price
#[inline]
pub fn percent_offsets(price: f64, direction: Direction, target_pct: f64, stop_pct: f64) -> (f64, f64) {
    let sign = direction.sign();
    (price * (1.0 + sign * target_pct), price * (1.0 - sign * stop_pct))
}

/// Candlestick levels: stop beyond the pattern extreme, target two risk units away.
/// Neutral patterns bracket the pattern range instead.
#[inline]
pub fn candle_levels(entry: f64, pattern_high: f64, pattern_low: f64, direction: Direction) -> (f64, f64) {
    match direction {
        Direction::Bullish => {
            let risk = (entry - pattern_low).max(f64::EPSILON);
            (entry + 2.0 * risk, pattern_low)
        }
        Direction::Bearish => {
            let risk = (pattern_high - entry).max(f64::EPSILON);
            (entry - 2.0 * risk, pattern_high)
        }
        Direction::Neutral => (pattern_high, pattern_low),
    }
}

/// Assemble a match, rejecting one-sided patterns whose direction disagrees with their bias.
#[inline]
pub fn matched(
    pattern: PatternType,
    direction: Direction,
    confidence: f64,
    entry_price: f64,
    (target_price, stop_loss): (f64, f64),
) -> Option<PatternMatch> {
    if !pattern.admits(direction) {
        return None;
    }
    let prices = [entry_price, target_price, stop_loss];
    if prices.iter().any(|p| !p.is_finite()) {
        return None;
    }
    Some(PatternMatch {
        pattern,
        direction,
        confidence: clamp_unit(confidence),
        entry_price,
        target_price,
        stop_loss,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measured_move() {
        assert_eq!(measured_move(100.0, 10.0, Direction::Bullish, 0.2), (110.0, 98.0));
        assert_eq!(measured_move(90.0, 10.0, Direction::Bearish, 0.2), (80.0, 92.0));
    }

    #[test]
    fn test_reversal_projection() {
        // double top at 110, neckline 100
        assert_eq!(reversal_projection(100.0, 110.0), (90.0, 110.0));
    }

    #[test]
    fn test_candle_levels() {
        assert_eq!(candle_levels(100.0, 101.0, 95.0, Direction::Bullish), (110.0, 95.0));
        assert_eq!(candle_levels(100.0, 103.0, 99.0, Direction::Bearish), (94.0, 103.0));
    }

    #[test]
    fn test_matched_respects_bias() {
        let levels = (110.0, 95.0);
        assert!(matched(PatternType::Hammer, Direction::Bearish, 0.8, 100.0, levels).is_none());
        let m = matched(PatternType::Hammer, Direction::Bullish, 1.4, 100.0, levels).unwrap();
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn test_window_slices() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(tail(&v, 2), Some(&v[3..]));
        assert_eq!(window_before(&v, 1, 3), Some(&v[1..4]));
        assert!(window_before(&v, 3, 3).is_none());
    }
}
