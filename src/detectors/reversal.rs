//! Reversal detectors: double and triple tops/bottoms, head and shoulders,
//! RSI divergence, rounding bottom and V-shaped turns
//!
//! Swing structures are searched in the bars before the latest one; the latest
//! close confirms the reversal by crossing the neckline. Targets mirror the
//! extreme past the neckline and the stop sits at the extreme.

use std::collections::HashMap;

use super::helpers::{
    matched, max_of, min_of, percent_offsets, relative_diff, reversal_projection, tail,
};
use crate::{
    indicators,
    params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
    Direction, MarketContext, PatternDetector, PatternFamily, PatternMatch, PatternType, Period,
    Ratio, Result, OHLCV,
};

impl_with_defaults!(
    DoubleTopBottomDetector,
    TripleTopBottomDetector,
    HeadAndShouldersDetector,
    DivergenceDetector,
    RoundingBottomDetector,
    VReversalDetector,
);

/// Latest close crossed `level` from the other side
#[inline]
fn fresh_cross(closes: &[f64], level: f64, direction: Direction) -> bool {
    let n = closes.len();
    if n < 2 {
        return false;
    }
    match direction {
        Direction::Bearish => closes[n - 1] < level && closes[n - 2] >= level,
        Direction::Bullish => closes[n - 1] > level && closes[n - 2] <= level,
        Direction::Neutral => false,
    }
}

/// Swing window before the latest bar, or `None` when too short
#[inline]
fn swing_window(ctx: &MarketContext, lookback: usize) -> Option<(usize, &[f64], &[f64])> {
    let n = ctx.len();
    if n < 2 {
        return None;
    }
    let lookback = lookback.min(n - 1);
    let start = n - 1 - lookback;
    Some((start, &ctx.highs[start..n - 1], &ctx.lows[start..n - 1]))
}

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

/// Two swing extremes at about the same price, confirmed by a neckline break
#[derive(Debug, Clone, Copy)]
pub struct DoubleTopBottomDetector {
    pub lookback: Period,
    pub swing_distance: Period,
    /// Maximum relative difference between the two extremes
    pub tolerance: Ratio,
}

impl Default for DoubleTopBottomDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(40),
            swing_distance: Period::new_const(3),
            tolerance: Ratio::new_const(0.02),
        }
    }
}

impl DoubleTopBottomDetector {
    fn confidence(&self, diff: f64) -> f64 {
        0.6 + 0.3 * (1.0 - diff / self.tolerance.get()).max(0.0)
    }
}

impl PatternDetector for DoubleTopBottomDetector {
    fn name(&self) -> &'static str {
        "double_top_bottom"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Reversal
    }

    fn min_bars(&self) -> usize {
        20
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let (_, highs, lows) = swing_window(ctx, self.lookback.get())?;
        let d = self.swing_distance.get();

        let peaks = indicators::find_peaks(highs, d);
        if let [.., p1, p2] = peaks[..] {
            let diff = relative_diff(highs[p1], highs[p2]);
            let neckline = min_of(&lows[p1..=p2]);
            let extreme = highs[p1].max(highs[p2]);
            if diff <= self.tolerance.get()
                && neckline < extreme
                && fresh_cross(&ctx.closes, neckline, Direction::Bearish)
            {
                return matched(
                    PatternType::DoubleTop,
                    Direction::Bearish,
                    self.confidence(diff),
                    neckline,
                    reversal_projection(neckline, extreme),
                );
            }
        }

        let troughs = indicators::find_troughs(lows, d);
        let [.., t1, t2] = troughs[..] else {
            return None;
        };
        let diff = relative_diff(lows[t1], lows[t2]);
        let neckline = max_of(&highs[t1..=t2]);
        let extreme = lows[t1].min(lows[t2]);
        if diff <= self.tolerance.get()
            && neckline > extreme
            && fresh_cross(&ctx.closes, neckline, Direction::Bullish)
        {
            return matched(
                PatternType::DoubleBottom,
                Direction::Bullish,
                self.confidence(diff),
                neckline,
                reversal_projection(neckline, extreme),
            );
        }
        None
    }
}

// ============================================================
// TRIPLE TOP / BOTTOM
// ============================================================

#[derive(Debug, Clone, Copy)]
pub struct TripleTopBottomDetector {
    pub lookback: Period,
    pub swing_distance: Period,
    pub tolerance: Ratio,
}

impl Default for TripleTopBottomDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(60),
            swing_distance: Period::new_const(3),
            tolerance: Ratio::new_const(0.02),
        }
    }
}

impl PatternDetector for TripleTopBottomDetector {
    fn name(&self) -> &'static str {
        "triple_top_bottom"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Reversal
    }

    fn min_bars(&self) -> usize {
        30
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let (_, highs, lows) = swing_window(ctx, self.lookback.get())?;
        let d = self.swing_distance.get();
        let tol = self.tolerance.get();

        let spread = |values: [f64; 3]| {
            let hi = values.iter().copied().fold(f64::MIN, f64::max);
            let lo = values.iter().copied().fold(f64::MAX, f64::min);
            relative_diff(hi, lo)
        };

        let peaks = indicators::find_peaks(highs, d);
        if let [.., p1, p2, p3] = peaks[..] {
            let diff = spread([highs[p1], highs[p2], highs[p3]]);
            let neckline = min_of(&lows[p1..=p3]);
            let extreme = highs[p1].max(highs[p2]).max(highs[p3]);
            if diff <= tol && fresh_cross(&ctx.closes, neckline, Direction::Bearish) {
                return matched(
                    PatternType::TripleTop,
                    Direction::Bearish,
                    0.65 + 0.3 * (1.0 - diff / tol),
                    neckline,
                    reversal_projection(neckline, extreme),
                );
            }
        }

        let troughs = indicators::find_troughs(lows, d);
        let [.., t1, t2, t3] = troughs[..] else {
            return None;
        };
        let diff = spread([lows[t1], lows[t2], lows[t3]]);
        let neckline = max_of(&highs[t1..=t3]);
        let extreme = lows[t1].min(lows[t2]).min(lows[t3]);
        if diff <= tol && fresh_cross(&ctx.closes, neckline, Direction::Bullish) {
            return matched(
                PatternType::TripleBottom,
                Direction::Bullish,
                0.65 + 0.3 * (1.0 - diff / tol),
                neckline,
                reversal_projection(neckline, extreme),
            );
        }
        None
    }
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

/// Three swings with the middle one most extreme and symmetric shoulders
#[derive(Debug, Clone, Copy)]
pub struct HeadAndShouldersDetector {
    pub lookback: Period,
    pub swing_distance: Period,
    /// Maximum relative difference between the shoulders
    pub shoulder_tolerance: Ratio,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(60),
            swing_distance: Period::new_const(3),
            shoulder_tolerance: Ratio::new_const(0.03),
        }
    }
}

impl HeadAndShouldersDetector {
    /// Neckline through the two reaction points, evaluated at `x`
    fn neckline_at(a: (usize, f64), b: (usize, f64), x: f64) -> f64 {
        if a.0 == b.0 {
            return a.1;
        }
        let slope = (b.1 - a.1) / (b.0 as f64 - a.0 as f64);
        a.1 + slope * (x - a.0 as f64)
    }

    /// Index and value of the minimum (or maximum) strictly between two indices
    fn reaction(values: &[f64], from: usize, to: usize, lowest: bool) -> Option<(usize, f64)> {
        (from + 1..to)
            .map(|i| (i, values[i]))
            .reduce(|best, cur| {
                let better = if lowest { cur.1 < best.1 } else { cur.1 > best.1 };
                if better {
                    cur
                } else {
                    best
                }
            })
    }
}

impl PatternDetector for HeadAndShouldersDetector {
    fn name(&self) -> &'static str {
        "head_and_shoulders"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Reversal
    }

    fn min_bars(&self) -> usize {
        25
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let (start, highs, lows) = swing_window(ctx, self.lookback.get())?;
        let d = self.swing_distance.get();
        let tol = self.shoulder_tolerance.get();
        let x_last = (n - 1 - start) as f64;

        let peaks = indicators::find_peaks(highs, d);
        if let [.., l, h, r] = peaks[..] {
            let symmetry = relative_diff(highs[l], highs[r]);
            if highs[h] > highs[l] && highs[h] > highs[r] && symmetry <= tol {
                let a = Self::reaction(lows, l, h, true)?;
                let b = Self::reaction(lows, h, r, true)?;
                let neckline = Self::neckline_at(a, b, x_last);
                let prev = Self::neckline_at(a, b, x_last - 1.0);
                let closes = &ctx.closes;
                if closes[n - 1] < neckline && closes[n - 2] >= prev {
                    return matched(
                        PatternType::HeadAndShoulders,
                        Direction::Bearish,
                        0.6 + 0.3 * (1.0 - symmetry / tol),
                        neckline,
                        reversal_projection(neckline, highs[h]),
                    );
                }
            }
        }

        let troughs = indicators::find_troughs(lows, d);
        let [.., l, h, r] = troughs[..] else {
            return None;
        };
        let symmetry = relative_diff(lows[l], lows[r]);
        if lows[h] < lows[l] && lows[h] < lows[r] && symmetry <= tol {
            let a = Self::reaction(highs, l, h, false)?;
            let b = Self::reaction(highs, h, r, false)?;
            let neckline = Self::neckline_at(a, b, x_last);
            let prev = Self::neckline_at(a, b, x_last - 1.0);
            let closes = &ctx.closes;
            if closes[n - 1] > neckline && closes[n - 2] <= prev {
                return matched(
                    PatternType::InverseHeadAndShoulders,
                    Direction::Bullish,
                    0.6 + 0.3 * (1.0 - symmetry / tol),
                    neckline,
                    reversal_projection(neckline, lows[h]),
                );
            }
        }
        None
    }
}

// ============================================================
// RSI DIVERGENCE
// ============================================================

/// Price makes a new swing extreme that RSI does not confirm
#[derive(Debug, Clone, Copy)]
pub struct DivergenceDetector {
    pub rsi_period: Period,
    pub lookback: Period,
    pub swing_distance: Period,
}

impl Default for DivergenceDetector {
    fn default() -> Self {
        Self {
            rsi_period: Period::new_const(14),
            lookback: Period::new_const(30),
            swing_distance: Period::new_const(2),
        }
    }
}

impl PatternDetector for DivergenceDetector {
    fn name(&self) -> &'static str {
        "rsi_divergence"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Reversal
    }

    fn min_bars(&self) -> usize {
        30
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let period = self.rsi_period.get();
        let rsi = indicators::rsi_series(&ctx.closes, period);
        let rsi_at = |abs: usize| abs.checked_sub(period).and_then(|j| rsi.get(j).copied());

        let lookback = self.lookback.get().min(n);
        let start = n - lookback;
        let d = self.swing_distance.get();
        // the second swing must be recent enough to still matter
        let recent = n.saturating_sub(2 * d + 3);
        let close = ctx.closes[n - 1];

        let troughs = indicators::find_troughs(&ctx.lows[start..], d);
        if let [.., t1, t2] = troughs[..] {
            let (a, b) = (start + t1, start + t2);
            if let (Some(r1), Some(r2)) = (rsi_at(a), rsi_at(b)) {
                if b >= recent && ctx.lows[b] < ctx.lows[a] && r2 > r1 {
                    return matched(
                        PatternType::BullishDivergence,
                        Direction::Bullish,
                        0.55 + ((r2 - r1) / 20.0).min(0.3),
                        close,
                        percent_offsets(close, Direction::Bullish, 0.03, 0.015),
                    );
                }
            }
        }

        let peaks = indicators::find_peaks(&ctx.highs[start..], d);
        let [.., p1, p2] = peaks[..] else {
            return None;
        };
        let (a, b) = (start + p1, start + p2);
        let (r1, r2) = (rsi_at(a)?, rsi_at(b)?);
        if b >= recent && ctx.highs[b] > ctx.highs[a] && r2 < r1 {
            return matched(
                PatternType::BearishDivergence,
                Direction::Bearish,
                0.55 + ((r1 - r2) / 20.0).min(0.3),
                close,
                percent_offsets(close, Direction::Bearish, 0.03, 0.015),
            );
        }
        None
    }
}

// ============================================================
// ROUNDING BOTTOM
// ============================================================

/// Gradual decline, flat base in the middle third, recovery in the last third
#[derive(Debug, Clone, Copy)]
pub struct RoundingBottomDetector {
    pub lookback: Period,
}

impl Default for RoundingBottomDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(30),
        }
    }
}

impl PatternDetector for RoundingBottomDetector {
    fn name(&self) -> &'static str {
        "rounding_bottom"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Reversal
    }

    fn min_bars(&self) -> usize {
        self.lookback.get().max(12)
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let closes = tail(&ctx.closes, self.lookback.get().max(12))?;
        let third = closes.len() / 3;
        let (left, middle, right) = (
            &closes[..third],
            &closes[third..2 * third],
            &closes[2 * third..],
        );

        let (bottom_idx, bottom) = closes
            .iter()
            .copied()
            .enumerate()
            .reduce(|a, b| if b.1 < a.1 { b } else { a })?;
        if !(third..2 * third).contains(&bottom_idx) {
            return None;
        }
        let left_slope = indicators::linear_regression(left)?.slope;
        let right_slope = indicators::linear_regression(right)?.slope;
        if left_slope >= 0.0 || right_slope <= 0.0 {
            return None;
        }

        let rim = max_of(left);
        let depth = rim - bottom;
        let close = *closes.last()?;
        if depth <= 0.0 || max_of(middle) >= rim {
            return None;
        }
        let recovery = (close - bottom) / depth;
        if recovery < 0.5 {
            return None;
        }

        matched(
            PatternType::RoundingBottom,
            Direction::Bullish,
            0.55 + 0.3 * recovery.min(1.0),
            close,
            (close + depth, bottom),
        )
    }
}

// ============================================================
// V REVERSAL
// ============================================================

/// Sharp move into an extreme followed by an equally sharp recovery
#[derive(Debug, Clone, Copy)]
pub struct VReversalDetector {
    /// Bars on each side of the turn
    pub leg_bars: Period,
    /// Minimum leg size relative to the starting price
    pub min_move: Ratio,
    /// Fraction of the first leg recovered by the latest close
    pub min_recovery: Ratio,
}

impl Default for VReversalDetector {
    fn default() -> Self {
        Self {
            leg_bars: Period::new_const(5),
            min_move: Ratio::new_const(0.03),
            min_recovery: Ratio::new_const(0.7),
        }
    }
}

impl PatternDetector for VReversalDetector {
    fn name(&self) -> &'static str {
        "v_reversal"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Reversal
    }

    fn min_bars(&self) -> usize {
        2 * self.leg_bars.get() + 2
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let span = 2 * self.leg_bars.get() + 1;
        let start = n - span;
        let first = ctx.closes[start];
        let close = ctx.closes[n - 1];
        if first <= 0.0 {
            return None;
        }
        let inner = 2..span - 2;

        let lows = &ctx.lows[start..];
        let (lo_idx, lo) = lows
            .iter()
            .copied()
            .enumerate()
            .reduce(|a, b| if b.1 < a.1 { b } else { a })?;
        let drop = first - lo;
        if inner.contains(&lo_idx)
            && drop / first >= self.min_move.get()
            && close - lo >= self.min_recovery.get() * drop
        {
            return matched(
                PatternType::VReversal,
                Direction::Bullish,
                0.5 + 0.3 * ((close - lo) / drop).min(1.0),
                close,
                reversal_projection(close, lo),
            );
        }

        let highs = &ctx.highs[start..];
        let (hi_idx, hi) = highs
            .iter()
            .copied()
            .enumerate()
            .reduce(|a, b| if b.1 > a.1 { b } else { a })?;
        let rise = hi - first;
        if inner.contains(&hi_idx)
            && rise / first >= self.min_move.get()
            && hi - close >= self.min_recovery.get() * rise
        {
            return matched(
                PatternType::VReversal,
                Direction::Bearish,
                0.5 + 0.3 * ((hi - close) / rise).min(1.0),
                close,
                reversal_projection(close, hi),
            );
        }
        None
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "lookback",
        param_type: ParamType::Period,
        default: 60.0,
        range: (30.0, 120.0, 10.0),
        description: "Bars searched for the three swings",
    },
    ParamMeta {
        name: "swing_distance",
        param_type: ParamType::Period,
        default: 3.0,
        range: (2.0, 6.0, 1.0),
        description: "Bars on each side of a swing point",
    },
    ParamMeta {
        name: "shoulder_tolerance",
        param_type: ParamType::Ratio,
        default: 0.03,
        range: (0.01, 0.06, 0.01),
        description: "Maximum relative difference between the shoulders",
    },
];

impl ParameterizedDetector for HeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn from_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, "lookback", 60)?,
            swing_distance: get_period(params, "swing_distance", 3)?,
            shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.03)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bar, ContextProvider, DefaultContextProvider, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    /// Bars following a close path. Each bar opens halfway from the previous close
    /// and its wicks extend 0.2 beyond the body.
    fn path(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap();
        let mut prev = closes[0];
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let open = (prev + c) / 2.0;
                let bar = Bar::new(
                    open,
                    open.max(c) + 0.2,
                    open.min(c) - 0.2,
                    c,
                    1_000,
                    t0 + Duration::minutes(5 * i as i64),
                );
                prev = c;
                bar
            })
            .collect()
    }

    /// Linear interpolation through `(index, price)` knots
    fn knots(points: &[(usize, f64)]) -> Vec<f64> {
        let mut out = Vec::new();
        for w in points.windows(2) {
            let ((i0, p0), (i1, p1)) = (w[0], w[1]);
            for i in i0..i1 {
                out.push(p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64);
            }
        }
        if let Some(&(_, last)) = points.last() {
            out.push(last);
        }
        out
    }

    fn run<D: PatternDetector>(detector: &D, bars: &[Bar]) -> Option<PatternMatch> {
        let ctx = DefaultContextProvider::default().compute(bars, Timeframe::FifteenMinutes);
        detector.detect(bars, &ctx)
    }

    #[test]
    fn test_double_top() {
        // base 100, tops at 110 and 110.5, neckline near 103, break on the last bar
        let closes = knots(&[(0, 100.0), (8, 110.0), (14, 103.0), (20, 110.5), (27, 103.5), (28, 101.0)]);
        let m = run(&DoubleTopBottomDetector::default(), &path(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::DoubleTop);
        assert_eq!(m.direction, Direction::Bearish);
        // stop at the higher top, target mirrored past the neckline
        assert!((m.stop_loss - 110.7).abs() < 1e-9);
        assert!((m.target_price - (2.0 * m.entry_price - 110.7)).abs() < 1e-9);
    }

    #[test]
    fn test_head_and_shoulders() {
        let closes = knots(&[
            (0, 100.0),
            (6, 106.0),
            (11, 102.0),
            (17, 112.0),
            (23, 102.0),
            (29, 106.5),
            (35, 102.5),
            (36, 100.0),
        ]);
        let m = run(&HeadAndShouldersDetector::default(), &path(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::HeadAndShoulders);
        assert_eq!(m.direction, Direction::Bearish);
        assert!((m.stop_loss - 112.2).abs() < 1e-9);
        assert!(m.target_price < m.entry_price);
    }

    #[test]
    fn test_asymmetric_shoulders_rejected() {
        let closes = knots(&[
            (0, 100.0),
            (6, 104.0),
            (11, 102.0),
            (17, 112.0),
            (23, 102.0),
            (29, 109.0),
            (35, 102.5),
            (36, 100.0),
        ]);
        assert!(run(&HeadAndShouldersDetector::default(), &path(&closes)).is_none());
    }

    #[test]
    fn test_v_reversal() {
        let closes = knots(&[(0, 100.0), (5, 94.0), (10, 99.0), (11, 99.5)]);
        let m = run(&VReversalDetector::default(), &path(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::VReversal);
        assert_eq!(m.direction, Direction::Bullish);
        assert!((m.stop_loss - 93.8).abs() < 1e-9);
    }

    #[test]
    fn test_rounding_bottom() {
        let closes: Vec<f64> = (0..30)
            .map(|i| {
                let x = (i as f64 - 14.5) / 14.5;
                100.0 + 8.0 * x * x
            })
            .collect();
        let m = run(&RoundingBottomDetector::default(), &path(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::RoundingBottom);
        assert_eq!(m.direction, Direction::Bullish);
    }

    #[test]
    fn test_short_windows_never_panic() {
        let bars = path(&knots(&[(0, 100.0), (10, 110.0), (20, 100.0)]));
        for len in 0..=bars.len() {
            let window = &bars[..len];
            let _ = run(&DoubleTopBottomDetector::default(), window);
            let _ = run(&TripleTopBottomDetector::default(), window);
            let _ = run(&HeadAndShouldersDetector::default(), window);
            let _ = run(&DivergenceDetector::default(), window);
            let _ = run(&RoundingBottomDetector::default(), window);
            let _ = run(&VReversalDetector::default(), window);
        }
    }
}
