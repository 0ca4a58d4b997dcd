//! Chart geometry: cup and handle, rectangles, broadening formations
//!
//! Like the breakout family, each shape is fitted to the bars before the latest
//! one and the latest close must leave it.

use super::helpers::{boundary_lines, matched, max_of, mean_of, measured_move, min_of, relative_diff};
use crate::{
    Direction, MarketContext, PatternDetector, PatternFamily, PatternMatch, PatternType, Period,
    Ratio, OHLCV,
};

impl_with_defaults!(CupAndHandleDetector, RectangleDetector, BroadeningDetector);

/// Line slope per bar, relative to price, treated as horizontal
const FLAT_SLOPE: f64 = 0.0005;

/// Index of the highest value in `values[from..to]`
fn argmax(values: &[f64], from: usize, to: usize) -> Option<usize> {
    (from..to).reduce(|best, i| if values[i] > values[best] { i } else { best })
}

fn argmin(values: &[f64], from: usize, to: usize) -> Option<usize> {
    (from..to).reduce(|best, i| if values[i] < values[best] { i } else { best })
}

// ============================================================
// CUP AND HANDLE
// ============================================================

/// Rounded base between two similar rims, a shallow handle, then a close over the rims
#[derive(Debug, Clone, Copy)]
pub struct CupAndHandleDetector {
    pub lookback: Period,
    pub max_handle_bars: Period,
    /// Maximum relative difference between the rims
    pub rim_tolerance: Ratio,
    pub min_depth: Ratio,
    pub max_depth: Ratio,
    /// Share of the cup depth the handle may give back
    pub max_handle_retrace: Ratio,
}

impl Default for CupAndHandleDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(60),
            max_handle_bars: Period::new_const(12),
            rim_tolerance: Ratio::new_const(0.03),
            min_depth: Ratio::new_const(0.03),
            max_depth: Ratio::new_const(0.35),
            max_handle_retrace: Ratio::new_const(0.5),
        }
    }
}

impl PatternDetector for CupAndHandleDetector {
    fn name(&self) -> &'static str {
        "cup_and_handle"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Chart
    }

    fn min_bars(&self) -> usize {
        30
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let start = n - 1 - self.lookback.get().min(n - 1);
        let end = n - 1;
        let span = end - start;
        let highs = &ctx.highs;
        let lows = &ctx.lows;

        let left = argmax(highs, start, start + span / 3)?;
        let right = argmax(highs, end - span / 3, end)?;
        let handle_len = end - right - 1;
        if !(2..=self.max_handle_bars.get()).contains(&handle_len) {
            return None;
        }
        let bottom = argmin(lows, left, right)?;
        let (left_rim, right_rim) = (highs[left], highs[right]);
        let rim = left_rim.max(right_rim);
        let depth = rim - lows[bottom];
        if rim <= 0.0
            || relative_diff(left_rim, right_rim) > self.rim_tolerance.get()
            || depth / rim < self.min_depth.get()
            || depth / rim > self.max_depth.get()
        {
            return None;
        }

        // a rounded base spends time near the bottom, a V does not
        let floor_band = lows[bottom] + 0.25 * depth;
        let cup_len = right - left;
        let near_floor = lows[left..=right].iter().filter(|&&l| l <= floor_band).count();
        if near_floor < (cup_len * 2 / 5).max(3) {
            return None;
        }

        let handle_low = min_of(&lows[right + 1..end]);
        if max_of(&highs[right + 1..end]) > right_rim
            || right_rim - handle_low > depth * self.max_handle_retrace.get()
        {
            return None;
        }
        let close = ctx.closes[end];
        if close <= rim {
            return None;
        }
        let symmetry = 1.0 - relative_diff(left_rim, right_rim) / self.rim_tolerance.get();

        matched(
            PatternType::CupAndHandle,
            Direction::Bullish,
            0.55 + 0.25 * symmetry,
            rim,
            (rim + depth, handle_low),
        )
    }
}

// ============================================================
// RECTANGLE
// ============================================================

/// Horizontal support and resistance touched repeatedly, then a close outside
#[derive(Debug, Clone, Copy)]
pub struct RectangleDetector {
    pub lookback: Period,
    pub swing_distance: Period,
    pub min_touches: usize,
}

impl Default for RectangleDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(40),
            swing_distance: Period::new_const(2),
            min_touches: 4,
        }
    }
}

impl PatternDetector for RectangleDetector {
    fn name(&self) -> &'static str {
        "rectangle"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Chart
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
        if price <= 0.0
            || b.touches < self.min_touches
            || (b.upper.slope / price).abs() > FLAT_SLOPE
            || (b.lower.slope / price).abs() > FLAT_SLOPE
        {
            return None;
        }

        let x_end = lookback as f64;
        let top = b.upper.value_at(x_end);
        let floor = b.lower.value_at(x_end);
        let height = top - floor;
        if height <= 0.0 {
            return None;
        }
        let close = ctx.closes[n - 1];
        let (direction, level) = if close > top {
            (Direction::Bullish, top)
        } else if close < floor {
            (Direction::Bearish, floor)
        } else {
            return None;
        };

        matched(
            PatternType::Rectangle,
            direction,
            0.5 + 0.05 * b.touches.min(6) as f64,
            level,
            measured_move(level, height, direction, 0.5),
        )
    }
}

// ============================================================
// BROADENING FORMATION
// ============================================================

/// Higher highs and lower lows on diverging lines, then a close outside them
#[derive(Debug, Clone, Copy)]
pub struct BroadeningDetector {
    pub lookback: Period,
    pub swing_distance: Period,
}

impl Default for BroadeningDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(40),
            swing_distance: Period::new_const(2),
        }
    }
}

impl PatternDetector for BroadeningDetector {
    fn name(&self) -> &'static str {
        "broadening"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Chart
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
        if price <= 0.0
            || b.upper.slope / price <= FLAT_SLOPE
            || b.lower.slope / price >= -FLAT_SLOPE
        {
            return None;
        }

        let x_end = lookback as f64;
        let upper_end = b.upper.value_at(x_end);
        let lower_end = b.lower.value_at(x_end);
        let width = upper_end - lower_end;
        if width <= 0.0 {
            return None;
        }
        let close = ctx.closes[n - 1];
        let (direction, level) = if close > upper_end {
            (Direction::Bullish, upper_end)
        } else if close < lower_end {
            (Direction::Bearish, lower_end)
        } else {
            return None;
        };

        matched(
            PatternType::BroadeningFormation,
            direction,
            0.45 + 0.25 * b.fit_quality(),
            level,
            measured_move(level, width / 2.0, direction, 0.3),
        )
    }
}
