//! Elliott-style wave counting on the zig-zag
//!
//! Only finished structures are reported. A five-wave impulse that just
//! completed points the other way (a correction is due); a completed A-B-C
//! correction points back in the direction of the larger trend.

use super::helpers::{clamp_unit, matched, window_swings};
use crate::{
    indicators::{Swing, SwingKind},
    Direction, MarketContext, PatternDetector, PatternFamily, PatternMatch, PatternType, Period,
    OHLCV,
};

impl_with_defaults!(ElliottWaveDetector);

/// Share of a finished impulse expected to be given back
const IMPULSE_RETRACE: f64 = 0.382;
/// Share of a finished correction expected to be recovered
const CORRECTION_RECOVERY: f64 = 0.618;

/// Wave counter over the last `lookback` bars
#[derive(Debug, Clone, Copy)]
pub struct ElliottWaveDetector {
    pub lookback: Period,
    pub swing_distance: Period,
    /// The final pivot must be within this many bars of the latest one
    pub recency: usize,
}

impl Default for ElliottWaveDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(120),
            swing_distance: Period::new_const(3),
            recency: 3,
        }
    }
}

impl ElliottWaveDetector {
    /// Six pivots: start, then the ends of waves 1 to 5
    fn impulse(&self, pivots: &[Swing], close: f64) -> Option<PatternMatch> {
        let [p0, p1, p2, p3, p4, p5] = pivots else {
            return None;
        };
        // +1 when the impulse runs up, so the completion is bearish
        let up = match p5.kind {
            SwingKind::High => 1.0,
            SwingKind::Low => -1.0,
        };
        let rel = |a: &Swing, b: &Swing| up * (a.price - b.price);

        // wave 2 stays above the start, wave 4 stays out of wave 1's territory
        if rel(p1, p0) <= 0.0
            || rel(p2, p0) <= 0.0
            || rel(p3, p1) <= 0.0
            || rel(p4, p1) <= 0.0
            || rel(p5, p3) <= 0.0
        {
            return None;
        }
        let w1 = rel(p1, p0);
        let w3 = rel(p3, p2);
        let w5 = rel(p5, p4);
        if w3 < w1 && w3 < w5 {
            return None;
        }

        let direction = if up > 0.0 {
            Direction::Bearish
        } else {
            Direction::Bullish
        };
        let sign = direction.sign();
        let mut confidence = 0.55;
        if w3 > w1 && w3 > w5 {
            confidence += 0.1;
        }
        if (0.382..=0.786).contains(&(rel(p1, p2) / w1)) {
            confidence += 0.1;
        }
        let total = (p5.price - p0.price).abs();

        matched(
            PatternType::ElliottImpulse,
            direction,
            confidence,
            close,
            (
                p5.price + sign * IMPULSE_RETRACE * total,
                p5.price - sign * 0.1 * w5,
            ),
        )
    }

    /// Four pivots: start of the correction, then the ends of A, B and C
    fn correction(&self, pivots: &[Swing], close: f64) -> Option<PatternMatch> {
        let [p0, a, b, c] = pivots else {
            return None;
        };
        let direction = match c.kind {
            SwingKind::Low => Direction::Bullish,
            SwingKind::High => Direction::Bearish,
        };
        let sign = direction.sign();
        let leg_a = (a.price - p0.price).abs();
        let leg_b = (b.price - a.price).abs();
        let leg_c = (c.price - b.price).abs();
        if leg_a <= 0.0 {
            return None;
        }
        // B stays inside A's start, C runs past A's end
        if sign * (p0.price - b.price) <= 0.0 || sign * (a.price - c.price) <= 0.0 {
            return None;
        }
        let b_ratio = leg_b / leg_a;
        let c_ratio = leg_c / leg_a;
        if !(0.382..=0.886).contains(&b_ratio) || !(0.618..=1.618).contains(&c_ratio) {
            return None;
        }
        let span = (p0.price - c.price).abs();

        matched(
            PatternType::ElliottCorrection,
            direction,
            clamp_unit(0.5 + 0.2 * (1.0 - (c_ratio - 1.0).abs())),
            close,
            (
                c.price + sign * CORRECTION_RECOVERY * span,
                c.price - sign * 0.1 * span,
            ),
        )
    }
}

impl PatternDetector for ElliottWaveDetector {
    fn name(&self) -> &'static str {
        "elliott_wave"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Wave
    }

    fn min_bars(&self) -> usize {
        40
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let swings = window_swings(ctx, self.lookback.get(), self.swing_distance.get());
        let last = swings.last()?;
        if last.index + self.recency < n - 1 {
            return None;
        }
        let close = ctx.last_close()?;
        // the final pivot must not have been taken out yet
        let holds = match last.kind {
            SwingKind::Low => close >= last.price,
            SwingKind::High => close <= last.price,
        };
        if !holds {
            return None;
        }

        let count = swings.len();
        count
            .checked_sub(6)
            .and_then(|i| self.impulse(&swings[i..], close))
            .or_else(|| {
                count
                    .checked_sub(4)
                    .and_then(|i| self.correction(&swings[i..], close))
            })
    }
}
