//! Three-bar candlestick detectors
//!
//! The trend is read before the first bar of the triple. Levels bracket all three bars.

use super::helpers::{
    self, candle_levels, is_body_long, is_body_short, matched, max_of, min_of, trend_bonus,
};
use crate::{
    Direction, MarketContext, OHLCVExt, PatternDetector, PatternFamily, PatternMatch, PatternType,
    Ratio, OHLCV,
};

impl_with_defaults!(StarDetector, ThreeSoldiersCrowsDetector, ThreeInsideDetector);

/// Last three bars, oldest first
#[inline]
fn triple<T>(bars: &[T]) -> Option<(&T, &T, &T)> {
    match bars {
        [.., first, second, third] => Some((first, second, third)),
        _ => None,
    }
}

fn triple_levels<T: OHLCV>(bars: (&T, &T, &T), direction: Direction) -> (f64, f64) {
    let (a, b, c) = bars;
    candle_levels(
        c.close(),
        max_of(&[a.high(), b.high(), c.high()]),
        min_of(&[a.low(), b.low(), c.low()]),
        direction,
    )
}

// ============================================================
// MORNING / EVENING STAR
// ============================================================

/// Long body, a small star beyond it, then a long opposite body closing deep
/// into the first
#[derive(Debug, Clone, Copy)]
pub struct StarDetector {
    /// How far into the first body the third bar must close
    pub penetration: Ratio,
}

impl Default for StarDetector {
    fn default() -> Self {
        Self {
            penetration: Ratio::new_const(0.3),
        }
    }
}

impl PatternDetector for StarDetector {
    fn name(&self) -> &'static str {
        "star"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickTriple
    }

    fn min_bars(&self) -> usize {
        4
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let (first, star, third) = triple(bars)?;
        if !is_body_long(first.body(), ctx.avg_body, first.range())
            || !is_body_short(star.body(), ctx.avg_body, star.range())
        {
            return None;
        }
        let reach = self.penetration.get() * first.body();

        let (pattern, direction) = if first.is_bearish()
            && star.body_top() <= first.close()
            && third.is_bullish()
            && third.close() >= first.close() + reach
        {
            (PatternType::MorningStar, Direction::Bullish)
        } else if first.is_bullish()
            && star.body_bottom() >= first.close()
            && third.is_bearish()
            && third.close() <= first.close() - reach
        {
            (PatternType::EveningStar, Direction::Bearish)
        } else {
            return None;
        };
        let recovered = (third.close() - first.close()).abs() / first.body();

        matched(
            pattern,
            direction,
            0.5 + 0.2 * recovered.min(1.0) + trend_bonus(ctx.trend_before(3)),
            third.close(),
            triple_levels((first, star, third), direction),
        )
    }
}

// ============================================================
// THREE WHITE SOLDIERS / THREE BLACK CROWS
// ============================================================

/// Three same-coloured bodies stepping in one direction, each opening inside
/// the previous body and closing near its extreme
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeSoldiersCrowsDetector;

impl PatternDetector for ThreeSoldiersCrowsDetector {
    fn name(&self) -> &'static str {
        "three_soldiers_crows"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickTriple
    }

    fn min_bars(&self) -> usize {
        4
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let (a, b, c) = triple(bars)?;
        let set = [a, b, c];
        // closing shadow at most a fifth of the range
        let tight = |shadow: f64, range: f64| range > 0.0 && shadow <= range * 0.2;
        let opens_inside =
            |prev: &T, next: &T| next.open() >= prev.body_bottom() && next.open() <= prev.body_top();

        let (pattern, direction) = if set.iter().all(|bar| bar.is_bullish())
            && b.close() > a.close()
            && c.close() > b.close()
            && set.iter().all(|bar| tight(bar.upper_shadow(), bar.range()))
        {
            (PatternType::ThreeWhiteSoldiers, Direction::Bullish)
        } else if set.iter().all(|bar| bar.is_bearish())
            && b.close() < a.close()
            && c.close() < b.close()
            && set.iter().all(|bar| tight(bar.lower_shadow(), bar.range()))
        {
            (PatternType::ThreeBlackCrows, Direction::Bearish)
        } else {
            return None;
        };
        if !opens_inside(a, b) || !opens_inside(b, c) {
            return None;
        }
        let long_bodies = set
            .iter()
            .filter(|bar| is_body_long(bar.body(), ctx.avg_body, bar.range()))
            .count();
        if long_bodies < 2 {
            return None;
        }

        matched(
            pattern,
            direction,
            0.5 + 0.1 * long_bodies as f64 + trend_bonus(ctx.trend_before(3)) / 2.0,
            c.close(),
            triple_levels((a, b, c), direction),
        )
    }
}

// ============================================================
// THREE INSIDE UP / DOWN
// ============================================================

/// Harami confirmed by a third bar closing beyond the first bar's open
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeInsideDetector;

impl PatternDetector for ThreeInsideDetector {
    fn name(&self) -> &'static str {
        "three_inside"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickTriple
    }

    fn min_bars(&self) -> usize {
        4
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let (first, inside, third) = triple(bars)?;
        if !is_body_long(first.body(), ctx.avg_body, first.range())
            || inside.body_top() >= first.body_top()
            || inside.body_bottom() <= first.body_bottom()
            || inside.body() >= first.body() * (1.0 - helpers::BODY_SHORT_RATIO)
        {
            return None;
        }

        let (pattern, direction) = if first.is_bearish()
            && inside.is_bullish()
            && third.close() > first.open()
        {
            (PatternType::ThreeInsideUp, Direction::Bullish)
        } else if first.is_bullish() && inside.is_bearish() && third.close() < first.open() {
            (PatternType::ThreeInsideDown, Direction::Bearish)
        } else {
            return None;
        };

        matched(
            pattern,
            direction,
            0.6 + trend_bonus(ctx.trend_before(3)),
            third.close(),
            triple_levels((first, inside, third), direction),
        )
    }
}
