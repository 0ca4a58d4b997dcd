//! Two-bar candlestick detectors
//!
//! The trend is read before the first bar of the pair. Levels bracket both bars.

use super::helpers::{
    candle_levels, is_body_long, is_body_short, is_equal, matched, max_of, min_of, trend_bonus,
};
use crate::{
    Direction, MarketContext, OHLCVExt, PatternDetector, PatternFamily, PatternMatch, PatternType,
    OHLCV,
};

impl_with_defaults!(
    EngulfingDetector,
    HaramiDetector,
    PiercingDarkCloudDetector,
    TweezerDetector,
);

/// Last two bars, oldest first
#[inline]
fn pair<T>(bars: &[T]) -> Option<(&T, &T)> {
    match bars {
        [.., first, second] => Some((first, second)),
        _ => None,
    }
}

fn pair_levels<T: OHLCV>(first: &T, second: &T, direction: Direction) -> (f64, f64) {
    candle_levels(
        second.close(),
        max_of(&[first.high(), second.high()]),
        min_of(&[first.low(), second.low()]),
        direction,
    )
}

// ============================================================
// ENGULFING
// ============================================================

/// Second body fully covers the opposite-coloured first body
#[derive(Debug, Clone, Copy, Default)]
pub struct EngulfingDetector;

impl PatternDetector for EngulfingDetector {
    fn name(&self) -> &'static str {
        "engulfing"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickDouble
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let (first, second) = pair(bars)?;
        let covers = second.body_top() >= first.body_top()
            && second.body_bottom() <= first.body_bottom()
            && second.body() > first.body();

        let (pattern, direction) = if first.is_bearish() && second.is_bullish() && covers {
            (PatternType::BullishEngulfing, Direction::Bullish)
        } else if first.is_bullish() && second.is_bearish() && covers {
            (PatternType::BearishEngulfing, Direction::Bearish)
        } else {
            return None;
        };
        let trend = ctx.trend_before(2);
        let against_trend = match direction {
            Direction::Bullish => trend.is_down(),
            _ => trend.is_up(),
        };
        let coverage = first.body() / second.body();

        matched(
            pattern,
            direction,
            0.45 + 0.2 * (1.0 - coverage)
                + if against_trend { 0.1 } else { 0.0 }
                + trend_bonus(trend),
            second.close(),
            pair_levels(first, second, direction),
        )
    }
}

// ============================================================
// HARAMI
// ============================================================

/// Small second body inside a long opposite first body
#[derive(Debug, Clone, Copy, Default)]
pub struct HaramiDetector;

impl PatternDetector for HaramiDetector {
    fn name(&self) -> &'static str {
        "harami"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickDouble
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let (first, second) = pair(bars)?;
        if !is_body_long(first.body(), ctx.avg_body, first.range())
            || !is_body_short(second.body(), ctx.avg_body, second.range())
            || second.body_top() >= first.body_top()
            || second.body_bottom() <= first.body_bottom()
        {
            return None;
        }

        let trend = ctx.trend_before(2);
        let (pattern, direction) = if first.is_bearish() && !trend.is_up() {
            (PatternType::BullishHarami, Direction::Bullish)
        } else if first.is_bullish() && !trend.is_down() {
            (PatternType::BearishHarami, Direction::Bearish)
        } else {
            return None;
        };

        matched(
            pattern,
            direction,
            0.45 + 0.15 * (1.0 - second.body() / first.body()) + trend_bonus(trend),
            second.close(),
            pair_levels(first, second, direction),
        )
    }
}

// ============================================================
// PIERCING LINE / DARK CLOUD COVER
// ============================================================

/// Opens beyond the first close and closes past the first body's midpoint
/// without engulfing it
#[derive(Debug, Clone, Copy, Default)]
pub struct PiercingDarkCloudDetector;

impl PatternDetector for PiercingDarkCloudDetector {
    fn name(&self) -> &'static str {
        "piercing_dark_cloud"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickDouble
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let (first, second) = pair(bars)?;
        if !is_body_long(first.body(), ctx.avg_body, first.range())
            || !is_body_long(second.body(), ctx.avg_body, second.range())
        {
            return None;
        }
        let midpoint = (first.open() + first.close()) / 2.0;

        let (pattern, direction, depth) = if first.is_bearish()
            && second.is_bullish()
            && second.open() < first.close()
            && second.close() > midpoint
            && second.close() < first.open()
        {
            let depth = (second.close() - first.close()) / first.body();
            (PatternType::PiercingLine, Direction::Bullish, depth)
        } else if first.is_bullish()
            && second.is_bearish()
            && second.open() > first.close()
            && second.close() < midpoint
            && second.close() > first.open()
        {
            let depth = (first.close() - second.close()) / first.body();
            (PatternType::DarkCloudCover, Direction::Bearish, depth)
        } else {
            return None;
        };

        matched(
            pattern,
            direction,
            0.4 + 0.3 * depth + trend_bonus(ctx.trend_before(2)),
            second.close(),
            pair_levels(first, second, direction),
        )
    }
}

// ============================================================
// TWEEZERS
// ============================================================

/// Matching extremes on opposite-coloured bars at the end of a trend
#[derive(Debug, Clone, Copy, Default)]
pub struct TweezerDetector;

impl PatternDetector for TweezerDetector {
    fn name(&self) -> &'static str {
        "tweezer"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickDouble
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() || ctx.avg_range <= 0.0 {
            return None;
        }
        let (first, second) = pair(bars)?;
        let trend = ctx.trend_before(2);

        let (pattern, direction) = if trend.is_up()
            && first.is_bullish()
            && second.is_bearish()
            && is_equal(first.high(), second.high(), ctx.avg_range)
        {
            (PatternType::TweezerTop, Direction::Bearish)
        } else if trend.is_down()
            && first.is_bearish()
            && second.is_bullish()
            && is_equal(first.low(), second.low(), ctx.avg_range)
        {
            (PatternType::TweezerBottom, Direction::Bullish)
        } else {
            return None;
        };

        matched(
            pattern,
            direction,
            0.5 + trend_bonus(trend),
            second.close(),
            pair_levels(first, second, direction),
        )
    }
}
