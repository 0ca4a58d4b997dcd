//! Single-bar candlestick detectors
//!
//! Body and shadow sizes are compared against the context averages of the
//! preceding bars. Reversal shapes read the trend that leads into the bar, not
//! the bar itself.

use super::helpers::{
    self, candle_levels, clamp_unit, is_body_long, is_body_short, is_doji, is_shadow_very_short,
    matched, trend_bonus,
};
use crate::{
    Direction, MarketContext, OHLCVExt, PatternDetector, PatternFamily, PatternMatch, PatternType,
    OHLCV,
};

impl_with_defaults!(
    DojiDetector,
    HammerDetector,
    InvertedHammerDetector,
    MarubozuDetector,
    SpinningTopDetector,
);

// ============================================================
// DOJI FAMILY
// ============================================================

/// Doji, dragonfly doji and gravestone doji
///
/// A doji with no upper shadow and a real lower shadow is a dragonfly; the
/// mirror image is a gravestone.
#[derive(Debug, Clone, Copy)]
pub struct DojiDetector {
    pub doji_factor: f64,
}

impl Default for DojiDetector {
    fn default() -> Self {
        Self {
            doji_factor: helpers::DOJI_FACTOR,
        }
    }
}

impl PatternDetector for DojiDetector {
    fn name(&self) -> &'static str {
        "doji"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickSingle
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let bar = bars.last()?;
        let body = bar.body();
        let range = bar.range();
        if range <= 0.0 {
            return None;
        }
        let within = if ctx.avg_range > 0.0 {
            body <= ctx.avg_range * self.doji_factor
        } else {
            is_doji(body, ctx.avg_range, range)
        };
        if !within {
            return None;
        }

        let upper = bar.upper_shadow();
        let lower = bar.lower_shadow();
        let upper_short = is_shadow_very_short(upper, ctx.avg_range, range);
        let lower_short = is_shadow_very_short(lower, ctx.avg_range, range);
        let strength = 1.0 - (body / range / helpers::DOJI_RATIO).min(1.0);

        let (pattern, direction) = match (upper_short, lower_short) {
            (true, false) => (PatternType::DragonflyDoji, Direction::Bullish),
            (false, true) => (PatternType::GravestoneDoji, Direction::Bearish),
            _ => (PatternType::Doji, Direction::Neutral),
        };

        matched(
            pattern,
            direction,
            0.45 + 0.3 * strength + trend_bonus(ctx.trend_before(1)),
            bar.close(),
            candle_levels(bar.close(), bar.high(), bar.low(), direction),
        )
    }
}

// ============================================================
// HAMMER FAMILY
// ============================================================

/// Hammer after a decline, hanging man after an advance. Same shape: small body
/// on top of a long lower shadow.
#[derive(Debug, Clone, Copy)]
pub struct HammerDetector {
    /// Lower shadow over body
    pub shadow_factor: f64,
}

impl Default for HammerDetector {
    fn default() -> Self {
        Self {
            shadow_factor: helpers::SHADOW_VERYLONG_FACTOR,
        }
    }
}

impl PatternDetector for HammerDetector {
    fn name(&self) -> &'static str {
        "hammer"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickSingle
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let bar = bars.last()?;
        let body = bar.body();
        let range = bar.range();
        let lower = bar.lower_shadow();
        if range <= 0.0
            || !is_body_short(body, ctx.avg_body, range)
            || lower <= body * self.shadow_factor
            || !is_shadow_very_short(bar.upper_shadow(), ctx.avg_range, range)
        {
            return None;
        }

        let trend = ctx.trend_before(1);
        let (pattern, direction) = if trend.is_down() {
            (PatternType::Hammer, Direction::Bullish)
        } else if trend.is_up() {
            (PatternType::HangingMan, Direction::Bearish)
        } else {
            return None;
        };

        matched(
            pattern,
            direction,
            0.45 + 0.35 * (lower / range) + trend_bonus(trend),
            bar.close(),
            candle_levels(bar.close(), bar.high(), bar.low(), direction),
        )
    }
}

/// Inverted hammer after a decline, shooting star after an advance: small body
/// under a long upper shadow.
#[derive(Debug, Clone, Copy)]
pub struct InvertedHammerDetector {
    /// Upper shadow over body
    pub shadow_factor: f64,
}

impl Default for InvertedHammerDetector {
    fn default() -> Self {
        Self {
            shadow_factor: helpers::SHADOW_VERYLONG_FACTOR,
        }
    }
}

impl PatternDetector for InvertedHammerDetector {
    fn name(&self) -> &'static str {
        "inverted_hammer"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickSingle
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let bar = bars.last()?;
        let body = bar.body();
        let range = bar.range();
        let upper = bar.upper_shadow();
        if range <= 0.0
            || !is_body_short(body, ctx.avg_body, range)
            || upper <= body * self.shadow_factor
            || !is_shadow_very_short(bar.lower_shadow(), ctx.avg_range, range)
        {
            return None;
        }

        let trend = ctx.trend_before(1);
        let (pattern, direction) = if trend.is_down() {
            (PatternType::InvertedHammer, Direction::Bullish)
        } else if trend.is_up() {
            (PatternType::ShootingStar, Direction::Bearish)
        } else {
            return None;
        };

        matched(
            pattern,
            direction,
            0.45 + 0.35 * (upper / range) + trend_bonus(trend),
            bar.close(),
            candle_levels(bar.close(), bar.high(), bar.low(), direction),
        )
    }
}

// ============================================================
// BODY SHAPES
// ============================================================

/// Long body with (almost) no shadows. Direction follows the body colour.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarubozuDetector;

impl PatternDetector for MarubozuDetector {
    fn name(&self) -> &'static str {
        "marubozu"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickSingle
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let bar = bars.last()?;
        let body = bar.body();
        let range = bar.range();
        if range <= 0.0
            || !is_body_long(body, ctx.avg_body, range)
            || !is_shadow_very_short(bar.upper_shadow(), ctx.avg_range, range)
            || !is_shadow_very_short(bar.lower_shadow(), ctx.avg_range, range)
        {
            return None;
        }
        let direction = if bar.is_bullish() {
            Direction::Bullish
        } else {
            Direction::Bearish
        };

        matched(
            PatternType::Marubozu,
            direction,
            clamp_unit(0.4 + 0.4 * body / range),
            bar.close(),
            candle_levels(bar.close(), bar.high(), bar.low(), direction),
        )
    }
}

/// Short body with shadows longer than the body on both sides
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinningTopDetector;

impl PatternDetector for SpinningTopDetector {
    fn name(&self) -> &'static str {
        "spinning_top"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::CandlestickSingle
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let bar = bars.last()?;
        let body = bar.body();
        let range = bar.range();
        if range <= 0.0
            || is_doji(body, ctx.avg_range, range)
            || !is_body_short(body, ctx.avg_body, range)
            || bar.upper_shadow() <= body
            || bar.lower_shadow() <= body
        {
            return None;
        }
        // balanced shadows read as stronger indecision
        let balance = bar.upper_shadow().min(bar.lower_shadow())
            / bar.upper_shadow().max(bar.lower_shadow());

        matched(
            PatternType::SpinningTop,
            Direction::Neutral,
            0.4 + 0.2 * balance,
            bar.close(),
            (bar.high(), bar.low()),
        )
    }
}
