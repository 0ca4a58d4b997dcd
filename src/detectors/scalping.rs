//! Scalping detectors for the one and five minute windows
//!
//! Tight fixed offsets: these setups are meant to be in and out within a few bars.

use super::helpers::{matched, max_of, min_of, percent_offsets, volume_ratio};
use crate::{
    indicators, Direction, EngineError, MarketContext, OHLCVExt, PatternDetector, PatternFamily,
    PatternMatch, PatternType, Period, Ratio, Result, OHLCV,
};

impl_with_defaults!(
    VwapDetector,
    EmaScalpCrossDetector,
    MicroPullbackDetector,
    MomentumBurstDetector,
);

const SCALP_TARGET: f64 = 0.005;
const SCALP_STOP: f64 = 0.0025;

// ============================================================
// VWAP
// ============================================================

/// Close crossing the rolling VWAP: a reclaim from below or a rejection from above
#[derive(Debug, Clone, Copy)]
pub struct VwapDetector {
    /// Bars in the rolling VWAP
    pub lookback: Period,
}

impl Default for VwapDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(30),
        }
    }
}

impl VwapDetector {
    fn vwap_until(&self, ctx: &MarketContext, end: usize) -> Option<f64> {
        let start = end.saturating_sub(self.lookback.get());
        indicators::vwap(
            &ctx.highs[start..end],
            &ctx.lows[start..end],
            &ctx.closes[start..end],
            &ctx.volumes[start..end],
        )
    }
}

impl PatternDetector for VwapDetector {
    fn name(&self) -> &'static str {
        "vwap"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Scalping
    }

    fn min_bars(&self) -> usize {
        10
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let prev_vwap = self.vwap_until(ctx, n - 1)?;
        let vwap = self.vwap_until(ctx, n)?;
        let prev_close = ctx.closes[n - 2];
        let close = ctx.closes[n - 1];

        let (pattern, direction) = if prev_close < prev_vwap && close > vwap {
            (PatternType::VwapReclaim, Direction::Bullish)
        } else if prev_close > prev_vwap && close < vwap {
            (PatternType::VwapRejection, Direction::Bearish)
        } else {
            return None;
        };
        let participation = match volume_ratio(ctx) {
            Some(r) if r >= 1.5 => 0.15,
            Some(r) if r >= 1.0 => 0.05,
            _ => 0.0,
        };

        matched(
            pattern,
            direction,
            0.55 + participation,
            close,
            percent_offsets(close, direction, SCALP_TARGET, SCALP_STOP),
        )
    }
}

// ============================================================
// EMA SCALP CROSS
// ============================================================

/// Fast EMA crossing the slow EMA on the latest bar
#[derive(Debug, Clone, Copy)]
pub struct EmaScalpCrossDetector {
    pub fast: Period,
    pub slow: Period,
}

impl Default for EmaScalpCrossDetector {
    fn default() -> Self {
        Self {
            fast: Period::new_const(9),
            slow: Period::new_const(21),
        }
    }
}

impl PatternDetector for EmaScalpCrossDetector {
    fn name(&self) -> &'static str {
        "ema_scalp_cross"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Scalping
    }

    fn min_bars(&self) -> usize {
        self.fast.get().max(self.slow.get()) + 1
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let fast = indicators::ema_series(&ctx.closes, self.fast.get());
        let slow = indicators::ema_series(&ctx.closes, self.slow.get());
        let ([.., fast_prev, fast_now], [.., slow_prev, slow_now]) = (&fast[..], &slow[..]) else {
            return None;
        };
        let close = ctx.last_close()?;

        let direction = if fast_prev <= slow_prev && fast_now > slow_now {
            Direction::Bullish
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Direction::Bearish
        } else {
            return None;
        };
        // close already on the far side of both averages
        let confirmed = match direction {
            Direction::Bullish => close > *fast_now && close > *slow_now,
            _ => close < *fast_now && close < *slow_now,
        };

        matched(
            PatternType::EmaScalpCross,
            direction,
            0.55 + if confirmed { 0.1 } else { 0.0 },
            close,
            percent_offsets(close, direction, SCALP_TARGET, SCALP_STOP),
        )
    }

    fn validate_config(&self) -> Result<()> {
        if self.fast >= self.slow {
            return Err(EngineError::InvalidConfig(
                "ema scalp fast period must be shorter than slow period".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// MICRO PULLBACK
// ============================================================

/// Short impulse, a shallow pullback of a few bars, then a bar clearing the pullback
#[derive(Debug, Clone, Copy)]
pub struct MicroPullbackDetector {
    pub impulse_bars: Period,
    pub max_pullback_bars: Period,
    /// Minimum impulse move relative to its starting close
    pub min_impulse: Ratio,
    /// Maximum share of the impulse given back by the pullback
    pub max_retrace: Ratio,
}

impl Default for MicroPullbackDetector {
    fn default() -> Self {
        Self {
            impulse_bars: Period::new_const(5),
            max_pullback_bars: Period::new_const(3),
            min_impulse: Ratio::new_const(0.005),
            max_retrace: Ratio::new_const(0.5),
        }
    }
}

impl MicroPullbackDetector {
    fn try_pullback<T: OHLCV>(
        &self,
        bars: &[T],
        ctx: &MarketContext,
        pull: usize,
    ) -> Option<PatternMatch> {
        let n = ctx.len();
        let p0 = n - 1 - pull;
        let i0 = p0.checked_sub(self.impulse_bars.get())?;
        let base = ctx.closes[i0];
        let peak = ctx.closes[p0 - 1];
        if base <= 0.0 {
            return None;
        }
        let impulse = peak - base;
        if impulse.abs() / base < self.min_impulse.get() {
            return None;
        }

        let pull_highs = &ctx.highs[p0..n - 1];
        let pull_lows = &ctx.lows[p0..n - 1];
        let pull_closes = &ctx.closes[p0..n - 1];
        let last = &bars[n - 1];
        let close = last.close();

        if impulse > 0.0 {
            let floor = min_of(pull_lows);
            let retrace = (peak - floor) / impulse;
            if pull_closes.iter().all(|&c| c < peak)
                && retrace <= self.max_retrace.get()
                && last.is_bullish()
                && close > max_of(pull_highs)
            {
                let risk = (close - floor).max(f64::EPSILON);
                return matched(
                    PatternType::MicroPullback,
                    Direction::Bullish,
                    0.6 + 0.2 * (1.0 - retrace),
                    close,
                    (close + 2.0 * risk, floor),
                );
            }
        } else {
            let ceiling = max_of(pull_highs);
            let retrace = (ceiling - peak) / -impulse;
            if pull_closes.iter().all(|&c| c > peak)
                && retrace <= self.max_retrace.get()
                && last.is_bearish()
                && close < min_of(pull_lows)
            {
                let risk = (ceiling - close).max(f64::EPSILON);
                return matched(
                    PatternType::MicroPullback,
                    Direction::Bearish,
                    0.6 + 0.2 * (1.0 - retrace),
                    close,
                    (close - 2.0 * risk, ceiling),
                );
            }
        }
        None
    }
}

impl PatternDetector for MicroPullbackDetector {
    fn name(&self) -> &'static str {
        "micro_pullback"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Scalping
    }

    fn min_bars(&self) -> usize {
        self.impulse_bars.get() + self.max_pullback_bars.get() + 2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() || bars.len() != ctx.len() {
            return None;
        }
        (1..=self.max_pullback_bars.get()).find_map(|pull| self.try_pullback(bars, ctx, pull))
    }
}

// ============================================================
// MOMENTUM BURST
// ============================================================

/// Consecutive wide bars in one direction on rising volume
#[derive(Debug, Clone, Copy)]
pub struct MomentumBurstDetector {
    pub burst_bars: Period,
    /// Each body over the average body
    pub body_multiplier: f64,
    /// Latest volume over the trailing average
    pub volume_multiplier: f64,
}

impl Default for MomentumBurstDetector {
    fn default() -> Self {
        Self {
            burst_bars: Period::new_const(3),
            body_multiplier: 1.2,
            volume_multiplier: 1.5,
        }
    }
}

impl PatternDetector for MomentumBurstDetector {
    fn name(&self) -> &'static str {
        "momentum_burst"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Scalping
    }

    fn min_bars(&self) -> usize {
        self.burst_bars.get() + 5
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() || bars.len() != n || ctx.avg_body <= 0.0 {
            return None;
        }
        let burst = &bars[n - self.burst_bars.get()..];
        let direction = if burst.iter().all(|b| b.is_bullish()) {
            Direction::Bullish
        } else if burst.iter().all(|b| b.is_bearish()) {
            Direction::Bearish
        } else {
            return None;
        };
        let wide = burst
            .iter()
            .all(|b| b.body() > ctx.avg_body * self.body_multiplier);
        let rising_volume = burst.windows(2).all(|w| w[1].volume() > w[0].volume());
        let ratio = volume_ratio(ctx)?;
        if !wide || !rising_volume || ratio < self.volume_multiplier {
            return None;
        }
        let close = ctx.last_close()?;

        matched(
            PatternType::MomentumBurst,
            direction,
            0.55 + (0.05 * ratio).min(0.25),
            close,
            percent_offsets(close, direction, SCALP_TARGET, SCALP_STOP),
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
        Bar::new(o, h, l, c, v, t0 + Duration::minutes(i))
    }

    fn run<D: PatternDetector>(detector: &D, bars: &[Bar]) -> Option<PatternMatch> {
        let ctx = DefaultContextProvider::default().compute(bars, Timeframe::OneMinute);
        detector.detect(bars, &ctx)
    }

    #[test]
    fn test_vwap_reclaim() {
        let mut bars: Vec<Bar> = (0..15)
            .map(|i| {
                let c = 101.0 - 0.1 * i as f64;
                bar(i, c + 0.05, c + 0.1, c - 0.1, c, 1_000)
            })
            .collect();
        bars.push(bar(15, 99.6, 101.8, 99.5, 101.5, 2_000));
        let m = run(&VwapDetector::default(), &bars).unwrap();
        assert_eq!(m.pattern, PatternType::VwapReclaim);
        assert_eq!(m.direction, Direction::Bullish);
        assert!((m.target_price - 101.5 * 1.005).abs() < 1e-9);
    }

    #[test]
    fn test_ema_cross_down() {
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + 0.05 * i as f64).collect();
        let mut found = None;
        let mut last = *closes.last().unwrap();
        for i in 0..10 {
            last -= 0.4;
            closes.push(last);
            let bars: Vec<Bar> = closes
                .iter()
                .enumerate()
                .map(|(j, &c)| bar(j as i64, c, c + 0.1, c - 0.1, c, 1_000))
                .collect();
            if let Some(m) = run(&EmaScalpCrossDetector::default(), &bars) {
                found = Some((i, m));
                break;
            }
        }
        let (_, m) = found.unwrap();
        assert_eq!(m.direction, Direction::Bearish);
        assert!(m.stop_loss > m.entry_price);
    }

    #[test]
    fn test_micro_pullback_bullish() {
        let mut bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0, 100.1, 99.9, 100.0, 1_000)).collect();
        // impulse
        for (k, c) in [100.3, 100.6, 100.9, 101.2, 101.5].into_iter().enumerate() {
            bars.push(bar(5 + k as i64, c - 0.3, c + 0.05, c - 0.35, c, 1_500));
        }
        // two-bar pullback
        bars.push(bar(10, 101.5, 101.55, 101.2, 101.3, 800));
        bars.push(bar(11, 101.3, 101.35, 101.1, 101.2, 700));
        // resumption
        bars.push(bar(12, 101.2, 101.8, 101.15, 101.7, 1_600));
        let m = run(&MicroPullbackDetector::default(), &bars).unwrap();
        assert_eq!(m.pattern, PatternType::MicroPullback);
        assert_eq!(m.direction, Direction::Bullish);
        assert_eq!(m.stop_loss, 101.1);
    }

    #[test]
    fn test_momentum_burst() {
        let mut bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0, 100.2, 99.8, 100.1, 1_000)).collect();
        bars.push(bar(10, 100.1, 100.7, 100.0, 100.6, 1_200));
        bars.push(bar(11, 100.6, 101.2, 100.5, 101.1, 1_600));
        bars.push(bar(12, 101.1, 101.8, 101.0, 101.7, 2_200));
        let m = run(&MomentumBurstDetector::default(), &bars).unwrap();
        assert_eq!(m.pattern, PatternType::MomentumBurst);
        assert_eq!(m.direction, Direction::Bullish);
    }

    #[test]
    fn test_mixed_burst_rejected() {
        let mut bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0, 100.2, 99.8, 100.1, 1_000)).collect();
        bars.push(bar(10, 100.1, 100.7, 100.0, 100.6, 1_200));
        bars.push(bar(11, 100.6, 100.7, 100.0, 100.1, 1_600));
        bars.push(bar(12, 100.1, 100.8, 100.0, 100.7, 2_200));
        assert!(run(&MomentumBurstDetector::default(), &bars).is_none());
    }
}
