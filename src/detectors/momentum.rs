//! Momentum detectors over oscillators and bands
//!
//! Targets and stops are fixed percentage offsets from the latest close, one
//! pair per indicator.

use std::collections::HashMap;

use super::helpers::{clamp_unit, matched, percent_offsets, volume_ratio};
use crate::{
    indicators,
    params::{get_factor, get_period, ParamMeta, ParamType, ParameterizedDetector},
    Direction, EngineError, MarketContext, OHLCVExt, PatternDetector, PatternFamily, PatternMatch,
    PatternType, Period, Result, OHLCV,
};

impl_with_defaults!(
    RsiDetector,
    MacdCrossDetector,
    StochasticDetector,
    BollingerSqueezeDetector,
    BollingerBounceDetector,
    IchimokuDetector,
    MomentumSurgeDetector,
);

// (target, stop) percentages per indicator
const RSI_OFFSETS: (f64, f64) = (0.02, 0.01);
const MACD_OFFSETS: (f64, f64) = (0.03, 0.015);
const STOCHASTIC_OFFSETS: (f64, f64) = (0.015, 0.0075);
const SQUEEZE_OFFSETS: (f64, f64) = (0.025, 0.01);
const ICHIMOKU_OFFSETS: (f64, f64) = (0.03, 0.015);
const SURGE_OFFSETS: (f64, f64) = (0.02, 0.01);

#[inline]
fn offsets(close: f64, direction: Direction, (target, stop): (f64, f64)) -> (f64, f64) {
    percent_offsets(close, direction, target, stop)
}

// ============================================================
// RSI
// ============================================================

/// RSI at or beyond the oversold/overbought thresholds
#[derive(Debug, Clone, Copy)]
pub struct RsiDetector {
    pub period: Period,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiDetector {
    fn default() -> Self {
        Self {
            period: Period::new_const(14),
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl PatternDetector for RsiDetector {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Momentum
    }

    fn min_bars(&self) -> usize {
        self.period.get() + 1
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let series = indicators::rsi_series(&ctx.closes, self.period.get());
        let rsi = *series.last()?;
        let turning = series.len() >= 2 && {
            let prev = series[series.len() - 2];
            (rsi <= self.oversold && rsi > prev) || (rsi >= self.overbought && rsi < prev)
        };
        let close = ctx.last_close()?;
        let turn_bonus = if turning { 0.1 } else { 0.0 };

        if rsi <= self.oversold {
            let depth = (self.oversold - rsi) / self.oversold.max(f64::EPSILON);
            return matched(
                PatternType::RsiOversold,
                Direction::Bullish,
                0.5 + 0.4 * depth + turn_bonus,
                close,
                offsets(close, Direction::Bullish, RSI_OFFSETS),
            );
        }
        if rsi >= self.overbought {
            let depth = (rsi - self.overbought) / (100.0 - self.overbought).max(f64::EPSILON);
            return matched(
                PatternType::RsiOverbought,
                Direction::Bearish,
                0.5 + 0.4 * depth + turn_bonus,
                close,
                offsets(close, Direction::Bearish, RSI_OFFSETS),
            );
        }
        None
    }

    fn validate_config(&self) -> Result<()> {
        if !(0.0 < self.oversold && self.oversold < self.overbought && self.overbought < 100.0) {
            return Err(EngineError::InvalidConfig(format!(
                "rsi thresholds must satisfy 0 < oversold ({}) < overbought ({}) < 100",
                self.oversold, self.overbought
            )));
        }
        Ok(())
    }
}

// ============================================================
// MACD
// ============================================================

/// MACD line crossing its signal line on the latest bar
#[derive(Debug, Clone, Copy)]
pub struct MacdCrossDetector {
    pub fast: Period,
    pub slow: Period,
    pub signal: Period,
}

impl Default for MacdCrossDetector {
    fn default() -> Self {
        Self {
            fast: Period::new_const(12),
            slow: Period::new_const(26),
            signal: Period::new_const(9),
        }
    }
}

impl PatternDetector for MacdCrossDetector {
    fn name(&self) -> &'static str {
        "macd_cross"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Momentum
    }

    fn min_bars(&self) -> usize {
        self.fast.get().max(self.slow.get()) + self.signal.get()
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let series = indicators::macd_series(
            &ctx.closes,
            self.fast.get(),
            self.slow.get(),
            self.signal.get(),
        );
        let [.., prev, last] = series[..] else {
            return None;
        };
        let close = ctx.last_close()?;

        let (pattern, direction) = if prev.histogram <= 0.0 && last.histogram > 0.0 {
            (PatternType::MacdBullishCross, Direction::Bullish)
        } else if prev.histogram >= 0.0 && last.histogram < 0.0 {
            (PatternType::MacdBearishCross, Direction::Bearish)
        } else {
            return None;
        };

        // crosses on the far side of the zero line carry more weight
        let zero_side = match direction {
            Direction::Bullish if last.macd < 0.0 => 0.1,
            Direction::Bearish if last.macd > 0.0 => 0.1,
            _ => 0.0,
        };
        let volume = match volume_ratio(ctx) {
            Some(r) if r > 1.2 => 0.1,
            _ => 0.0,
        };

        matched(
            pattern,
            direction,
            0.55 + zero_side + volume,
            close,
            offsets(close, direction, MACD_OFFSETS),
        )
    }

    fn validate_config(&self) -> Result<()> {
        if self.fast >= self.slow {
            return Err(EngineError::InvalidConfig(
                "macd fast period must be shorter than slow period".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// STOCHASTIC
// ============================================================

#[derive(Debug, Clone, Copy)]
pub struct StochasticDetector {
    pub period: Period,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for StochasticDetector {
    fn default() -> Self {
        Self {
            period: Period::new_const(14),
            oversold: 20.0,
            overbought: 80.0,
        }
    }
}

impl PatternDetector for StochasticDetector {
    fn name(&self) -> &'static str {
        "stochastic"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Momentum
    }

    fn min_bars(&self) -> usize {
        self.period.get() + 1
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        if ctx.len() < self.min_bars() {
            return None;
        }
        let series =
            indicators::stochastic_series(&ctx.highs, &ctx.lows, &ctx.closes, self.period.get());
        let [.., prev, k] = series[..] else {
            return None;
        };
        let close = ctx.last_close()?;

        if k <= self.oversold {
            let turning = if k > prev { 0.1 } else { 0.0 };
            return matched(
                PatternType::StochasticOversold,
                Direction::Bullish,
                0.5 + 0.3 * (self.oversold - k) / self.oversold.max(f64::EPSILON) + turning,
                close,
                offsets(close, Direction::Bullish, STOCHASTIC_OFFSETS),
            );
        }
        if k >= self.overbought {
            let turning = if k < prev { 0.1 } else { 0.0 };
            return matched(
                PatternType::StochasticOverbought,
                Direction::Bearish,
                0.5 + 0.3 * (k - self.overbought) / (100.0 - self.overbought).max(f64::EPSILON)
                    + turning,
                close,
                offsets(close, Direction::Bearish, STOCHASTIC_OFFSETS),
            );
        }
        None
    }
}

// ============================================================
// BOLLINGER
// ============================================================

/// Bands contracted to their narrowest of the lookback, then a close outside them
#[derive(Debug, Clone, Copy)]
pub struct BollingerSqueezeDetector {
    pub period: Period,
    pub k: f64,
    /// Bandwidths compared when looking for the squeeze
    pub lookback: Period,
    /// Previous bandwidth must be within this factor of the lookback minimum
    pub tightness: f64,
}

impl Default for BollingerSqueezeDetector {
    fn default() -> Self {
        Self {
            period: Period::new_const(20),
            k: 2.0,
            lookback: Period::new_const(20),
            tightness: 1.1,
        }
    }
}

impl PatternDetector for BollingerSqueezeDetector {
    fn name(&self) -> &'static str {
        "bollinger_squeeze"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Momentum
    }

    fn min_bars(&self) -> usize {
        self.period.get() + self.lookback.get()
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let period = self.period.get();
        // bandwidths for the windows ending before the latest bar
        let widths: Vec<f64> = (n - self.lookback.get()..n)
            .filter_map(|end| indicators::bollinger(&ctx.closes[..end], period, self.k))
            .map(|b| b.bandwidth())
            .collect();
        let prev_width = *widths.last()?;
        let narrowest = widths.iter().copied().fold(f64::MAX, f64::min);
        if prev_width > narrowest * self.tightness {
            return None;
        }

        let bands = indicators::bollinger(&ctx.closes, period, self.k)?;
        let close = ctx.last_close()?;
        let direction = if close > bands.upper {
            Direction::Bullish
        } else if close < bands.lower {
            Direction::Bearish
        } else {
            return None;
        };

        matched(
            PatternType::BollingerSqueeze,
            direction,
            0.6 + if bands.bandwidth() > prev_width * 1.5 { 0.15 } else { 0.0 },
            close,
            offsets(close, direction, SQUEEZE_OFFSETS),
        )
    }
}

/// Previous bar pierced a band and the latest bar closes back inside, moving away from it
#[derive(Debug, Clone, Copy)]
pub struct BollingerBounceDetector {
    pub period: Period,
    pub k: f64,
}

impl Default for BollingerBounceDetector {
    fn default() -> Self {
        Self {
            period: Period::new_const(20),
            k: 2.0,
        }
    }
}

impl PatternDetector for BollingerBounceDetector {
    fn name(&self) -> &'static str {
        "bollinger_bounce"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Momentum
    }

    fn min_bars(&self) -> usize {
        self.period.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() || bars.len() != n {
            return None;
        }
        let period = self.period.get();
        let prev_bands = indicators::bollinger(&ctx.closes[..n - 1], period, self.k)?;
        let bands = indicators::bollinger(&ctx.closes, period, self.k)?;
        let last = &bars[n - 1];
        let close = last.close();

        if ctx.lows[n - 2] <= prev_bands.lower
            && close > bands.lower
            && last.is_bullish()
            && bands.middle > close
        {
            return matched(
                PatternType::BollingerBandBounce,
                Direction::Bullish,
                0.6,
                close,
                (bands.middle, ctx.lows[n - 2].min(last.low())),
            );
        }
        if ctx.highs[n - 2] >= prev_bands.upper
            && close < bands.upper
            && last.is_bearish()
            && bands.middle < close
        {
            return matched(
                PatternType::BollingerBandBounce,
                Direction::Bearish,
                0.6,
                close,
                (bands.middle, ctx.highs[n - 2].max(last.high())),
            );
        }
        None
    }
}

// ============================================================
// ICHIMOKU
// ============================================================

/// Close breaks out of the cloud with tenkan on the same side of kijun
#[derive(Debug, Clone, Copy, Default)]
pub struct IchimokuDetector;

impl PatternDetector for IchimokuDetector {
    fn name(&self) -> &'static str {
        "ichimoku"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Momentum
    }

    fn min_bars(&self) -> usize {
        53
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let now = indicators::ichimoku(&ctx.highs, &ctx.lows)?;
        let before = indicators::ichimoku(&ctx.highs[..n - 1], &ctx.lows[..n - 1])?;
        let close = ctx.closes[n - 1];
        let prev_close = ctx.closes[n - 2];

        let (pattern, direction) = if close > now.cloud_top()
            && prev_close <= before.cloud_top()
            && now.tenkan > now.kijun
        {
            (PatternType::IchimokuBullish, Direction::Bullish)
        } else if close < now.cloud_bottom()
            && prev_close >= before.cloud_bottom()
            && now.tenkan < now.kijun
        {
            (PatternType::IchimokuBearish, Direction::Bearish)
        } else {
            return None;
        };
        let thick_cloud = now.cloud_top() - now.cloud_bottom() > 0.01 * close;

        matched(
            pattern,
            direction,
            0.6 + if thick_cloud { 0.1 } else { 0.0 },
            close,
            offsets(close, direction, ICHIMOKU_OFFSETS),
        )
    }
}

// ============================================================
// MOMENTUM SURGE
// ============================================================

/// Strong rate of change capped by a wide-bodied bar in the same direction
#[derive(Debug, Clone, Copy)]
pub struct MomentumSurgeDetector {
    pub roc_period: Period,
    /// Minimum absolute rate of change
    pub min_roc: f64,
    /// Latest body over average body
    pub body_multiplier: f64,
}

impl Default for MomentumSurgeDetector {
    fn default() -> Self {
        Self {
            roc_period: Period::new_const(10),
            min_roc: 0.03,
            body_multiplier: 1.5,
        }
    }
}

impl PatternDetector for MomentumSurgeDetector {
    fn name(&self) -> &'static str {
        "momentum_surge"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Momentum
    }

    fn min_bars(&self) -> usize {
        self.roc_period.get() + 2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() || bars.len() != n {
            return None;
        }
        let base = ctx.closes[n - 1 - self.roc_period.get()];
        if base <= 0.0 {
            return None;
        }
        let close = ctx.closes[n - 1];
        let roc = (close - base) / base;
        let last = &bars[n - 1];
        if roc.abs() < self.min_roc || last.body() <= ctx.avg_body * self.body_multiplier {
            return None;
        }
        let direction = match (roc > 0.0, last.is_bullish(), last.is_bearish()) {
            (true, true, _) => Direction::Bullish,
            (false, _, true) => Direction::Bearish,
            _ => return None,
        };

        matched(
            PatternType::MomentumSurge,
            direction,
            clamp_unit(0.5 + (roc.abs() / 0.1).min(0.3)),
            close,
            offsets(close, direction, SURGE_OFFSETS),
        )
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static RSI_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "period",
        param_type: ParamType::Period,
        default: 14.0,
        range: (7.0, 21.0, 7.0),
        description: "RSI lookback",
    },
    ParamMeta {
        name: "oversold",
        param_type: ParamType::Factor,
        default: 30.0,
        range: (15.0, 40.0, 5.0),
        description: "RSI at or below this level is oversold",
    },
    ParamMeta {
        name: "overbought",
        param_type: ParamType::Factor,
        default: 70.0,
        range: (60.0, 85.0, 5.0),
        description: "RSI at or above this level is overbought",
    },
];

impl ParameterizedDetector for RsiDetector {
    fn param_meta() -> &'static [ParamMeta] {
        RSI_PARAMS
    }

    fn from_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            period: get_period(params, "period", 14)?,
            oversold: get_factor(params, "oversold", 30.0)?,
            overbought: get_factor(params, "overbought", 70.0)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bar, ContextProvider, DefaultContextProvider, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 8, 1, 9, 30, 0).unwrap();
        let mut prev = closes[0];
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let bar = Bar::new(
                    prev,
                    prev.max(c) + 0.1,
                    prev.min(c) - 0.1,
                    c,
                    1_000,
                    t0 + Duration::minutes(i as i64),
                );
                prev = c;
                bar
            })
            .collect()
    }

    fn run<D: PatternDetector>(detector: &D, bars: &[Bar]) -> Option<PatternMatch> {
        let ctx = DefaultContextProvider::default().compute(bars, Timeframe::FiveMinutes);
        detector.detect(bars, &ctx)
    }

    #[test]
    fn test_rsi_oversold_on_falling_series() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let m = run(&RsiDetector::default(), &bars_from_closes(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::RsiOversold);
        assert_eq!(m.direction, Direction::Bullish);
        assert!((m.target_price - 71.0 * 1.02).abs() < 1e-9);
        assert!((m.stop_loss - 71.0 * 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_overbought_on_rising_series() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let m = run(&RsiDetector::default(), &bars_from_closes(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::RsiOverbought);
        assert_eq!(m.direction, Direction::Bearish);
        assert!(m.target_price < m.entry_price && m.stop_loss > m.entry_price);
    }

    #[test]
    fn test_macd_bullish_cross() {
        // accelerating decline keeps the histogram negative, then a sharp turn up
        let mut closes: Vec<f64> = (0..40).map(|i| 150.0 - 0.02 * (i * i) as f64).collect();
        let bottom = closes[39];
        let mut found = None;
        for i in 1..=15 {
            closes.push(bottom + 1.5 * i as f64);
            if let Some(m) = run(&MacdCrossDetector::default(), &bars_from_closes(&closes)) {
                found = Some(m);
                break;
            }
        }
        let m = found.unwrap();
        assert_eq!(m.pattern, PatternType::MacdBullishCross);
        assert_eq!(m.direction, Direction::Bullish);
    }

    #[test]
    fn test_stochastic_overbought() {
        let closes: Vec<f64> = (0..20).map(|i| 50.0 + i as f64).collect();
        let m = run(&StochasticDetector::default(), &bars_from_closes(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::StochasticOverbought);
    }

    #[test]
    fn test_momentum_surge() {
        let mut closes = vec![100.0; 15];
        closes.extend([100.5, 101.0, 101.5, 102.0, 106.0]);
        let m = run(&MomentumSurgeDetector::default(), &bars_from_closes(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::MomentumSurge);
        assert_eq!(m.direction, Direction::Bullish);
    }

    #[test]
    fn test_rsi_thresholds_validated() {
        let mut params = HashMap::new();
        params.insert("oversold", 75.0);
        assert!(RsiDetector::with_params(&params).is_err());
        assert!(RsiDetector::default().validate_config().is_ok());
    }

    #[test]
    fn test_flat_series_is_quiet() {
        let bars = bars_from_closes(&[100.0; 60]);
        assert!(run(&MacdCrossDetector::default(), &bars).is_none());
        assert!(run(&BollingerSqueezeDetector::default(), &bars).is_none());
        assert!(run(&BollingerBounceDetector::default(), &bars).is_none());
        assert!(run(&IchimokuDetector, &bars).is_none());
        assert!(run(&MomentumSurgeDetector::default(), &bars).is_none());
    }
}
