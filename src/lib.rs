//! # Confluence - multi-timeframe pattern detection and signal synthesis
//!
//! Recognizes breakout, reversal, momentum, volume, scalping, options, candlestick,
//! harmonic, chart-geometry and wave patterns on OHLCV windows, scores them with
//! timeframe reliability and historical outcomes, cross-checks them across
//! timeframes and turns the strongest into time-limited trading signals.
//!
//! ## Quick Start
//!
//! ```rust
//! use confluence::prelude::*;
//! use chrono::{TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap();
//! let bars: Vec<Bar> = (0..60)
//!     .map(|i| {
//!         let base = 100.0 + (i as f64 * 0.3).sin();
//!         Bar::new(base, base + 0.5, base - 0.5, base + 0.1, 1_000, start + chrono::Duration::minutes(i))
//!     })
//!     .collect();
//!
//! let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
//! let detections = engine.detect_patterns(&bars, Timeframe::OneMinute);
//!
//! let chain = OptionChain::new(100.0, vec![]);
//! let signals = engine.generate_signals(&detections, &chain);
//! assert!(signals.iter().all(|s| s.confidence > 0.6));
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod confluence;
pub mod detectors;
pub mod feedback;
pub mod indicators;
pub mod params;
pub mod pattern_type;
pub mod scoring;
pub mod signals;
pub mod timeframe;

pub use config::{ConfluenceConfig, EngineConfig, ScoringConfig, SignalConfig};
pub use confluence::{ConfluenceAnalyzer, ConfluenceDetection, TimeframeTrend};
pub use feedback::{PerformanceRecord, PerformanceSnapshot, PerformanceStore};
pub use pattern_type::{PatternFamily, PatternType};
pub use scoring::ConfidenceScorer;
pub use signals::{
    InstrumentRef, InstrumentUniverse, OptionChain, OptionClass, OptionContract, SignalSynthesizer,
    SignalType, TradingSignal,
};
pub use timeframe::Timeframe;

pub mod prelude {
    pub use crate::{
        detectors::*,
        params::{
            check_params, get_factor, get_period, get_ratio, ParamMeta, ParamType,
            ParameterizedDetector,
        },
        validate_window, Bar, BuiltinDetector, ConfidenceScorer, ConfluenceAnalyzer,
        ConfluenceDetection, ContextProvider, DefaultContextProvider, Direction, EngineBuilder,
        EngineConfig, EngineError, InstrumentRef, InstrumentUniverse, MarketContext,
        MultiTimeframeAnalysis, OHLCVExt, OptionChain, OptionClass, OptionContract,
        PatternDetection, PatternDetector, PatternFamily, PatternMatch, PatternType,
        PerformanceRecord, PerformanceSnapshot, PerformanceStore, Period, Ratio, Result,
        SignalEngine, SignalSynthesizer, SignalType, Timeframe, TradingSignal, Trend, OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by configuration and input validation.
///
/// The analysis path itself never fails: missing data yields no detection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Bar at index {index} is not after its predecessor")]
    UnorderedBars { index: usize },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(EngineError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(EngineError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(EngineError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Validate OHLC consistency of a single bar
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(EngineError::InvalidBar {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(EngineError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(EngineError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        if self.body_bottom() < self.low() || self.body_top() > self.high() {
            return Err(EngineError::InvalidBar {
                index: 0,
                reason: "open/close outside high-low range",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// One OHLCV sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    pub fn new(
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            timestamp,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume as f64
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Check the bar invariants of a window: consistent OHLC, finite values and
/// strictly ascending timestamps.
pub fn validate_window<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            EngineError::InvalidBar { reason, .. } => EngineError::InvalidBar { index: i, reason },
            other => other,
        })?;
        if i > 0 && bar.timestamp() <= bars[i - 1].timestamp() {
            return Err(EngineError::UnorderedBars { index: i });
        }
    }
    Ok(())
}

// ============================================================
// DETECTION RESULTS
// ============================================================

/// Direction/bias of a pattern
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    /// +1 for bullish, -1 for bearish, 0 for neutral
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Neutral => 0.0,
            Direction::Bearish => -1.0,
        }
    }
}

/// Raw detector output - Copy, no allocations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub pattern: PatternType,
    pub direction: Direction,
    /// Raw heuristic score 0.0..=1.0, before timeframe and history adjustments
    pub confidence: f64,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
}

impl PatternMatch {
    /// Stamp the match with the window it came from.
    pub fn into_detection(self, timeframe: Timeframe, timestamp: DateTime<Utc>) -> PatternDetection {
        PatternDetection {
            pattern: self.pattern,
            direction: self.direction,
            confidence: self.confidence.clamp(0.0, 1.0),
            entry_price: self.entry_price,
            target_price: self.target_price,
            stop_loss: self.stop_loss,
            timeframe,
            timestamp,
        }
    }
}

/// A pattern found in one timeframe window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDetection {
    pub pattern: PatternType,
    pub direction: Direction,
    pub confidence: f64,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub timeframe: Timeframe,
    /// Timestamp of the last bar of the analysed window
    pub timestamp: DateTime<Utc>,
}

// ============================================================
// MARKET CONTEXT
// ============================================================

/// Market trend classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Trend {
    StrongUp,
    WeakUp,
    #[default]
    Sideways,
    WeakDown,
    StrongDown,
}

impl Trend {
    /// Classify a fractional price change.
    pub fn from_change(change: f64) -> Self {
        match change {
            c if c > 0.05 => Trend::StrongUp,
            c if c > 0.02 => Trend::WeakUp,
            c if c < -0.05 => Trend::StrongDown,
            c if c < -0.02 => Trend::WeakDown,
            _ => Trend::Sideways,
        }
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Trend::WeakDown | Trend::StrongDown)
    }

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Trend::WeakUp | Trend::StrongUp)
    }
}

/// Columns and trailing statistics of one window, shared by every detector
#[derive(Debug, Clone, Default)]
pub struct MarketContext {
    pub timeframe: Timeframe,
    pub opens: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
    /// Average volume of the bars before the last one
    pub avg_volume: f64,
    /// Average body size of the bars before the last one
    pub avg_body: f64,
    /// Average high-low range of the bars before the last one
    pub avg_range: f64,
    pub atr: Option<f64>,
    /// Trend over the trend period ending at the last bar
    pub trend: Trend,
    pub trend_period: usize,
}

impl MarketContext {
    #[inline]
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    #[inline]
    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    /// Trend over the trend period that ends `skip` bars before the last bar.
    ///
    /// Candlestick detectors use this to check the move leading into the pattern
    /// without the pattern bars themselves.
    pub fn trend_before(&self, skip: usize) -> Trend {
        let n = self.closes.len();
        if n < skip + self.trend_period + 1 || self.trend_period == 0 {
            return Trend::Sideways;
        }
        let end = n - 1 - skip;
        let start = end - self.trend_period;
        let first = self.closes[start];
        if first <= f64::EPSILON {
            return Trend::Sideways;
        }
        Trend::from_change((self.closes[end] - first) / first)
    }

    /// Mean volume of the `period` bars preceding the last `skip` bars.
    pub fn trailing_volume(&self, skip: usize, period: usize) -> Option<f64> {
        let n = self.volumes.len();
        if period == 0 || n < skip + period {
            return None;
        }
        let slice = &self.volumes[n - skip - period..n - skip];
        Some(slice.iter().sum::<f64>() / period as f64)
    }
}

/// Provider of market context for a window
pub trait ContextProvider: Send + Sync {
    fn compute<T: OHLCV>(&self, bars: &[T], timeframe: Timeframe) -> MarketContext;
}

/// Default context provider using trailing simple averages
#[derive(Debug, Clone)]
pub struct DefaultContextProvider {
    pub trend_period: Period,
    pub volume_period: Period,
    pub candle_period: Period,
    pub atr_period: Period,
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self {
            trend_period: Period::new_const(14),
            volume_period: Period::new_const(20),
            candle_period: Period::new_const(10),
            atr_period: Period::new_const(14),
        }
    }
}

impl ContextProvider for DefaultContextProvider {
    fn compute<T: OHLCV>(&self, bars: &[T], timeframe: Timeframe) -> MarketContext {
        let n = bars.len();
        let mut ctx = MarketContext {
            timeframe,
            opens: bars.iter().map(|b| b.open()).collect(),
            highs: bars.iter().map(|b| b.high()).collect(),
            lows: bars.iter().map(|b| b.low()).collect(),
            closes: bars.iter().map(|b| b.close()).collect(),
            volumes: bars.iter().map(|b| b.volume()).collect(),
            trend_period: self.trend_period.get(),
            ..MarketContext::default()
        };
        if n == 0 {
            return ctx;
        }

        let candles = trailing(bars, self.candle_period.get());
        let count = candles.len() as f64;
        ctx.avg_body = candles.iter().map(|b| b.body()).sum::<f64>() / count;
        ctx.avg_range = candles.iter().map(|b| b.range()).sum::<f64>() / count;

        let volume_slice = trailing(bars, self.volume_period.get());
        ctx.avg_volume =
            volume_slice.iter().map(|b| b.volume()).sum::<f64>() / volume_slice.len() as f64;

        ctx.atr = indicators::atr(&ctx.highs, &ctx.lows, &ctx.closes, self.atr_period.get());
        ctx.trend = ctx.trend_before(0);
        ctx
    }
}

/// Up to `period` bars before the last one. A single bar averages over itself.
fn trailing<T>(bars: &[T], period: usize) -> &[T] {
    let n = bars.len();
    if n <= 1 {
        bars
    } else {
        &bars[(n - 1).saturating_sub(period)..n - 1]
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Pattern detector over the end of a window
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn family(&self) -> PatternFamily;
    /// Shorter windows yield no detection
    fn min_bars(&self) -> usize;
    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - enum dispatch, no vtable
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, ctx)),*
                }
            }

            #[inline]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(d) => PatternDetector::name(d)),*
                }
            }

            #[inline]
            pub fn family(&self) -> PatternFamily {
                match self {
                    $(Self::$variant(d) => PatternDetector::family(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Breakout (6)
    RangeBreakout(RangeBreakoutDetector),
    Triangle(TriangleDetector),
    Flag(FlagDetector),
    Wedge(WedgeDetector),
    Channel(ChannelBreakoutDetector),
    SupportResistance(SupportResistanceDetector),

    // Reversal (6)
    DoubleTopBottom(DoubleTopBottomDetector),
    TripleTopBottom(TripleTopBottomDetector),
    HeadAndShoulders(HeadAndShouldersDetector),
    Divergence(DivergenceDetector),
    RoundingBottom(RoundingBottomDetector),
    VReversal(VReversalDetector),

    // Momentum (7)
    Rsi(RsiDetector),
    MacdCross(MacdCrossDetector),
    Stochastic(StochasticDetector),
    BollingerSqueeze(BollingerSqueezeDetector),
    BollingerBounce(BollingerBounceDetector),
    Ichimoku(IchimokuDetector),
    MomentumSurge(MomentumSurgeDetector),

    // Volume (4)
    VolumeBreakout(VolumeBreakoutDetector),
    VolumeDivergence(VolumeDivergenceDetector),
    AccumulationDistribution(AccumulationDistributionDetector),
    VolumeClimax(VolumeClimaxDetector),

    // Scalping (4)
    Vwap(VwapDetector),
    EmaScalpCross(EmaScalpCrossDetector),
    MicroPullback(MicroPullbackDetector),
    MomentumBurst(MomentumBurstDetector),

    // Options (4)
    GammaSqueeze(GammaSqueezeDetector),
    IvCrush(IvCrushDetector),
    PinRisk(PinRiskDetector),
    VolatilityExpansion(VolatilityExpansionDetector),

    // Single bar (5)
    Doji(DojiDetector),
    Hammer(HammerDetector),
    InvertedHammer(InvertedHammerDetector),
    Marubozu(MarubozuDetector),
    SpinningTop(SpinningTopDetector),

    // Two bar (4)
    Engulfing(EngulfingDetector),
    Harami(HaramiDetector),
    PiercingDarkCloud(PiercingDarkCloudDetector),
    Tweezer(TweezerDetector),

    // Three bar (3)
    Star(StarDetector),
    ThreeSoldiersCrows(ThreeSoldiersCrowsDetector),
    ThreeInside(ThreeInsideDetector),

    // Harmonic, chart geometry, waves
    Harmonic(HarmonicDetector),
    CupAndHandle(CupAndHandleDetector),
    Rectangle(RectangleDetector),
    Broadening(BroadeningDetector),
    ElliottWave(ElliottWaveDetector),
}

// ============================================================
// SIGNAL ENGINE
// ============================================================

/// Detections of one multi-timeframe pass
#[derive(Debug, Clone, Default)]
pub struct MultiTimeframeAnalysis {
    pub by_timeframe: BTreeMap<Timeframe, Vec<PatternDetection>>,
    /// Cross-timeframe detections. Empty when fewer than two timeframes were supplied.
    pub confluence: Vec<ConfluenceDetection>,
}

/// Main detection, scoring and signal engine
pub struct SignalEngine<C: ContextProvider = DefaultContextProvider> {
    detectors: Vec<BuiltinDetector>,
    context_provider: C,
    config: EngineConfig,
    scorer: ConfidenceScorer,
    confluence: ConfluenceAnalyzer,
    synthesizer: SignalSynthesizer,
    feedback: PerformanceStore,
}

impl<C: ContextProvider> SignalEngine<C> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.detectors
    }

    /// The outcome store consulted by the scorer.
    pub fn feedback(&self) -> &PerformanceStore {
        &self.feedback
    }

    #[inline]
    pub fn compute_context<T: OHLCV>(&self, bars: &[T], timeframe: Timeframe) -> MarketContext {
        self.context_provider.compute(bars, timeframe)
    }

    /// Opt-in check before analysis: the bar invariants hold and the window is
    /// long enough for at least one detector eligible on `timeframe`.
    pub fn check_window<T: OHLCV>(&self, bars: &[T], timeframe: Timeframe) -> Result<()> {
        validate_window(bars)?;
        let need = self
            .detectors
            .iter()
            .filter(|d| d.family().is_eligible(timeframe))
            .map(|d| d.min_bars())
            .min()
            .unwrap_or(0);
        if bars.len() < need {
            return Err(EngineError::InsufficientData {
                need,
                got: bars.len(),
            });
        }
        Ok(())
    }

    // ===========================================
    // DETECTION
    // ===========================================

    /// Run every eligible detector on the window, without scoring.
    ///
    /// Results are concatenated in detector order; confidences are the raw
    /// detector scores clamped to [0, 1].
    pub fn raw_detections<T: OHLCV>(&self, bars: &[T], timeframe: Timeframe) -> Vec<PatternDetection> {
        let Some(last) = bars.last() else {
            return Vec::new();
        };
        let timestamp = last.timestamp();
        let ctx = self.compute_context(bars, timeframe);

        self.detectors
            .iter()
            .filter(|d| d.family().is_eligible(timeframe) && bars.len() >= d.min_bars())
            .filter_map(|d| d.detect(bars, &ctx))
            .filter(|m| self.should_include(m))
            .map(|m| m.into_detection(timeframe, timestamp))
            .collect()
    }

    /// Scored and filtered detections for one timeframe.
    pub fn detect_patterns<T: OHLCV>(&self, bars: &[T], timeframe: Timeframe) -> Vec<PatternDetection> {
        let snapshot = self.feedback.snapshot();
        self.detect_with_snapshot(bars, timeframe, &snapshot)
    }

    fn detect_with_snapshot<T: OHLCV>(
        &self,
        bars: &[T],
        timeframe: Timeframe,
        snapshot: &PerformanceSnapshot,
    ) -> Vec<PatternDetection> {
        let raw = self.raw_detections(bars, timeframe);
        let raw_count = raw.len();
        let scored = self.scorer.score(raw, snapshot);
        log::debug!(
            "{timeframe}: {} bars, {raw_count} raw detections, {} after scoring",
            bars.len(),
            scored.len()
        );
        scored
    }

    /// Analyse several timeframes of the same instrument in one pass.
    ///
    /// All timeframes are scored against one feedback snapshot. With two or more
    /// timeframes the confluence stage adds cross-timeframe detections.
    pub fn analyze_multi_timeframe<T: OHLCV + Sync>(
        &self,
        windows: &BTreeMap<Timeframe, &[T]>,
    ) -> MultiTimeframeAnalysis
    where
        C: Sync,
    {
        let snapshot = self.feedback.snapshot();

        let results: Vec<(Timeframe, Vec<PatternDetection>, Option<TimeframeTrend>)> = windows
            .par_iter()
            .map(|(&timeframe, bars)| {
                let detections = self.detect_with_snapshot(*bars, timeframe, &snapshot);
                let trend = TimeframeTrend::from_window(*bars, timeframe);
                (timeframe, detections, trend)
            })
            .collect();

        let mut by_timeframe = BTreeMap::new();
        // a window too short for a trend voids the alignment check
        let mut trends = Some(Vec::with_capacity(results.len()));
        for (timeframe, detections, trend) in results {
            by_timeframe.insert(timeframe, detections);
            trends = trends.zip(trend).map(|(mut all, t)| {
                all.push(t);
                all
            });
        }

        let confluence = if by_timeframe.len() >= 2 {
            let mut found = self.confluence.analyze(&by_timeframe, &snapshot);
            if let Some(trends) = &trends {
                found.extend(self.confluence.trend_alignment(trends, &snapshot));
            }
            log::debug!(
                "confluence over {} timeframes: {} detections",
                by_timeframe.len(),
                found.len()
            );
            found
        } else {
            Vec::new()
        };

        MultiTimeframeAnalysis {
            by_timeframe,
            confluence,
        }
    }

    // ===========================================
    // SIGNALS
    // ===========================================

    /// Turn scored detections into actionable signals.
    pub fn generate_signals<U: InstrumentUniverse + ?Sized>(
        &self,
        detections: &[PatternDetection],
        universe: &U,
    ) -> Vec<TradingSignal> {
        self.synthesizer.synthesize(detections, universe)
    }

    /// Turn confluence detections into actionable signals.
    pub fn generate_confluence_signals<U: InstrumentUniverse + ?Sized>(
        &self,
        confluence: &[ConfluenceDetection],
        universe: &U,
    ) -> Vec<TradingSignal> {
        self.synthesizer.synthesize_confluence(confluence, universe)
    }

    // ===========================================
    // FEEDBACK
    // ===========================================

    /// Record the outcome of a trade that originated from `pattern`.
    pub fn record_outcome(&self, pattern: PatternType, was_successful: bool) {
        self.feedback.record_outcome(pattern, was_successful);
    }

    /// Historical success rate, 0.5 for patterns without outcomes.
    pub fn success_rate(&self, pattern: PatternType) -> f64 {
        self.feedback.success_rate(pattern)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn should_include(&self, m: &PatternMatch) -> bool {
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&m.pattern) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for d in &self.detectors {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating SignalEngine instances
pub struct EngineBuilder<C: ContextProvider = DefaultContextProvider> {
    context_provider: C,
    detectors: Vec<BuiltinDetector>,
    config: EngineConfig,
    feedback: PerformanceStore,
}

impl Default for EngineBuilder<DefaultContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DefaultContextProvider> {
    pub fn new() -> Self {
        Self {
            context_provider: DefaultContextProvider::default(),
            detectors: Vec::new(),
            config: EngineConfig::default(),
            feedback: PerformanceStore::new(),
        }
    }
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl<C: ContextProvider> EngineBuilder<C> {
    /// Change context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> EngineBuilder<C2> {
        EngineBuilder {
            context_provider: provider,
            detectors: self.detectors,
            config: self.config,
            feedback: self.feedback,
        }
    }

    /// Add every builtin family with default parameters
    pub fn with_all_defaults(self) -> Self {
        self.with_breakout_defaults()
            .with_reversal_defaults()
            .with_momentum_defaults()
            .with_volume_defaults()
            .with_scalping_defaults()
            .with_options_defaults()
            .with_candlestick_defaults()
            .with_harmonic_defaults()
            .with_chart_defaults()
            .with_wave_defaults()
    }

    pub fn with_breakout_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![
            RangeBreakout,
            Triangle,
            Flag,
            Wedge,
            Channel,
            SupportResistance,
        ]);
        self
    }

    pub fn with_reversal_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![
            DoubleTopBottom,
            TripleTopBottom,
            HeadAndShoulders,
            Divergence,
            RoundingBottom,
            VReversal,
        ]);
        self
    }

    pub fn with_momentum_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![
            Rsi,
            MacdCross,
            Stochastic,
            BollingerSqueeze,
            BollingerBounce,
            Ichimoku,
            MomentumSurge,
        ]);
        self
    }

    pub fn with_volume_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![
            VolumeBreakout,
            VolumeDivergence,
            AccumulationDistribution,
            VolumeClimax,
        ]);
        self
    }

    pub fn with_scalping_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![
            Vwap,
            EmaScalpCross,
            MicroPullback,
            MomentumBurst,
        ]);
        self
    }

    pub fn with_options_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![
            GammaSqueeze,
            IvCrush,
            PinRisk,
            VolatilityExpansion,
        ]);
        self
    }

    /// Single, two and three bar candlestick detectors
    pub fn with_candlestick_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![
            Doji,
            Hammer,
            InvertedHammer,
            Marubozu,
            SpinningTop,
            Engulfing,
            Harami,
            PiercingDarkCloud,
            Tweezer,
            Star,
            ThreeSoldiersCrows,
            ThreeInside,
        ]);
        self
    }

    pub fn with_harmonic_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![Harmonic]);
        self
    }

    pub fn with_chart_defaults(mut self) -> Self {
        self.detectors
            .extend(builtin_defaults![CupAndHandle, Rectangle, Broadening]);
        self
    }

    pub fn with_wave_defaults(mut self) -> Self {
        self.detectors.extend(builtin_defaults![ElliottWave]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.detectors.push(detector);
        Ok(self)
    }

    /// Replace the engine configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Report only these patterns
    pub fn only_patterns(mut self, patterns: impl IntoIterator<Item = PatternType>) -> Self {
        self.config.pattern_filter = Some(patterns.into_iter().collect());
        self
    }

    /// Start from previously persisted outcome records
    pub fn feedback(mut self, store: PerformanceStore) -> Self {
        self.feedback = store;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<SignalEngine<C>> {
        let engine = SignalEngine {
            detectors: self.detectors,
            context_provider: self.context_provider,
            scorer: ConfidenceScorer::new(self.config.scoring.clone()),
            confluence: ConfluenceAnalyzer::new(self.config.confluence.clone()),
            synthesizer: SignalSynthesizer::new(self.config.signals.clone()),
            config: self.config,
            feedback: self.feedback,
        };
        engine.validate()?;
        Ok(engine)
    }
}

/// Default engine with DefaultContextProvider
pub type DefaultEngine = SignalEngine<DefaultContextProvider>;

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap() + chrono::Duration::minutes(i)
    }

    fn bar(i: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar::new(o, h, l, c, 1_000, ts(i))
    }

    fn make_downtrend_bars() -> Vec<Bar> {
        (0..20)
            .map(|i| {
                let base = 100.0 - i as f64 * 2.0;
                bar(i, base, base + 1.0, base - 1.0, base - 0.5)
            })
            .collect()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let b = bar(0, 100.0, 110.0, 90.0, 105.0);
        assert_eq!(b.body(), 5.0);
        assert_eq!(b.range(), 20.0);
        assert!(b.is_bullish());
        assert!(!b.is_bearish());
        assert!((b.body_ratio().unwrap() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_validate_window() {
        let good = make_downtrend_bars();
        assert!(validate_window(&good).is_ok());

        let mut bad = good.clone();
        bad[3].high = bad[3].low - 1.0;
        assert!(matches!(
            validate_window(&bad),
            Err(EngineError::InvalidBar { index: 3, .. })
        ));

        let mut unordered = good;
        unordered[5].timestamp = unordered[4].timestamp;
        assert!(matches!(
            validate_window(&unordered),
            Err(EngineError::UnorderedBars { index: 5 })
        ));
    }

    #[test]
    fn test_context_excludes_last_bar() {
        let mut bars: Vec<Bar> = (0..21).map(|i| bar(i, 100.0, 101.0, 99.0, 100.5)).collect();
        bars[20].volume = 10_000;
        let ctx = DefaultContextProvider::default().compute(&bars, Timeframe::FiveMinutes);
        assert_eq!(ctx.len(), 21);
        assert!((ctx.avg_volume - 1_000.0).abs() < 1e-9);
        assert!((ctx.avg_range - 2.0).abs() < 1e-9);
        assert_eq!(ctx.timeframe, Timeframe::FiveMinutes);
    }

    #[test]
    fn test_trend_before() {
        let bars = make_downtrend_bars();
        let ctx = DefaultContextProvider::default().compute(&bars, Timeframe::OneMinute);
        assert!(ctx.trend.is_down());
        assert!(ctx.trend_before(3).is_down());
        assert_eq!(ctx.trend_before(15), Trend::Sideways);
    }

    #[test]
    fn test_engine_builder() {
        let engine = EngineBuilder::new().with_all_defaults().build();
        assert!(engine.is_ok());
        assert_eq!(engine.unwrap().detectors().len(), 48);
    }

    #[test]
    fn test_empty_window() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars: Vec<Bar> = vec![];
        assert!(engine.detect_patterns(&bars, Timeframe::OneMinute).is_empty());
    }

    #[test]
    fn test_short_window_yields_nothing_and_never_panics() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        for len in 1..6 {
            let bars: Vec<Bar> = make_downtrend_bars().into_iter().take(len).collect();
            for tf in [Timeframe::OneMinute, Timeframe::OneHour] {
                let _ = engine.raw_detections(&bars, tf);
            }
        }
    }

    #[test]
    fn test_pattern_filter() {
        let mut bars = make_downtrend_bars();
        bars.push(bar(20, 60.0, 60.1, 55.0, 60.05));

        let engine = EngineBuilder::new()
            .with_candlestick_defaults()
            .only_patterns([PatternType::Marubozu])
            .build()
            .unwrap();
        assert!(engine
            .raw_detections(&bars, Timeframe::FifteenMinutes)
            .iter()
            .all(|d| d.pattern == PatternType::Marubozu));
    }

    #[test]
    fn test_scalping_only_on_short_timeframes() {
        let bars: Vec<Bar> = (0..40)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.5).sin() * 2.0;
                bar(i, base, base + 0.8, base - 0.8, base + 0.3)
            })
            .collect();
        let engine = EngineBuilder::new().with_scalping_defaults().build().unwrap();
        assert!(engine.raw_detections(&bars, Timeframe::OneHour).is_empty());
    }

    #[test]
    fn test_hammer_detection() {
        let mut bars = make_downtrend_bars();
        bars.push(bar(20, 60.0, 60.1, 55.0, 60.05));

        let engine = EngineBuilder::new()
            .add(BuiltinDetector::Hammer(HammerDetector::with_defaults()))
            .build()
            .unwrap();

        let found = engine.raw_detections(&bars, Timeframe::FifteenMinutes);
        assert!(found.iter().any(|d| d.pattern == PatternType::Hammer));
    }

    #[test]
    fn test_check_window() {
        let engine = EngineBuilder::new().with_breakout_defaults().build().unwrap();
        let bars = make_downtrend_bars();
        assert!(engine.check_window(&bars, Timeframe::FiveMinutes).is_ok());
        assert!(matches!(
            engine.check_window(&bars[..10], Timeframe::FiveMinutes),
            Err(EngineError::InsufficientData { need: 13, got: 10 })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.signals.ttl_secs = 0;
        assert!(EngineBuilder::new().config(config).build().is_err());
    }
}
