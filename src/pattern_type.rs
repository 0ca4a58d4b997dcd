//! Closed pattern catalog with its family and directional-bias tables

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{Direction, Timeframe};

/// Detector family. Decides which timeframes a detector runs on and how its
/// detections map to signal types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatternFamily {
    Breakout,
    Reversal,
    Momentum,
    Volume,
    Scalping,
    Options,
    CandlestickSingle,
    CandlestickDouble,
    CandlestickTriple,
    Harmonic,
    Chart,
    Wave,
    MultiTimeframe,
}

impl PatternFamily {
    /// Whether detectors of this family run on `timeframe`.
    ///
    /// Harmonic and wave counts need enough swing structure that one-minute
    /// bars are excluded; multi-timeframe patterns are produced by the
    /// confluence stage, never by a single-window detector.
    pub fn is_eligible(self, timeframe: Timeframe) -> bool {
        match self {
            PatternFamily::Scalping => timeframe.is_scalping(),
            PatternFamily::Harmonic | PatternFamily::Wave => timeframe >= Timeframe::FiveMinutes,
            PatternFamily::MultiTimeframe => false,
            _ => true,
        }
    }

    pub fn is_candlestick(self) -> bool {
        matches!(
            self,
            PatternFamily::CandlestickSingle
                | PatternFamily::CandlestickDouble
                | PatternFamily::CandlestickTriple
        )
    }
}

/// Every pattern the engine can report
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    EnumCount,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatternType {
    // Breakout
    RangeBreakout,
    AscendingTriangle,
    DescendingTriangle,
    SymmetricalTriangle,
    BullFlag,
    BearFlag,
    Pennant,
    RisingWedge,
    FallingWedge,
    ChannelBreakout,
    SupportBreak,
    ResistanceBreak,

    // Reversal
    DoubleTop,
    DoubleBottom,
    TripleTop,
    TripleBottom,
    HeadAndShoulders,
    InverseHeadAndShoulders,
    BullishDivergence,
    BearishDivergence,
    RoundingBottom,
    VReversal,

    // Momentum
    RsiOversold,
    RsiOverbought,
    MacdBullishCross,
    MacdBearishCross,
    StochasticOversold,
    StochasticOverbought,
    BollingerSqueeze,
    BollingerBandBounce,
    IchimokuBullish,
    IchimokuBearish,
    MomentumSurge,

    // Volume
    VolumeBreakout,
    VolumeDivergence,
    Accumulation,
    Distribution,
    VolumeClimax,

    // Scalping
    VwapReclaim,
    VwapRejection,
    EmaScalpCross,
    MicroPullback,
    MomentumBurst,

    // Options
    GammaSqueeze,
    IvCrush,
    PinRisk,
    VolatilityExpansion,

    // Candlestick, single bar
    Doji,
    DragonflyDoji,
    GravestoneDoji,
    Hammer,
    HangingMan,
    InvertedHammer,
    ShootingStar,
    Marubozu,
    SpinningTop,

    // Candlestick, two bars
    BullishEngulfing,
    BearishEngulfing,
    BullishHarami,
    BearishHarami,
    PiercingLine,
    DarkCloudCover,
    TweezerTop,
    TweezerBottom,

    // Candlestick, three bars
    MorningStar,
    EveningStar,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
    ThreeInsideUp,
    ThreeInsideDown,

    // Harmonic
    Gartley,
    Butterfly,
    Bat,
    Crab,
    Abcd,

    // Chart geometry
    CupAndHandle,
    Rectangle,
    BroadeningFormation,

    // Wave counting
    ElliottImpulse,
    ElliottCorrection,

    // Multi-timeframe
    MultiTimeframeTrend,
    MultiTimeframeConvergence,
}

impl PatternType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn family(self) -> PatternFamily {
        use PatternType::*;
        match self {
            RangeBreakout | AscendingTriangle | DescendingTriangle | SymmetricalTriangle
            | BullFlag | BearFlag | Pennant | RisingWedge | FallingWedge | ChannelBreakout
            | SupportBreak | ResistanceBreak => PatternFamily::Breakout,

            DoubleTop | DoubleBottom | TripleTop | TripleBottom | HeadAndShoulders
            | InverseHeadAndShoulders | BullishDivergence | BearishDivergence | RoundingBottom
            | VReversal => PatternFamily::Reversal,

            RsiOversold | RsiOverbought | MacdBullishCross | MacdBearishCross
            | StochasticOversold | StochasticOverbought | BollingerSqueeze
            | BollingerBandBounce | IchimokuBullish | IchimokuBearish | MomentumSurge => {
                PatternFamily::Momentum
            }

            VolumeBreakout | VolumeDivergence | Accumulation | Distribution | VolumeClimax => {
                PatternFamily::Volume
            }

            VwapReclaim | VwapRejection | EmaScalpCross | MicroPullback | MomentumBurst => {
                PatternFamily::Scalping
            }

            GammaSqueeze | IvCrush | PinRisk | VolatilityExpansion => PatternFamily::Options,

            Doji | DragonflyDoji | GravestoneDoji | Hammer | HangingMan | InvertedHammer
            | ShootingStar | Marubozu | SpinningTop => PatternFamily::CandlestickSingle,

            BullishEngulfing | BearishEngulfing | BullishHarami | BearishHarami | PiercingLine
            | DarkCloudCover | TweezerTop | TweezerBottom => PatternFamily::CandlestickDouble,

            MorningStar | EveningStar | ThreeWhiteSoldiers | ThreeBlackCrows | ThreeInsideUp
            | ThreeInsideDown => PatternFamily::CandlestickTriple,

            Gartley | Butterfly | Bat | Crab | Abcd => PatternFamily::Harmonic,

            CupAndHandle | Rectangle | BroadeningFormation => PatternFamily::Chart,

            ElliottImpulse | ElliottCorrection => PatternFamily::Wave,

            MultiTimeframeTrend | MultiTimeframeConvergence => PatternFamily::MultiTimeframe,
        }
    }

    /// Expected direction of this pattern.
    ///
    /// - `Some(Direction::Bullish)` / `Some(Direction::Bearish)` - one-sided pattern
    /// - `Some(Direction::Neutral)` - no directional bias
    /// - `None` - bidirectional, the geometry decides
    ///
    /// Detectors only report a one-sided pattern when the geometry agrees with its bias.
    pub fn bias(self) -> Option<Direction> {
        use PatternType::*;
        match self {
            AscendingTriangle | BullFlag | FallingWedge | ResistanceBreak | DoubleBottom
            | TripleBottom | InverseHeadAndShoulders | BullishDivergence | RoundingBottom
            | RsiOversold | MacdBullishCross | StochasticOversold | IchimokuBullish
            | Accumulation | VwapReclaim | DragonflyDoji | Hammer | InvertedHammer
            | BullishEngulfing | BullishHarami | PiercingLine | TweezerBottom | MorningStar
            | ThreeWhiteSoldiers | ThreeInsideUp | CupAndHandle => Some(Direction::Bullish),

            DescendingTriangle | BearFlag | RisingWedge | SupportBreak | DoubleTop
            | TripleTop | HeadAndShoulders | BearishDivergence | RsiOverbought
            | MacdBearishCross | StochasticOverbought | IchimokuBearish | Distribution
            | VwapRejection | GravestoneDoji | HangingMan | ShootingStar | BearishEngulfing
            | BearishHarami | DarkCloudCover | TweezerTop | EveningStar | ThreeBlackCrows
            | ThreeInsideDown => Some(Direction::Bearish),

            IvCrush | PinRisk | Doji | SpinningTop => Some(Direction::Neutral),

            RangeBreakout | SymmetricalTriangle | Pennant | ChannelBreakout | VReversal
            | BollingerSqueeze | BollingerBandBounce | MomentumSurge | VolumeBreakout
            | VolumeDivergence | VolumeClimax | EmaScalpCross | MicroPullback
            | MomentumBurst | GammaSqueeze | VolatilityExpansion | Marubozu | Gartley
            | Butterfly | Bat | Crab | Abcd | Rectangle | BroadeningFormation
            | ElliottImpulse | ElliottCorrection | MultiTimeframeTrend
            | MultiTimeframeConvergence => None,
        }
    }

    /// Returns true if the geometry decides the direction.
    pub fn is_bidirectional(self) -> bool {
        self.bias().is_none()
    }

    /// Whether a detection in `direction` is consistent with this pattern's bias.
    pub fn admits(self, direction: Direction) -> bool {
        match self.bias() {
            Some(bias) => bias == direction,
            None => true,
        }
    }
}
