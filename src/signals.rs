//! Signal synthesis: gate, signal type mapping, instrument selection, expiry

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::SignalConfig, ConfluenceDetection, Direction, PatternDetection, PatternFamily,
    PatternType, Timeframe,
};

// ============================================================
// INSTRUMENTS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionClass {
    Call,
    Put,
}

/// One tradeable option contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub strike: f64,
    pub class: OptionClass,
    pub current_price: f64,
}

/// Opaque reference to the instrument a signal trades
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentRef(pub String);

impl std::fmt::Display for InstrumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of contracts signals can be attached to
pub trait InstrumentUniverse {
    fn underlying_price(&self) -> f64;
    fn contracts(&self) -> &[OptionContract];

    /// Contract of `class` whose strike is closest to the underlying.
    /// Equidistant strikes resolve to the lower one.
    fn select(&self, class: OptionClass) -> Option<&OptionContract> {
        let underlying = self.underlying_price();
        let mut candidates = self.contracts().iter().filter(|c| c.class == class);
        let mut best = candidates.next()?;
        for c in candidates {
            let d_best = (best.strike - underlying).abs();
            let d = (c.strike - underlying).abs();
            if d < d_best || (d == d_best && c.strike < best.strike) {
                best = c;
            }
        }
        Some(best)
    }
}

/// Snapshot of an option chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying_price: f64,
    pub contracts: Vec<OptionContract>,
}

impl OptionChain {
    pub fn new(underlying_price: f64, contracts: Vec<OptionContract>) -> Self {
        Self {
            underlying_price,
            contracts,
        }
    }
}

impl InstrumentUniverse for OptionChain {
    fn underlying_price(&self) -> f64 {
        self.underlying_price
    }

    fn contracts(&self) -> &[OptionContract] {
        &self.contracts
    }
}

// ============================================================
// SIGNALS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SignalType {
    BreakoutBuy,
    BreakdownSell,
    ReversalBuy,
    ReversalSell,
    MomentumBuy,
    MomentumSell,
    Scalping,
}

impl SignalType {
    /// Map a pattern family and direction to a signal type. Unmapped pairs are `Scalping`.
    pub fn classify(family: PatternFamily, direction: Direction) -> Self {
        use PatternFamily::*;
        match (family, direction) {
            (Breakout | Chart, Direction::Bullish) => SignalType::BreakoutBuy,
            (Breakout | Chart, Direction::Bearish) => SignalType::BreakdownSell,
            (
                Reversal | Harmonic | CandlestickSingle | CandlestickDouble | CandlestickTriple,
                Direction::Bullish,
            ) => SignalType::ReversalBuy,
            (
                Reversal | Harmonic | CandlestickSingle | CandlestickDouble | CandlestickTriple,
                Direction::Bearish,
            ) => SignalType::ReversalSell,
            (Momentum | Wave, Direction::Bullish) => SignalType::MomentumBuy,
            (Momentum | Wave, Direction::Bearish) => SignalType::MomentumSell,
            _ => SignalType::Scalping,
        }
    }
}

/// An actionable trade idea
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    /// `None` when no contract of the needed class exists or the signal is neutral
    pub instrument: Option<InstrumentRef>,
    pub signal_type: SignalType,
    pub direction: Direction,
    pub confidence: f64,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub timeframe: Timeframe,
    pub contributing_patterns: BTreeSet<PatternType>,
    pub timestamp: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl TradingSignal {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Not yet expired and bound to an instrument
    pub fn is_actionable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.instrument.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalSynthesizer {
    config: SignalConfig,
}

impl SignalSynthesizer {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.config.ttl_secs as i64)
    }

    /// Signals for every detection above the gate, strongest first.
    pub fn synthesize<U: InstrumentUniverse + ?Sized>(
        &self,
        detections: &[PatternDetection],
        universe: &U,
    ) -> Vec<TradingSignal> {
        let mut signals: Vec<TradingSignal> = detections
            .iter()
            .filter(|d| self.passes_gate(d.pattern, d.confidence))
            .map(|d| self.build(d, BTreeSet::from([d.pattern]), universe))
            .collect();
        sort_by_confidence(&mut signals);
        signals
    }

    /// Signals for confluence detections. They carry the multi-timeframe
    /// convergence tag next to the confirmed pattern.
    pub fn synthesize_confluence<U: InstrumentUniverse + ?Sized>(
        &self,
        confluence: &[ConfluenceDetection],
        universe: &U,
    ) -> Vec<TradingSignal> {
        let mut signals: Vec<TradingSignal> = confluence
            .iter()
            .filter(|c| self.passes_gate(c.pattern, c.confidence))
            .map(|c| {
                let patterns =
                    BTreeSet::from([c.pattern, PatternType::MultiTimeframeConvergence]);
                self.build(&c.to_detection(), patterns, universe)
            })
            .collect();
        sort_by_confidence(&mut signals);
        signals
    }

    fn passes_gate(&self, pattern: PatternType, confidence: f64) -> bool {
        if confidence > self.config.min_confidence {
            return true;
        }
        log::trace!("{pattern} at {confidence:.3} below signal gate");
        false
    }

    fn build<U: InstrumentUniverse + ?Sized>(
        &self,
        d: &PatternDetection,
        contributing_patterns: BTreeSet<PatternType>,
        universe: &U,
    ) -> TradingSignal {
        let class = match d.direction {
            Direction::Bullish => Some(OptionClass::Call),
            Direction::Bearish => Some(OptionClass::Put),
            Direction::Neutral => None,
        };
        let instrument = class.and_then(|class| {
            let found = universe.select(class).map(|c| InstrumentRef(c.symbol.clone()));
            if found.is_none() {
                log::warn!(
                    "no {class:?} contract for {} near {}",
                    d.pattern,
                    universe.underlying_price()
                );
            }
            found
        });

        TradingSignal {
            instrument,
            signal_type: SignalType::classify(d.pattern.family(), d.direction),
            direction: d.direction,
            confidence: d.confidence,
            entry_price: d.entry_price,
            target_price: d.target_price,
            stop_loss: d.stop_loss,
            timeframe: d.timeframe,
            contributing_patterns,
            timestamp: d.timestamp,
            expiry: d.timestamp + self.ttl(),
        }
    }
}

/// Strongest first; the sort is stable so equal confidences keep their input order.
fn sort_by_confidence(signals: &mut [TradingSignal]) {
    signals.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn contract(symbol: &str, strike: f64, class: OptionClass) -> OptionContract {
        OptionContract {
            symbol: symbol.to_string(),
            strike,
            class,
            current_price: 10.0,
        }
    }

    fn chain() -> OptionChain {
        OptionChain::new(
            18_040.0,
            vec![
                contract("C18000", 18_000.0, OptionClass::Call),
                contract("C18050", 18_050.0, OptionClass::Call),
                contract("P18000", 18_000.0, OptionClass::Put),
                contract("P18100", 18_100.0, OptionClass::Put),
            ],
        )
    }

    fn detection(pattern: PatternType, direction: Direction, confidence: f64) -> PatternDetection {
        PatternDetection {
            pattern,
            direction,
            confidence,
            entry_price: 18_040.0,
            target_price: 18_200.0,
            stop_loss: 17_980.0,
            timeframe: Timeframe::FiveMinutes,
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_atm_selection() {
        let chain = chain();
        assert_eq!(chain.select(OptionClass::Call).unwrap().symbol, "C18050");
        // no 18050 put: 18000 is 40 away, 18100 is 60 away
        assert_eq!(chain.select(OptionClass::Put).unwrap().symbol, "P18000");
        assert!(OptionChain::new(100.0, vec![]).select(OptionClass::Call).is_none());
    }

    #[test]
    fn test_nearest_strike_when_grid_strike_missing() {
        // 18050 is not listed; 18100 is 30 away, 18000 is 70 away
        let chain = OptionChain::new(
            18_070.0,
            vec![
                contract("C18000", 18_000.0, OptionClass::Call),
                contract("C18100", 18_100.0, OptionClass::Call),
            ],
        );
        assert_eq!(chain.select(OptionClass::Call).unwrap().symbol, "C18100");
    }

    #[test]
    fn test_host_universe_with_off_grid_strikes() {
        struct Listed(Vec<OptionContract>);

        impl InstrumentUniverse for Listed {
            fn underlying_price(&self) -> f64 {
                124.0
            }

            fn contracts(&self) -> &[OptionContract] {
                &self.0
            }
        }

        let listed = Listed(vec![
            contract("C100", 100.0, OptionClass::Call),
            contract("C124", 124.0, OptionClass::Call),
            contract("C125", 125.0, OptionClass::Call),
        ]);
        assert_eq!(listed.select(OptionClass::Call).unwrap().symbol, "C124");
    }

    #[test]
    fn test_equidistant_strikes_take_the_lower() {
        let chain = OptionChain::new(
            18_050.0,
            vec![
                contract("P18100", 18_100.0, OptionClass::Put),
                contract("P18000", 18_000.0, OptionClass::Put),
            ],
        );
        assert_eq!(chain.select(OptionClass::Put).unwrap().symbol, "P18000");
    }

    #[test]
    fn test_signal_type_mapping() {
        use PatternFamily::*;
        assert_eq!(SignalType::classify(Breakout, Direction::Bullish), SignalType::BreakoutBuy);
        assert_eq!(SignalType::classify(Chart, Direction::Bearish), SignalType::BreakdownSell);
        assert_eq!(
            SignalType::classify(CandlestickDouble, Direction::Bearish),
            SignalType::ReversalSell
        );
        assert_eq!(SignalType::classify(Momentum, Direction::Bullish), SignalType::MomentumBuy);
        assert_eq!(SignalType::classify(Volume, Direction::Bullish), SignalType::Scalping);
        assert_eq!(SignalType::classify(Breakout, Direction::Neutral), SignalType::Scalping);
    }

    #[test]
    fn test_gate_and_order() {
        let synth = SignalSynthesizer::default();
        let signals = synth.synthesize(
            &[
                detection(PatternType::BullFlag, Direction::Bullish, 0.7),
                detection(PatternType::Hammer, Direction::Bullish, 0.6),
                detection(PatternType::DoubleTop, Direction::Bearish, 0.9),
            ],
            &chain(),
        );
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].signal_type, SignalType::ReversalSell);
        assert_eq!(signals[0].instrument, Some(InstrumentRef("P18000".to_string())));
        assert_eq!(signals[1].signal_type, SignalType::BreakoutBuy);
        assert_eq!(signals[1].instrument, Some(InstrumentRef("C18050".to_string())));
    }

    #[test]
    fn test_expiry() {
        let synth = SignalSynthesizer::default();
        let d = detection(PatternType::BullFlag, Direction::Bullish, 0.8);
        let signal = synth.synthesize(&[d.clone()], &chain()).remove(0);
        assert_eq!(signal.expiry - signal.timestamp, Duration::minutes(30));
        assert!(signal.is_actionable(d.timestamp + Duration::minutes(29)));
        assert!(signal.is_expired(d.timestamp + Duration::minutes(30)));
        assert!(!signal.is_actionable(d.timestamp + Duration::hours(1)));
    }

    #[test]
    fn test_neutral_signal_has_no_instrument() {
        let synth = SignalSynthesizer::default();
        let signals = synth.synthesize(
            &[detection(PatternType::PinRisk, Direction::Neutral, 0.8)],
            &chain(),
        );
        assert_eq!(signals[0].signal_type, SignalType::Scalping);
        assert!(signals[0].instrument.is_none());
    }
}
