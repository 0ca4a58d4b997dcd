//! Property tests for scoring, confluence, feedback and indicator bounds.

use chrono::{Duration, TimeZone, Utc};
use confluence::indicators;
use confluence::prelude::*;
use proptest::prelude::*;
use strum::IntoEnumIterator;

fn timeframe_strategy() -> impl Strategy<Value = Timeframe> {
    prop::sample::select(Timeframe::iter().collect::<Vec<_>>())
}

fn detection(confidence: f64, timeframe: Timeframe) -> PatternDetection {
    PatternDetection {
        pattern: PatternType::BullFlag,
        direction: Direction::Bullish,
        confidence,
        entry_price: 100.0,
        target_price: 105.0,
        stop_loss: 98.0,
        timeframe,
        timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap(),
    }
}

/// Random walk of valid bars
fn bars_strategy(len: usize) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-1.5f64..1.5, 0.0f64..1.0, 0.0f64..1.0, 100u64..5_000), len).prop_map(
        |steps| {
            let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
            let mut close = 100.0;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (step, up, down, volume))| {
                    let open = close;
                    close = (close + step).max(1.0);
                    Bar::new(
                        open,
                        open.max(close) + up,
                        open.min(close) - down.min(open.min(close) * 0.5),
                        close,
                        volume,
                        t0 + Duration::minutes(5 * i as i64),
                    )
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn prop_scored_confidence_is_bounded(
        raw in prop::collection::vec((0.0f64..=1.0, timeframe_strategy()), 0..20),
        wins in 0u32..10,
        losses in 0u32..10,
    ) {
        let store = PerformanceStore::new();
        for _ in 0..wins {
            store.record_outcome(PatternType::BullFlag, true);
        }
        for _ in 0..losses {
            store.record_outcome(PatternType::BullFlag, false);
        }
        let detections: Vec<PatternDetection> =
            raw.iter().map(|&(c, tf)| detection(c, tf)).collect();
        let scored = ConfidenceScorer::default().score(detections, &store.snapshot());
        prop_assert!(scored.len() <= raw.len());
        for d in scored {
            prop_assert!(d.confidence > 0.3);
            prop_assert!(d.confidence <= 0.95);
        }
    }

    #[test]
    fn prop_confluence_formula(confidences in prop::collection::vec(0.0f64..=1.0, 1..8)) {
        let analyzer = ConfluenceAnalyzer::default();
        let n = confidences.len() as f64;
        let mean = confidences.iter().sum::<f64>() / n;
        let expected = (mean + (0.1 * n).min(0.3)).clamp(0.0, 1.0);
        let got = analyzer.boosted_confidence(&confidences);
        prop_assert!((got - expected).abs() < 1e-12);
        prop_assert!(got >= mean.min(1.0) - 1e-12);
    }

    #[test]
    fn prop_success_rate_matches_counts(outcomes in prop::collection::vec(any::<bool>(), 1..50)) {
        let store = PerformanceStore::new();
        for &ok in &outcomes {
            store.record_outcome(PatternType::Hammer, ok);
        }
        let wins = outcomes.iter().filter(|&&ok| ok).count() as f64;
        let rate = store.success_rate(PatternType::Hammer);
        prop_assert!((rate - wins / outcomes.len() as f64).abs() < 1e-12);
        let record = store.record(PatternType::Hammer).unwrap();
        prop_assert_eq!(record.total_trades as usize, outcomes.len());
        prop_assert!(record.successful_trades <= record.total_trades);
    }

    #[test]
    fn prop_rsi_is_bounded(closes in prop::collection::vec(1.0f64..200.0, 15..80)) {
        for value in indicators::rsi_series(&closes, 14) {
            prop_assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn prop_rsi_of_rising_series_is_100(start in 1.0f64..100.0, step in 0.01f64..5.0) {
        let closes: Vec<f64> = (0..30).map(|i| start + step * i as f64).collect();
        prop_assert_eq!(indicators::rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn prop_stochastic_is_bounded(bars in bars_strategy(30)) {
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        for value in indicators::stochastic_series(&highs, &lows, &closes, 14) {
            prop_assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn prop_engine_output_is_admissible(bars in bars_strategy(60), tf in timeframe_strategy()) {
        prop_assert!(validate_window(&bars).is_ok());
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        for d in engine.detect_patterns(&bars, tf) {
            prop_assert!(d.confidence > 0.3 && d.confidence <= 0.95);
            prop_assert!(d.pattern.admits(d.direction));
            prop_assert!(d.pattern.family().is_eligible(tf));
            prop_assert_eq!(d.timeframe, tf);
            prop_assert!(d.entry_price.is_finite());
        }
    }
}
