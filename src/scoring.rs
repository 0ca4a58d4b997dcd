//! Confidence scoring: timeframe weighting, historical blend, clamp and noise floor

use crate::{config::ScoringConfig, feedback::PerformanceSnapshot, PatternDetection};

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Adjusted confidence of one raw detection, before the noise floor.
    ///
    /// The timeframe multiplier applies first; a recorded success rate then
    /// scales the result by `0.5 + rate`, so a 50% history is neutral.
    pub fn adjust(&self, detection: &PatternDetection, snapshot: &PerformanceSnapshot) -> f64 {
        let mut confidence = detection.confidence * detection.timeframe.reliability();
        if let Some(rate) = snapshot.recorded_rate(detection.pattern) {
            confidence *= 0.5 + rate;
        }
        if confidence.is_nan() {
            return 0.0;
        }
        confidence.clamp(0.0, self.config.confidence_ceiling)
    }

    /// Score every detection and drop those at or below the noise floor.
    pub fn score(
        &self,
        detections: Vec<PatternDetection>,
        snapshot: &PerformanceSnapshot,
    ) -> Vec<PatternDetection> {
        detections
            .into_iter()
            .filter_map(|mut d| {
                d.confidence = self.adjust(&d, snapshot);
                if d.confidence <= self.config.noise_floor {
                    log::trace!(
                        "dropping {} on {} at {:.3}",
                        d.pattern,
                        d.timeframe,
                        d.confidence
                    );
                    return None;
                }
                Some(d)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, PatternType, PerformanceStore, Timeframe};
    use chrono::{TimeZone, Utc};

    fn detection(pattern: PatternType, confidence: f64, timeframe: Timeframe) -> PatternDetection {
        PatternDetection {
            pattern,
            direction: Direction::Bullish,
            confidence,
            entry_price: 100.0,
            target_price: 104.0,
            stop_loss: 98.0,
            timeframe,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_timeframe_multiplier() {
        let scorer = ConfidenceScorer::default();
        let snapshot = PerformanceSnapshot::default();
        let d = detection(PatternType::BullFlag, 0.5, Timeframe::OneMinute);
        assert!((scorer.adjust(&d, &snapshot) - 0.4).abs() < 1e-12);
        let d = detection(PatternType::BullFlag, 0.5, Timeframe::OneHour);
        assert!((scorer.adjust(&d, &snapshot) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_ceiling_and_floor() {
        let scorer = ConfidenceScorer::default();
        let snapshot = PerformanceSnapshot::default();
        let out = scorer.score(
            vec![
                detection(PatternType::BullFlag, 1.0, Timeframe::OneHour),
                detection(PatternType::Hammer, 0.3, Timeframe::FifteenMinutes),
                detection(PatternType::Doji, 0.35, Timeframe::OneMinute),
            ],
            &snapshot,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confidence, 0.95);
    }

    #[test]
    fn test_history_blend() {
        let store = PerformanceStore::new();
        for _ in 0..3 {
            store.record_outcome(PatternType::BullFlag, true);
        }
        store.record_outcome(PatternType::BullFlag, false);
        let scorer = ConfidenceScorer::default();
        let d = detection(PatternType::BullFlag, 0.5, Timeframe::FifteenMinutes);
        // 0.5 * 1.0 * (0.5 + 0.75)
        assert!((scorer.adjust(&d, &store.snapshot()) - 0.625).abs() < 1e-12);
    }
}
