//! Cross-timeframe confirmation
//!
//! A `(pattern, direction)` pair reported on two or more timeframes produces a
//! confluence detection with boosted confidence. The per-timeframe detections
//! it was built from stay in the analysis output.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::ConfluenceConfig, feedback::PerformanceSnapshot, indicators, Direction, PatternDetection,
    PatternType, Timeframe, OHLCV,
};

/// Closes used for the per-timeframe trend slope
pub const TREND_LOOKBACK: usize = 20;

/// A pattern confirmed on several timeframes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceDetection {
    pub pattern: PatternType,
    pub direction: Direction,
    pub confidence: f64,
    pub timeframes: BTreeSet<Timeframe>,
    /// Number of contributing detections
    pub occurrences: usize,
    /// Historical success rate with the confluence bump applied
    pub success_rate: f64,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub timestamp: DateTime<Utc>,
}

impl ConfluenceDetection {
    /// Longest contributing timeframe
    pub fn anchor_timeframe(&self) -> Timeframe {
        self.timeframes.last().copied().unwrap_or_default()
    }

    /// View as a single detection stamped with the anchor timeframe.
    pub fn to_detection(&self) -> PatternDetection {
        PatternDetection {
            pattern: self.pattern,
            direction: self.direction,
            confidence: self.confidence,
            entry_price: self.entry_price,
            target_price: self.target_price,
            stop_loss: self.stop_loss,
            timeframe: self.anchor_timeframe(),
            timestamp: self.timestamp,
        }
    }
}

/// Regression trend of one timeframe window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeframeTrend {
    pub timeframe: Timeframe,
    /// Slope of the last closes, as a fraction of the last close per bar
    pub slope: f64,
    pub last_close: f64,
    pub timestamp: DateTime<Utc>,
}

impl TimeframeTrend {
    pub fn from_window<T: OHLCV>(bars: &[T], timeframe: Timeframe) -> Option<Self> {
        if bars.len() < TREND_LOOKBACK {
            return None;
        }
        let tail = &bars[bars.len() - TREND_LOOKBACK..];
        let closes: Vec<f64> = tail.iter().map(|b| b.close()).collect();
        let line = indicators::linear_regression(&closes)?;
        let last = tail.last()?;
        let last_close = last.close();
        if last_close <= 0.0 {
            return None;
        }
        Some(Self {
            timeframe,
            slope: line.slope / last_close,
            last_close,
            timestamp: last.timestamp(),
        })
    }

    pub fn direction(&self) -> Direction {
        if self.slope > 0.0 {
            Direction::Bullish
        } else if self.slope < 0.0 {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfluenceAnalyzer {
    config: ConfluenceConfig,
}

impl ConfluenceAnalyzer {
    pub fn new(config: ConfluenceConfig) -> Self {
        Self { config }
    }

    /// `clamp(mean + min(bonus * count, max_bonus), 0, 1)`
    pub fn boosted_confidence(&self, confidences: &[f64]) -> f64 {
        if confidences.is_empty() {
            return 0.0;
        }
        let count = confidences.len() as f64;
        let mean = confidences.iter().sum::<f64>() / count;
        let bonus = (self.config.bonus_per_occurrence * count).min(self.config.max_bonus);
        (mean + bonus).clamp(0.0, 1.0)
    }

    fn bumped_success_rate(&self, base: f64, count: usize) -> f64 {
        (base + self.config.success_rate_bump * count as f64).min(self.config.success_rate_cap)
    }

    /// Group scored detections by `(pattern, direction)` and keep the pairs seen on
    /// at least two distinct timeframes.
    pub fn analyze(
        &self,
        by_timeframe: &BTreeMap<Timeframe, Vec<PatternDetection>>,
        snapshot: &PerformanceSnapshot,
    ) -> Vec<ConfluenceDetection> {
        let mut groups: BTreeMap<(PatternType, Direction), Vec<&PatternDetection>> =
            BTreeMap::new();
        for detection in by_timeframe.values().flatten() {
            groups
                .entry((detection.pattern, detection.direction))
                .or_default()
                .push(detection);
        }

        groups
            .into_iter()
            .filter_map(|((pattern, direction), members)| {
                let timeframes: BTreeSet<Timeframe> = members.iter().map(|d| d.timeframe).collect();
                if timeframes.len() < 2 {
                    return None;
                }
                let confidences: Vec<f64> = members.iter().map(|d| d.confidence).collect();

                // Levels come from the longest timeframe, its strongest detection first.
                let anchor = members.iter().copied().max_by(|a, b| {
                    a.timeframe
                        .cmp(&b.timeframe)
                        .then(a.confidence.total_cmp(&b.confidence))
                })?;
                let timestamp = members.iter().map(|d| d.timestamp).max()?;

                Some(ConfluenceDetection {
                    pattern,
                    direction,
                    confidence: self.boosted_confidence(&confidences),
                    occurrences: members.len(),
                    success_rate: self
                        .bumped_success_rate(snapshot.success_rate(pattern), members.len()),
                    entry_price: anchor.entry_price,
                    target_price: anchor.target_price,
                    stop_loss: anchor.stop_loss,
                    timeframes,
                    timestamp,
                })
            })
            .collect()
    }

    /// Emit a multi-timeframe trend detection when every trend's regression
    /// slope points the same way. The engine only calls this when every
    /// supplied window produced a trend.
    pub fn trend_alignment(
        &self,
        trends: &[TimeframeTrend],
        snapshot: &PerformanceSnapshot,
    ) -> Option<ConfluenceDetection> {
        if trends.len() < 2 {
            return None;
        }
        let direction = trends[0].direction();
        if direction == Direction::Neutral || trends.iter().any(|t| t.direction() != direction) {
            return None;
        }

        let anchor = trends.iter().max_by_key(|t| t.timeframe)?;
        let timestamp = trends.iter().map(|t| t.timestamp).max()?;
        let price = anchor.last_close;
        let sign = direction.sign();
        let count = trends.len();

        Some(ConfluenceDetection {
            pattern: PatternType::MultiTimeframeTrend,
            direction,
            confidence: (0.5 + 0.1 * count as f64).min(0.9),
            timeframes: trends.iter().map(|t| t.timeframe).collect(),
            occurrences: count,
            success_rate: self.bumped_success_rate(
                snapshot.success_rate(PatternType::MultiTimeframeTrend),
                count,
            ),
            entry_price: price,
            target_price: price * (1.0 + sign * 0.02),
            stop_loss: price * (1.0 - sign * 0.01),
            timestamp,
        })
    }
}
