//! Per-pattern trade outcome counters
//!
//! The store is the only state shared between analysis calls. Writers take the
//! exclusive lock; every analysis pass works from a [`PerformanceSnapshot`]
//! taken once at its start.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::PatternType;

/// Success rate reported for patterns without any recorded outcome
pub const DEFAULT_SUCCESS_RATE: f64 = 0.5;

/// Outcome counters for one pattern type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub pattern: PatternType,
    pub total_trades: u64,
    pub successful_trades: u64,
}

impl PerformanceRecord {
    pub fn new(pattern: PatternType) -> Self {
        Self {
            pattern,
            total_trades: 0,
            successful_trades: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_trades == 0 {
            DEFAULT_SUCCESS_RATE
        } else {
            self.successful_trades as f64 / self.total_trades as f64
        }
    }
}

/// Shared outcome store
#[derive(Debug, Default)]
pub struct PerformanceStore {
    records: RwLock<HashMap<PatternType, PerformanceRecord>>,
}

impl PerformanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from exported records. Later duplicates replace earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = PerformanceRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| {
                let successful_trades = r.successful_trades.min(r.total_trades);
                (
                    r.pattern,
                    PerformanceRecord {
                        successful_trades,
                        ..r
                    },
                )
            })
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    /// Count one trade outcome, creating the record on first use.
    pub fn record_outcome(&self, pattern: PatternType, was_successful: bool) {
        let mut records = self.records.write();
        let record = records
            .entry(pattern)
            .or_insert_with(|| PerformanceRecord::new(pattern));
        record.total_trades += 1;
        if was_successful {
            record.successful_trades += 1;
        }
        log::debug!(
            "outcome for {pattern}: {}/{} successful",
            record.successful_trades,
            record.total_trades
        );
    }

    pub fn success_rate(&self, pattern: PatternType) -> f64 {
        self.records
            .read()
            .get(&pattern)
            .map_or(DEFAULT_SUCCESS_RATE, PerformanceRecord::success_rate)
    }

    pub fn record(&self, pattern: PatternType) -> Option<PerformanceRecord> {
        self.records.read().get(&pattern).copied()
    }

    /// All records, ordered by pattern type.
    pub fn records(&self) -> Vec<PerformanceRecord> {
        let mut records: Vec<PerformanceRecord> = self.records.read().values().copied().collect();
        records.sort_by_key(|r| r.pattern);
        records
    }

    /// Consistent read-only copy for one analysis pass.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            records: self.records.read().clone(),
        }
    }
}

/// Point-in-time copy of the store
#[derive(Debug, Clone, Default)]
pub struct PerformanceSnapshot {
    records: HashMap<PatternType, PerformanceRecord>,
}

impl PerformanceSnapshot {
    /// Success rate when a record exists. Used for the scorer's blend.
    pub fn recorded_rate(&self, pattern: PatternType) -> Option<f64> {
        self.records.get(&pattern).map(PerformanceRecord::success_rate)
    }

    pub fn success_rate(&self, pattern: PatternType) -> f64 {
        self.recorded_rate(pattern).unwrap_or(DEFAULT_SUCCESS_RATE)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
