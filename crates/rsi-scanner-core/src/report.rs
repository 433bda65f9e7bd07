use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicator::IndicatorResult;
use crate::signal::Signal;

/// Number of results per signal category in one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalCounts {
    pub long: usize,
    pub short: usize,
    pub total: usize,
}

/// Ranked results of a single scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub generated_at: DateTime<Utc>,
    results: Vec<IndicatorResult>,
}

impl ScanReport {
    /// Build a report, ranking `results` with [`rank`].
    pub fn new(generated_at: DateTime<Utc>, mut results: Vec<IndicatorResult>) -> Self {
        rank(&mut results);
        Self {
            generated_at,
            results,
        }
    }

    /// Results in ranked order.
    pub fn results(&self) -> &[IndicatorResult] {
        &self.results
    }

    pub fn counts(&self) -> SignalCounts {
        self.results
            .iter()
            .fold(SignalCounts::default(), |mut counts, result| {
                match result.signal {
                    Signal::Long => counts.long += 1,
                    Signal::Short => counts.short += 1,
                    Signal::Neutral => {}
                }
                counts.total += 1;
                counts
            })
    }
}

/// Sort results so LONG/SHORT come before NEUTRAL, then by descending
/// `|rsi_diff|`. Equal keys fall back to the symbol so the order does not
/// depend on the order results arrived in.
pub fn rank(results: &mut [IndicatorResult]) {
    results.sort_by(compare_rank);
}

fn compare_rank(a: &IndicatorResult, b: &IndicatorResult) -> Ordering {
    b.signal
        .is_directional()
        .cmp(&a.signal.is_directional())
        .then_with(|| b.rsi_diff.abs().total_cmp(&a.rsi_diff.abs()))
        .then_with(|| a.symbol.cmp(&b.symbol))
}
