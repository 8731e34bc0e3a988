//! Per-query logging: row shape and daily-aggregate percentile computation
//! over search latency and result-quality metrics.

use chrono::Utc;

use crate::error::Result;
use crate::retrieval::SearchOutcome;
use crate::store::{DailySearchStats, StoreBackend};
use crate::types::{Direction, SearchLogEntry};

/// Thin wrapper around [`StoreBackend`]'s search-log table: builds one
/// [`SearchLogEntry`] per completed search and exposes the daily-aggregate
/// read path.
pub struct SearchLogger;

impl SearchLogger {
    /// Persist one completed search as a log row.
    pub async fn record(
        store: &dyn StoreBackend,
        query: &str,
        cleaned_query: &str,
        is_temporal: bool,
        direction: Direction,
        outcome: &SearchOutcome,
    ) -> Result<()> {
        let top1_score = outcome.results.first().map(|r| r.score);
        let top5_avg_score = if outcome.results.is_empty() {
            None
        } else {
            let take = outcome.results.len().min(5);
            Some(outcome.results[..take].iter().map(|r| r.score).sum::<f32>() / take as f32)
        };

        store
            .append_search_log(SearchLogEntry {
                query: query.to_string(),
                cleaned_query: cleaned_query.to_string(),
                is_temporal,
                direction,
                result_count: outcome.results.len(),
                total_activated: outcome.metadata.total_activated,
                top1_score,
                top5_avg_score,
                latency: outcome.latencies,
                recorded_at: Utc::now(),
            })
            .await
    }

    /// Daily aggregate: P50/P95/P99 latency, zero-result rate, average
    /// top-1 score, phase averages. Delegates the actual aggregation to the
    /// store, which has the full row set.
    pub async fn daily_stats(store: &dyn StoreBackend, day: chrono::DateTime<Utc>) -> Result<DailySearchStats> {
        store.daily_search_stats(day).await
    }
}

/// Percentile helper shared by store implementations when computing
/// [`DailySearchStats`] from a raw latency sample (nearest-rank method).
#[must_use]
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted_values.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted_values.len() - 1);
    sorted_values[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_single_value_is_itself() {
        assert_eq!(percentile(&[42.0], 95.0), 42.0);
    }

    #[test]
    fn p50_of_sorted_sample() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&values, 50.0), 5.0);
    }

    #[test]
    fn empty_sample_is_zero() {
        assert_eq!(percentile(&[], 99.0), 0.0);
    }
}
