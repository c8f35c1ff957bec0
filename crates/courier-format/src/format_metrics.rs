//! Process-wide counters and rolling processing-time samples.
//!
//! Updated after every request, success or failure. Snapshots are read-only;
//! counters reset only on explicit caller action.

use std::collections::BTreeMap;

use serde::Serialize;

/// Rolling window size for processing-time samples.
pub const PROCESSING_SAMPLE_WINDOW: usize = 1_000;

#[derive(Debug, Default)]
/// Public struct `FormatMetrics` used across Courier components.
pub struct FormatMetrics {
    total_requests: u64,
    cache_hits: u64,
    errors: u64,
    formatter_usage: BTreeMap<String, u64>,
    processing_time_samples: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Read-only metrics snapshot returned to observability callers.
pub struct MetricsSnapshot {
    pub total_messages: u64,
    pub cache_hit_rate_percent: f64,
    pub error_rate_percent: f64,
    pub average_processing_time_ms: f64,
    pub formatter_usage: BTreeMap<String, u64>,
    pub cache_size: usize,
}

impl FormatMetrics {
    /// Records one completed request, whatever its outcome.
    pub fn record_request(
        &mut self,
        formatter_used: &str,
        processing_time_ms: u64,
        cache_hit: bool,
        errored: bool,
    ) {
        self.total_requests = self.total_requests.saturating_add(1);
        if cache_hit {
            self.cache_hits = self.cache_hits.saturating_add(1);
        }
        if errored {
            self.errors = self.errors.saturating_add(1);
        }
        if !formatter_used.is_empty() {
            *self
                .formatter_usage
                .entry(formatter_used.to_string())
                .or_insert(0) += 1;
        }
        self.processing_time_samples.push(processing_time_ms);
        while self.processing_time_samples.len() > PROCESSING_SAMPLE_WINDOW {
            self.processing_time_samples.remove(0);
        }
    }

    pub fn snapshot(&self, cache_size: usize) -> MetricsSnapshot {
        let total = self.total_requests;
        let rate = |count: u64| {
            if total == 0 {
                0.0
            } else {
                (count as f64 / total as f64) * 100.0
            }
        };
        let average = if self.processing_time_samples.is_empty() {
            0.0
        } else {
            self.processing_time_samples.iter().sum::<u64>() as f64
                / self.processing_time_samples.len() as f64
        };
        MetricsSnapshot {
            total_messages: total,
            cache_hit_rate_percent: rate(self.cache_hits),
            error_rate_percent: rate(self.errors),
            average_processing_time_ms: average,
            formatter_usage: self.formatter_usage.clone(),
            cache_size,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_snapshot_reports_rates_and_usage() {
        let mut metrics = FormatMetrics::default();
        metrics.record_request("StandupFormatter", 4, false, false);
        metrics.record_request("StandupFormatter", 2, true, false);
        metrics.record_request("", 10, false, true);
        let snapshot = metrics.snapshot(7);
        assert_eq!(snapshot.total_messages, 3);
        assert!((snapshot.cache_hit_rate_percent - 100.0 / 3.0).abs() < 1e-9);
        assert!((snapshot.error_rate_percent - 100.0 / 3.0).abs() < 1e-9);
        assert!((snapshot.average_processing_time_ms - 16.0 / 3.0).abs() < 1e-9);
        assert_eq!(snapshot.formatter_usage.get("StandupFormatter"), Some(&2));
        assert_eq!(snapshot.cache_size, 7);
    }

    #[test]
    fn unit_empty_metrics_snapshot_is_all_zeroes() {
        let snapshot = FormatMetrics::default().snapshot(0);
        assert_eq!(snapshot.total_messages, 0);
        assert_eq!(snapshot.cache_hit_rate_percent, 0.0);
        assert_eq!(snapshot.average_processing_time_ms, 0.0);
    }

    #[test]
    fn regression_sample_window_stays_bounded() {
        let mut metrics = FormatMetrics::default();
        for index in 0..(PROCESSING_SAMPLE_WINDOW as u64 + 50) {
            metrics.record_request("F", index, false, false);
        }
        // Only the most recent window contributes to the average.
        let snapshot = metrics.snapshot(0);
        let expected_first = 50.0; // oldest surviving sample
        assert!(snapshot.average_processing_time_ms >= expected_first);
        assert_eq!(snapshot.total_messages, PROCESSING_SAMPLE_WINDOW as u64 + 50);
    }

    #[test]
    fn unit_reset_clears_all_counters() {
        let mut metrics = FormatMetrics::default();
        metrics.record_request("F", 5, true, true);
        metrics.reset();
        let snapshot = metrics.snapshot(0);
        assert_eq!(snapshot.total_messages, 0);
        assert!(snapshot.formatter_usage.is_empty());
    }
}
