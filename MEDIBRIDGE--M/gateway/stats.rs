use parking_lot::Mutex;
use serde::Serialize;

/// Aggregate request count and latency. Shared across concurrent requests.
#[derive(Debug, Default)]
pub struct RequestStats {
    inner: Mutex<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    requests: u64,
    total_latency_ms: u64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Simplification requests served.
    pub requests: u64,
    /// Mean `elapsedMs`, rounded to two decimals; zero when idle.
    pub avg_latency_ms: f64,
}

impl RequestStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed simplification.
    pub fn record(&self, elapsed_ms: u64) {
        let mut inner = self.inner.lock();
        inner.requests += 1;
        inner.total_latency_ms = inner.total_latency_ms.saturating_add(elapsed_ms);
    }

    /// Reads the counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        let avg_latency_ms = if inner.requests == 0 {
            0.0
        } else {
            let mean = inner.total_latency_ms as f64 / inner.requests as f64;
            (mean * 100.0).round() / 100.0
        };
        StatsSnapshot {
            requests: inner.requests,
            avg_latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn idle_stats_report_zero() {
        let snapshot = RequestStats::new().snapshot();
        assert_eq!(snapshot.requests, 0);
        assert!(snapshot.avg_latency_ms.abs() < f64::EPSILON);
    }

    #[test]
    fn average_is_rounded_to_two_decimals() {
        let stats = RequestStats::new();
        for elapsed in [10, 10, 11] {
            stats.record(elapsed);
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 3);
        assert!((snapshot.avg_latency_ms - 10.33).abs() < 1e-9);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let stats = Arc::new(RequestStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record(2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 800);
        assert!((snapshot.avg_latency_ms - 2.0).abs() < f64::EPSILON);
    }
}
