//! Latency summary for the timed phase

use std::fmt;
use std::time::Duration;

/// Summary of one batch of timed requests
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LatencySummary {
    pub requests: usize,
    pub errors: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    /// Summarize per-request latencies; `errors` of them failed
    #[allow(clippy::cast_precision_loss)]
    pub fn from_samples(mut samples: Vec<Duration>, errors: usize) -> Self {
        if samples.is_empty() {
            return Self {
                errors,
                ..Self::default()
            };
        }
        samples.sort_unstable();
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        let total: Duration = samples.iter().sum();

        Self {
            requests: samples.len(),
            errors,
            avg_ms: ms(total) / samples.len() as f64,
            p50_ms: ms(nearest_rank(&samples, 50)),
            p99_ms: ms(nearest_rank(&samples, 99)),
            max_ms: ms(samples[samples.len() - 1]),
        }
    }
}

/// Nearest-rank percentile of sorted, non-empty samples
fn nearest_rank(sorted: &[Duration], pct: usize) -> Duration {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests={} errors={} avg={:.2}ms p50={:.2}ms p99={:.2}ms max={:.2}ms",
            self.requests, self.errors, self.avg_ms, self.p50_ms, self.p99_ms, self.max_ms
        )
    }
}
