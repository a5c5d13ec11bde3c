//! API request metrics for Prometheus
//!
//! Tracks requests, status classes and latencies per API operation.

use diner_cache::MemoryCache;
use diner_core::CacheStatsSnapshot;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// API operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiOperation {
    GetConfiguration,
    CreateRestaurant,
    GetRestaurant,
    DeleteRestaurant,
    RateRestaurant,
    TopByCuisine,
    TopByRegion,
    TopByRegionAndCuisine,
}

impl ApiOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetConfiguration => "GetConfiguration",
            Self::CreateRestaurant => "CreateRestaurant",
            Self::GetRestaurant => "GetRestaurant",
            Self::DeleteRestaurant => "DeleteRestaurant",
            Self::RateRestaurant => "RateRestaurant",
            Self::TopByCuisine => "TopByCuisine",
            Self::TopByRegion => "TopByRegion",
            Self::TopByRegionAndCuisine => "TopByRegionAndCuisine",
        }
    }
}

/// Per-operation metrics
#[derive(Debug, Default)]
struct OperationMetrics {
    requests_total: AtomicU64,
    /// 2xx
    requests_success: AtomicU64,
    /// 4xx
    requests_client_error: AtomicU64,
    /// 5xx
    requests_server_error: AtomicU64,
    latency_sum_us: AtomicU64,
}

impl OperationMetrics {
    fn record(&self, status_code: u16, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        match status_code {
            200..=299 => self.requests_success.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.requests_client_error.fetch_add(1, Ordering::Relaxed),
            500.. => self.requests_server_error.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
    }
}

/// API metrics collector
#[derive(Debug)]
pub struct ApiMetrics {
    operations: RwLock<HashMap<ApiOperation, OperationMetrics>>,
    start_time: Instant,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one finished request
    pub fn record_operation(&self, op: ApiOperation, status_code: u16, latency_us: u64) {
        {
            let ops = self.operations.read();
            if let Some(m) = ops.get(&op) {
                m.record(status_code, latency_us);
                return;
            }
        }
        self.operations
            .write()
            .entry(op)
            .or_default()
            .record(status_code, latency_us);
    }

    /// Requests seen so far for `op`
    pub fn requests_total(&self, op: ApiOperation) -> u64 {
        self.operations
            .read()
            .get(&op)
            .map_or(0, |m| m.requests_total.load(Ordering::Relaxed))
    }

    /// Export request metrics and the coordinator's cache counters in
    /// Prometheus text format
    pub fn export_prometheus(&self, cache: &CacheStatsSnapshot, cache_enabled: bool) -> String {
        let mut output = String::with_capacity(4 * 1024);

        let _ = writeln!(output, "# HELP diner_uptime_seconds API uptime in seconds");
        let _ = writeln!(output, "# TYPE diner_uptime_seconds counter");
        let _ = writeln!(
            output,
            "diner_uptime_seconds {}",
            self.start_time.elapsed().as_secs()
        );

        let ops = self.operations.read();
        let mut sorted: Vec<_> = ops.iter().collect();
        sorted.sort_by_key(|(op, _)| **op);

        let series: [(&str, &str, fn(&OperationMetrics) -> u64); 5] = [
            ("diner_requests_total", "Total requests", |m: &OperationMetrics| {
                m.requests_total.load(Ordering::Relaxed)
            }),
            ("diner_requests_success_total", "Requests answered 2xx", |m: &OperationMetrics| {
                m.requests_success.load(Ordering::Relaxed)
            }),
            ("diner_requests_client_error_total", "Requests answered 4xx", |m: &OperationMetrics| {
                m.requests_client_error.load(Ordering::Relaxed)
            }),
            ("diner_requests_server_error_total", "Requests answered 5xx", |m: &OperationMetrics| {
                m.requests_server_error.load(Ordering::Relaxed)
            }),
            (
                "diner_request_latency_microseconds_sum",
                "Sum of request latencies in microseconds",
                |m: &OperationMetrics| m.latency_sum_us.load(Ordering::Relaxed),
            ),
        ];
        for (name, help, value) in series {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            for (op, m) in &sorted {
                let _ = writeln!(output, "{name}{{operation=\"{}\"}} {}", op.as_str(), value(m));
            }
        }
        drop(ops);

        let _ = writeln!(output, "# HELP diner_cache_enabled Whether reads go through the cache");
        let _ = writeln!(output, "# TYPE diner_cache_enabled gauge");
        let _ = writeln!(output, "diner_cache_enabled {}", u8::from(cache_enabled));

        let cache_counters = [
            ("diner_cache_hits_total", "Reads answered by the cache", cache.hits),
            ("diner_cache_misses_total", "Reads that fell through to the store", cache.misses),
            ("diner_cache_populates_total", "Entries written to the cache", cache.populates),
            ("diner_cache_invalidations_total", "Entries or generations invalidated", cache.invalidations),
            ("diner_cache_errors_total", "Cache failures swallowed", cache.errors),
        ];
        for (name, help, value) in cache_counters {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {value}");
        }

        let _ = writeln!(output, "# HELP diner_cache_hit_ratio Cache hit ratio");
        let _ = writeln!(output, "# TYPE diner_cache_hit_ratio gauge");
        let _ = writeln!(output, "diner_cache_hit_ratio {:.4}", cache.hit_ratio);

        output
    }
}

/// Prometheus text for the in-process cache's own counters
pub fn export_memory_cache(cache: &MemoryCache) -> String {
    let stats = cache.stats();
    let mut output = String::with_capacity(1024);

    let counters = [
        ("diner_memory_cache_evictions_total", "Entries evicted to stay within capacity", &stats.evictions),
        ("diner_memory_cache_injected_failures_total", "Operations failed on request", &stats.injected_failures),
    ];
    for (name, help, value) in counters {
        let _ = writeln!(output, "# HELP {name} {help}");
        let _ = writeln!(output, "# TYPE {name} counter");
        let _ = writeln!(output, "{name} {}", value.load(Ordering::Relaxed));
    }

    let _ = writeln!(output, "# HELP diner_memory_cache_entries Entries currently cached");
    let _ = writeln!(output, "# TYPE diner_memory_cache_entries gauge");
    let _ = writeln!(output, "diner_memory_cache_entries {}", cache.len());

    output
}

/// Global API metrics instance
static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Get the global API metrics instance
pub fn api_metrics() -> &'static ApiMetrics {
    API_METRICS.get_or_init(ApiMetrics::new)
}
