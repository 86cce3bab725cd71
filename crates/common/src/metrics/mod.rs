//! Metrics and observability utilities
//!
//! Prometheus metrics with SLO-aligned histograms and standardized naming.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Baanboard metrics
pub const METRICS_PREFIX: &str = "baanboard";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 250ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.100,  // 100ms
    0.250,  // 250ms - P99 target
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of listing searches"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Listing search latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of listings returned from the last search"
    );

    // Mutation metrics
    describe_counter!(
        format!("{}_listing_mutations_total", METRICS_PREFIX),
        Unit::Count,
        "Listing create/update/delete operations by outcome"
    );

    describe_counter!(
        format!("{}_partial_writes_total", METRICS_PREFIX),
        Unit::Count,
        "Multi-step listing writes that failed part way"
    );

    // Catalog cache metrics
    describe_counter!(
        format!("{}_catalog_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Reference catalog cache hits"
    );

    describe_counter!(
        format!("{}_catalog_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Reference catalog cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, kind: &str, result_count: usize) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record the outcome of a listing mutation
pub fn record_mutation(operation: &str, outcome: &str) {
    counter!(
        format!("{}_listing_mutations_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Helper to record a write that stopped part way
pub fn record_partial_write(step: &str) {
    counter!(
        format!("{}_partial_writes_total", METRICS_PREFIX),
        "step" => step.to_string()
    )
    .increment(1);
}

/// Helper to record catalog cache metrics
pub fn record_catalog_cache(hit: bool, language: &str) {
    if hit {
        counter!(
            format!("{}_catalog_cache_hits_total", METRICS_PREFIX),
            "language" => language.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_catalog_cache_misses_total", METRICS_PREFIX),
            "language" => language.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        assert!(LATENCY_BUCKETS.contains(&0.050));
        assert!(LATENCY_BUCKETS.contains(&0.250));
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("POST", "/v1/listings/search");
        metrics.finish(200);
        record_mutation("create", "ok");
        record_partial_write("tags");
        record_catalog_cache(false, "th");
    }
}
