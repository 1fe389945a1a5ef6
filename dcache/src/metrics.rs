//! Metrics declaration and recording.
//!
//! All metric names are prefixed with the configured application name so
//! multiple cache instances in one process can share the global recorder
//! without colliding. Recording goes through the `metrics` facade; the
//! exporter decides where the data ends up.

use std::time::Instant;

/// Histogram bucket boundaries for the read-latency metric, in milliseconds.
///
/// The `metrics` facade leaves bucketing to the exporter; install these
/// boundaries there (for a Prometheus exporter, via its bucket
/// configuration for `*_dcache_latency_ms`).
pub const LATENCY_BUCKETS_MS: [f64; 12] = [
    1.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0,
];

/// Read served from the process-local cache.
pub(crate) const HIT_MEM: &str = "mem";
/// Read served from the remote store.
pub(crate) const HIT_REDIS: &str = "redis";
/// Read served from the origin.
pub(crate) const HIT_DB: &str = "db";

/// A cache write after an origin read failed.
pub(crate) const ERR_SET_CACHE: &str = "set_cache";
/// A malformed invalidation broadcast was received.
pub(crate) const ERR_INVALIDATE: &str = "invalidate_error";

/// App-prefixed metric names for one cache instance.
#[derive(Debug, Clone)]
pub(crate) struct MetricSet {
    hit: String,
    latency: String,
    error: String,
}

impl MetricSet {
    /// Builds the name set and registers metric descriptions. Describing an
    /// already-described metric is harmless, so repeated construction with
    /// the same prefix does not conflict.
    pub(crate) fn new(app_name: &str) -> Self {
        let set = MetricSet {
            hit: format!("{app_name}_dcache_hit_total"),
            latency: format!("{app_name}_dcache_latency_ms"),
            error: format!("{app_name}_dcache_error_total"),
        };
        metrics::describe_counter!(
            set.hit.clone(),
            "Cache reads served, by layer: {mem, redis, db}."
        );
        metrics::describe_histogram!(
            set.latency.clone(),
            metrics::Unit::Milliseconds,
            "Cache read latency in milliseconds, by layer."
        );
        metrics::describe_counter!(
            set.error.clone(),
            "Internal cache errors, by site: {set_cache, invalidate_error}."
        );
        set
    }

    pub(crate) fn hit(&self, layer: &'static str) {
        metrics::counter!(self.hit.clone(), "hit" => layer).increment(1);
    }

    pub(crate) fn latency(&self, layer: &'static str, started: Instant) {
        metrics::histogram!(self.latency.clone(), "hit" => layer)
            .record(started.elapsed().as_millis() as f64);
    }

    pub(crate) fn error(&self, site: &'static str) {
        metrics::counter!(self.error.clone(), "when" => site).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_carry_the_app_prefix() {
        let set = MetricSet::new("orders");
        assert_eq!(set.hit, "orders_dcache_hit_total");
        assert_eq!(set.latency, "orders_dcache_latency_ms");
        assert_eq!(set.error, "orders_dcache_error_total");
    }

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        let set = MetricSet::new("test");
        set.hit(HIT_MEM);
        set.latency(HIT_REDIS, Instant::now());
        set.error(ERR_SET_CACHE);
    }

    #[test]
    fn buckets_are_sorted_and_span_the_expected_range() {
        assert!(LATENCY_BUCKETS_MS.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(LATENCY_BUCKETS_MS[0], 1.0);
        assert_eq!(LATENCY_BUCKETS_MS[11], 4096.0);
    }
}
