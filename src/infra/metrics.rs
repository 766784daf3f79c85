//! Lock-free pipeline counters and per-run summaries
//!
//! Uses atomics so concurrent routing tasks never contend on a mutex.
//! `report()` swaps the per-run counters to zero and returns a snapshot.
//!
//! Counters only feed the run summary log line. Nothing in the pipeline reads
//! them back to decide anything, so every access is `Relaxed`.

use crate::domain::types::{MatchSource, Rejection};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Routing latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const BUCKET_BOUNDS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Raise the slowest-route latency seen so far
#[inline]
fn raise_max(slowest_ms: &AtomicU64, latency_ms: u64) {
    slowest_ms.fetch_max(latency_ms, Ordering::Relaxed);
}

/// Drain the latency histogram
#[inline]
fn drain_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].swap(0, Ordering::Relaxed))
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    feed_fetches: AtomicU64,
    feed_failures: AtomicU64,
    events_seen: AtomicU64,
    events_kept: AtomicU64,
    rejected_not_work: AtomicU64,
    rejected_missing_start: AtomicU64,
    rejected_bad_start: AtomicU64,
    rejected_before_floor: AtomicU64,
    resolved_label: AtomicU64,
    resolved_gazetteer: AtomicU64,
    resolved_summary_suffix: AtomicU64,
    resolved_default: AtomicU64,
    route_requests: AtomicU64,
    route_cache_hits: AtomicU64,
    route_failures: AtomicU64,
    /// Routing latency histogram (reset on report)
    route_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Max routing latency in ms (reset on report)
    route_latency_max_ms: AtomicU64,
    geocode_requests: AtomicU64,
    geocode_failures: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            feed_fetches: AtomicU64::new(0),
            feed_failures: AtomicU64::new(0),
            events_seen: AtomicU64::new(0),
            events_kept: AtomicU64::new(0),
            rejected_not_work: AtomicU64::new(0),
            rejected_missing_start: AtomicU64::new(0),
            rejected_bad_start: AtomicU64::new(0),
            rejected_before_floor: AtomicU64::new(0),
            resolved_label: AtomicU64::new(0),
            resolved_gazetteer: AtomicU64::new(0),
            resolved_summary_suffix: AtomicU64::new(0),
            resolved_default: AtomicU64::new(0),
            route_requests: AtomicU64::new(0),
            route_cache_hits: AtomicU64::new(0),
            route_failures: AtomicU64::new(0),
            route_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            route_latency_max_ms: AtomicU64::new(0),
            geocode_requests: AtomicU64::new(0),
            geocode_failures: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_feed_fetch(&self, ok: bool) {
        self.feed_fetches.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.feed_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_event_kept(&self) {
        self.events_seen.fetch_add(1, Ordering::Relaxed);
        self.events_kept.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_rejected(&self, reason: Rejection) {
        self.events_seen.fetch_add(1, Ordering::Relaxed);
        let counter = match reason {
            Rejection::NotWork => &self.rejected_not_work,
            Rejection::MissingStart => &self.rejected_missing_start,
            Rejection::BadStart => &self.rejected_bad_start,
            Rejection::BeforeFloor => &self.rejected_before_floor,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_resolution(&self, source: MatchSource) {
        let counter = match source {
            MatchSource::Label => &self.resolved_label,
            MatchSource::Gazetteer => &self.resolved_gazetteer,
            MatchSource::SummarySuffix => &self.resolved_summary_suffix,
            MatchSource::Default => &self.resolved_default,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_cache_hit(&self) {
        self.route_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one routing backend call and its wall time
    #[inline]
    pub fn record_route_request(&self, latency_ms: u64, ok: bool) {
        self.route_requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.route_failures.fetch_add(1, Ordering::Relaxed);
        }
        let bucket = bucket_index(latency_ms);
        self.route_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        raise_max(&self.route_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_geocode(&self, ok: bool) {
        self.geocode_requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.geocode_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn route_requests(&self) -> u64 {
        self.route_requests.load(Ordering::Relaxed)
    }

    pub fn route_cache_hits(&self) -> u64 {
        self.route_cache_hits.load(Ordering::Relaxed)
    }

    /// Snapshot all counters, resetting the routing latency histogram
    pub fn report(&self) -> MetricsSummary {
        let latency_buckets = drain_buckets(&self.route_latency_buckets);
        let route_latency_max_ms = self.route_latency_max_ms.swap(0, Ordering::Relaxed);

        let elapsed_ms = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed.as_millis() as u64
        };

        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);

        MetricsSummary {
            elapsed_ms,
            feed_fetches: load(&self.feed_fetches),
            feed_failures: load(&self.feed_failures),
            events_seen: load(&self.events_seen),
            events_kept: load(&self.events_kept),
            rejected_not_work: load(&self.rejected_not_work),
            rejected_missing_start: load(&self.rejected_missing_start),
            rejected_bad_start: load(&self.rejected_bad_start),
            rejected_before_floor: load(&self.rejected_before_floor),
            resolved_label: load(&self.resolved_label),
            resolved_gazetteer: load(&self.resolved_gazetteer),
            resolved_summary_suffix: load(&self.resolved_summary_suffix),
            resolved_default: load(&self.resolved_default),
            route_requests: load(&self.route_requests),
            route_cache_hits: load(&self.route_cache_hits),
            route_failures: load(&self.route_failures),
            route_p50_ms: percentile_from_buckets(&latency_buckets, 0.50),
            route_p99_ms: percentile_from_buckets(&latency_buckets, 0.99),
            route_latency_max_ms,
            geocode_requests: load(&self.geocode_requests),
            geocode_failures: load(&self.geocode_failures),
        }
    }
}

/// Snapshot produced by [`Metrics::report`]
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub elapsed_ms: u64,
    pub feed_fetches: u64,
    pub feed_failures: u64,
    pub events_seen: u64,
    pub events_kept: u64,
    pub rejected_not_work: u64,
    pub rejected_missing_start: u64,
    pub rejected_bad_start: u64,
    pub rejected_before_floor: u64,
    pub resolved_label: u64,
    pub resolved_gazetteer: u64,
    pub resolved_summary_suffix: u64,
    pub resolved_default: u64,
    pub route_requests: u64,
    pub route_cache_hits: u64,
    pub route_failures: u64,
    pub route_p50_ms: u64,
    pub route_p99_ms: u64,
    pub route_latency_max_ms: u64,
    pub geocode_requests: u64,
    pub geocode_failures: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            elapsed_ms = %self.elapsed_ms,
            feed_fetches = %self.feed_fetches,
            feed_failures = %self.feed_failures,
            events_seen = %self.events_seen,
            events_kept = %self.events_kept,
            not_work = %self.rejected_not_work,
            missing_start = %self.rejected_missing_start,
            bad_start = %self.rejected_bad_start,
            before_floor = %self.rejected_before_floor,
            by_label = %self.resolved_label,
            by_gazetteer = %self.resolved_gazetteer,
            by_summary_suffix = %self.resolved_summary_suffix,
            by_default = %self.resolved_default,
            route_requests = %self.route_requests,
            route_cache_hits = %self.route_cache_hits,
            route_failures = %self.route_failures,
            route_p50_ms = %self.route_p50_ms,
            route_p99_ms = %self.route_p99_ms,
            route_max_ms = %self.route_latency_max_ms,
            geocode_requests = %self.geocode_requests,
            geocode_failures = %self.geocode_failures,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(51), 1);
        assert_eq!(bucket_index(25600), 9);
        assert_eq!(bucket_index(100_000), 10);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let mut buckets = [0u64; NUM_BUCKETS];
        buckets[1] = 90;
        buckets[5] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 1600);
        assert_eq!(percentile_from_buckets(&[0; NUM_BUCKETS], 0.5), 0);
    }

    #[test]
    fn test_rejections_counted_by_reason() {
        let metrics = Metrics::new();
        metrics.record_event_kept();
        metrics.record_event_rejected(Rejection::NotWork);
        metrics.record_event_rejected(Rejection::NotWork);
        metrics.record_event_rejected(Rejection::BeforeFloor);

        let summary = metrics.report();
        assert_eq!(summary.events_seen, 4);
        assert_eq!(summary.events_kept, 1);
        assert_eq!(summary.rejected_not_work, 2);
        assert_eq!(summary.rejected_before_floor, 1);
    }

    #[test]
    fn test_report_resets_latency_histogram() {
        let metrics = Metrics::new();
        metrics.record_route_request(120, true);
        metrics.record_route_request(900, false);

        let first = metrics.report();
        assert_eq!(first.route_requests, 2);
        assert_eq!(first.route_failures, 1);
        assert_eq!(first.route_latency_max_ms, 900);
        assert_eq!(first.route_p99_ms, 1600);

        let second = metrics.report();
        // Monotonic counters survive, histogram does not
        assert_eq!(second.route_requests, 2);
        assert_eq!(second.route_latency_max_ms, 0);
        assert_eq!(second.route_p99_ms, 0);
    }
}
