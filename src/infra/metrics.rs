//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

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
    /// Datagrams read from the position socket (monotonic)
    frames_received: AtomicU64,
    /// Datagrams that failed to decode (monotonic)
    frames_rejected: AtomicU64,
    /// Position reports dropped because the dispatch channel was full (monotonic)
    reports_dropped: AtomicU64,
    /// Position reports processed by the dispatcher (monotonic)
    positions_total: AtomicU64,
    /// Position reports since last report (reset on report)
    positions_since_report: AtomicU64,
    /// Sum of processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max processing latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Accepted zone transitions (monotonic)
    breaches_total: AtomicU64,
    /// LED commands written to the network (monotonic)
    commands_sent: AtomicU64,
    /// LED commands that failed to send (monotonic)
    commands_failed: AtomicU64,
    /// Tags seen for the first time (monotonic)
    tags_created: AtomicU64,
    /// Tags removed for inactivity (monotonic)
    tags_evicted: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            reports_dropped: AtomicU64::new(0),
            positions_total: AtomicU64::new(0),
            positions_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            breaches_total: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
            tags_created: AtomicU64::new(0),
            tags_evicted: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a position was processed with given latency (lock-free)
    #[inline]
    pub fn record_position_processed(&self, latency_us: u64) {
        self.positions_total.fetch_add(1, Ordering::Relaxed);
        self.positions_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_breach(&self) {
        self.breaches_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command_failed(&self) {
        self.commands_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tag_created(&self) {
        self.tags_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tag_evicted(&self) {
        self.tags_evicted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn positions_total(&self) -> u64 {
        self.positions_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn breaches_total(&self) -> u64 {
        self.breaches_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tags_evicted(&self) -> u64 {
        self.tags_evicted.load(Ordering::Relaxed)
    }

    /// Snapshot counters, resetting the periodic ones
    pub fn report(&self) -> MetricsSummary {
        let positions_count = self.positions_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let positions_per_sec = if elapsed.as_secs_f64() > 0.0 {
            positions_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if positions_count > 0 { latency_sum / positions_count } else { 0 };

        let tags_created = self.tags_created.load(Ordering::Relaxed);
        let tags_evicted = self.tags_evicted.load(Ordering::Relaxed);

        MetricsSummary {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            positions_total: self.positions_total.load(Ordering::Relaxed),
            positions_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            breaches_total: self.breaches_total.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            tracked_tags: tags_created.saturating_sub(tags_evicted),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub reports_dropped: u64,
    pub positions_total: u64,
    pub positions_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub breaches_total: u64,
    pub commands_sent: u64,
    pub commands_failed: u64,
    /// Tags created minus tags evicted
    pub tracked_tags: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_received = %self.frames_received,
            frames_rejected = %self.frames_rejected,
            reports_dropped = %self.reports_dropped,
            positions_total = %self.positions_total,
            positions_per_sec = format!("{:.1}", self.positions_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            breaches_total = %self.breaches_total,
            commands_sent = %self.commands_sent,
            commands_failed = %self.commands_failed,
            tracked_tags = %self.tracked_tags,
            "metrics_summary"
        );
    }
}
