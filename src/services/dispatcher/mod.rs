//! Position dispatch and breach orchestration
//!
//! The Dispatcher is the single consumer of decoded position reports. It:
//! - keeps one `BreachTracker` per tag, created on first sighting
//! - evaluates zone membership for every report
//! - logs, records and forwards accepted transitions as LED commands
//! - evicts tags that stop reporting and clears their LEDs
//! - clears every lit tag on shutdown

mod registry;

pub use registry::TagRegistry;

use crate::domain::types::{LedCommand, PositionReport, TagId};
use crate::domain::zone::{self, Zone};
use crate::domain::Point;
use crate::infra::metrics::Metrics;
use crate::io::egress::BreachEgress;
use crate::services::breach_tracker::{BreachTracker, TrackerSettings, Transition};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info};

/// Where LED commands go once a transition is accepted
///
/// Implementations must not block the dispatch loop.
pub trait CommandSink {
    fn send(&self, tag_id: TagId, command: LedCommand);
}

/// How often idle tags are checked for eviction
const EVICTION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Central processor for position reports
pub struct Dispatcher<S: CommandSink> {
    zones: Arc<[Zone]>,
    settings: TrackerSettings,
    registry: TagRegistry,
    sink: S,
    metrics: Arc<Metrics>,
    /// Writes accepted transitions to file (optional)
    egress: Option<BreachEgress>,
    /// Tags silent for longer than this are dropped (None disables eviction)
    idle_timeout: Option<Duration>,
}

impl<S: CommandSink> Dispatcher<S> {
    pub fn new(zones: Arc<[Zone]>, settings: TrackerSettings, sink: S, metrics: Arc<Metrics>) -> Self {
        Self { zones, settings, registry: TagRegistry::new(), sink, metrics, egress: None, idle_timeout: None }
    }

    pub fn with_egress(mut self, egress: BreachEgress) -> Self {
        self.egress = Some(egress);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Number of tags with a live tracker
    pub fn tracked_tags(&self) -> usize {
        self.registry.len()
    }

    pub fn tracker(&self, tag_id: TagId) -> Option<&BreachTracker> {
        self.registry.get(tag_id)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume reports until shutdown is signalled or the channel closes,
    /// then clear every lit tag
    pub async fn run(&mut self, mut report_rx: mpsc::Receiver<PositionReport>, mut shutdown: watch::Receiver<bool>) {
        let mut eviction_interval = interval(EVICTION_CHECK_INTERVAL);

        loop {
            tokio::select! {
                report = report_rx.recv() => {
                    match report {
                        Some(report) => self.process_position(report),
                        None => break, // Channel closed
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = eviction_interval.tick(), if self.idle_timeout.is_some() => {
                    self.evict_idle(Instant::now());
                }
            }
        }

        self.shutdown();
    }

    /// Run one report through its tag's tracker
    pub fn process_position(&mut self, report: PositionReport) {
        let process_start = Instant::now();
        let tag_id = report.tag_id;

        let raw = zone::membership(&self.zones, Point::new(report.x, report.y));

        let zones = &self.zones;
        let settings = self.settings;
        let (tracker, created) = self
            .registry
            .get_or_insert_with(tag_id, process_start, || BreachTracker::new(tag_id, zones.clone(), settings));
        if created {
            self.metrics.record_tag_created();
            debug!(tag_id = %tag_id, "tag_tracked");
        }

        if let Some(transition) = tracker.update(raw, report.network_time) {
            self.emit(transition);
        }

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_position_processed(latency_us);
    }

    /// Drop trackers that have gone quiet, clearing any lit LEDs
    pub fn evict_idle(&mut self, now: Instant) {
        let Some(timeout) = self.idle_timeout else {
            return;
        };

        for mut tracker in self.registry.remove_idle(now, timeout) {
            let tag_id = tracker.tag_id();
            self.metrics.record_tag_evicted();
            info!(tag_id = %tag_id, idle_secs = %timeout.as_secs(), "tag_evicted");
            if let Some(transition) = tracker.force_clear() {
                self.emit(transition);
            }
        }
    }

    /// Clear every lit tag and forget all trackers
    pub fn shutdown(&mut self) {
        let mut cleared = 0usize;
        let trackers = self.registry.drain();
        let tracked = trackers.len();

        for mut tracker in trackers {
            if let Some(transition) = tracker.force_clear() {
                self.emit(transition);
                cleared += 1;
            }
        }

        info!(tracked_tags = %tracked, cleared_tags = %cleared, "dispatcher_shutdown");
    }

    fn emit(&mut self, transition: Transition) {
        let Transition { event, command } = transition;

        info!(
            tag_id = %event.tag_id,
            entered_zones = ?event.entered_zones,
            exited_zones = ?event.exited_zones,
            network_time = %event.network_time,
            "zone_breach"
        );
        self.metrics.record_breach();

        if let Some(egress) = &self.egress {
            egress.write_event(&event);
        }

        self.sink.send(event.tag_id, command);
    }
}
