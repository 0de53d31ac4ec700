//! Per-tag zone membership with hysteresis
//!
//! Raw containment results jitter near zone borders. A tracker counts
//! consecutive readings that differ from the accepted membership and accepts
//! the reading that brings the count to `hysteresis`. Any reading matching
//! the accepted membership resets the count.
//!
//! Key behaviors:
//! - The accepted membership starts out unknown, so the first settled reading
//!   (even "no zones") is always reported
//! - Differing readings need not agree with each other; a tag jittering
//!   between two new memberships still leaves the old one
//! - Thresholds 0 and 1 both accept on the first differing reading

use crate::domain::types::{BreachEvent, LedCommand, Rgb, TagId};
use crate::domain::zone::{Membership, Zone};
use std::sync::Arc;

/// Default number of consecutive readings before a change is trusted
pub const DEFAULT_HYSTERESIS: u32 = 5;

/// Default LED slot per zone color in a round-robin pattern (ms)
pub const DEFAULT_LED_SLOT_MS: u32 = 500;

/// Settings shared by every tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub hysteresis: u32,
    pub led_slot_ms: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self { hysteresis: DEFAULT_HYSTERESIS, led_slot_ms: DEFAULT_LED_SLOT_MS }
    }
}

/// Output of an accepted membership change
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub event: BreachEvent,
    pub command: LedCommand,
}

/// Hysteresis state machine for one tag
#[derive(Debug, Clone)]
pub struct BreachTracker {
    tag_id: TagId,
    zones: Arc<[Zone]>,
    settings: TrackerSettings,
    /// Last accepted membership (None until the first acceptance)
    current: Option<Membership>,
    consecutive_mismatches: u32,
    /// Network time of the most recent reading
    last_network_time: u64,
}

impl BreachTracker {
    pub fn new(tag_id: TagId, zones: Arc<[Zone]>, settings: TrackerSettings) -> Self {
        Self { tag_id, zones, settings, current: None, consecutive_mismatches: 0, last_network_time: 0 }
    }

    #[inline]
    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    /// Accepted membership, or None if nothing has been accepted yet
    #[inline]
    pub fn current_zones(&self) -> Option<&[usize]> {
        self.current.as_deref()
    }

    #[inline]
    pub fn consecutive_mismatches(&self) -> u32 {
        self.consecutive_mismatches
    }

    /// Whether the tag is currently accepted as inside at least one zone
    #[inline]
    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(|zones| !zones.is_empty())
    }

    /// Feed one raw membership reading
    ///
    /// Indices outside the tracker's zone list are ignored when building the
    /// event and LED pattern.
    pub fn update(&mut self, raw: Membership, network_time: u64) -> Option<Transition> {
        self.last_network_time = network_time;

        if self.current.as_ref() == Some(&raw) {
            self.consecutive_mismatches = 0;
            return None;
        }

        self.consecutive_mismatches = self.consecutive_mismatches.saturating_add(1);
        if self.consecutive_mismatches < self.settings.hysteresis.max(1) {
            return None;
        }

        self.consecutive_mismatches = 0;
        let transition = self.transition_to(&raw, network_time);
        self.current = Some(raw);
        Some(transition)
    }

    /// Force the membership to empty, as if an empty reading had been
    /// accepted at the last seen network time. Returns None unless the tag
    /// was inside any zone.
    pub fn force_clear(&mut self) -> Option<Transition> {
        if !self.is_active() {
            return None;
        }
        let empty = Membership::new();
        let transition = self.transition_to(&empty, self.last_network_time);
        self.current = Some(empty);
        self.consecutive_mismatches = 0;
        Some(transition)
    }

    fn transition_to(&self, accepted: &Membership, network_time: u64) -> Transition {
        let mut entered_zones = Vec::with_capacity(accepted.len());
        let mut exited_zones = Vec::with_capacity(self.zones.len().saturating_sub(accepted.len()));
        for (index, zone) in self.zones.iter().enumerate() {
            if accepted.contains(&index) {
                entered_zones.push(zone.name().to_string());
            } else {
                exited_zones.push(zone.name().to_string());
            }
        }

        let colors: Vec<Rgb> =
            accepted.iter().filter_map(|&index| self.zones.get(index)).map(Zone::color).collect();
        let command = LedCommand::round_robin(colors, self.settings.led_slot_ms);

        Transition {
            event: BreachEvent { tag_id: self.tag_id, entered_zones, exited_zones, network_time },
            command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Point;
    use crate::domain::types::LedState;
    use smallvec::smallvec;

    fn square(name: &str, x0: f64, color: Rgb) -> Zone {
        let pts = [[x0, 0.0], [x0 + 10.0, 0.0], [x0 + 10.0, 10.0], [x0, 10.0]];
        Zone::new(name, pts.into_iter().map(Point::from).collect(), color).unwrap()
    }

    fn zones() -> Arc<[Zone]> {
        Arc::from(vec![
            square("A", 0.0, Rgb::new(255, 0, 0)),
            square("B", 20.0, Rgb::new(0, 255, 0)),
            square("C", 40.0, Rgb::new(0, 0, 255)),
        ])
    }

    fn tracker(hysteresis: u32) -> BreachTracker {
        BreachTracker::new(TagId(7), zones(), TrackerSettings { hysteresis, led_slot_ms: 500 })
    }

    fn a() -> Membership {
        smallvec![0]
    }

    fn b() -> Membership {
        smallvec![1]
    }

    fn c() -> Membership {
        smallvec![2]
    }

    fn none() -> Membership {
        Membership::new()
    }

    #[test]
    fn test_starts_unknown() {
        let t = tracker(3);
        assert_eq!(t.current_zones(), None);
        assert_eq!(t.consecutive_mismatches(), 0);
        assert!(!t.is_active());
    }

    #[test]
    fn test_hysteresis_sequence() {
        let mut t = tracker(3);
        // Establish A as the accepted membership
        for _ in 0..2 {
            assert!(t.update(a(), 0).is_none());
        }
        assert!(t.update(a(), 0).is_some());

        // [A, A, B, B, B, A]
        assert!(t.update(a(), 1).is_none());
        assert!(t.update(a(), 2).is_none());
        assert!(t.update(b(), 3).is_none());
        assert!(t.update(b(), 4).is_none());
        let accepted = t.update(b(), 5).expect("third B accepts");
        assert_eq!(accepted.event.entered_zones, vec!["B"]);
        assert_eq!(accepted.event.network_time, 5);
        assert_eq!(t.current_zones(), Some(&[1usize][..]));

        assert!(t.update(a(), 6).is_none());
        assert_eq!(t.current_zones(), Some(&[1usize][..]));
        assert_eq!(t.consecutive_mismatches(), 1);
    }

    #[test]
    fn test_matching_reading_resets_count() {
        let mut t = tracker(3);
        for _ in 0..3 {
            t.update(a(), 0);
        }
        t.update(b(), 0);
        t.update(b(), 0);
        assert_eq!(t.consecutive_mismatches(), 2);
        assert!(t.update(a(), 0).is_none());
        assert_eq!(t.consecutive_mismatches(), 0);
        assert!(t.update(b(), 0).is_none());
        assert!(t.update(b(), 0).is_none());
        assert!(t.update(b(), 0).is_some());
    }

    #[test]
    fn test_differing_readings_count_together() {
        let mut t = tracker(2);
        t.update(a(), 0);
        t.update(a(), 0);
        assert_eq!(t.current_zones(), Some(&[0usize][..]));

        // Jitter between B and C still leaves A; the reading that reaches
        // the threshold is the one accepted
        assert!(t.update(b(), 1).is_none());
        let accepted = t.update(c(), 2).expect("second mismatch accepts");
        assert_eq!(accepted.event.entered_zones, vec!["C"]);
        assert_eq!(t.current_zones(), Some(&[2usize][..]));
    }

    #[test]
    fn test_alternating_border_readings_leave_old_zone() {
        let mut t = tracker(2);
        t.update(a(), 0);
        t.update(a(), 0);

        let mut accepted = 0;
        for i in 0..100u64 {
            let raw = if i % 2 == 0 { b() } else { c() };
            if t.update(raw, i).is_some() {
                accepted += 1;
            }
        }
        assert!(accepted > 0);
        assert_ne!(t.current_zones(), Some(&[0usize][..]));
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut t = tracker(1);
        let transition = t.update(smallvec![0, 9], 0).unwrap();
        assert_eq!(transition.event.entered_zones, vec!["A"]);
        assert_eq!(transition.command, LedCommand::round_robin([Rgb::new(255, 0, 0)], 500));
    }

    #[test]
    fn test_repeated_reading_is_idempotent() {
        let mut t = tracker(2);
        assert!(t.update(a(), 0).is_none());
        assert!(t.update(a(), 0).is_some());
        for i in 0..50 {
            assert!(t.update(a(), i).is_none());
            assert_eq!(t.consecutive_mismatches(), 0);
        }
        assert_eq!(t.current_zones(), Some(&[0usize][..]));
    }

    #[test]
    fn test_threshold_zero_and_one_accept_immediately() {
        for hysteresis in [0, 1] {
            let mut t = tracker(hysteresis);
            assert!(t.update(a(), 0).is_some());
            assert!(t.update(b(), 0).is_some());
            assert!(t.update(b(), 0).is_none());
        }
    }

    #[test]
    fn test_first_empty_reading_emits_clear() {
        let mut t = tracker(1);
        let transition = t.update(none(), 9).unwrap();
        assert!(transition.command.is_clear());
        assert!(transition.event.entered_zones.is_empty());
        assert_eq!(transition.event.exited_zones, vec!["A", "B", "C"]);
        assert!(!t.is_active());
    }

    #[test]
    fn test_multi_zone_command_staggers_colors() {
        let mut t = tracker(1);
        let transition = t.update(smallvec![0, 2], 0).unwrap();
        assert_eq!(transition.event.entered_zones, vec!["A", "C"]);
        assert_eq!(transition.event.exited_zones, vec!["B"]);
        assert_eq!(
            transition.command.states,
            vec![
                LedState { start_offset_ms: 0, duration_ms: 500, cycle_length_ms: 1000, color: Rgb::new(255, 0, 0) },
                LedState { start_offset_ms: 500, duration_ms: 500, cycle_length_ms: 1000, color: Rgb::new(0, 0, 255) },
            ]
        );
    }

    #[test]
    fn test_force_clear() {
        let mut t = tracker(1);
        assert_eq!(t.force_clear(), None);

        t.update(a(), 0);
        t.update(a(), 42);
        assert!(t.is_active());
        let cleared = t.force_clear().unwrap();
        assert_eq!(cleared.command, LedCommand::clear());
        assert!(cleared.event.entered_zones.is_empty());
        assert_eq!(cleared.event.exited_zones, vec!["A", "B", "C"]);
        assert_eq!(cleared.event.network_time, 42);
        assert!(!t.is_active());
        assert_eq!(t.force_clear(), None);
    }
}
