//! Shared types for the geofence gateway

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for tag serial numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TagId(pub u64);

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// A decoded position report for one tag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReport {
    pub tag_id: TagId,
    pub x: f64,
    pub y: f64,
    /// Network time of the fix, in network clock ticks
    pub network_time: u64,
}

/// Zone display color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One timed color slot of an LED pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedState {
    pub start_offset_ms: u32,
    pub duration_ms: u32,
    pub cycle_length_ms: u32,
    pub color: Rgb,
}

/// Indicator pattern addressed to a single tag
///
/// An empty pattern resets the tag's LED to its default behavior.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedCommand {
    pub states: Vec<LedState>,
}

impl LedCommand {
    /// Reset the LED to default behavior
    pub fn clear() -> Self {
        Self { states: Vec::new() }
    }

    /// Round-robin over the given colors, one slot each
    pub fn round_robin<I>(colors: I, slot_ms: u32) -> Self
    where
        I: IntoIterator<Item = Rgb>,
        I::IntoIter: ExactSizeIterator,
    {
        let colors = colors.into_iter();
        let cycle_length_ms = slot_ms.saturating_mul(colors.len() as u32);
        let states = colors
            .enumerate()
            .map(|(i, color)| LedState {
                start_offset_ms: slot_ms.saturating_mul(i as u32),
                duration_ms: slot_ms,
                cycle_length_ms,
                color,
            })
            .collect();
        Self { states }
    }

    #[inline]
    pub fn is_clear(&self) -> bool {
        self.states.is_empty()
    }
}

/// An accepted change of zone membership
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreachEvent {
    pub tag_id: TagId,
    /// Every zone the tag is now inside
    pub entered_zones: Vec<String>,
    /// Every configured zone the tag is now outside of
    pub exited_zones: Vec<String>,
    pub network_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_offsets() {
        let cmd = LedCommand::round_robin([Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)], 500);
        assert_eq!(
            cmd.states,
            vec![
                LedState { start_offset_ms: 0, duration_ms: 500, cycle_length_ms: 1000, color: Rgb::new(255, 0, 0) },
                LedState { start_offset_ms: 500, duration_ms: 500, cycle_length_ms: 1000, color: Rgb::new(0, 0, 255) },
            ]
        );
        assert!(!cmd.is_clear());
    }

    #[test]
    fn test_clear() {
        assert!(LedCommand::clear().is_clear());
        assert_eq!(LedCommand::round_robin(std::iter::empty::<Rgb>(), 500), LedCommand::clear());
    }

    #[test]
    fn test_tag_id_display() {
        assert_eq!(TagId(0x0A0B0C).to_string(), "000A0B0C");
    }
}
