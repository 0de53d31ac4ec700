//! Services - breach detection and dispatch
//!
//! - `breach_tracker` - Per-tag hysteresis state machine
//! - `dispatcher` - Routes position reports to trackers and emits LED commands

pub mod breach_tracker;
pub mod dispatcher;

// Re-export commonly used types
pub use breach_tracker::{BreachTracker, TrackerSettings, Transition};
pub use dispatcher::{CommandSink, Dispatcher};
