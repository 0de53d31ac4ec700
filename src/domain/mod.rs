//! Domain models - geometry, zones and shared types
//!
//! - `geometry` - points, segments and the segment intersection test
//! - `zone` - polygonal zones and point containment
//! - `types` - tag ids, position reports, LED commands, breach events

pub mod geometry;
pub mod types;
pub mod zone;

// Re-export commonly used types at module level
pub use geometry::{Point, Segment, COLLINEAR_EPSILON};
pub use types::{BreachEvent, LedCommand, LedState, PositionReport, Rgb, TagId};
pub use zone::{membership, Membership, Zone, ZoneError};
