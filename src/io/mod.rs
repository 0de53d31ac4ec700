//! IO modules - external system interfaces
//!
//! - `cdp` - binary codec for position reports and LED commands
//! - `udp` - multicast sockets and the position listener
//! - `command_channel` - non-blocking LED command sink and its network worker
//! - `egress` - breach events to file (JSONL format)

pub mod cdp;
pub mod command_channel;
pub mod egress;
pub mod udp;

// Re-export commonly used types
pub use command_channel::{create_command_worker, CommandSender, CommandWorker};
pub use egress::BreachEgress;
pub use udp::{bind_multicast, bind_sender, start_position_listener};
