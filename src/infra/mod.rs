//! Infrastructure - configuration and metrics
//!
//! - `config` - Application configuration (TOML loading, zone validation, defaults)
//! - `metrics` - Lock-free metrics collection

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use metrics::Metrics;
