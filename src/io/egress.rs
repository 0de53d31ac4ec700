//! Breach egress - appends accepted zone transitions to a file
//!
//! Events are written in JSONL format (one JSON object per line).

use crate::domain::types::{epoch_ms, BreachEvent};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, error, info};

#[derive(Serialize)]
struct BreachRecord<'a> {
    /// Wall-clock time the transition was accepted (epoch ms)
    ts: u64,
    /// Same instant, RFC 3339 UTC
    time: String,
    #[serde(flatten)]
    event: &'a BreachEvent,
}

/// Egress writer for breach events
pub struct BreachEgress {
    file_path: String,
}

impl BreachEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write an event to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_event(&self, event: &BreachEvent) -> bool {
        let time = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        let line = match serde_json::to_string(&BreachRecord { ts: epoch_ms(), time, event }) {
            Ok(line) => line,
            Err(e) => {
                error!(tag_id = %event.tag_id, error = %e, "breach_serialize_failed");
                return false;
            }
        };

        match self.append_line(&line) {
            Ok(()) => true,
            Err(e) => {
                error!(tag_id = %event.tag_id, error = %e, "breach_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}
