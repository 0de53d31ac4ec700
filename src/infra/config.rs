//! Configuration loading from TOML files
//!
//! Zones are validated one entry at a time: a malformed entry is logged and
//! dropped, the rest still load. Startup only fails when no zone survives.

use crate::domain::geometry::Point;
use crate::domain::types::Rgb;
use crate::domain::zone::{Zone, ZoneError, MIN_VERTICES};
use crate::services::breach_tracker::{TrackerSettings, DEFAULT_HYSTERESIS, DEFAULT_LED_SLOT_MS};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use toml::Value;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no usable zones in {0}")]
    NoUsableZones(String),
}

/// Why a `[[zones]]` entry was dropped
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZoneRejection {
    #[error("zone entry is not a table")]
    NotATable,
    #[error("name is missing")]
    MissingName,
    #[error("name is not a string")]
    NameNotString,
    #[error("name is already used by another zone")]
    DuplicateName,
    #[error("vertices are missing")]
    MissingVertices,
    #[error("vertices are not an array")]
    VerticesNotArray,
    #[error("vertex {index} is not an [x, y] pair")]
    VertexNotPair { index: usize },
    #[error("vertex {index} has a non-numeric coordinate")]
    VertexNotNumeric { index: usize },
    #[error("rgb is missing")]
    MissingRgb,
    #[error("rgb is not an array")]
    RgbNotArray,
    #[error("rgb needs exactly 3 values, got {0}")]
    RgbArity(usize),
    #[error("rgb value {index} is not an integer between 0 and 255")]
    RgbComponent { index: usize },
    #[error(transparent)]
    Geometry(#[from] ZoneError),
}

/// One side of the multicast transport
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MulticastEndpoint {
    pub group: Ipv4Addr,
    pub port: u16,
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,
}

fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Where the network publishes position reports
    #[serde(default = "default_listen")]
    pub listen: MulticastEndpoint,
    /// Where the network accepts device commands
    #[serde(default = "default_command")]
    pub command: MulticastEndpoint,
}

fn default_listen() -> MulticastEndpoint {
    MulticastEndpoint { group: Ipv4Addr::new(239, 255, 76, 67), port: 7668, interface: default_interface() }
}

fn default_command() -> MulticastEndpoint {
    MulticastEndpoint { group: Ipv4Addr::new(239, 255, 76, 67), port: 7667, interface: default_interface() }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { listen: default_listen(), command: default_command() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedConfig {
    /// Display time per zone color in a round-robin pattern
    #[serde(default = "default_led_slot_ms")]
    pub slot_ms: u32,
}

fn default_led_slot_ms() -> u32 {
    DEFAULT_LED_SLOT_MS
}

impl Default for LedConfig {
    fn default() -> Self {
        Self { slot_ms: default_led_slot_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Forget tags silent for this long (0 keeps them forever)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    600
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { idle_timeout_secs: default_idle_timeout_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EgressConfig {
    /// JSONL file for accepted breach events (disabled when absent)
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub hysteresis_value: Option<Value>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub led: LedConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub zones: Vec<Value>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    hysteresis: u32,
    led_slot_ms: u32,
    zones: Arc<[Zone]>,
    listen: MulticastEndpoint,
    command: MulticastEndpoint,
    idle_timeout_secs: u64,
    metrics_interval_secs: u64,
    egress_file: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse configuration text; `source` names it in diagnostics
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {}", source))?;

        let hysteresis = resolve_hysteresis(toml_config.hysteresis_value.as_ref());
        let zones = validate_zones(&toml_config.zones);
        if zones.is_empty() {
            return Err(ConfigError::NoUsableZones(source.to_string()).into());
        }

        let led_slot_ms = if toml_config.led.slot_ms == 0 {
            warn!(default = %DEFAULT_LED_SLOT_MS, "led_slot_ms_zero_using_default");
            DEFAULT_LED_SLOT_MS
        } else {
            toml_config.led.slot_ms
        };

        Ok(Self {
            config_file: source.to_string(),
            hysteresis,
            led_slot_ms,
            zones: Arc::from(zones),
            listen: toml_config.network.listen,
            command: toml_config.network.command,
            idle_timeout_secs: toml_config.registry.idle_timeout_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            egress_file: toml_config.egress.file.filter(|f| !f.is_empty()),
        })
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn hysteresis(&self) -> u32 {
        self.hysteresis
    }

    pub fn led_slot_ms(&self) -> u32 {
        self.led_slot_ms
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings { hysteresis: self.hysteresis, led_slot_ms: self.led_slot_ms }
    }

    pub fn zones(&self) -> &Arc<[Zone]> {
        &self.zones
    }

    pub fn zone_names(&self) -> Vec<&str> {
        self.zones.iter().map(Zone::name).collect()
    }

    pub fn listen(&self) -> &MulticastEndpoint {
        &self.listen
    }

    pub fn command(&self) -> &MulticastEndpoint {
        &self.command
    }

    /// Idle eviction window, None when disabled
    pub fn tag_idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn egress_file(&self) -> Option<&str> {
        self.egress_file.as_deref()
    }
}

/// Read the hysteresis threshold, substituting the default for anything unusable
fn resolve_hysteresis(value: Option<&Value>) -> u32 {
    let parsed = match value {
        None => {
            warn!(default = %DEFAULT_HYSTERESIS, "hysteresis_value_missing_using_default");
            return DEFAULT_HYSTERESIS;
        }
        Some(Value::Integer(i)) => Some(*i),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(i) if i < 0 => {
            warn!(value = %i, default = %DEFAULT_HYSTERESIS, "hysteresis_value_negative_using_default");
            DEFAULT_HYSTERESIS
        }
        Some(i) => u32::try_from(i).unwrap_or(u32::MAX),
        None => {
            warn!(default = %DEFAULT_HYSTERESIS, "hysteresis_value_invalid_using_default");
            DEFAULT_HYSTERESIS
        }
    }
}

/// Build every valid zone, logging the reason each invalid entry was dropped
fn validate_zones(entries: &[Value]) -> Vec<Zone> {
    let mut seen = HashSet::new();
    let mut zones = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let label = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", index));

        let result = parse_zone(entry).and_then(|zone| {
            if seen.insert(zone.name().to_string()) {
                Ok(zone)
            } else {
                Err(ZoneRejection::DuplicateName)
            }
        });

        match result {
            Ok(zone) => {
                info!(zone = %label, vertices = %zone.vertices().len(), "zone_accepted");
                zones.push(zone);
            }
            Err(reason) => {
                warn!(zone = %label, reason = %reason, "zone_rejected");
            }
        }
    }

    zones
}

/// Validate a single `[[zones]]` entry
pub fn parse_zone(entry: &Value) -> Result<Zone, ZoneRejection> {
    let table = entry.as_table().ok_or(ZoneRejection::NotATable)?;

    let name = match table.get("name") {
        None => return Err(ZoneRejection::MissingName),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(ZoneRejection::NameNotString),
    };

    let raw_vertices = match table.get("vertices") {
        None => return Err(ZoneRejection::MissingVertices),
        Some(Value::Array(a)) => a,
        Some(_) => return Err(ZoneRejection::VerticesNotArray),
    };
    if raw_vertices.len() < MIN_VERTICES {
        return Err(ZoneError::TooFewVertices(raw_vertices.len()).into());
    }
    let vertices = raw_vertices
        .iter()
        .enumerate()
        .map(|(index, v)| parse_vertex(index, v))
        .collect::<Result<Vec<_>, _>>()?;

    let color = match table.get("rgb") {
        None => return Err(ZoneRejection::MissingRgb),
        Some(Value::Array(a)) => parse_rgb(a)?,
        Some(_) => return Err(ZoneRejection::RgbNotArray),
    };

    Ok(Zone::new(name, vertices, color)?)
}

fn parse_vertex(index: usize, value: &Value) -> Result<Point, ZoneRejection> {
    let pair = match value.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => return Err(ZoneRejection::VertexNotPair { index }),
    };
    let coord = |v: &Value| match v {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    match (coord(&pair[0]), coord(&pair[1])) {
        (Some(x), Some(y)) => Ok(Point::new(x, y)),
        _ => Err(ZoneRejection::VertexNotNumeric { index }),
    }
}

fn parse_rgb(values: &[Value]) -> Result<Rgb, ZoneRejection> {
    if values.len() != 3 {
        return Err(ZoneRejection::RgbArity(values.len()));
    }
    let mut channels = [0u8; 3];
    for (index, (slot, value)) in channels.iter_mut().zip(values).enumerate() {
        *slot = value
            .as_integer()
            .and_then(|i| u8::try_from(i).ok())
            .ok_or(ZoneRejection::RgbComponent { index })?;
    }
    Ok(Rgb::new(channels[0], channels[1], channels[2]))
}
