//! Tag simulator - drives the gateway without real hardware
//!
//! Walks one or more simulated tags between the centroids of the configured
//! zones, publishing Position V3 packets to the listen group. With
//! `--watch-commands` it also joins the command group and logs every LED
//! command the gateway sends back.
//!
//! Usage:
//!   cargo run --bin tag-sim -- --config config/dev.toml --tags 3

use clap::Parser;
use geofence_gateway::domain::Point;
use geofence_gateway::infra::Config;
use geofence_gateway::io::cdp::{decode_led_command, Encoder, PositionV3};
use geofence_gateway::io::{bind_multicast, bind_sender};
use std::net::{SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Serial this simulator stamps on its packets
const SIM_SOURCE_SERIAL: u32 = 0x5349_4D00;

#[derive(Parser, Debug)]
#[command(name = "tag-sim")]
#[command(about = "Publish simulated tag positions that walk through the configured zones")]
struct Args {
    /// Config file path (zones and network endpoints)
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Number of simulated tags
    #[arg(long, default_value = "1")]
    tags: u32,

    /// Serial of the first tag; further tags count up from here
    #[arg(long, default_value = "1")]
    first_serial: u32,

    /// Interval between position packets
    #[arg(long, default_value = "100")]
    interval_ms: u64,

    /// Distance moved per packet (mm)
    #[arg(long, default_value = "250")]
    step_mm: f64,

    /// Number of laps through all zones (0 = run until Ctrl+C)
    #[arg(long, default_value = "1")]
    laps: u32,

    /// Also log LED commands seen on the command group
    #[arg(long)]
    watch_commands: bool,
}

/// A tag walking a closed route
struct SimTag {
    serial: u32,
    route: Vec<Point>,
    leg: usize,
    position: Point,
    laps: u32,
}

impl SimTag {
    fn new(serial: u32, route: Vec<Point>, start_leg: usize) -> Self {
        let leg = start_leg % route.len();
        Self { serial, position: route[leg], route, leg, laps: 0 }
    }

    /// Move one step toward the next waypoint
    fn advance(&mut self, step: f64) {
        let next = (self.leg + 1) % self.route.len();
        let target = self.route[next];
        let (dx, dy) = (target.x - self.position.x, target.y - self.position.y);
        let distance = (dx * dx + dy * dy).sqrt();

        if distance <= step {
            self.position = target;
            self.leg = next;
            if next == 0 {
                self.laps += 1;
            }
        } else {
            self.position = Point::new(self.position.x + dx / distance * step, self.position.y + dy / distance * step);
        }
    }

    fn item(&self, network_time: u64) -> PositionV3 {
        PositionV3 {
            serial: self.serial,
            network_time,
            x: self.position.x.round() as i32,
            y: self.position.y.round() as i32,
            z: 0,
            quality: 100,
            anchor_count: 4,
            flags: 0,
            smoothing: 0,
        }
    }
}

/// Serials for `count` tags (at least one), wrapping past `u32::MAX`
fn tag_serials(first: u32, count: u32) -> impl Iterator<Item = u32> {
    (0..count.max(1)).map(move |i| first.wrapping_add(i))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    // Waypoints: every zone centroid, then a point well outside all of them
    let mut route: Vec<Point> = config.zones().iter().map(|zone| zone.centroid()).collect();
    let max_x = config.zones().iter().map(|zone| zone.bounding_box().max_x).fold(f64::MIN, f64::max);
    let max_y = config.zones().iter().map(|zone| zone.bounding_box().max_y).fold(f64::MIN, f64::max);
    route.push(Point::new(max_x + 5_000.0, max_y + 5_000.0));

    let mut tags: Vec<SimTag> = tag_serials(args.first_serial, args.tags)
        .enumerate()
        .map(|(i, serial)| SimTag::new(serial, route.clone(), i))
        .collect();

    let socket = bind_sender(config.listen())?;
    let target = SocketAddr::V4(SocketAddrV4::new(config.listen().group, config.listen().port));

    if args.watch_commands {
        let command_socket = bind_multicast(config.command())?;
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_536];
            loop {
                match command_socket.recv(&mut buf).await {
                    Ok(len) => match decode_led_command(&buf[..len]) {
                        Some((tag_id, command)) if command.is_clear() => {
                            info!(tag_id = %tag_id, "led_cleared");
                        }
                        Some((tag_id, command)) => {
                            let colors: Vec<String> = command
                                .states
                                .iter()
                                .map(|s| format!("#{:02X}{:02X}{:02X}", s.color.r, s.color.g, s.color.b))
                                .collect();
                            info!(tag_id = %tag_id, colors = ?colors, "led_set");
                        }
                        None => warn!(bytes = %len, "unrecognized_command_packet"),
                    },
                    Err(e) => {
                        warn!(error = %e, "command_recv_failed");
                        break;
                    }
                }
            }
        });
    }

    info!(
        target_addr = %target,
        tags = %tags.len(),
        zones = ?config.zone_names(),
        "tag_sim_started"
    );

    let mut encoder = Encoder::new(SIM_SOURCE_SERIAL);
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let started = Instant::now();
    let mut packets: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {}
        }

        let network_time = started.elapsed().as_micros() as u64;
        let items: Vec<PositionV3> = tags.iter().map(|tag| tag.item(network_time)).collect();
        let packet = encoder.positions(&items);
        if let Err(e) = socket.send_to(&packet, target).await {
            warn!(error = %e, "position_send_failed");
        }
        packets += 1;

        for tag in &mut tags {
            tag.advance(args.step_mm);
        }

        if args.laps > 0 && tags.iter().all(|tag| tag.laps >= args.laps) {
            break;
        }
    }

    info!(packets = %packets, elapsed_secs = %started.elapsed().as_secs(), "tag_sim_finished");
    Ok(())
}
