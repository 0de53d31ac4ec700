//! Outbound LED command channel and worker
//!
//! The dispatcher hands commands to a `CommandSender`, which never blocks.
//! A `CommandWorker` task encodes each command into its own CDP packet and
//! writes it to the command socket. Dropping every sender lets the worker
//! flush what is queued and stop, which is how shutdown clears get out.

use crate::domain::types::{LedCommand, TagId};
use crate::infra::metrics::Metrics;
use crate::io::cdp::Encoder;
use crate::services::dispatcher::CommandSink;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Source serial stamped on packets from this gateway
const GATEWAY_SERIAL: u32 = 0;

/// A command waiting for the worker
#[derive(Debug)]
pub struct OutboundCommand {
    pub tag_id: TagId,
    pub command: LedCommand,
    /// When the command was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Non-blocking handle used by the dispatcher
///
/// Unbounded: commands are only produced on accepted transitions, and the
/// shutdown drain must never lose a clear.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<OutboundCommand>,
    metrics: Arc<Metrics>,
}

impl CommandSink for CommandSender {
    fn send(&self, tag_id: TagId, command: LedCommand) {
        let cmd = OutboundCommand { tag_id, command, enqueued_at: Instant::now() };
        if self.tx.send(cmd).is_err() {
            self.metrics.record_command_failed();
            warn!(tag_id = %tag_id, "led_command_dropped: worker stopped");
        }
    }
}

/// Worker that writes LED commands to the network
pub struct CommandWorker {
    rx: mpsc::UnboundedReceiver<OutboundCommand>,
    socket: UdpSocket,
    target: SocketAddr,
    encoder: Encoder,
    metrics: Arc<Metrics>,
}

impl CommandWorker {
    /// Run the worker, processing commands until every sender is dropped
    pub async fn run(mut self) {
        info!(target_addr = %self.target, "command_worker_started");

        while let Some(cmd) = self.rx.recv().await {
            let queue_delay_us = cmd.enqueued_at.elapsed().as_micros() as u64;

            let packet = match self.encoder.led_command(cmd.tag_id, &cmd.command) {
                Ok(packet) => packet,
                Err(e) => {
                    self.metrics.record_command_failed();
                    error!(tag_id = %cmd.tag_id, error = %e, "led_command_encode_failed");
                    continue;
                }
            };

            match self.socket.send_to(&packet, self.target).await {
                Ok(_) => {
                    self.metrics.record_command_sent();
                    debug!(
                        tag_id = %cmd.tag_id,
                        states = %cmd.command.states.len(),
                        queue_delay_us = %queue_delay_us,
                        "led_command_sent"
                    );
                }
                Err(e) => {
                    self.metrics.record_command_failed();
                    error!(tag_id = %cmd.tag_id, error = %e, "led_command_send_failed");
                }
            }
        }

        info!("command_worker_stopped");
    }
}

/// Create a command channel and worker
///
/// Returns the sender (for the dispatcher) and the worker (to be spawned)
pub fn create_command_worker(
    socket: UdpSocket,
    target: SocketAddr,
    metrics: Arc<Metrics>,
) -> (CommandSender, CommandWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = CommandSender { tx, metrics: metrics.clone() };
    let worker = CommandWorker { rx, socket, target, encoder: Encoder::new(GATEWAY_SERIAL), metrics };
    (sender, worker)
}
