//! UDP multicast transport for position reports
//!
//! The listener decodes each datagram and forwards the reports to the
//! dispatcher with `try_send`, so a slow dispatcher never stalls the socket.
//! Undecodable datagrams are logged, counted and skipped.

use crate::domain::types::PositionReport;
use crate::infra::config::MulticastEndpoint;
use crate::infra::metrics::Metrics;
use crate::io::cdp::{self, MAX_FRAME_LEN};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Create a multicast socket bound to the endpoint's port and join the group.
pub fn bind_multicast(endpoint: &MulticastEndpoint) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(not(windows))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, endpoint.port);
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&endpoint.group, &endpoint.interface)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Create a socket for sending to the endpoint's multicast group.
pub fn bind_sender(endpoint: &MulticastEndpoint) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_nonblocking(true)?;
    if !endpoint.interface.is_unspecified() {
        socket.set_multicast_if_v4(&endpoint.interface)?;
    }
    socket.set_multicast_loop_v4(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Read datagrams until shutdown, forwarding decoded position reports.
pub async fn start_position_listener(
    socket: UdpSocket,
    report_tx: mpsc::Sender<PositionReport>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = vec![0u8; MAX_FRAME_LEN];

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now().checked_sub(Duration::from_secs(2)).unwrap_or_else(Instant::now);

    info!(local_addr = ?socket.local_addr().ok(), "position_listener_started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("position_listener_shutdown");
                    return Ok(());
                }
            }
            result = socket.recv_from(&mut buf) => {
                let (len, peer) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        error!(error = %e, "position_listener_recv_failed");
                        continue;
                    }
                };
                metrics.record_frame_received();

                let reports = match cdp::decode_positions(&buf[..len]) {
                    Ok(reports) => reports,
                    Err(e) => {
                        metrics.record_frame_rejected();
                        warn!(peer = %peer, bytes = %len, error = %e, "frame_rejected");
                        continue;
                    }
                };

                for report in reports {
                    debug!(tag_id = %report.tag_id, x = %report.x, y = %report.y, "position_received");
                    match report_tx.try_send(report) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            metrics.record_report_dropped();
                            if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                warn!("position_report_dropped: channel full");
                                last_drop_warn = Instant::now();
                            }
                        }
                        Err(TrySendError::Closed(_)) => {
                            info!("position_listener_channel_closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
