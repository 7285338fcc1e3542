use std::time::Duration;

use service::config::PeerConfig;
use service::{Handlers, PeerId, ReceiverContext, ReceiverOptions};
use tokio::net::UdpSocket;
use tokio::time::interval;

use crate::config::Config;

struct LoggingHandlers;

impl Handlers for LoggingHandlers {
    fn on_auth(&self, peer: PeerId, remote: std::net::SocketAddr) -> bool {
        log::info!("peer {peer:?} authenticated from {remote}");
        true
    }

    fn on_disconnect(&self, peer: PeerId) {
        log::warn!("peer {peer:?} is dead");
    }

    fn on_data(&self, flow: service::flow::FlowId, data: &[u8]) {
        log::trace!("flow {flow:#x}: delivered {} bytes", data.len());
    }

    fn on_oob(&self, peer: PeerId, data: &[u8]) {
        log::debug!("peer {peer:?}: oob block of {} bytes", data.len());
    }

    fn on_stats(&self, peer: PeerId, stats: &service::peer::PeerStats) {
        log::info!(
            "peer {peer:?}: received={} recovered={} lost={} rtt={}ms",
            stats.received,
            stats.recovered,
            stats.lost,
            stats.rtt_smoothed_ms
        );
    }

    fn on_nack(&self, peer: PeerId, sequences: &[u32]) {
        log::trace!("peer {peer:?}: unexpected inbound nack for {} sequences", sequences.len());
    }

    fn on_receiver_report(&self, peer: PeerId, report: &codec::payload::ReceiverReport) {
        log::trace!("peer {peer:?}: unexpected inbound receiver report: {report:?}");
    }
}

/// Runs the receiver-side event loop: one cooperative task multiplexing the
/// UDP socket, the reorder/NACK tick, and the stats tick.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(config.rist.listen).await?;

    let mut receiver = ReceiverContext::new(ReceiverOptions {
        handler: LoggingHandlers,
        reorder_window: 8192,
        profile: config.rist.profile.into(),
    });

    for peer in &config.peers {
        receiver.register_peer(peer.address, config.rist.listen, peer.clone())?;
    }

    let mut tick = interval(Duration::from_millis(1));
    let mut stats_tick = interval(Duration::from_millis(config.rist.stats_interval_ms));
    let mut buf = vec![0u8; 65_535];

    loop {
        tokio::select! {
            recv = socket.recv_from(&mut buf) => {
                let (len, remote) = recv?;
                if let Err(err) = receiver.on_datagram(remote, config.rist.listen, &buf[..len]) {
                    log::debug!("dropped datagram from {remote}: {err}");
                }
            }
            _ = tick.tick() => {
                for nack in receiver.tick() {
                    if let Err(err) = socket.send_to(&nack.bytes, nack.remote).await {
                        log::debug!("failed to send nack to {}: {err}", nack.remote);
                    }
                }
            }
            _ = stats_tick.tick() => {
                receiver.report_stats();
                for peer_id in receiver.peer_ids() {
                    let Some(rr) = receiver.build_receiver_report(peer_id) else { continue };
                    if let Err(err) = socket.send_to(&rr.bytes, rr.remote).await {
                        log::debug!("failed to send receiver report to {}: {err}", rr.remote);
                    }
                }
            }
        }
    }
}
