//! Peer state machine, flow aggregation, and the sender/receiver protocol
//! engines built on top of `rist_codec`'s wire framing.

pub mod config;
pub mod flow;
pub mod oob;
pub mod peer;
pub mod receiver;
pub mod reorder;
pub mod retransmit;
pub mod sender;
pub mod seq;
pub mod table;

pub use peer::{Peer, PeerId, PeerKey, PeerState};
pub use receiver::{ReceiverContext, ReceiverOptions};
pub use sender::{Outbound, SenderContext, SenderOptions};

#[derive(Debug)]
pub enum Error {
    InvalidConfig(&'static str),
    WouldBlock,
    TimedOut,
    MalformedPacket,
    DecryptFailed,
    PeerDead,
    RingFull,
    Unauthorized,
    NotStarted,
    AlreadyStarted,
    Fatal(&'static str),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<codec::Error> for Error {
    fn from(value: codec::Error) -> Self {
        match value {
            codec::Error::DecryptFailed => Self::DecryptFailed,
            codec::Error::Decompress
            | codec::Error::Truncated
            | codec::Error::ReservedBitsSet
            | codec::Error::UnknownPayloadType(_)
            | codec::Error::TryFromSliceError(_) => Self::MalformedPacket,
        }
    }
}

/// Capability record the application installs on a context.
///
/// Every method has a default no-op body, so a caller only overrides the
/// callbacks it cares about.
pub trait Handlers: Send + Sync {
    /// Called once a peer's auth handshake completes. Returning `false`
    /// rejects the peer and drives it straight to `dead`.
    #[allow(unused_variables)]
    fn on_auth(&self, peer: PeerId, remote: std::net::SocketAddr) -> bool {
        true
    }

    /// Invoked exactly once per peer, when it transitions to `dead`.
    #[allow(unused_variables)]
    fn on_disconnect(&self, peer: PeerId) {}

    /// A reordered, de-duplicated application data block is ready.
    #[allow(unused_variables)]
    fn on_data(&self, flow: flow::FlowId, data: &[u8]) {}

    /// An out-of-band block arrived (or is being delivered from the FIFO).
    #[allow(unused_variables)]
    fn on_oob(&self, peer: PeerId, data: &[u8]) {}

    /// Fired on the configured stats interval with a snapshot.
    #[allow(unused_variables)]
    fn on_stats(&self, peer: PeerId, stats: &peer::PeerStats) {}

    /// A NACK (range or bitmask) addressed to this peer arrived, naming the
    /// sequences it's missing. Only reachable on a context that shares a
    /// socket with the peer's own sender role.
    #[allow(unused_variables)]
    fn on_nack(&self, peer: PeerId, sequences: &[u32]) {}

    /// A receiver report addressed to this peer arrived, describing its
    /// reception quality for traffic this end is sending it.
    #[allow(unused_variables)]
    fn on_receiver_report(&self, peer: PeerId, report: &codec::payload::ReceiverReport) {}
}
