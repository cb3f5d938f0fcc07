//! The relay core: room registry, fan-out dispatcher, and the shared types
//! that tie a connection's read path to every other member's write path.

pub mod dispatcher;
pub mod registry;

use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;

/// Identifies an event's chat room. Rooms are created and destroyed by the
/// surrounding platform; the relay only routes by them.
pub type RoomId = i64;

/// Identifies the authenticated principal behind a connection.
pub type UserId = i64;

/// Sending half of a connection's bounded outbound queue. The registry holds
/// the only long-lived sender; the dispatcher clones it transiently during
/// fan-out, so removing the registry entry closes the queue.
pub type OutboundSender = mpsc::Sender<Utf8Bytes>;

/// A stored-and-enriched message on its way from one connection's read task
/// to the dispatcher. The payload is serialized exactly once; every room
/// member receives an identical frame.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub room_id: RoomId,
    pub payload: Utf8Bytes,
}

/// Runtime knobs for connection liveness and queue sizing.
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// How long to wait for a pong (or any read progress past the deadline)
    /// before declaring the peer dead.
    pub pong_wait: Duration,
    /// Upper bound on any single socket write.
    pub write_wait: Duration,
    /// Inbound frames larger than this are rejected by the protocol layer,
    /// closing the connection.
    pub max_frame_bytes: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
}

impl RelaySettings {
    /// Ping period must stay strictly below `pong_wait` so a healthy peer
    /// always has time to answer before the read deadline lapses.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(30),
            max_frame_bytes: 512,
            outbound_capacity: 100,
        }
    }
}
