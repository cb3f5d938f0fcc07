use std::sync::Arc;

use tokio::sync::mpsc;

use crate::relay::registry::RoomRegistry;
use crate::relay::{InboundEvent, RelaySettings};
use crate::store::MessageStore;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator: stores and enriches inbound messages
    pub store: Arc<dyn MessageStore>,
    /// Room membership table shared with the dispatcher
    pub registry: Arc<RoomRegistry>,
    /// Sending half of the dispatcher's shared inbound queue
    pub inbound_tx: mpsc::Sender<InboundEvent>,
    /// HS256 secret for validating access tokens
    pub jwt_secret: Vec<u8>,
    /// Liveness and queue tuning for connections
    pub relay: RelaySettings,
}
