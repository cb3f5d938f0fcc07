use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored chat message, enriched with the sender's display metadata.
/// This is also the outbound wire format: one such record is serialized as
/// a single JSON text frame per message. Field names are part of the client
/// contract, hence the camelCase renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub username: String,
    /// Absolute CDN URL when the sender has an avatar.
    pub profile_image: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
