//! Room registry: the shared, lock-protected table of which connections are
//! currently joined to which room.
//!
//! One registry instance exists per relay process and is dependency-injected
//! into the upgrade handler and the dispatcher, so tests can run several
//! independent instances side by side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{OutboundSender, RoomId, UserId};

/// One registered connection as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub user_id: UserId,
    pub conn_id: u64,
    pub sender: OutboundSender,
}

/// Handle a connection keeps for its own cleanup. The `conn_id` makes
/// unregistration identity-checked: a connection displaced by a newer one
/// must not tear down its replacement's registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionKey {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub conn_id: u64,
}

/// Mapping from room to its member set, keyed by user. All operations are
/// short in-memory bookkeeping under a single lock; the lock is never held
/// across socket I/O or queue sends.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, HashMap<UserId, RoomMember>>>,
    next_conn_id: AtomicU64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a connection's outbound sender under (room, user).
    ///
    /// Last-connect-wins: if the slot is already occupied, the previous
    /// entry is displaced and its outbound queue closes here (the registry
    /// holds the only long-lived sender), so the displaced connection's
    /// write task drains, sends a Close frame, and exits.
    pub fn register(&self, room_id: RoomId, user_id: UserId, sender: OutboundSender) -> ConnectionKey {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let member = RoomMember {
            user_id,
            conn_id,
            sender,
        };
        let displaced = {
            let mut rooms = self.rooms.lock().expect("registry lock poisoned");
            rooms.entry(room_id).or_default().insert(user_id, member)
        };
        if let Some(old) = displaced {
            tracing::info!(
                room_id,
                user_id,
                old_conn_id = old.conn_id,
                conn_id,
                "reconnect displaced previous connection"
            );
        }
        ConnectionKey {
            room_id,
            user_id,
            conn_id,
        }
    }

    /// Remove the entry for `key` if it is still the registered connection.
    /// A stale key (the slot is absent or held by a newer connection) is the
    /// expected outcome of last-connect-wins and is a no-op.
    pub fn unregister(&self, key: &ConnectionKey) {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        let Some(members) = rooms.get_mut(&key.room_id) else {
            return;
        };
        match members.get(&key.user_id) {
            Some(current) if current.conn_id == key.conn_id => {
                // Dropping the stored sender closes the outbound queue.
                members.remove(&key.user_id);
                if members.is_empty() {
                    rooms.remove(&key.room_id);
                }
            }
            Some(current) => {
                tracing::debug!(
                    room_id = key.room_id,
                    user_id = key.user_id,
                    conn_id = key.conn_id,
                    current_conn_id = current.conn_id,
                    "stale unregister ignored"
                );
            }
            None => {}
        }
    }

    /// Copy of the room's current member set for fan-out. Copy-then-release:
    /// the caller sends without the lock held.
    pub fn snapshot(&self, room_id: RoomId) -> Vec<RoomMember> {
        self.rooms
            .lock()
            .expect("registry lock poisoned")
            .get(&room_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every registered sender. Each connection's write task drains its
    /// queue, sends a Close frame, and exits; read tasks unblock via the
    /// close handshake or their liveness deadline. Used on shutdown.
    pub fn close_all(&self) {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        let count: usize = rooms.values().map(HashMap::len).sum();
        rooms.clear();
        if count > 0 {
            tracing::info!(connections = count, "closed all registered connections");
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
