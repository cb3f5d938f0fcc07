//! Per-connection lifecycle: one read task and one write task per accepted
//! socket, decoupled by the connection's bounded outbound queue.
//!
//! Teardown can start from either side — a read error, a liveness deadline,
//! a write failure, or displacement by a reconnect. Whichever side notices
//! first unregisters the connection; the other side is unblocked by the
//! queue closing or the close handshake reaching the socket.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, timeout_at, Instant};

use crate::relay::registry::{ConnectionKey, RoomRegistry};
use crate::relay::{InboundEvent, RelaySettings, RoomId, UserId};
use crate::state::AppState;

/// Run an authenticated connection to completion: register it, start the
/// write task, and drive the read loop until the connection dies.
///
/// Registration and task startup cannot fail once the upgrade succeeded, so
/// everything after this point is observable only as disconnection.
pub async fn run(socket: WebSocket, state: AppState, user_id: UserId, room_id: RoomId) {
    let settings = state.relay;
    let (ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_capacity);

    let key = state.registry.register(room_id, user_id, outbound_tx);
    tracing::info!(room_id, user_id, conn_id = key.conn_id, "connection joined room");

    let writer = tokio::spawn(write_loop(
        ws_sink,
        outbound_rx,
        state.registry.clone(),
        key,
        settings,
    ));

    read_loop(&mut ws_stream, &state, key).await;

    // Closing: remove the registry entry (closing the outbound queue) and
    // wait for the write task to send its Close frame and release the sink.
    state.registry.unregister(&key);
    let _ = writer.await;
    tracing::info!(room_id, user_id, conn_id = key.conn_id, "connection closed");
}

/// Read frames until error, close, or liveness deadline. Text frames are
/// persisted through the store and handed to the dispatcher. The frame-size
/// cap is enforced by the protocol layer (set on the upgrade), so an
/// oversized frame surfaces here as a receive error.
async fn read_loop(stream: &mut SplitStream<WebSocket>, state: &AppState, key: ConnectionKey) {
    let settings = state.relay;
    let mut deadline = Instant::now() + settings.pong_wait;

    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                tracing::warn!(
                    room_id = key.room_id,
                    user_id = key.user_id,
                    "liveness deadline lapsed, closing connection"
                );
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                tracing::warn!(
                    room_id = key.room_id,
                    user_id = key.user_id,
                    error = %err,
                    "websocket receive error"
                );
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                if !store_and_submit(state, key, text.as_str().to_owned()).await {
                    // The dispatcher is gone — relay shutdown.
                    break;
                }
            }
            Message::Pong(_) => {
                deadline = Instant::now() + settings.pong_wait;
            }
            Message::Ping(_) => {
                // The protocol layer queues the pong reply on its own.
            }
            Message::Binary(_) => {
                tracing::debug!(
                    room_id = key.room_id,
                    user_id = key.user_id,
                    "ignoring binary frame on text protocol"
                );
            }
            Message::Close(frame) => {
                tracing::info!(
                    room_id = key.room_id,
                    user_id = key.user_id,
                    reason = ?frame,
                    "client initiated close"
                );
                break;
            }
        }
    }
}

/// Persist one inbound message and enqueue the enriched result for fan-out.
/// A store failure drops this message only; the connection stays up.
/// Returns false when the dispatcher's inbound queue is closed.
async fn store_and_submit(state: &AppState, key: ConnectionKey, text: String) -> bool {
    let store = state.store.clone();
    let saved =
        tokio::task::spawn_blocking(move || store.save_message(key.room_id, key.user_id, &text))
            .await;

    let message = match saved {
        Ok(Ok(message)) => message,
        Ok(Err(err)) => {
            tracing::warn!(
                room_id = key.room_id,
                user_id = key.user_id,
                error = %err,
                "failed to store message, dropping frame"
            );
            return true;
        }
        Err(err) => {
            tracing::error!(
                room_id = key.room_id,
                user_id = key.user_id,
                error = %err,
                "store task panicked, dropping frame"
            );
            return true;
        }
    };

    let payload = match serde_json::to_string(&message) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize stored message");
            return true;
        }
    };

    state
        .inbound_tx
        .send(InboundEvent {
            room_id: key.room_id,
            payload: payload.into(),
        })
        .await
        .is_ok()
}

/// Drain the outbound queue onto the socket and send a liveness ping on a
/// fixed period. Exits when the queue is closed and drained (sending a Close
/// frame first) or on any write failure.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<axum::extract::ws::Utf8Bytes>,
    registry: Arc<RoomRegistry>,
    key: ConnectionKey,
    settings: RelaySettings,
) {
    let mut ping = interval(settings.ping_period());
    // The first tick completes immediately; skip it.
    ping.tick().await;

    loop {
        tokio::select! {
            entry = outbound.recv() => match entry {
                Some(payload) => {
                    match timeout(settings.write_wait, sink.send(Message::Text(payload))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            tracing::warn!(
                                room_id = key.room_id,
                                user_id = key.user_id,
                                error = %err,
                                "socket write failed"
                            );
                            break;
                        }
                        Err(_) => {
                            tracing::warn!(
                                room_id = key.room_id,
                                user_id = key.user_id,
                                "socket write timed out"
                            );
                            break;
                        }
                    }
                }
                None => {
                    // Queue closed by unregistration and fully drained.
                    let _ = timeout(settings.write_wait, sink.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => {
                let probe = sink.send(Message::Ping(Bytes::new()));
                if !matches!(timeout(settings.write_wait, probe).await, Ok(Ok(()))) {
                    tracing::debug!(
                        room_id = key.room_id,
                        user_id = key.user_id,
                        "ping write failed"
                    );
                    break;
                }
            }
        }
    }

    // A write-side failure may be the first sign of a dead connection; make
    // sure the registry entry is gone (no-op if the read side got there
    // first or a reconnect already displaced us).
    registry.unregister(&key);
    let _ = sink.close().await;
}
