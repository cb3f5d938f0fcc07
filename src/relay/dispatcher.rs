//! Fan-out dispatcher: the single consumer of the shared inbound queue.
//!
//! Each dequeued event is fanned out to every connection registered in the
//! target room by a non-blocking enqueue onto that member's outbound queue.
//! A full queue drops the message for that member only, so one slow receiver
//! never stalls delivery to the rest of the room.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::registry::RoomRegistry;
use super::InboundEvent;

pub struct Dispatcher {
    registry: Arc<RoomRegistry>,
    inbound: mpsc::Receiver<InboundEvent>,
}

impl Dispatcher {
    /// Create the dispatcher and the sending half of its bounded inbound
    /// queue. Connection read tasks hold clones of the sender.
    pub fn new(
        registry: Arc<RoomRegistry>,
        queue_capacity: usize,
    ) -> (mpsc::Sender<InboundEvent>, Self) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        (
            tx,
            Self {
                registry,
                inbound: rx,
            },
        )
    }

    /// Consume the inbound queue until every sender is gone. Messages from a
    /// single room are fanned out in dequeue order.
    pub async fn run(mut self) {
        while let Some(event) = self.inbound.recv().await {
            self.fan_out(event);
        }
        tracing::debug!("inbound queue closed, dispatcher stopping");
    }

    fn fan_out(&self, event: InboundEvent) {
        let members = self.registry.snapshot(event.room_id);
        for member in members {
            match member.sender.try_send(event.payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        room_id = event.room_id,
                        user_id = member.user_id,
                        "outbound queue full, dropping message for member"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    // Member is mid-teardown; its unregistration will catch up.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_WAIT: Duration = Duration::from_secs(1);

    fn event(room_id: i64, payload: &str) -> InboundEvent {
        InboundEvent {
            room_id,
            payload: payload.to_string().into(),
        }
    }

    #[tokio::test]
    async fn fans_out_to_all_room_members_in_order() {
        let registry = Arc::new(RoomRegistry::new());
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let (tx3, mut rx3) = mpsc::channel(8);
        registry.register(42, 1, tx1);
        registry.register(42, 2, tx2);
        registry.register(7, 3, tx3);

        let (inbound_tx, dispatcher) = Dispatcher::new(registry, 16);
        tokio::spawn(dispatcher.run());

        inbound_tx.send(event(42, "first")).await.unwrap();
        inbound_tx.send(event(42, "second")).await.unwrap();

        for rx in [&mut rx1, &mut rx2] {
            let a = timeout(RECV_WAIT, rx.recv()).await.unwrap().unwrap();
            let b = timeout(RECV_WAIT, rx.recv()).await.unwrap().unwrap();
            assert_eq!(a.as_str(), "first");
            assert_eq!(b.as_str(), "second");
        }

        // The other room saw nothing.
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_member_queue_drops_without_stalling_the_room() {
        let registry = Arc::new(RoomRegistry::new());
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        registry.register(42, 1, slow_tx);
        registry.register(42, 2, fast_tx);

        let (inbound_tx, dispatcher) = Dispatcher::new(registry, 16);
        tokio::spawn(dispatcher.run());

        inbound_tx.send(event(42, "first")).await.unwrap();
        inbound_tx.send(event(42, "second")).await.unwrap();

        // The fast member gets both, in order.
        let a = timeout(RECV_WAIT, fast_rx.recv()).await.unwrap().unwrap();
        let b = timeout(RECV_WAIT, fast_rx.recv()).await.unwrap().unwrap();
        assert_eq!(a.as_str(), "first");
        assert_eq!(b.as_str(), "second");

        // The slow member's queue held one entry; the second was dropped.
        let only = timeout(RECV_WAIT, slow_rx.recv()).await.unwrap().unwrap();
        assert_eq!(only.as_str(), "first");
        assert!(slow_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_member_queue_is_skipped() {
        let registry = Arc::new(RoomRegistry::new());
        let (gone_tx, gone_rx) = mpsc::channel(8);
        let (live_tx, mut live_rx) = mpsc::channel(8);
        registry.register(42, 1, gone_tx);
        registry.register(42, 2, live_tx);
        drop(gone_rx);

        let (inbound_tx, dispatcher) = Dispatcher::new(registry, 16);
        tokio::spawn(dispatcher.run());

        inbound_tx.send(event(42, "hello")).await.unwrap();

        let got = timeout(RECV_WAIT, live_rx.recv()).await.unwrap().unwrap();
        assert_eq!(got.as_str(), "hello");
    }
}
