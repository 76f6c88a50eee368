//! Per-session event channel.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use ens_domain::event::Event;

/// Buffer size of the session event channel. A slow consumer
/// backpressures the runtime once this many events are in flight.
pub const EVENT_BUFFER: usize = 128;

/// Sending half of a session's event channel.
///
/// Sends block on a full buffer. `close` drops the sender so consumers
/// see end-of-stream even while the runtime value itself stays alive;
/// sends after close (or with the consumer gone) are quietly discarded.
#[derive(Clone)]
pub struct EventBus {
    tx: Arc<Mutex<Option<mpsc::Sender<Event>>>>,
}

impl EventBus {
    pub fn channel() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    pub async fn send(&self, event: Event) {
        let sender = self.tx.lock().clone();
        match sender {
            Some(sender) => {
                if sender.send(event).await.is_err() {
                    tracing::debug!("event consumer dropped, discarding event");
                }
            }
            None => tracing::debug!("event bus closed, discarding event"),
        }
    }

    /// A raw sender for collaborators that emit events directly. The
    /// clone keeps the channel open only as long as the caller holds it.
    pub fn raw_sender(&self) -> Option<mpsc::Sender<Event>> {
        self.tx.lock().clone()
    }

    /// Signal end-of-stream to the consumer.
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let (bus, mut rx) = EventBus::channel();
        bus.send(Event::stream_started("root", "s1")).await;
        bus.send(Event::agent_choice("root", "s1", "hi")).await;
        bus.send(Event::stream_stopped("root", "s1")).await;

        assert_eq!(rx.recv().await.unwrap().kind(), "stream_started");
        assert_eq!(rx.recv().await.unwrap().kind(), "agent_choice");
        assert_eq!(rx.recv().await.unwrap().kind(), "stream_stopped");
    }

    #[tokio::test]
    async fn close_ends_the_consumer_stream() {
        let (bus, mut rx) = EventBus::channel();
        bus.send(Event::stream_stopped("root", "s1")).await;
        bus.close();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none(), "channel must report end-of-stream");

        // Late sends are discarded, not errors.
        bus.send(Event::stream_started("root", "s1")).await;
    }

    #[tokio::test]
    async fn closed_consumer_does_not_panic() {
        let (bus, rx) = EventBus::channel();
        drop(rx);
        bus.send(Event::stream_started("root", "s1")).await;
    }
}
