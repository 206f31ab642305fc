//! Best-effort fan-out of engine events to every connected subscriber

use futures_util::Stream;
use log::{debug, warn};
use tokio::sync::broadcast;

use crate::models::FlasherEvent;

/// Relays events; owns no domain state.
///
/// Subscribers only see events published after they subscribed. Late joiners
/// pull current status from the components directly.
#[derive(Clone)]
pub struct ProgressPublisher {
    tx: broadcast::Sender<FlasherEvent>,
}

impl ProgressPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(16));
        Self { tx }
    }

    pub fn publish(&self, event: FlasherEvent) {
        debug!("Publishing {:?}", event);
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlasherEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Subscription as a stream; lagging subscribers skip what they missed
    pub fn stream(&self) -> impl Stream<Item = FlasherEvent> + Send + 'static {
        let rx = self.subscribe();
        futures_util::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
