use shared::Event;
use tokio::sync::broadcast;

/// Fan-out of runner events to any number of observers.
///
/// Each subscriber owns a bounded queue. Publishing never blocks; a
/// subscriber that falls behind loses its oldest events.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver a copy of `event` to every current subscriber.
    /// Returns how many subscribers received it.
    pub fn publish(&self, event: Event) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!("Event published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        tracing::debug!("Event subscriber added");
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Next event, skipping over anything lost to lag.
    /// `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event subscriber lagged, dropped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Event subscriber lagged, dropped {} events", n);
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        tracing::debug!("Event subscriber removed");
    }
}
