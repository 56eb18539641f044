//! Process-wide change notifications between independently rendered views.

use std::{future::Future, time::Duration};

use shared::protocol::{ChangeEvent, ChangeTopic};
use tokio::{
    sync::broadcast::{self, error::RecvError, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

const DEFAULT_BUS_CAPACITY: usize = 256;

/// How long a view waits after a change notification before refetching, so
/// the backend's write-then-read path has settled.
pub const EVENTUAL_CONSISTENCY_GRACE_PERIOD: Duration = Duration::from_millis(2000);

#[derive(Clone)]
pub struct NotificationBus {
    events: broadcast::Sender<ChangeEvent>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    /// Publishes `event`; returns how many subscribers were listening.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        let topic = event.topic();
        match self.events.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(%topic, "change emitted with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self, topic: ChangeTopic) -> Subscription {
        self.subscribe_topics(&[topic])
    }

    pub fn subscribe_topics(&self, topics: &[ChangeTopic]) -> Subscription {
        Subscription {
            topics: topics.to_vec(),
            receiver: self.events.subscribe(),
        }
    }

    /// Runs `handler` on a background task for every event on `topic`.
    pub fn subscribe_with<H>(&self, topic: ChangeTopic, handler: H) -> SubscriptionHandle
    where
        H: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let mut subscription = self.subscribe(topic);
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event);
            }
        });
        SubscriptionHandle { topic, task }
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        debug!(topic = %handle.topic, "unsubscribing handler");
        drop(handle);
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

pub struct Subscription {
    topics: Vec<ChangeTopic>,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Next event on a subscribed topic; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.topics.contains(&event.topic()) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification subscriber lagged; continuing");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.topics.contains(&event.topic()) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification subscriber lagged; continuing");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Dropping the handle stops the handler task.
pub struct SubscriptionHandle {
    topic: ChangeTopic,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> ChangeTopic {
        self.topic
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Refetch-after-grace-period driver for a view.
///
/// Events arriving while the watcher waits are folded into the pending
/// refresh, so a burst of changes costs one refetch.
pub struct RefreshWatcher {
    task: JoinHandle<()>,
}

impl RefreshWatcher {
    pub fn spawn<F, Fut>(
        bus: &NotificationBus,
        topics: &[ChangeTopic],
        grace_period: Duration,
        refresh: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = bus.subscribe_topics(topics);
        let task = tokio::spawn(async move {
            while let Some(first) = subscription.recv().await {
                debug!(
                    topic = %first.topic(),
                    id = first.id,
                    grace_ms = grace_period.as_millis() as u64,
                    "change observed; scheduling refresh"
                );
                tokio::time::sleep(grace_period).await;

                let mut coalesced = 0usize;
                while subscription.try_recv().is_some() {
                    coalesced += 1;
                }
                if coalesced > 0 {
                    debug!(coalesced, "folded extra changes into pending refresh");
                }
                refresh().await;
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for RefreshWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/notifications_tests.rs"]
mod tests;
