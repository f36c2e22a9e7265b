//! Polling subscriptions.
//!
//! Subscribers of one collection share a single poll task. The task runs a
//! conditional refresh every interval; changed content reaches subscribers
//! through the cache's broadcast channel. The last subscriber to leave stops
//! the task.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::cache::{Cache, Snapshot};
use crate::CollectionName;

struct Topic {
    refs: usize,
    /// Dropping the sender stops the poll task
    _stop: oneshot::Sender<()>,
}

/// Reference-counted poll tasks, one per subscribed collection.
pub struct SubscriptionEngine {
    cache: Arc<Cache>,
    interval: Duration,
    topics: DashMap<CollectionName, Topic>,
}

impl SubscriptionEngine {
    pub fn new(cache: Arc<Cache>, interval: Duration) -> Self {
        Self {
            cache,
            interval,
            topics: DashMap::new(),
        }
    }

    /// Register interest in a collection, starting its poll task if this is
    /// the first subscriber.
    pub fn acquire(&self, collection: &str) -> broadcast::Receiver<Snapshot> {
        let rx = self.cache.watch(collection);
        let mut topic = self
            .topics
            .entry(collection.to_string())
            .or_insert_with(|| self.start(collection));
        topic.refs += 1;
        rx
    }

    /// Drop one subscriber; the poll task stops with the last one.
    pub fn release(&self, collection: &str) {
        if let Some(mut topic) = self.topics.get_mut(collection) {
            topic.refs = topic.refs.saturating_sub(1);
        }
        if self
            .topics
            .remove_if(collection, |_, topic| topic.refs == 0)
            .is_some()
        {
            tracing::debug!(collection = %collection, "poll stopped");
        }
    }

    /// Collections with a running poll task.
    pub fn active_polls(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.topics.get(collection).map(|t| t.refs).unwrap_or(0)
    }

    fn start(&self, collection: &str) -> Topic {
        let (stop, stopped) = oneshot::channel();
        tokio::spawn(poll(
            Arc::clone(&self.cache),
            collection.to_string(),
            self.interval,
            stopped,
        ));
        tracing::debug!(
            collection = %collection,
            interval = ?self.interval,
            "poll started"
        );
        Topic { refs: 0, _stop: stop }
    }
}

async fn poll(
    cache: Arc<Cache>,
    collection: CollectionName,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {}
        }

        // Runs to completion even if the last subscriber leaves meanwhile
        if let Err(e) = cache.get(&collection, true).await {
            tracing::warn!(collection = %collection, error = %e, "poll failed");
        }
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    collection: CollectionName,
    engine: Arc<SubscriptionEngine>,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(
        collection: CollectionName,
        engine: Arc<SubscriptionEngine>,
        forwarder: JoinHandle<()>,
    ) -> Self {
        Self {
            collection,
            engine,
            forwarder,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Stop receiving callbacks.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.forwarder.abort();
        self.engine.release(&self.collection);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;

    fn engine() -> (Arc<MemoryRemote>, SubscriptionEngine) {
        let remote = Arc::new(MemoryRemote::new());
        let cache = Arc::new(Cache::new(remote.clone(), "db"));
        (remote, SubscriptionEngine::new(cache, Duration::from_secs(5)))
    }

    #[tokio::test(start_paused = true)]
    async fn shares_one_poll_per_collection() {
        let (_remote, engine) = engine();
        let _a = engine.acquire("w");
        let _b = engine.acquire("w");
        let _c = engine.acquire("other");

        assert_eq!(engine.active_polls(), 2);
        assert_eq!(engine.subscriber_count("w"), 2);

        engine.release("w");
        assert_eq!(engine.active_polls(), 2);
        engine.release("w");
        assert_eq!(engine.active_polls(), 1);
        assert_eq!(engine.subscriber_count("w"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval_until_released() {
        let (remote, engine) = engine();
        remote.seed("db/w.json", Vec::new());
        let _rx = engine.acquire("w");

        time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(remote.fetch_count(), 2);

        engine.release("w");
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(remote.fetch_count(), 2);
    }

    #[test]
    fn release_without_acquire_is_harmless() {
        let remote = Arc::new(MemoryRemote::new());
        let cache = Arc::new(Cache::new(remote, "db"));
        let engine = SubscriptionEngine::new(cache, Duration::from_secs(5));
        engine.release("w");
        assert_eq!(engine.active_polls(), 0);
    }
}
