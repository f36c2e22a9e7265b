//! The document store facade.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gitdoc_engine::{record, AuditAction, AuditEntry, AuditTrail, Document, QueryBuilder};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::cache::{Cache, Snapshot};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::queue::{RetryPolicy, WriteQueue};
use crate::remote::{GitHubRemote, RemoteStore};
use crate::subscription::{Subscription, SubscriptionEngine};
use crate::CollectionName;

/// Store status report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// A credential is configured
    pub connected: bool,
    /// Collections with insert rules
    pub collections: Vec<CollectionName>,
    pub cached_collections: Vec<CollectionName>,
    pub pending_writes: usize,
    pub active_polls: usize,
    pub time: DateTime<Utc>,
}

struct Inner {
    config: StoreConfig,
    cache: Arc<Cache>,
    queue: WriteQueue,
    subscriptions: Arc<SubscriptionEngine>,
    audit: DashMap<CollectionName, AuditTrail>,
}

/// A document collection store backed by a remote content host.
///
/// Cloning is cheap; clones share the cache, write queue and poll tasks.
#[derive(Clone)]
pub struct DocStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DocStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocStore")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl DocStore {
    /// Create a store talking to GitHub. Must be called within a tokio
    /// runtime.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let remote = GitHubRemote::new(&config)?;
        Ok(Self::with_remote(config, Arc::new(remote)))
    }

    /// Create a store over any remote. Must be called within a tokio runtime.
    pub fn with_remote(config: StoreConfig, remote: Arc<dyn RemoteStore>) -> Self {
        let cache = Arc::new(Cache::new(Arc::clone(&remote), config.base_path.clone()));
        let queue = WriteQueue::spawn(remote, Arc::clone(&cache), RetryPolicy::from_config(&config));
        let subscriptions = Arc::new(SubscriptionEngine::new(
            Arc::clone(&cache),
            config.poll_interval,
        ));

        tracing::info!(
            owner = %config.owner,
            repo = %config.repo,
            branch = %config.branch,
            "document store ready"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                cache,
                queue,
                subscriptions,
                audit: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Current records of a collection, loading it on first use.
    ///
    /// A collection missing on the remote is created empty.
    pub async fn get(&self, collection: &str) -> Result<Snapshot> {
        self.load(collection, false).await
    }

    /// Re-read a collection from the remote (conditionally).
    pub async fn refresh(&self, collection: &str) -> Result<Snapshot> {
        self.load(collection, true).await
    }

    async fn load(&self, collection: &str, force: bool) -> Result<Snapshot> {
        match self.inner.cache.get(collection, force).await {
            Err(e) if e.is_not_found() => self.create(collection).await,
            other => other,
        }
    }

    /// Persist an empty collection and use it as the initial state.
    async fn create(&self, collection: &str) -> Result<Snapshot> {
        let staged = self.inner.cache.stage_absent(collection, || {
            let ticket = self.inner.queue.enqueue(collection, Vec::new())?;
            Ok((Vec::new(), ticket))
        })?;

        match staged {
            Some((snapshot, ticket)) => {
                tracing::info!(collection = %collection, "creating missing collection");
                ticket.wait().await?;
                Ok(snapshot)
            }
            // Created or written concurrently
            None => self.inner.cache.get(collection, false).await,
        }
    }

    /// Record matching `key` by `id` or `uid`.
    pub async fn get_item(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        let records = self.get(collection).await?;
        Ok(record::find_by_key(&records, key).cloned())
    }

    /// Run a query over a collection's current records.
    ///
    /// ```ignore
    /// let emails = store
    ///     .query("waitlist", |q| q.sort("subscribedAt", SortOrder::Desc).limit(10).all())
    ///     .await?;
    /// ```
    pub async fn query<R, F>(&self, collection: &str, build: F) -> Result<R>
    where
        F: FnOnce(QueryBuilder<'_>) -> R,
    {
        let records = self.get(collection).await?;
        Ok(build(QueryBuilder::new(&records)))
    }

    /// Validate and append a record, returning it with its `id` and `uid`.
    ///
    /// Fails before any remote call when the document breaks the
    /// collection's rules.
    pub async fn insert<T: Serialize>(&self, collection: &str, document: &T) -> Result<Document> {
        let payload = serde_json::to_value(document)?;
        let fields = self.inner.config.schema.prepare_insert(collection, payload)?;

        self.get(collection).await?;

        let (_, (created, ticket)) = self.inner.cache.stage(collection, |current| {
            let mut next = current.map(<[Document]>::to_vec).unwrap_or_default();
            let created = record::new_record(fields, &next);
            next.push(created.clone());
            let ticket = self.inner.queue.enqueue(collection, next.clone())?;
            Ok((next, (created, ticket)))
        })?;

        ticket.wait().await?;
        tracing::debug!(
            collection = %collection,
            id = record::record_id(&created).unwrap_or_default(),
            "record inserted"
        );

        self.audit(collection, AuditAction::Insert, created.clone());
        Ok(created)
    }

    /// Overwrite a collection's records wholesale, without validation.
    pub async fn replace(&self, collection: &str, documents: Vec<Document>) -> Result<Snapshot> {
        let (snapshot, ticket) = self.inner.cache.stage(collection, |_| {
            let ticket = self.inner.queue.enqueue(collection, documents.clone())?;
            Ok((documents, ticket))
        })?;

        ticket.wait().await?;
        Ok(snapshot)
    }

    /// Call `callback` with every new snapshot of a collection.
    ///
    /// When the collection is cached the callback runs before this returns;
    /// otherwise it runs once the initial load completes.
    pub fn subscribe<F>(&self, collection: &str, callback: F) -> Subscription
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let mut rx = self.inner.subscriptions.acquire(collection);
        let cached = self.inner.cache.snapshot(collection);
        if let Some(snapshot) = &cached {
            callback(Arc::clone(snapshot));
        }

        let store = self.clone();
        let name = collection.to_string();
        let forwarder = tokio::spawn(async move {
            let mut last = cached;
            if last.is_none() {
                match store.get(&name).await {
                    Ok(snapshot) => {
                        callback(Arc::clone(&snapshot));
                        last = Some(snapshot);
                    }
                    Err(e) => {
                        tracing::warn!(collection = %name, error = %e, "initial load failed")
                    }
                }
            }

            loop {
                match rx.recv().await {
                    Ok(snapshot) => {
                        if last.as_ref().is_some_and(|l| Arc::ptr_eq(l, &snapshot)) {
                            continue;
                        }
                        callback(Arc::clone(&snapshot));
                        last = Some(snapshot);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(collection = %name, skipped, "subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription::new(
            collection.to_string(),
            Arc::clone(&self.inner.subscriptions),
            forwarder,
        )
    }

    fn audit(&self, collection: &str, action: AuditAction, document: Document) {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.inner
            .audit
            .entry(collection.to_string())
            .or_default()
            .record(action, document, now);
    }

    /// Most recent mutations of a collection, oldest first.
    pub fn audit_log(&self, collection: &str) -> Vec<AuditEntry> {
        self.inner
            .audit
            .get(collection)
            .map(|trail| trail.to_vec())
            .unwrap_or_default()
    }

    /// Writes queued or in flight across all collections.
    pub fn pending_writes(&self) -> usize {
        self.inner.queue.depth()
    }

    /// Collections with a running poll task.
    pub fn active_polls(&self) -> usize {
        self.inner.subscriptions.active_polls()
    }

    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.inner.subscriptions.subscriber_count(collection)
    }

    pub fn status(&self) -> StoreStatus {
        let config = &self.inner.config;
        let mut cached = self.inner.cache.collections();
        cached.sort();
        StoreStatus {
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            connected: !config.token.is_empty(),
            collections: config.schema.collection_names(),
            cached_collections: cached,
            pending_writes: self.pending_writes(),
            active_polls: self.active_polls(),
            time: Utc::now(),
        }
    }

    /// Whether repository identity and credential are configured.
    pub fn is_ready(&self) -> bool {
        self.inner.config.is_complete()
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
