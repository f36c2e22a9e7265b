//! Serialized write queue.
//!
//! All writes, for every collection, run one at a time on a single worker
//! task in the order they were enqueued. Each write re-reads the current
//! write handle, commits, and on a stale-handle conflict waits and retries
//! up to a fixed number of attempts.

use chrono::{DateTime, SecondsFormat, Utc};
use gitdoc_engine::Document;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::cache::Cache;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::remote::{FetchOutcome, RemoteError, RemoteStore, WriteHandle};
use crate::CollectionName;

/// Retry behaviour for conflicted writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_attempts: config.max_write_attempts.max(1),
            delay: config.retry_delay,
        }
    }
}

struct WriteRequest {
    collection: CollectionName,
    documents: Vec<Document>,
    reply: oneshot::Sender<Result<WriteHandle>>,
}

/// Completion handle for one queued write.
#[must_use = "a ticket does nothing unless awaited"]
pub struct WriteTicket(oneshot::Receiver<Result<WriteHandle>>);

impl WriteTicket {
    /// Wait for the write to commit or fail for good.
    pub async fn wait(self) -> Result<WriteHandle> {
        self.0.await.map_err(|_| StoreError::QueueClosed)?
    }
}

/// Handle to the write worker.
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<WriteRequest>,
    cache: Arc<Cache>,
    depth: Arc<AtomicUsize>,
}

impl WriteQueue {
    /// Start the worker task. Must be called within a tokio runtime.
    pub fn spawn(remote: Arc<dyn RemoteStore>, cache: Arc<Cache>, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run(
            rx,
            Worker {
                remote,
                cache: Arc::clone(&cache),
                policy,
                depth: Arc::clone(&depth),
            },
        ));

        Self { tx, cache, depth }
    }

    /// Queue a full replacement of a collection's content.
    pub fn enqueue(&self, collection: &str, documents: Vec<Document>) -> Result<WriteTicket> {
        let (reply, rx) = oneshot::channel();
        self.cache.begin_write(collection);
        self.depth.fetch_add(1, Ordering::SeqCst);

        let request = WriteRequest {
            collection: collection.to_string(),
            documents,
            reply,
        };
        if self.tx.send(request).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.cache.finish_write(collection);
            return Err(StoreError::QueueClosed);
        }

        tracing::trace!(collection = %collection, "write queued");
        Ok(WriteTicket(rx))
    }

    /// Writes queued or in flight.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Commit message for a collection write.
pub fn commit_message(collection: &str, at: DateTime<Utc>) -> String {
    format!(
        "Update {} - {}",
        collection,
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

struct Worker {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<Cache>,
    policy: RetryPolicy,
    depth: Arc<AtomicUsize>,
}

async fn run(mut rx: mpsc::UnboundedReceiver<WriteRequest>, worker: Worker) {
    while let Some(request) = rx.recv().await {
        let result = worker.write(&request.collection, &request.documents).await;
        if let Err(e) = &result {
            tracing::error!(collection = %request.collection, error = %e, "write failed");
        }

        worker.depth.fetch_sub(1, Ordering::SeqCst);
        if worker.cache.finish_write(&request.collection) == 0 {
            // Settle the cache on remote truth before the caller resumes
            match worker.cache.get(&request.collection, true).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    // Nothing was persisted; the next read creates it again
                    worker.cache.evict(&request.collection);
                }
                Err(e) => {
                    tracing::warn!(
                        collection = %request.collection,
                        error = %e,
                        "refresh after write failed"
                    );
                }
            }
        }

        // The caller may have stopped waiting
        let _ = request.reply.send(result);
    }
    tracing::debug!("write queue closed");
}

impl Worker {
    async fn write(&self, collection: &str, documents: &[Document]) -> Result<WriteHandle> {
        let path = self.cache.path_for(collection);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let handle = match self.remote.fetch(&path, None).await {
                Ok(FetchOutcome::Modified(object)) => Some(object.write_handle),
                Ok(FetchOutcome::NotModified) => self
                    .cache
                    .entry(collection)
                    .and_then(|e| e.write_handle.clone()),
                Err(RemoteError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            };

            let message = commit_message(collection, Utc::now());
            match self
                .remote
                .put(&path, documents, handle.as_deref(), &message)
                .await
            {
                Ok(written) => {
                    tracing::info!(
                        collection = %collection,
                        records = documents.len(),
                        attempts,
                        "collection committed"
                    );
                    return Ok(written);
                }
                Err(RemoteError::Conflict(_)) if attempts < self.policy.max_attempts => {
                    tracing::warn!(
                        collection = %collection,
                        attempt = attempts,
                        "write conflicted, retrying in {:?}",
                        self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(RemoteError::Conflict(_)) => {
                    return Err(StoreError::Conflict {
                        collection: collection.to_string(),
                        attempts,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
