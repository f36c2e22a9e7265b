//! Per-collection snapshot cache.
//!
//! Every collection has at most one [`CacheEntry`]. Entries are immutable
//! and replaced as a whole, so a reader holding a [`Snapshot`] never sees a
//! half-applied update. Change notifications go out on a broadcast channel
//! per collection.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gitdoc_engine::Document;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::collection_path;
use crate::error::{Result, StoreError};
use crate::remote::{FetchOutcome, RemoteError, RemoteObject, RemoteStore, Revision, WriteHandle};
use crate::CollectionName;

/// Shared, immutable view of a collection's records.
pub type Snapshot = Arc<Vec<Document>>;

/// Buffered notifications per collection before slow receivers lag.
const CHANNEL_CAPACITY: usize = 16;

/// Last known state of one collection.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub documents: Snapshot,
    /// Token for the next conditional read; `None` forces a full read
    pub revision: Option<Revision>,
    pub write_handle: Option<WriteHandle>,
}

pub struct Cache {
    remote: Arc<dyn RemoteStore>,
    base_path: String,
    entries: DashMap<CollectionName, Arc<CacheEntry>>,
    channels: DashMap<CollectionName, broadcast::Sender<Snapshot>>,
    /// Queued writes per collection whose outcome is not known yet.
    ///
    /// Always locked after (never before) the collection's `entries` slot.
    pending: DashMap<CollectionName, usize>,
}

impl Cache {
    pub fn new(remote: Arc<dyn RemoteStore>, base_path: impl Into<String>) -> Self {
        Self {
            remote,
            base_path: base_path.into(),
            entries: DashMap::new(),
            channels: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Remote path of a collection's file.
    pub fn path_for(&self, collection: &str) -> String {
        collection_path(&self.base_path, collection)
    }

    /// Current entry, without touching the remote.
    pub fn entry(&self, collection: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(collection).map(|e| Arc::clone(e.value()))
    }

    /// Current snapshot, without touching the remote.
    pub fn snapshot(&self, collection: &str) -> Option<Snapshot> {
        self.entries
            .get(collection)
            .map(|e| Arc::clone(&e.value().documents))
    }

    /// Collections that currently have an entry.
    pub fn collections(&self) -> Vec<CollectionName> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Receive every snapshot published for a collection from now on.
    pub fn watch(&self, collection: &str) -> broadcast::Receiver<Snapshot> {
        self.channels
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn publish(&self, collection: &str, snapshot: Snapshot) {
        if let Some(tx) = self.channels.get(collection) {
            // No receivers is fine
            let _ = tx.send(snapshot);
        }
    }

    /// Return the collection's snapshot, reading the remote on a miss or
    /// when `force` is set.
    ///
    /// A forced read is conditional on the stored revision; `NotModified`
    /// leaves the entry untouched and notifies nobody. A missing remote
    /// object surfaces as [`RemoteError::NotFound`].
    pub async fn get(&self, collection: &str, force: bool) -> Result<Snapshot> {
        let existing = self.entry(collection);
        if let (Some(entry), false) = (&existing, force) {
            return Ok(Arc::clone(&entry.documents));
        }

        let path = self.path_for(collection);
        let revision = existing.as_ref().and_then(|e| e.revision.clone());
        match self.remote.fetch(&path, revision.as_deref()).await? {
            FetchOutcome::NotModified => match existing {
                Some(entry) => {
                    tracing::trace!(collection = %collection, "collection not modified");
                    Ok(Arc::clone(&entry.documents))
                }
                None => Err(StoreError::Remote(RemoteError::Http {
                    status: 304,
                    body: format!("unexpected not-modified for uncached {}", path),
                })),
            },
            FetchOutcome::Modified(object) => Ok(self.apply_remote(collection, object)),
        }
    }

    /// Install authoritative remote content.
    ///
    /// While writes to the collection are still queued, the optimistic
    /// snapshot is kept; the last write to settle refreshes again.
    fn apply_remote(&self, collection: &str, object: RemoteObject) -> Snapshot {
        let documents: Snapshot = Arc::new(object.documents);
        let fresh = Arc::new(CacheEntry {
            documents: Arc::clone(&documents),
            revision: object.revision,
            write_handle: Some(object.write_handle),
        });

        let changed = match self.entries.entry(collection.to_string()) {
            Entry::Occupied(mut slot) => {
                if self.pending_for(collection) > 0 {
                    tracing::debug!(
                        collection = %collection,
                        "keeping optimistic snapshot while writes are queued"
                    );
                    return Arc::clone(&slot.get().documents);
                }
                let changed = slot.get().documents != documents;
                slot.insert(fresh);
                changed
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                true
            }
        };

        if changed {
            tracing::debug!(
                collection = %collection,
                records = documents.len(),
                "collection updated from remote"
            );
            self.publish(collection, Arc::clone(&documents));
        }
        documents
    }

    /// Swap in a locally produced snapshot ahead of remote confirmation.
    ///
    /// `build` sees the current records (`None` when the collection is not
    /// cached) and runs while the collection's slot is locked, so concurrent
    /// stages of one collection are serialized. An error from `build` leaves
    /// the cache untouched. The staged entry has no revision, so the next
    /// read after settlement is unconditional and replaces it with remote
    /// truth.
    pub(crate) fn stage<T, F>(&self, collection: &str, build: F) -> Result<(Snapshot, T)>
    where
        F: FnOnce(Option<&[Document]>) -> Result<(Vec<Document>, T)>,
    {
        let (documents, out) = match self.entries.entry(collection.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = Arc::clone(slot.get());
                let (next, out) = build(Some(current.documents.as_slice()))?;
                let documents: Snapshot = Arc::new(next);
                slot.insert(staged(&documents, current.write_handle.clone()));
                (documents, out)
            }
            Entry::Vacant(slot) => {
                let (next, out) = build(None)?;
                let documents: Snapshot = Arc::new(next);
                slot.insert(staged(&documents, None));
                (documents, out)
            }
        };

        self.publish(collection, Arc::clone(&documents));
        Ok((documents, out))
    }

    /// Like [`stage`](Self::stage), but only for a collection that is not
    /// cached yet. Returns `Ok(None)` without calling `build` otherwise.
    pub(crate) fn stage_absent<T, F>(&self, collection: &str, build: F) -> Result<Option<(Snapshot, T)>>
    where
        F: FnOnce() -> Result<(Vec<Document>, T)>,
    {
        let (documents, out) = match self.entries.entry(collection.to_string()) {
            Entry::Occupied(_) => return Ok(None),
            Entry::Vacant(slot) => {
                let (next, out) = build()?;
                let documents: Snapshot = Arc::new(next);
                slot.insert(staged(&documents, None));
                (documents, out)
            }
        };

        self.publish(collection, Arc::clone(&documents));
        Ok(Some((documents, out)))
    }

    /// Drop a collection's entry unless writes to it are still queued.
    pub(crate) fn evict(&self, collection: &str) -> bool {
        let removed = self
            .entries
            .remove_if(collection, |_, _| self.pending_for(collection) == 0)
            .is_some();
        if removed {
            tracing::debug!(collection = %collection, "evicted collection missing on remote");
        }
        removed
    }

    /// Count a write as queued for the collection.
    pub(crate) fn begin_write(&self, collection: &str) {
        *self.pending.entry(collection.to_string()).or_insert(0) += 1;
    }

    /// Count a write as settled, returning how many remain queued.
    pub(crate) fn finish_write(&self, collection: &str) -> usize {
        let remaining = match self.pending.get_mut(collection) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.pending.remove_if(collection, |_, count| *count == 0);
        }
        remaining
    }

    /// Writes still queued for the collection.
    pub fn pending_for(&self, collection: &str) -> usize {
        self.pending.get(collection).map(|c| *c).unwrap_or(0)
    }
}

fn staged(documents: &Snapshot, write_handle: Option<WriteHandle>) -> Arc<CacheEntry> {
    Arc::new(CacheEntry {
        documents: Arc::clone(documents),
        revision: None,
        write_handle,
    })
}
