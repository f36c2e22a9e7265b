//! In-process content host.
//!
//! Mirrors the revision semantics of the real host: every write produces a
//! new revision and write handle, conditional reads answer `NotModified`
//! while the revision is current, and writes naming a stale handle
//! conflict. Failures can be injected per path, and every call is logged so
//! callers can inspect ordering and overlap.

use async_trait::async_trait;
use dashmap::DashMap;
use gitdoc_engine::Document;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{FetchOutcome, RemoteError, RemoteObject, RemoteStore, WriteHandle};

/// A failure to inject into the next call on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    Conflict,
    Status(u16),
}

impl Injected {
    fn into_error(self, path: &str) -> RemoteError {
        match self {
            Injected::Conflict => RemoteError::Conflict(path.to_string()),
            Injected::Status(404) => RemoteError::NotFound(path.to_string()),
            Injected::Status(status) => RemoteError::Http {
                status,
                body: "injected failure".to_string(),
            },
        }
    }
}

/// One logged call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch {
        path: String,
        conditional: bool,
    },
    Put {
        path: String,
        message: String,
        records: usize,
    },
}

#[derive(Debug, Clone)]
struct StoredObject {
    documents: Vec<Document>,
    version: u64,
}

impl StoredObject {
    fn revision(&self) -> String {
        format!("\"rev-{}\"", self.version)
    }

    fn write_handle(&self) -> WriteHandle {
        format!("sha-{}", self.version)
    }
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    objects: DashMap<String, StoredObject>,
    fetch_failures: DashMap<String, VecDeque<Injected>>,
    put_failures: DashMap<String, VecDeque<Injected>>,
    calls: Mutex<Vec<RemoteCall>>,
    next_version: AtomicU64,
    not_modified: AtomicUsize,
    puts_in_flight: AtomicUsize,
    max_puts_in_flight: AtomicUsize,
    put_delay_ms: AtomicU64,
}

/// Decrements the in-flight counter when a put finishes, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite an object, as an edit made outside the store would.
    pub fn seed(&self, path: &str, documents: Vec<Document>) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        self.objects
            .insert(path.to_string(), StoredObject { documents, version });
    }

    pub fn remove(&self, path: &str) {
        self.objects.remove(path);
    }

    /// Current content of an object.
    pub fn documents(&self, path: &str) -> Option<Vec<Document>> {
        self.objects.get(path).map(|o| o.documents.clone())
    }

    /// Current write handle of an object.
    pub fn write_handle(&self, path: &str) -> Option<WriteHandle> {
        self.objects.get(path).map(|o| o.write_handle())
    }

    /// Fail the next fetches of `path`, one failure per call.
    pub fn fail_fetches(&self, path: &str, failures: impl IntoIterator<Item = Injected>) {
        self.fetch_failures
            .entry(path.to_string())
            .or_default()
            .extend(failures);
    }

    /// Fail the next puts to `path`, one failure per call.
    pub fn fail_puts(&self, path: &str, failures: impl IntoIterator<Item = Injected>) {
        self.put_failures
            .entry(path.to_string())
            .or_default()
            .extend(failures);
    }

    /// Make every put take this long before completing.
    pub fn set_put_delay(&self, delay: Duration) {
        self.put_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn log(&self) -> MutexGuard<'_, Vec<RemoteCall>> {
        // A poisoned log is still a valid log
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.log().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Fetch { .. }))
            .count()
    }

    pub fn put_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Put { .. }))
            .count()
    }

    /// Paths written, in order.
    pub fn put_paths(&self) -> Vec<String> {
        self.log()
            .iter()
            .filter_map(|c| match c {
                RemoteCall::Put { path, .. } => Some(path.clone()),
                RemoteCall::Fetch { .. } => None,
            })
            .collect()
    }

    /// Number of conditional reads answered with `NotModified`.
    pub fn not_modified_count(&self) -> usize {
        self.not_modified.load(Ordering::SeqCst)
    }

    /// Highest number of puts that were ever running at the same time.
    pub fn max_concurrent_puts(&self) -> usize {
        self.max_puts_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(map: &DashMap<String, VecDeque<Injected>>, path: &str) -> Option<Injected> {
        map.get_mut(path).and_then(|mut queue| queue.pop_front())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(
        &self,
        path: &str,
        if_revision: Option<&str>,
    ) -> Result<FetchOutcome, RemoteError> {
        self.log().push(RemoteCall::Fetch {
            path: path.to_string(),
            conditional: if_revision.is_some(),
        });
        tokio::task::yield_now().await;

        if let Some(failure) = Self::take_failure(&self.fetch_failures, path) {
            return Err(failure.into_error(path));
        }

        let object = self
            .objects
            .get(path)
            .map(|o| o.value().clone())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;

        if if_revision == Some(object.revision().as_str()) {
            self.not_modified.fetch_add(1, Ordering::SeqCst);
            return Ok(FetchOutcome::NotModified);
        }

        Ok(FetchOutcome::Modified(RemoteObject {
            revision: Some(object.revision()),
            write_handle: object.write_handle(),
            documents: object.documents,
        }))
    }

    async fn put(
        &self,
        path: &str,
        documents: &[Document],
        write_handle: Option<&str>,
        message: &str,
    ) -> Result<WriteHandle, RemoteError> {
        self.log().push(RemoteCall::Put {
            path: path.to_string(),
            message: message.to_string(),
            records: documents.len(),
        });

        let running = self.puts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.puts_in_flight);
        self.max_puts_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        } else {
            tokio::task::yield_now().await;
        }

        if let Some(failure) = Self::take_failure(&self.put_failures, path) {
            return Err(failure.into_error(path));
        }

        let current = self.objects.get(path).map(|o| o.write_handle());
        if current.as_deref() != write_handle {
            return Err(RemoteError::Conflict(path.to_string()));
        }

        self.seed(path, documents.to_vec());
        self.write_handle(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }
}
