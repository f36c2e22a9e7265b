//! # gitdoc-store
//!
//! A document collection store on top of a version-controlled content host.
//! Each collection is one JSON file in a GitHub repository; the store keeps
//! a cached snapshot per collection, validates inserts, serializes every
//! write through one queue with conflict retry, and polls subscribed
//! collections for outside changes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gitdoc_store::{CollectionSchema, DocStore, FieldKind, Schema, StoreConfig};
//! use serde_json::json;
//!
//! # async fn run() -> gitdoc_store::Result<()> {
//! let schema = Schema::new().with_collection(
//!     "waitlist",
//!     CollectionSchema::new()
//!         .require("email")
//!         .field("email", FieldKind::String)
//!         .default_value("source", "coming-soon-page"),
//! );
//! let store = DocStore::new(StoreConfig::from_env()?.with_schema(schema))?;
//!
//! let record = store.insert("waitlist", &json!({"email": "a@b.com"})).await?;
//! assert_eq!(record["id"], "1");
//!
//! let _subscription = store.subscribe("waitlist", |records| {
//!     println!("{} subscribers", records.len());
//! });
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod queue;
pub mod remote;
pub mod store;
pub mod subscription;

pub use cache::{CacheEntry, Snapshot};
pub use config::{ConfigError, StoreConfig};
pub use error::{Result, StoreError};
pub use queue::{commit_message, RetryPolicy};
pub use remote::{
    FetchOutcome, GitHubRemote, RemoteError, RemoteObject, RemoteStore, Revision, WriteHandle,
};

/// In-process remote for tests, enabled by the `testing` feature.
#[cfg(any(test, feature = "testing"))]
pub use remote::{Injected, MemoryRemote, RemoteCall};
pub use store::{DocStore, StoreStatus};
pub use subscription::Subscription;

pub use gitdoc_engine::Error as ValidationError;
pub use gitdoc_engine::{
    AuditAction, AuditEntry, CollectionName, CollectionSchema, Document, FieldDef, FieldKind,
    QueryBuilder, Schema, SortOrder,
};
