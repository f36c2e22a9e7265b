//! # gitdoc Engine
//!
//! Pure document-collection logic for gitdoc.
//!
//! A gitdoc collection is an ordered list of JSON objects stored as a single
//! file on a version-controlled content host. This crate holds everything
//! about those documents that does not touch the network: how records get
//! their identity, how inserts are validated, how mutations are audited and
//! how snapshots are queried.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine knows nothing about HTTP, files or timers
//! - **Deterministic**: callers pass timestamps in
//! - **Testable**: pure functions over plain `serde_json` values
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A record is an open JSON object ([`Document`]) with two reserved fields:
//! - `id`: `max(existing ids) + 1`, as a string, unique within its collection
//! - `uid`: a UUID v4 assigned once at creation
//!
//! ### Schemas
//!
//! A [`CollectionSchema`] lists required fields, field kinds and default
//! values. [`Schema::prepare_insert`] merges defaults and reports the first
//! violation.
//!
//! ### Audit
//!
//! [`AuditTrail`] keeps the most recent 100 mutations of a collection.
//!
//! ## Quick Start
//!
//! ```rust
//! use gitdoc_engine::{record, CollectionSchema, FieldKind, QueryBuilder, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new().with_collection(
//!     "waitlist",
//!     CollectionSchema::new()
//!         .require("email")
//!         .field("email", FieldKind::String)
//!         .default_value("source", "coming-soon-page"),
//! );
//!
//! let mut records = Vec::new();
//! let fields = schema
//!     .prepare_insert("waitlist", json!({"email": "a@b.com"}))
//!     .unwrap();
//! records.push(record::new_record(fields, &records));
//!
//! assert_eq!(records[0]["id"], "1");
//! assert_eq!(records[0]["source"], "coming-soon-page");
//!
//! let count = QueryBuilder::new(&records).where_eq("email", "a@b.com").count();
//! assert_eq!(count, 1);
//! ```

pub mod audit;
pub mod error;
pub mod query;
pub mod record;
pub mod schema;

// Re-export main types at crate root
pub use audit::{AuditAction, AuditEntry, AuditTrail, DEFAULT_AUDIT_CAPACITY};
pub use error::Error;
pub use query::{QueryBuilder, SortOrder};
pub use schema::{CollectionSchema, FieldDef, FieldKind, Schema};

/// A record: an open mapping of field name to JSON value.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
pub type Timestamp = u64;
