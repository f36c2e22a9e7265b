//! Bounded, in-memory audit trail of mutations.

use crate::{Document, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of entries kept per collection.
pub const DEFAULT_AUDIT_CAPACITY: usize = 100;

/// Kind of mutation recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Insert,
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: AuditAction,
    /// The document as it was written
    pub document: Document,
    /// Milliseconds since epoch
    pub timestamp: Timestamp,
}

/// Append-only log that keeps only the most recent `capacity` entries.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, dropping the oldest once over capacity.
    pub fn record(&mut self, action: AuditAction, document: Document, timestamp: Timestamp) {
        self.entries.push_back(AuditEntry {
            action,
            document,
            timestamp,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<AuditEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
