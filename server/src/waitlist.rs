//! The waitlist collection: its rules and record shapes.

use gitdoc_store::{CollectionSchema, FieldKind};
use serde::{Deserialize, Serialize};

/// Collection holding subscribers.
pub const WAITLIST: &str = "waitlist";

/// Source recorded for sign-ups that do not name one.
pub const DEFAULT_SOURCE: &str = "coming-soon-page";

/// Insert rules for the waitlist collection.
pub fn waitlist_schema() -> CollectionSchema {
    CollectionSchema::new()
        .require("email")
        .field("email", FieldKind::String)
        .field("subscribedAt", FieldKind::Date)
        .field("ipAddress", FieldKind::String)
        .field("userAgent", FieldKind::String)
        .field("source", FieldKind::String)
        .default_value("source", DEFAULT_SOURCE)
}

/// Fields supplied when a subscriber is added.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscriber {
    pub email: String,
    pub subscribed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub source: String,
}

/// A stored subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: String,
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub subscribed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Canonical form of an address: trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
