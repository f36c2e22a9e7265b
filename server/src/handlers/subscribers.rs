//! Waitlist read handlers.

use gitdoc_store::{DocStore, SortOrder};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::waitlist::{Subscriber, WAITLIST};

/// Response body for GET /waitlist/count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

/// Response body for GET /waitlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub count: usize,
    pub subscribers: Vec<Subscriber>,
}

/// Number of subscribers, or 0 when the store cannot be read.
pub async fn handle_count(store: &DocStore) -> CountResponse {
    let count = match store.query(WAITLIST, |q| q.count()).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "failed to count subscribers");
            0
        }
    };
    CountResponse { count }
}

/// All subscribers, newest first.
pub async fn handle_list(store: &DocStore) -> Result<ListResponse> {
    let records = store
        .query(WAITLIST, |q| q.sort("subscribedAt", SortOrder::Desc).all())
        .await?;

    let subscribers: Vec<Subscriber> = records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(serde_json::Value::Object(record)) {
            Ok(subscriber) => Some(subscriber),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed subscriber");
                None
            }
        })
        .collect();

    Ok(ListResponse {
        count: subscribers.len(),
        subscribers,
    })
}
