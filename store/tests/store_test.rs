//! Integration tests for reads, inserts and the write queue.
//!
//! All tests run against the in-process remote.

use gitdoc_store::{
    CollectionSchema, DocStore, Document, FieldKind, Injected, MemoryRemote, RemoteCall,
    RemoteError, Schema, SortOrder, StoreConfig, StoreError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn waitlist_schema() -> Schema {
    Schema::new().with_collection(
        "waitlist",
        CollectionSchema::new()
            .require("email")
            .field("email", FieldKind::String)
            .field("subscribedAt", FieldKind::Date)
            .default_value("source", "coming-soon-page"),
    )
}

fn setup() -> (Arc<MemoryRemote>, DocStore) {
    let remote = Arc::new(MemoryRemote::new());
    let config = StoreConfig::new("acme", "site", "t0k3n").with_schema(waitlist_schema());
    let store = DocStore::with_remote(config, remote.clone());
    (remote, store)
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap()
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn missing_collection_is_created_empty() {
    let (remote, store) = setup();

    let records = store.get("fresh").await.unwrap();

    assert!(records.is_empty());
    assert_eq!(remote.documents("db/fresh.json"), Some(Vec::new()));
    assert_eq!(remote.put_paths(), vec!["db/fresh.json".to_string()]);
    assert!(remote.calls().iter().any(|c| matches!(
        c,
        RemoteCall::Put { message, .. } if message.starts_with("Update fresh - ")
    )));
    assert_eq!(store.pending_writes(), 0);
}

#[tokio::test]
async fn cached_reads_do_not_touch_remote() {
    let (remote, store) = setup();
    remote.seed("db/items.json", vec![doc(json!({"id": "1"}))]);

    store.get("items").await.unwrap();
    store.get("items").await.unwrap();
    store.get_item("items", "1").await.unwrap();

    assert_eq!(remote.fetch_count(), 1);
}

#[tokio::test]
async fn refresh_picks_up_outside_edits() {
    let (remote, store) = setup();
    remote.seed("db/items.json", vec![doc(json!({"id": "1"}))]);
    let before = store.get("items").await.unwrap();

    let unchanged = store.refresh("items").await.unwrap();
    assert!(Arc::ptr_eq(&before, &unchanged));
    assert_eq!(remote.not_modified_count(), 1);

    remote.seed(
        "db/items.json",
        vec![doc(json!({"id": "1"})), doc(json!({"id": "2"}))],
    );
    let after = store.refresh("items").await.unwrap();
    assert_eq!(after.len(), 2);
}

#[tokio::test]
async fn get_item_matches_id_or_uid() {
    let (remote, store) = setup();
    remote.seed(
        "db/items.json",
        vec![
            doc(json!({"id": "1", "uid": "aaaa", "name": "first"})),
            doc(json!({"id": "2", "uid": "bbbb", "name": "second"})),
        ],
    );

    let by_id = store.get_item("items", "2").await.unwrap().unwrap();
    assert_eq!(by_id["name"], "second");

    let by_uid = store.get_item("items", "aaaa").await.unwrap().unwrap();
    assert_eq!(by_uid["name"], "first");

    assert!(store.get_item("items", "3").await.unwrap().is_none());
}

#[tokio::test]
async fn query_over_snapshot() {
    let (remote, store) = setup();
    remote.seed(
        "db/scores.json",
        vec![
            doc(json!({"id": "1", "name": "a", "score": 10})),
            doc(json!({"id": "2", "name": "b", "score": 30})),
            doc(json!({"id": "3", "name": "c"})),
            doc(json!({"id": "4", "name": "d", "score": 20})),
        ],
    );

    let top: Vec<String> = store
        .query("scores", |q| {
            q.sort("score", SortOrder::Desc)
                .limit(3)
                .project(["name"])
                .all()
        })
        .await
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(top, vec!["b", "d", "a"]);

    let scored = store
        .query("scores", |q| q.filter(|r| r.contains_key("score")).count())
        .await
        .unwrap();
    assert_eq!(scored, 3);
}

#[tokio::test]
async fn read_errors_other_than_not_found_surface() {
    let (remote, store) = setup();
    remote.fail_fetches("db/items.json", [Injected::Status(503)]);

    let err = store.get("items").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Remote(RemoteError::Http { status: 503, .. })
    ));
    assert_eq!(remote.put_count(), 0);
}

#[tokio::test]
async fn failed_create_is_retried_on_next_read() {
    let (remote, store) = setup();
    remote.fail_puts("db/fresh.json", [Injected::Status(500)]);

    let err = store.get("fresh").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Remote(RemoteError::Http { status: 500, .. })
    ));
    assert_eq!(remote.documents("db/fresh.json"), None);
    assert!(store.status().cached_collections.is_empty());

    let records = store.get("fresh").await.unwrap();
    assert!(records.is_empty());
    assert_eq!(remote.put_count(), 2);
    assert_eq!(remote.documents("db/fresh.json"), Some(Vec::new()));
}

// ============================================================================
// Inserts
// ============================================================================

#[tokio::test]
async fn waitlist_insert_assigns_id_uid_and_defaults() {
    let (remote, store) = setup();

    let first = store
        .insert("waitlist", &json!({"email": "a@b.com"}))
        .await
        .unwrap();
    assert_eq!(first["id"], "1");
    assert_eq!(first["email"], "a@b.com");
    assert_eq!(first["source"], "coming-soon-page");
    assert!(uuid_like(first["uid"].as_str().unwrap()));

    let second = store
        .insert("waitlist", &json!({"email": "c@d.com"}))
        .await
        .unwrap();
    assert_eq!(second["id"], "2");

    let stored = remote.documents("db/waitlist.json").unwrap();
    assert_eq!(stored, vec![first, second]);
}

fn uuid_like(value: &str) -> bool {
    value.len() == 36 && value.chars().filter(|c| *c == '-').count() == 4
}

#[tokio::test]
async fn sequential_inserts_number_records_in_order() {
    let (_remote, store) = setup();

    for n in 1..=12 {
        let record = store
            .insert("notes", &json!({"text": format!("note {}", n)}))
            .await
            .unwrap();
        assert_eq!(record["id"], n.to_string());
    }

    let ids: Vec<String> = store
        .get("notes")
        .await
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (1..=12).map(|n: i32| n.to_string()).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn ids_continue_after_non_numeric_ids() {
    let (remote, store) = setup();
    remote.seed(
        "db/mixed.json",
        vec![doc(json!({"id": "alpha"})), doc(json!({"id": "7"}))],
    );

    let record = store.insert("mixed", &json!({})).await.unwrap();
    assert_eq!(record["id"], "8");
}

#[tokio::test]
async fn uid_is_stable_across_refreshes_and_writes() {
    let (remote, store) = setup();
    let created = store
        .insert("waitlist", &json!({"email": "a@b.com"}))
        .await
        .unwrap();
    let uid = created["uid"].as_str().unwrap().to_string();

    store
        .insert("waitlist", &json!({"email": "c@d.com"}))
        .await
        .unwrap();
    store.refresh("waitlist").await.unwrap();

    let found = store.get_item("waitlist", &uid).await.unwrap().unwrap();
    assert_eq!(found["id"], "1");
    assert_eq!(
        remote.documents("db/waitlist.json").unwrap()[0]["uid"],
        uid.as_str()
    );
}

#[tokio::test]
async fn insert_after_huge_outside_id() {
    let (remote, store) = setup();
    remote.seed(
        "db/notes.json",
        vec![doc(json!({"id": "18446744073709551615", "uid": "u-max"}))],
    );

    let created = store.insert("notes", &json!({"x": 1})).await.unwrap();
    assert_eq!(created["id"], "18446744073709551616");

    let next = store.insert("notes", &json!({"x": 2})).await.unwrap();
    assert_eq!(next["id"], "18446744073709551617");
}

#[tokio::test]
async fn caller_cannot_choose_id_or_uid() {
    let (_remote, store) = setup();
    let record = store
        .insert(
            "waitlist",
            &json!({"email": "a@b.com", "id": "99", "uid": "mine"}),
        )
        .await
        .unwrap();
    assert_eq!(record["id"], "1");
    assert_ne!(record["uid"], "mine");
}

#[tokio::test]
async fn invalid_insert_never_reaches_remote() {
    let (remote, store) = setup();

    let missing = store
        .insert("waitlist", &json!({"name": "no email"}))
        .await
        .unwrap_err();
    assert!(missing.is_validation());
    assert_eq!(
        missing.to_string(),
        "validation failed: missing required field: email"
    );

    let wrong_type = store
        .insert("waitlist", &json!({"email": 42}))
        .await
        .unwrap_err();
    assert!(wrong_type.is_validation());

    let not_object = store.insert("waitlist", &json!(["a"])).await.unwrap_err();
    assert!(not_object.is_validation());

    assert!(remote.calls().is_empty());
    assert_eq!(store.pending_writes(), 0);
    assert!(store.audit_log("waitlist").is_empty());
}

#[tokio::test]
async fn insert_is_recorded_in_audit_log() {
    let (_remote, store) = setup();
    let record = store
        .insert("waitlist", &json!({"email": "a@b.com"}))
        .await
        .unwrap();

    let log = store.audit_log("waitlist");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, gitdoc_store::AuditAction::Insert);
    assert_eq!(log[0].document, record);
    assert!(log[0].timestamp > 0);
}

#[tokio::test]
async fn audit_log_keeps_most_recent_hundred() {
    let (_remote, store) = setup();
    for n in 0..105 {
        store.insert("log", &json!({"n": n})).await.unwrap();
    }

    let log = store.audit_log("log");
    assert_eq!(log.len(), 100);
    assert_eq!(log[0].document["id"], "6");
    assert_eq!(log[99].document["id"], "105");
}

#[tokio::test]
async fn replace_skips_validation() {
    let (remote, store) = setup();
    store.get("waitlist").await.unwrap();

    let snapshot = store
        .replace("waitlist", vec![doc(json!({"id": "1", "note": "no email"}))])
        .await
        .unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(remote.documents("db/waitlist.json").unwrap().len(), 1);
    assert!(store.audit_log("waitlist").is_empty());
}

// ============================================================================
// Write queue
// ============================================================================

#[tokio::test(start_paused = true)]
async fn insert_is_visible_before_commit() {
    let (remote, store) = setup();
    store.get("waitlist").await.unwrap();
    remote.set_put_delay(Duration::from_secs(1));

    let writer = store.clone();
    let pending = tokio::spawn(async move {
        writer
            .insert("waitlist", &json!({"email": "a@b.com"}))
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.pending_writes(), 1);
    let optimistic = store.get("waitlist").await.unwrap();
    assert_eq!(optimistic.len(), 1);
    assert!(remote.documents("db/waitlist.json").unwrap().is_empty());

    pending.await.unwrap().unwrap();
    assert_eq!(store.pending_writes(), 0);
    assert_eq!(remote.documents("db/waitlist.json").unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn persistent_conflict_is_tried_five_times() {
    let (remote, store) = setup();
    store.get("waitlist").await.unwrap();
    remote.fail_puts("db/waitlist.json", [Injected::Conflict; 8]);

    let err = store
        .insert("waitlist", &json!({"email": "a@b.com"}))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert!(matches!(err, StoreError::Conflict { attempts: 5, .. }));
    assert_eq!(remote.put_count(), 6); // creation + five attempts
    assert_eq!(store.pending_writes(), 0);

    // The optimistic record is rolled back to remote truth
    assert!(store.get("waitlist").await.unwrap().is_empty());
    assert!(store.audit_log("waitlist").is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_conflict_is_retried() {
    let (remote, store) = setup();
    remote.seed("db/waitlist.json", Vec::new());
    remote.fail_puts("db/waitlist.json", [Injected::Conflict, Injected::Conflict]);

    let record = store
        .insert("waitlist", &json!({"email": "a@b.com"}))
        .await
        .unwrap();

    assert_eq!(record["id"], "1");
    assert_eq!(remote.put_count(), 3);
}

#[tokio::test]
async fn transport_failure_is_not_retried() {
    let (remote, store) = setup();
    remote.seed("db/waitlist.json", Vec::new());
    remote.fail_puts("db/waitlist.json", [Injected::Status(502)]);

    let err = store
        .insert("waitlist", &json!({"email": "a@b.com"}))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::Remote(RemoteError::Http { status: 502, .. })
    ));
    assert_eq!(remote.put_count(), 1);
    assert!(store.get("waitlist").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_writes_never_overlap() {
    let (remote, store) = setup();
    remote.set_put_delay(Duration::from_millis(50));

    let mut handles = Vec::new();
    for n in 0..6 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .insert("waitlist", &json!({"email": format!("user{}@example.com", n)}))
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        ids.push(record["id"].as_str().unwrap().parse::<u32>().unwrap());
    }
    ids.sort_unstable();

    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(remote.max_concurrent_puts(), 1);
    assert_eq!(remote.documents("db/waitlist.json").unwrap().len(), 6);
    assert_eq!(store.pending_writes(), 0);
}

#[tokio::test]
async fn writes_commit_in_submission_order_across_collections() {
    let (remote, store) = setup();

    let (a1, b, a2) = tokio::join!(
        store.replace("a", vec![doc(json!({"id": "1"}))]),
        store.replace("b", vec![doc(json!({"id": "1"}))]),
        store.replace("a", vec![doc(json!({"id": "1"})), doc(json!({"id": "2"}))]),
    );
    a1.unwrap();
    b.unwrap();
    a2.unwrap();

    assert_eq!(
        remote.put_paths(),
        vec![
            "db/a.json".to_string(),
            "db/b.json".to_string(),
            "db/a.json".to_string()
        ]
    );
    assert_eq!(remote.documents("db/a.json").unwrap().len(), 2);
    assert_eq!(store.get("a").await.unwrap().len(), 2);
}

// ============================================================================
// Introspection
// ============================================================================

#[tokio::test]
async fn status_reports_configuration() {
    let (_remote, store) = setup();
    store.get("waitlist").await.unwrap();

    let status = store.status();
    assert_eq!(status.owner, "acme");
    assert_eq!(status.repo, "site");
    assert!(status.connected);
    assert_eq!(status.collections, vec!["waitlist".to_string()]);
    assert_eq!(status.cached_collections, vec!["waitlist".to_string()]);
    assert_eq!(status.pending_writes, 0);

    assert!(store.is_ready());
    assert!(!store.version().is_empty());
}
