//! Record identity: sequential ids and immutable uids.
//!
//! A record is an open JSON object. The engine only cares about two fields:
//! `id`, a numeric-looking string unique within the collection, and `uid`, a
//! UUID assigned once when the record is created.

use crate::{Document, RecordId};
use serde_json::Value;
use uuid::Uuid;

/// Field holding the per-collection sequential id.
pub const ID_FIELD: &str = "id";

/// Field holding the globally unique id.
pub const UID_FIELD: &str = "uid";

/// Decimal digits of a record's numeric id without leading zeros, or `None`
/// when the id is missing or not a non-negative integer.
///
/// Ids are kept as digit strings so that values past `u64::MAX` stored by
/// other writers still order and increment correctly.
fn numeric_id(record: &Document) -> Option<String> {
    let digits = match record.get(ID_FIELD)? {
        Value::String(s) => {
            let s = s.trim();
            s.strip_prefix('+').unwrap_or(s).to_string()
        }
        Value::Number(n) => n.as_u64()?.to_string(),
        _ => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
}

/// Add one to a canonical decimal digit string.
fn increment(digits: &str) -> String {
    let mut bytes = digits.as_bytes().to_vec();
    for b in bytes.iter_mut().rev() {
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    let mut carried = String::with_capacity(bytes.len() + 1);
    carried.push('1');
    carried.push_str(&String::from_utf8_lossy(&bytes));
    carried
}

/// Compute the id for the next record: `max(existing ids) + 1`.
///
/// Ids are not guaranteed to be gapless; records edited or removed outside
/// the store simply leave holes. Missing or non-numeric ids count as 0.
pub fn next_id(records: &[Document]) -> RecordId {
    let max = records
        .iter()
        .filter_map(numeric_id)
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .unwrap_or_else(|| "0".to_string());
    increment(&max)
}

/// Build a new record from caller fields, assigning `id` and `uid`.
///
/// The assigned identity always wins over anything the caller supplied under
/// the same field names.
pub fn new_record(mut fields: Document, existing: &[Document]) -> Document {
    let id = next_id(existing);
    fields.insert(ID_FIELD.to_string(), Value::String(id));
    fields.insert(
        UID_FIELD.to_string(),
        Value::String(Uuid::new_v4().to_string()),
    );
    fields
}

/// The record's `id`, if it is a string.
pub fn record_id(record: &Document) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// The record's `uid`, if present.
pub fn record_uid(record: &Document) -> Option<&str> {
    record.get(UID_FIELD).and_then(Value::as_str)
}

/// Whether `key` names this record by either `id` or `uid`.
pub fn matches_key(record: &Document, key: &str) -> bool {
    record_id(record) == Some(key) || record_uid(record) == Some(key)
}

/// Find a record by `id` or `uid`.
pub fn find_by_key<'a>(records: &'a [Document], key: &str) -> Option<&'a Document> {
    records.iter().find(|r| matches_key(r, key))
}
