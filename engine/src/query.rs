//! Simple predicate, sort and projection helpers over a collection snapshot.

use crate::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

type Predicate<'a> = Box<dyn Fn(&Document) -> bool + Send + 'a>;

/// Builder for querying the records of one collection.
///
/// Filters are combined with AND. Sorting is stable, so records that compare
/// equal keep their collection order.
pub struct QueryBuilder<'a> {
    records: &'a [Document],
    filters: Vec<Predicate<'a>>,
    sort: Option<(String, SortOrder)>,
    projection: Option<Vec<String>>,
    limit: Option<usize>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(records: &'a [Document]) -> Self {
        Self {
            records,
            filters: Vec::new(),
            sort: None,
            projection: None,
            limit: None,
        }
    }

    /// Keep only records matching the predicate.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + 'a,
    {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Keep only records whose `field` equals `value`.
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        self.filter(move |r| r.get(&field) == Some(&value))
    }

    /// Order by a field. Missing and null values sort last in either direction.
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    /// Keep only the named fields in each result.
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    fn matching(&self) -> Vec<&'a Document> {
        let mut matched: Vec<&'a Document> = self
            .records
            .iter()
            .filter(|r| self.filters.iter().all(|f| f(r)))
            .collect();

        if let Some((field, order)) = &self.sort {
            matched.sort_by(|a, b| compare_field(a.get(field), b.get(field), *order));
        }

        if let Some(n) = self.limit {
            matched.truncate(n);
        }

        matched
    }

    fn shape(&self, record: &Document) -> Document {
        match &self.projection {
            Some(fields) => fields
                .iter()
                .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
                .collect(),
            None => record.clone(),
        }
    }

    /// Get all matching records.
    pub fn all(self) -> Vec<Document> {
        self.matching().into_iter().map(|r| self.shape(r)).collect()
    }

    /// Get the first matching record.
    pub fn first(self) -> Option<Document> {
        self.matching().first().map(|r| self.shape(r))
    }

    /// Count matching records.
    pub fn count(self) -> usize {
        self.matching().len()
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn compare_field(a: Option<&Value>, b: Option<&Value>, order: SortOrder) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match order {
            SortOrder::Asc => compare_values(a, b),
            SortOrder::Desc => compare_values(b, a),
        },
    }
}
