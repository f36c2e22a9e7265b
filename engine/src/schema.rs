//! Schema definition and validation.
//!
//! Schemas describe the documents a collection accepts on insert: which
//! fields must be present, which primitive kind a field must hold, and which
//! default values are filled in when the caller leaves a field out.

use crate::{error::Result, CollectionName, Document, Error};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Primitive kinds a field can be constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// A string that parses as a date or date-time
    Date,
    /// A string holding a UUID
    Uuid,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::String => write!(f, "string"),
            FieldKind::Number => write!(f, "number"),
            FieldKind::Boolean => write!(f, "boolean"),
            FieldKind::Object => write!(f, "object"),
            FieldKind::Array => write!(f, "array"),
            FieldKind::Date => write!(f, "date"),
            FieldKind::Uuid => write!(f, "uuid"),
        }
    }
}

impl FieldKind {
    /// Whether a JSON value satisfies this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Date => value.as_str().is_some_and(parses_as_date),
            FieldKind::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
        }
    }
}

fn parses_as_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Kind constraint for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Expected kind
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Check a present value against this definition.
    ///
    /// `null` only satisfies [`FieldKind::Object`].
    pub fn validate(&self, value: &Value) -> Result<()> {
        let null_object = value.is_null() && self.kind == FieldKind::Object;
        if null_object || self.kind.accepts(value) {
            return Ok(());
        }
        Err(Error::TypeMismatch {
            field: self.name.clone(),
            expected: self.kind.to_string(),
            got: json_type_name(value).to_string(),
        })
    }
}

/// Insert rules for one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    /// Fields that must be present and non-null
    #[serde(default)]
    pub required: Vec<String>,
    /// Kind constraints, checked in order
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Values filled in for fields the caller left out
    #[serde(default)]
    pub defaults: Document,
}

impl CollectionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to require a field.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Builder-style method to constrain a field's kind.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef::new(name, kind));
        self
    }

    /// Builder-style method to add a default value.
    pub fn default_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    /// Fill in defaults without touching caller-supplied fields.
    pub fn apply_defaults(&self, document: &mut Document) {
        for (name, value) in &self.defaults {
            if !document.contains_key(name) {
                document.insert(name.clone(), value.clone());
            }
        }
    }

    /// Validate a document. Required fields are checked before kinds, each
    /// in rule order, and the first failure is returned.
    pub fn validate(&self, document: &Document) -> Result<()> {
        for name in &self.required {
            match document.get(name) {
                None | Some(Value::Null) => {
                    return Err(Error::MissingRequiredField(name.clone()));
                }
                Some(_) => {}
            }
        }

        for field in &self.fields {
            if let Some(value) = document.get(&field.name) {
                field.validate(value)?;
            }
        }

        Ok(())
    }
}

/// Insert rules for every configured collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    /// Collection schemas by name
    pub collections: HashMap<CollectionName, CollectionSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection to the schema.
    pub fn add_collection(
        &mut self,
        name: impl Into<CollectionName>,
        collection: CollectionSchema,
    ) -> &mut Self {
        self.collections.insert(name.into(), collection);
        self
    }

    /// Builder-style method to add a collection.
    pub fn with_collection(
        mut self,
        name: impl Into<CollectionName>,
        collection: CollectionSchema,
    ) -> Self {
        self.add_collection(name, collection);
        self
    }

    /// Get a collection schema by name.
    pub fn get_collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// Names of all configured collections, sorted.
    pub fn collection_names(&self) -> Vec<CollectionName> {
        let mut names: Vec<_> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Prepare a document for insertion: it must be an object, defaults are
    /// merged in, then the collection's rules (if any) are enforced.
    ///
    /// Collections without rules accept any object.
    pub fn prepare_insert(&self, collection: &str, payload: Value) -> Result<Document> {
        let mut document = match payload {
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidPayload(format!(
                    "document must be an object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        if let Some(rules) = self.collections.get(collection) {
            rules.apply_defaults(&mut document);
            rules.validate(&document)?;
        }

        Ok(document)
    }
}
