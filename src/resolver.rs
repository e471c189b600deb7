//! Recipient lookup.
//!
//! A [`RecipientResolver`] maps an opaque recipient identifier (a student
//! registration number, say) to a [`ContactRecord`]. The store behind it is
//! out of scope; [`MemoryResolver`] covers tests, fixtures and small
//! deployments that load records from JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::DispatchError;

/// Flat field mapping of a stored record.
pub type Fields = BTreeMap<String, String>;

/// Names of the record fields that carry identity and addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Identifier field
    pub id: String,
    /// Primary (student) address field
    pub primary: String,
    /// Alternate (parent) address field
    pub alternate: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            id: "regNo".into(),
            primary: "email".into(),
            alternate: "parentEmail".into(),
        }
    }
}

/// Contact data for one recipient, scoped to a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: String,
    pub primary_address: String,
    pub alternate_address: String,
    /// Every field of the stored record, addresses included
    pub fields: Fields,
}

impl ContactRecord {
    /// Build a record from a flat field mapping.
    ///
    /// Missing address fields become empty strings. The identifier is always
    /// available under the mapping's id field.
    pub fn from_fields(id: impl Into<String>, mut fields: Fields, mapping: &FieldMapping) -> Self {
        let id = id.into();
        let has_id = fields
            .get(&mapping.id)
            .is_some_and(|v| !v.trim().is_empty());
        if !has_id {
            fields.insert(mapping.id.clone(), id.clone());
        }

        let lookup = |key: &str| fields.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
        Self {
            id,
            primary_address: lookup(&mapping.primary),
            alternate_address: lookup(&mapping.alternate),
            fields,
        }
    }

    /// The address to deliver to.
    pub fn address(&self, alternate: bool) -> &str {
        if alternate {
            &self.alternate_address
        } else {
            &self.primary_address
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Looks up contact records by identifier.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    /// Fetch the record for `recipient_id`.
    ///
    /// Fails with [`DispatchError::RecipientNotFound`] if there is none.
    async fn resolve(&self, recipient_id: &str) -> Result<ContactRecord, DispatchError>;
}

/// In-memory recipient store.
///
/// ```rust,ignore
/// use bulletin::{MemoryResolver, RecipientResolver};
///
/// let resolver = MemoryResolver::new().with_record(
///     "RA001",
///     [("name", "Asha"), ("email", "asha@school.edu"), ("parentEmail", "mom@example.com")],
/// );
/// let record = resolver.resolve("RA001").await.unwrap();
/// assert_eq!(record.primary_address, "asha@school.edu");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    records: HashMap<String, Fields>,
    mapping: FieldMapping,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom field mapping.
    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Add or replace a record.
    pub fn insert(&mut self, id: impl Into<String>, fields: Fields) {
        self.records.insert(id.into(), fields);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_record<I, K, V>(mut self, id: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.insert(id, fields);
        self
    }

    /// Load records from a JSON array of objects.
    ///
    /// Each object must carry the mapping's id field (`regNo` by default;
    /// `RegNo` is also accepted). Strings, numbers and booleans become field
    /// values; nulls, arrays and nested objects are skipped.
    pub fn from_json_str(json: &str, mapping: FieldMapping) -> Result<Self, DispatchError> {
        let rows: Vec<serde_json::Map<String, Value>> = serde_json::from_str(json)?;
        let mut resolver = Self::new().with_mapping(mapping);

        for (index, row) in rows.into_iter().enumerate() {
            let fields: Fields = row
                .into_iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k, v)))
                .collect();

            let id = fields
                .get(&resolver.mapping.id)
                .or_else(|| fields.get(&capitalize(&resolver.mapping.id)))
                .cloned()
                .ok_or_else(|| {
                    DispatchError::Configuration(format!(
                        "record {} has no '{}' field",
                        index, resolver.mapping.id
                    ))
                })?;
            resolver.insert(id, fields);
        }

        tracing::debug!(records = resolver.len(), "Recipient records loaded");
        Ok(resolver)
    }

    /// Load records from a JSON file (see [`from_json_str`](Self::from_json_str)).
    pub fn from_json_file(
        path: impl AsRef<Path>,
        mapping: FieldMapping,
    ) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Configuration(format!("recipient file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json, mapping)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecipientResolver for MemoryResolver {
    async fn resolve(&self, recipient_id: &str) -> Result<ContactRecord, DispatchError> {
        let fields = self
            .records
            .get(recipient_id)
            .cloned()
            .ok_or_else(|| DispatchError::RecipientNotFound(recipient_id.to_string()))?;
        Ok(ContactRecord::from_fields(recipient_id, fields, &self.mapping))
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
