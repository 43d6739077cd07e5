//! Query model handed to [`Store::find_many`](crate::Store::find_many) and
//! [`Store::count`](crate::Store::count).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{compare_values, lookup, Document};
use crate::error::{StoreError, StoreResult};

/// Equality constraints, field path → expected textual value.
///
/// Values are strings because they come from query strings; backends compare
/// them with the textual rendering of stored scalars.
pub type Filter = BTreeMap<String, String>;

/// Sort direction of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Ascending }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Descending }
    }
}

/// Ordered list of sort keys.
///
/// Textual form: keys separated by spaces or commas, `-field` descending,
/// `field` / `+field` ascending (e.g. `-createdAt name`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort(Vec<SortKey>);

impl Sort {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self(keys)
    }

    /// Newest first by identity.
    pub fn newest_first(identity_field: &str) -> Self {
        Self(vec![SortKey::descending(identity_field)])
    }

    pub fn parse(raw: &str) -> Self {
        let keys = raw
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter_map(|token| {
                if let Some(field) = token.strip_prefix('-') {
                    (!field.is_empty()).then(|| SortKey::descending(field))
                } else {
                    let field = token.strip_prefix('+').unwrap_or(token);
                    (!field.is_empty()).then(|| SortKey::ascending(field))
                }
            })
            .collect();
        Self(keys)
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare two documents under this sort.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.0 {
            let ord = compare_values(lookup(a, &key.field), lookup(b, &key.field));
            let ord = match key.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if key.direction == Direction::Descending {
                f.write_str("-")?;
            }
            f.write_str(&key.field)?;
        }
        Ok(())
    }
}

/// Field projection, kept in its textual form (`"name email"`,
/// `"-password"`) and interpreted by [`Projection::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection(String);

impl Projection {
    /// `None` when the projection names no field.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.split(|c: char| c.is_whitespace() || c == ',').all(str::is_empty) {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Restrict a document to the projected fields.
    ///
    /// Inclusion keeps the identity field unless it is explicitly excluded;
    /// any other mix of inclusions and exclusions is rejected.
    pub fn apply(&self, doc: &Document, identity_field: &str) -> StoreResult<Document> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for token in self.0.split(|c: char| c.is_whitespace() || c == ',') {
            if let Some(field) = token.strip_prefix('-') {
                if !field.is_empty() {
                    exclude.push(field);
                }
            } else {
                let field = token.strip_prefix('+').unwrap_or(token);
                if !field.is_empty() {
                    include.push(field);
                }
            }
        }

        if include.is_empty() {
            let mut out = doc.clone();
            for path in exclude {
                remove_path(&mut out, path);
            }
            return Ok(out);
        }

        let keep_identity = !exclude.contains(&identity_field);
        if exclude.iter().any(|field| *field != identity_field) {
            return Err(StoreError::validation(
                "Projection cannot have a mix of inclusion and exclusion.",
            ));
        }

        let mut out = Document::new();
        if keep_identity {
            if let Some(id) = doc.get(identity_field) {
                out.insert(identity_field.to_string(), id.clone());
            }
        }
        for path in include {
            if let Some(value) = lookup(doc, path) {
                insert_path(&mut out, path, value.clone());
            }
        }
        Ok(out)
    }
}

fn insert_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = doc.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

/// A fully-resolved `find_many` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: Sort,
    /// Number of matching records to skip.
    pub skip: u64,
    /// Maximum number of records to return.
    pub limit: u64,
    pub projection: Option<Projection>,
}

impl FindQuery {
    /// Whether a document satisfies every equality constraint of the filter.
    pub fn matches(filter: &Filter, doc: &Document) -> bool {
        filter
            .iter()
            .all(|(path, expected)| crate::document::matches_text(lookup(doc, path), expected))
    }
}
