//! In-memory store for tests/dev.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crudforge_core::document::scalar_text;
use crudforge_core::{
    Document, Filter, FindQuery, RecordId, Store, StoreError, StoreResult,
};

/// Records keyed by identity.
///
/// Keys are the textual identity; generated identities are UUIDv7 strings, so
/// key order is creation order.
#[derive(Debug)]
pub struct InMemoryStore {
    entity: String,
    identity_field: String,
    inner: RwLock<BTreeMap<String, Document>>,
}

impl InMemoryStore {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            identity_field: "_id".to_string(),
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Document>>> {
        self.inner
            .read()
            .map_err(|_| StoreError::unavailable(format!("{} store lock poisoned", self.entity)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Document>>> {
        self.inner
            .write()
            .map_err(|_| StoreError::unavailable(format!("{} store lock poisoned", self.entity)))
    }

    fn identity_of(&self, fields: &Document) -> StoreResult<Option<String>> {
        match fields.get(&self.identity_field) {
            None | Some(Value::Null) => Ok(None),
            Some(v @ (Value::String(_) | Value::Number(_))) => Ok(scalar_text(v)),
            Some(_) => Err(StoreError::validation(format!(
                "{} must be a string or a number",
                self.identity_field
            ))),
        }
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn identity_field(&self) -> &str {
        &self.identity_field
    }

    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Document>> {
        let map = self.read()?;

        let mut matched: Vec<&Document> = map
            .values()
            .filter(|doc| FindQuery::matches(&query.filter, doc))
            .collect();
        if !query.sort.is_empty() {
            matched.sort_by(|a, b| query.sort.compare(a, b));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);

        matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &query.projection {
                Some(projection) => projection.apply(doc, &self.identity_field),
                None => Ok(doc.clone()),
            })
            .collect()
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        let map = self.read()?;
        let n = map.values().filter(|doc| FindQuery::matches(filter, doc)).count();
        Ok(n as u64)
    }

    async fn create(&self, mut fields: Document) -> StoreResult<Document> {
        let id = match self.identity_of(&fields)? {
            Some(id) => id,
            None => {
                let id = RecordId::new().to_string();
                fields.insert(self.identity_field.clone(), Value::String(id.clone()));
                id
            }
        };

        let mut map = self.write()?;
        if map.contains_key(&id) {
            return Err(StoreError::conflict(format!(
                "duplicate key: {} {} already exists",
                self.identity_field, id
            )));
        }
        map.insert(id.clone(), fields.clone());
        tracing::debug!(entity = %self.entity, id = %id, "record inserted");
        Ok(fields)
    }

    async fn update_by_id(&self, id: &str, fields: Document) -> StoreResult<Option<Document>> {
        if let Some(new_id) = self.identity_of(&fields)? {
            if new_id != id {
                return Err(StoreError::validation(format!(
                    "Performing an update on the path '{0}' would modify the immutable field '{0}'",
                    self.identity_field
                )));
            }
        }

        let mut map = self.write()?;
        let Some(record) = map.get_mut(id) else {
            return Ok(None);
        };
        for (key, value) in fields {
            if key != self.identity_field {
                record.insert(key, value);
            }
        }
        Ok(Some(record.clone()))
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        let removed = self.write()?.remove(id);
        if removed.is_some() {
            tracing::debug!(entity = %self.entity, id = %id, "record removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crudforge_core::{Projection, Sort};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn query(filter: Filter, sort: &str, skip: u64, limit: u64) -> FindQuery {
        FindQuery {
            filter,
            sort: Sort::parse(sort),
            skip,
            limit,
            projection: None,
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new("users");
        for (name, role, age) in [
            ("ali", "student", 21),
            ("sara", "teacher", 40),
            ("omar", "student", 19),
            ("hina", "student", 25),
            ("zaid", "admin", 33),
        ] {
            store
                .create(doc(json!({"name": name, "role": role, "age": age})))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn create_assigns_identity() {
        let store = InMemoryStore::new("users");
        let created = store.create(doc(json!({"name": "ali"}))).await.unwrap();
        let id = created["_id"].as_str().unwrap().to_string();
        assert!(id.parse::<RecordId>().is_ok());
        assert_eq!(store.find_by_id(&id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_identity() {
        let store = InMemoryStore::new("users");
        store.create(doc(json!({"_id": "1"}))).await.unwrap();
        let err = store.create(doc(json!({"_id": "1"}))).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn default_order_is_newest_first() {
        let store = seeded().await;
        let docs = store
            .find_many(&query(Filter::new(), "-_id", 0, 10))
            .await
            .unwrap();
        let names: Vec<_> = docs.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["zaid", "hina", "omar", "sara", "ali"]);
    }

    #[tokio::test]
    async fn filter_sort_and_page() {
        let store = seeded().await;
        let mut filter = Filter::new();
        filter.insert("role".into(), "student".into());

        let page = store.find_many(&query(filter.clone(), "age", 1, 1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["name"], "ali");

        assert_eq!(store.count(&filter).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn numeric_filter_matches_textual_value() {
        let store = seeded().await;
        let mut filter = Filter::new();
        filter.insert("age".into(), "40".into());
        let docs = store.find_many(&query(filter, "", 0, 10)).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["name"], "sara");
    }

    #[tokio::test]
    async fn projection_is_applied() {
        let store = seeded().await;
        let mut q = query(Filter::new(), "name", 0, 1);
        q.projection = Projection::new("name");
        let docs = store.find_many(&q).await.unwrap();
        assert_eq!(docs[0].len(), 2);
        assert_eq!(docs[0]["name"], "ali");
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = InMemoryStore::new("users");
        let created = store
            .create(doc(json!({"_id": "1", "name": "ali", "role": "student"})))
            .await
            .unwrap();
        assert_eq!(created["role"], "student");

        let updated = store
            .update_by_id("1", doc(json!({"role": "teacher"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Value::Object(updated), json!({"_id": "1", "name": "ali", "role": "teacher"}));
    }

    #[tokio::test]
    async fn update_cannot_change_identity() {
        let store = InMemoryStore::new("users");
        store.create(doc(json!({"_id": "1"}))).await.unwrap();
        let err = store.update_by_id("1", doc(json!({"_id": "2"}))).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn absent_ids_leave_store_untouched() {
        let store = seeded().await;
        assert!(store.find_by_id("missing").await.unwrap().is_none());
        assert!(store.update_by_id("missing", doc(json!({"a": 1}))).await.unwrap().is_none());
        assert!(store.delete_by_id("missing").await.unwrap().is_none());
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn custom_identity_field() {
        let store = InMemoryStore::new("books").with_identity_field("isbn");
        let created = store.create(doc(json!({"title": "Dune"}))).await.unwrap();
        let id = created["isbn"].as_str().unwrap();
        let removed = store.delete_by_id(id).await.unwrap();
        assert_eq!(removed.unwrap()["title"], "Dune");
        assert!(store.is_empty());
    }
}
