//! Store doubles for handler tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crudforge_core::{Document, Filter, FindQuery, Store, StoreError, StoreResult};

/// Fails every operation with the same error.
pub struct FailingStore {
    error: StoreError,
}

impl FailingStore {
    pub fn new(error: StoreError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl Store for FailingStore {
    fn entity(&self) -> &str {
        "failing"
    }

    async fn find_many(&self, _query: &FindQuery) -> StoreResult<Vec<Document>> {
        Err(self.error.clone())
    }

    async fn find_by_id(&self, _id: &str) -> StoreResult<Option<Document>> {
        Err(self.error.clone())
    }

    async fn count(&self, _filter: &Filter) -> StoreResult<u64> {
        Err(self.error.clone())
    }

    async fn create(&self, _fields: Document) -> StoreResult<Document> {
        Err(self.error.clone())
    }

    async fn update_by_id(&self, _id: &str, _fields: Document) -> StoreResult<Option<Document>> {
        Err(self.error.clone())
    }

    async fn delete_by_id(&self, _id: &str) -> StoreResult<Option<Document>> {
        Err(self.error.clone())
    }
}

/// Empty store that records each call it receives.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Store for RecordingStore {
    fn entity(&self) -> &str {
        "recording"
    }

    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Document>> {
        self.record(format!(
            "find_many skip={} limit={} sort={}",
            query.skip, query.limit, query.sort
        ));
        Ok(Vec::new())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        self.record(format!("find_by_id {id}"));
        Ok(None)
    }

    async fn count(&self, _filter: &Filter) -> StoreResult<u64> {
        self.record("count".to_string());
        Ok(0)
    }

    async fn create(&self, fields: Document) -> StoreResult<Document> {
        self.record("create".to_string());
        Ok(fields)
    }

    async fn update_by_id(&self, id: &str, _fields: Document) -> StoreResult<Option<Document>> {
        self.record(format!("update_by_id {id}"));
        Ok(None)
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        self.record(format!("delete_by_id {id}"));
        Ok(None)
    }
}
