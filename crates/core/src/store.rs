use std::sync::Arc;

use crate::document::Document;
use crate::error::StoreResult;
use crate::query::{Filter, FindQuery};

/// A collection of records of one entity type.
///
/// Implementations must be safe to call concurrently; the HTTP layer shares a
/// single handle across all in-flight requests and adds no locking of its own.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Entity name (e.g. `"users"`), used for diagnostics.
    fn entity(&self) -> &str;

    /// Field holding the record identity.
    fn identity_field(&self) -> &str {
        "_id"
    }

    /// Matching records, sorted, paged and projected as requested.
    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Document>>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>>;

    /// Number of records matching `filter`, ignoring any paging.
    async fn count(&self, filter: &Filter) -> StoreResult<u64>;

    /// Persist a new record and return it as stored (identity assigned).
    async fn create(&self, fields: Document) -> StoreResult<Document>;

    /// Merge `fields` into the record and return it after the update.
    async fn update_by_id(&self, id: &str, fields: Document) -> StoreResult<Option<Document>>;

    /// Remove the record and return what was removed.
    async fn delete_by_id(&self, id: &str) -> StoreResult<Option<Document>>;
}

/// Shared handle used by routers.
pub type SharedStore = Arc<dyn Store>;

#[async_trait::async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    fn entity(&self) -> &str {
        (**self).entity()
    }

    fn identity_field(&self) -> &str {
        (**self).identity_field()
    }

    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Document>> {
        (**self).find_many(query).await
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        (**self).find_by_id(id).await
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        (**self).count(filter).await
    }

    async fn create(&self, fields: Document) -> StoreResult<Document> {
        (**self).create(fields).await
    }

    async fn update_by_id(&self, id: &str, fields: Document) -> StoreResult<Option<Document>> {
        (**self).update_by_id(id, fields).await
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        (**self).delete_by_id(id).await
    }
}
