//! The five generated handlers.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

use crudforge_core::document::scalar_text;
use crudforge_core::{Document, StoreError};

use crate::app::dto::{ListResponse, MessageResponse};
use crate::app::errors::CrudError;
use crate::app::query::ListParams;
use crate::app::routes::CrudState;

/// JSON object body. An empty body reads as an empty document.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonBody(pub Document);

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = CrudError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| CrudError::Body(e.to_string()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(Document::new()));
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(fields)) => Ok(Self(fields)),
            Ok(_) => Err(CrudError::Body("request body must be a JSON object".to_string())),
            Err(e) => Err(CrudError::Body(format!("malformed JSON body: {e}"))),
        }
    }
}

fn store_fault<'a>(state: &'a CrudState, operation: &'static str) -> impl FnOnce(StoreError) -> CrudError + 'a {
    move |err| {
        tracing::error!(entity = state.store.entity(), operation, error = %err, "store operation failed");
        CrudError::Store(err)
    }
}

fn not_found(state: &CrudState, id: &str) -> CrudError {
    tracing::debug!(entity = state.store.entity(), id, "record not found");
    CrudError::NotFound
}

/// `GET /`: one page of matching records plus the unpaged total.
pub async fn list_items(
    State(state): State<CrudState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>, CrudError> {
    let params = ListParams::from_query(pairs, state.store.identity_field(), state.defaults)?;

    let data: Vec<Document> = state
        .store
        .find_many(&params.find_query())
        .await
        .and_then(|found| found.into_iter().map(|doc| state.redact(doc)).collect())
        .map_err(store_fault(&state, "list"))?;
    let total = state
        .store
        .count(&params.filter)
        .await
        .map_err(store_fault(&state, "list"))?;

    Ok(Json(ListResponse {
        data,
        total,
        page: params.page,
        limit: params.limit,
    }))
}

/// `GET /:id`
pub async fn get_item(
    State(state): State<CrudState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, CrudError> {
    match state.store.find_by_id(&id).await.map_err(store_fault(&state, "get_by_id"))? {
        Some(doc) => Ok(Json(state.redact(doc).map_err(store_fault(&state, "get_by_id"))?)),
        None => Err(not_found(&state, &id)),
    }
}

/// `POST /`
pub async fn create_item(
    State(state): State<CrudState>,
    JsonBody(fields): JsonBody,
) -> Result<impl IntoResponse, CrudError> {
    let created = state.store.create(fields).await.map_err(store_fault(&state, "create"))?;

    let id = created
        .get(state.store.identity_field())
        .and_then(scalar_text)
        .unwrap_or_default();
    tracing::info!(entity = state.store.entity(), id = %id, "record created");

    let created = state.redact(created).map_err(store_fault(&state, "create"))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /:id`: shallow merge of the body into the stored record.
pub async fn update_item(
    State(state): State<CrudState>,
    Path(id): Path<String>,
    JsonBody(fields): JsonBody,
) -> Result<Json<Document>, CrudError> {
    match state
        .store
        .update_by_id(&id, fields)
        .await
        .map_err(store_fault(&state, "update"))?
    {
        Some(doc) => Ok(Json(state.redact(doc).map_err(store_fault(&state, "update"))?)),
        None => Err(not_found(&state, &id)),
    }
}

/// `DELETE /:id`
pub async fn delete_item(
    State(state): State<CrudState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, CrudError> {
    match state.store.delete_by_id(&id).await.map_err(store_fault(&state, "delete"))? {
        Some(_) => {
            tracing::info!(entity = state.store.entity(), id = %id, "record deleted");
            Ok(Json(MessageResponse::new("Item deleted successfully")))
        }
        None => Err(not_found(&state, &id)),
    }
}
