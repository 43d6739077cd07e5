//! Postgres-backed store.
//!
//! One table per entity, each record kept whole as JSONB:
//!
//! ```sql
//! CREATE TABLE <entity> (id TEXT PRIMARY KEY, doc JSONB NOT NULL)
//! ```
//!
//! The identity is duplicated into `id` so lookups by identity hit the primary
//! key.
//!
//! Filters and sorts follow the in-memory store:
//!
//! - a filter value matches a scalar whose text equals it, or any scalar
//!   element of an array (one level deep);
//! - sort keys order by type first (missing/null, numbers, strings, objects,
//!   arrays, booleans), strings by byte order (`COLLATE "C"`).
//!
//! Objects and arrays still compare with jsonb rules inside their type (size
//! before content), and numbers match on Postgres' rendering of the stored
//! numeric, so `1.50` does not match `1.5`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use crudforge_core::document::scalar_text;
use crudforge_core::{
    Direction, Document, Filter, FindQuery, RecordId, Sort, Store, StoreError, StoreResult,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    entity: String,
    identity_field: String,
}

impl PgStore {
    /// The entity name doubles as the table name and must be a plain SQL
    /// identifier.
    pub fn new(pool: PgPool, entity: impl Into<String>) -> StoreResult<Self> {
        let entity = entity.into();
        let valid = entity
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && entity.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(StoreError::validation(format!("invalid table name '{entity}'")));
        }
        Ok(Self {
            pool,
            entity,
            identity_field: "_id".to_string(),
        })
    }

    /// Open a small pool against `database_url` and ensure the table exists.
    pub async fn connect(database_url: &str, entity: impl Into<String>) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool, entity)?;
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    /// Create the backing table if it does not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, doc JSONB NOT NULL)",
            self.entity
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
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

fn path_of(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for (i, (field, value)) in filter.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        // The value itself, or each element when it is an array; only scalars
        // have a text form.
        qb.push("EXISTS (SELECT 1 FROM (SELECT doc #> ");
        qb.push_bind(path_of(field));
        qb.push(
            " AS v) AS f CROSS JOIN LATERAL jsonb_array_elements(CASE jsonb_typeof(f.v) \
             WHEN 'array' THEN f.v ELSE jsonb_build_array(f.v) END) AS e(v) \
             WHERE f.v IS NOT NULL AND CASE jsonb_typeof(e.v) \
             WHEN 'null' THEN 'null' WHEN 'object' THEN NULL WHEN 'array' THEN NULL \
             ELSE e.v #>> '{}' END = ",
        );
        qb.push_bind(value.clone());
        qb.push(")");
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: &Sort) {
    for (i, key) in sort.keys().iter().enumerate() {
        let (dir, nulls) = match key.direction {
            Direction::Ascending => (" ASC", " NULLS FIRST"),
            Direction::Descending => (" DESC", " NULLS LAST"),
        };
        let path = path_of(&key.field);

        qb.push(if i == 0 { " ORDER BY " } else { ", " });
        qb.push("CASE jsonb_typeof(doc #> ");
        qb.push_bind(path.clone());
        qb.push(
            ") WHEN 'number' THEN 1 WHEN 'string' THEN 2 WHEN 'object' THEN 3 \
             WHEN 'array' THEN 4 WHEN 'boolean' THEN 5 ELSE 0 END",
        );
        qb.push(dir);

        qb.push(", CASE WHEN jsonb_typeof(doc #> ");
        qb.push_bind(path.clone());
        qb.push(") = 'string' THEN doc #>> ");
        qb.push_bind(path.clone());
        qb.push(" END COLLATE \"C\"");
        qb.push(dir);
        qb.push(nulls);

        qb.push(", doc #> ");
        qb.push_bind(path);
        qb.push(dir);
        qb.push(nulls);
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn identity_field(&self) -> &str {
        &self.identity_field
    }

    #[instrument(skip_all, err)]
    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Document>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT doc FROM {}", self.entity));
        push_where(&mut qb, &query.filter);
        push_order(&mut qb, &query.sort);

        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_scalar::<Json<Document>>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_many", e))?;

        rows.into_iter()
            .map(|Json(doc)| match &query.projection {
                Some(projection) => projection.apply(&doc, &self.identity_field),
                None => Ok(doc),
            })
            .collect()
    }

    #[instrument(skip_all, err)]
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", self.entity);
        let row: Option<Json<Document>> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;
        Ok(row.map(|Json(doc)| doc))
    }

    #[instrument(skip_all, err)]
    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {}", self.entity));
        push_where(&mut qb, filter);
        let n = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    #[instrument(skip_all, err)]
    async fn create(&self, mut fields: Document) -> StoreResult<Document> {
        let id = match self.identity_of(&fields)? {
            Some(id) => id,
            None => {
                let id = RecordId::new().to_string();
                fields.insert(self.identity_field.clone(), Value::String(id.clone()));
                id
            }
        };

        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2) RETURNING doc", self.entity);
        let Json(doc): Json<Document> = sqlx::query_scalar(&sql)
            .bind(&id)
            .bind(Json(&fields))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create", e))?;
        Ok(doc)
    }

    #[instrument(skip_all, err)]
    async fn update_by_id(&self, id: &str, mut fields: Document) -> StoreResult<Option<Document>> {
        if let Some(new_id) = self.identity_of(&fields)? {
            if new_id != id {
                return Err(StoreError::validation(format!(
                    "Performing an update on the path '{0}' would modify the immutable field '{0}'",
                    self.identity_field
                )));
            }
        }
        fields.remove(&self.identity_field);

        let sql = format!(
            "UPDATE {} SET doc = doc || $2 WHERE id = $1 RETURNING doc",
            self.entity
        );
        let row: Option<Json<Document>> = sqlx::query_scalar(&sql)
            .bind(id)
            .bind(Json(&fields))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_by_id", e))?;
        Ok(row.map(|Json(doc)| doc))
    }

    #[instrument(skip_all, err)]
    async fn delete_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        let sql = format!("DELETE FROM {} WHERE id = $1 RETURNING doc", self.entity);
        let row: Option<Json<Document>> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_by_id", e))?;
        Ok(row.map(|Json(doc)| doc))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
