//! `crudforge-core`: storage capability and query model.
//!
//! Nothing here depends on HTTP: it describes *what* a collection store can
//! do and the shape of the queries it receives.

pub mod document;
pub mod error;
pub mod id;
pub mod query;
pub mod store;

pub use document::Document;
pub use error::{StoreError, StoreResult};
pub use id::RecordId;
pub use query::{Direction, Filter, FindQuery, Projection, Sort, SortKey};
pub use store::{SharedStore, Store};
