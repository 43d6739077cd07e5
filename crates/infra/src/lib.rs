//! Infrastructure layer: concrete [`Store`](crudforge_core::Store) backends.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStore;

#[cfg(feature = "postgres")]
pub use postgres::PgStore;
