//! Persistence port for resource documents.
//!
//! Handlers only talk to [`DocumentStore`]; the server wires in [`PgDocumentStore`]
//! and tests use [`MemoryStore`]. Every store assigns numeric identifiers that grow
//! with insertion order and maintains the [`VERSION_FIELD`] counter on each document.

pub mod memory;
pub mod postgres;

use crate::query::{Document, Filter, QuerySpec};
use rocket_db_pools::sqlx;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// Store-assigned document identifier.
pub type DocumentId = i64;

/// Internal revision counter kept on every stored document.
pub const VERSION_FIELD: &str = "__v";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored document {id} in '{collection}' is not a JSON object")]
    Corrupt { collection: String, id: DocumentId },
}

/// Lazily executed document queries plus identifier-addressed writes.
///
/// `scope` arguments restrict id lookups the same way list queries are restricted,
/// so a document hidden from listings is also invisible to read, update and delete.
#[rocket::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Execute a shaped query: filter, sort, paginate, then project.
    async fn find(&self, query: &QuerySpec) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    async fn find_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
    ) -> StoreResult<Option<Document>>;

    /// Persist a new document and return it with `id` and version assigned.
    async fn insert(&self, collection: &str, document: Document) -> StoreResult<Document>;

    /// Shallow-merge `changes` into the stored document and bump its version.
    async fn update_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
        changes: Document,
    ) -> StoreResult<Option<Document>>;

    /// Remove a document, returning what was removed.
    async fn delete_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
    ) -> StoreResult<Option<Document>>;

    /// Remove every document of a collection, returning how many were removed.
    async fn clear(&self, collection: &str) -> StoreResult<u64>;
}

/// Drop the fields a client must never write directly.
pub(crate) fn strip_managed_fields(document: &mut Document) {
    document.remove(crate::query::ID_FIELD);
    document.remove(VERSION_FIELD);
}
