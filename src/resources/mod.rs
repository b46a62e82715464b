//! Resource types served through the generic handler factory.
//!
//! Each resource declares its collection, schema and lifecycle hooks through the
//! [`Resource`] trait. The collection-level rules (scope, hidden fields, population)
//! are also reachable by collection name through [`rules_for`], which population uses
//! when it follows a reference into another collection.

pub mod booking;
pub mod import;
pub mod populate;
pub mod review;
pub mod schema;
pub mod tour;
pub mod user;

use serde_json::Value;

use crate::error::ApiResult;
use crate::query::eval::project;
use crate::query::{Document, FieldPath, Filter, Projection};
use crate::store::{DocumentStore, VERSION_FIELD};

pub use booking::Bookings;
pub use review::Reviews;
pub use schema::{FieldIssue, Schema};
pub use tour::Tours;
pub use user::Users;

/// How a field holding identifiers is replaced by the documents it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Populate {
    /// `path` holds one id or an array of ids in `collection`; `select` limits the
    /// attached fields (empty keeps all visible fields).
    Reference {
        path: &'static str,
        collection: &'static str,
        select: &'static [&'static str],
    },
    /// Attach every document of `collection` whose `foreign_field` equals this
    /// document's id, stored under `path`.
    Virtual {
        path: &'static str,
        collection: &'static str,
        foreign_field: &'static str,
    },
}

/// Fields whose combined values must not repeat within a collection.
#[derive(Debug, Clone, Copy)]
pub struct UniqueKey {
    pub fields: &'static [&'static str],
}

/// Read-side rules of a collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionRules {
    pub scope: Filter,
    pub hidden: &'static [&'static str],
    pub populate: &'static [Populate],
}

impl CollectionRules {
    /// Reduce a document to what a client may see, optionally to `select`ed fields.
    pub fn present(&self, document: Document, select: &[&str]) -> Document {
        let mut document = if select.is_empty() {
            document
        } else {
            project(
                document,
                &Projection::Include(select.iter().map(|field| FieldPath::from(*field)).collect()),
            )
        };
        strip_hidden(&mut document, self.hidden);
        document.remove(VERSION_FIELD);
        document
    }
}

pub fn rules_for(collection: &str) -> CollectionRules {
    match collection {
        tour::COLLECTION => Tours::rules(),
        review::COLLECTION => Reviews::rules(),
        booking::COLLECTION => Bookings::rules(),
        user::COLLECTION => Users::rules(),
        _ => CollectionRules::default(),
    }
}

pub(crate) fn strip_hidden(document: &mut Document, hidden: &[&str]) {
    for field in hidden {
        document.remove(*field);
    }
}

#[rocket::async_trait]
pub trait Resource: Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Singular name used in client-facing messages.
    const LABEL: &'static str;

    fn schema() -> &'static Schema;

    /// Restriction applied to every query and id lookup on this collection.
    fn scope() -> Filter {
        Vec::new()
    }

    /// Fields never returned to clients.
    fn hidden_fields() -> &'static [&'static str] {
        &[]
    }

    fn unique_keys() -> &'static [UniqueKey] {
        &[]
    }

    /// References resolved on every list and read.
    fn populate() -> &'static [Populate] {
        &[]
    }

    fn rules() -> CollectionRules
    where
        Self: Sized,
    {
        CollectionRules {
            scope: Self::scope(),
            hidden: Self::hidden_fields(),
            populate: Self::populate(),
        }
    }

    /// Cross-field constraints, checked after the per-field schema rules.
    fn validate_document(&self, _document: &Document) -> Vec<FieldIssue> {
        Vec::new()
    }

    async fn before_insert(&self, _document: &mut Document) -> ApiResult<()> {
        Ok(())
    }

    fn before_update(&self, _changes: &mut Document) -> ApiResult<()> {
        Ok(())
    }

    /// Runs after a create, update or delete with the affected document. Updates
    /// also pass the document as it was before the change.
    async fn after_write(
        &self,
        _store: &dyn DocumentStore,
        _document: &Document,
        _previous: Option<&Document>,
    ) -> ApiResult<()> {
        Ok(())
    }

    /// Add computed fields to an outgoing document.
    fn decorate(&self, _document: &mut Document) {}
}

pub(crate) fn number(document: &Document, field: &str) -> Option<f64> {
    document.get(field).and_then(Value::as_f64)
}
