//! Preparing seed documents for insertion.
//!
//! Seed files carry their own identifiers (`_id` or `id`) and refer to each
//! other by them. The store assigns fresh ids, so each document is stripped of
//! its source id and its references are rewritten through an [`IdMap`] built
//! from the collections imported before it.

use serde_json::Value;
use std::collections::HashMap;

use crate::auth::AuthResult;
use crate::auth::passwords::PasswordService;
use crate::query::Document;
use crate::resources::tour::slugify;
use crate::resources::{review, tour, user};
use crate::store::DocumentId;

/// Identifiers in the source files mapped to the ids the store assigned.
pub type IdMap = HashMap<String, DocumentId>;

/// Ids assigned so far, per referenced collection.
#[derive(Debug, Default)]
pub struct ImportIds {
    pub users: IdMap,
    pub tours: IdMap,
}

impl ImportIds {
    /// Record the id the store gave a document imported from `source`.
    pub fn record(&mut self, collection: &str, source: &Value, id: DocumentId) {
        let ids = match collection {
            user::COLLECTION => &mut self.users,
            tour::COLLECTION => &mut self.tours,
            _ => return,
        };
        ids.insert(source_key(source), id);
    }
}

/// Shape one seed document for `collection` and return its source id.
pub fn prepare_document(
    collection: &str,
    document: &mut Document,
    ids: &ImportIds,
    passwords: &PasswordService,
) -> AuthResult<Option<Value>> {
    let source_id = document.remove("_id").or_else(|| document.remove("id"));
    match collection {
        user::COLLECTION => {
            if let Some(Value::String(password)) = document.get("password") {
                if !password.starts_with("$argon2") {
                    let hash = passwords.hash_password(password)?;
                    document.insert("password".into(), Value::String(hash));
                }
            }
            document.remove("passwordConfirm");
        }
        tour::COLLECTION => {
            remap_field(document, "guides", &ids.users);
            if let Some(name) = document.get("name").and_then(Value::as_str) {
                let slug = slugify(name);
                document.insert("slug".into(), Value::String(slug));
            }
        }
        review::COLLECTION => {
            remap_field(document, "user", &ids.users);
            remap_field(document, "tour", &ids.tours);
        }
        _ => {}
    }
    Ok(source_id)
}

pub fn source_key(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// Replace source identifiers in `field` (one id or a list) with stored ids.
/// Unknown identifiers are kept as they are.
pub fn remap_field(document: &mut Document, field: &str, ids: &IdMap) {
    let remap = |value: &mut Value| {
        if let Some(id) = ids.get(&source_key(value)) {
            *value = Value::from(*id);
        }
    };
    match document.get_mut(field) {
        Some(Value::Array(values)) => values.iter_mut().for_each(remap),
        Some(value) => remap(value),
        None => {}
    }
}
