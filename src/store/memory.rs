use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::query::eval::{matches_all, project, sort_documents};
use crate::query::{Document, Filter, ID_FIELD, QuerySpec};
use crate::store::{DocumentId, DocumentStore, StoreResult, VERSION_FIELD, strip_managed_fields};

/// Process-local document store used by tests and database-less runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<DocumentId, Document>>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> DocumentId {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[rocket::async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, query: &QuerySpec) -> StoreResult<Vec<Document>> {
        let mut documents: Vec<Document> = {
            let collections = self.collections.read();
            collections
                .get(&query.collection)
                .map(|documents| {
                    documents
                        .values()
                        .filter(|document| matches_all(document, &query.filter))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        sort_documents(&mut documents, &query.sort);

        let page: Vec<Document> = match query.pagination {
            Some(pagination) => documents
                .into_iter()
                .skip(usize::try_from(pagination.skip).unwrap_or(usize::MAX))
                .take(usize::try_from(pagination.limit).unwrap_or(usize::MAX))
                .collect(),
            None => documents,
        };

        Ok(page
            .into_iter()
            .map(|document| project(document, &query.projection))
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read();
        let count = collections
            .get(collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|document| matches_all(document, filter))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
    ) -> StoreResult<Option<Document>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(&id))
            .filter(|document| matches_all(document, scope))
            .cloned())
    }

    async fn insert(&self, collection: &str, mut document: Document) -> StoreResult<Document> {
        strip_managed_fields(&mut document);
        let id = self.allocate_id();
        document.insert(ID_FIELD.to_string(), Value::from(id));
        document.insert(VERSION_FIELD.to_string(), Value::from(0));

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, document.clone());
        Ok(document)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
        mut changes: Document,
    ) -> StoreResult<Option<Document>> {
        strip_managed_fields(&mut changes);
        let mut collections = self.collections.write();
        let Some(document) = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(&id))
            .filter(|document| matches_all(document, scope))
        else {
            return Ok(None);
        };

        let version = document
            .get(VERSION_FIELD)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        for (key, value) in changes {
            document.insert(key, value);
        }
        document.insert(VERSION_FIELD.to_string(), Value::from(version + 1));
        Ok(Some(document.clone()))
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(None);
        };
        if !documents
            .get(&id)
            .is_some_and(|document| matches_all(document, scope))
        {
            return Ok(None);
        }
        Ok(documents.remove(&id))
    }

    async fn clear(&self, collection: &str) -> StoreResult<u64> {
        let removed = self
            .collections
            .write()
            .remove(collection)
            .map(|documents| documents.len())
            .unwrap_or(0);
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Pagination, Predicate, Projection, SortKey};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn assigns_increasing_ids_and_versions() {
        let store = MemoryStore::new();
        let first = store.insert("tours", doc(json!({ "name": "a", "id": 99 }))).await.unwrap();
        let second = store.insert("tours", doc(json!({ "name": "b" }))).await.unwrap();

        assert_eq!(first["id"], json!(1));
        assert_eq!(second["id"], json!(2));
        assert_eq!(first[VERSION_FIELD], json!(0));

        let updated = store
            .update_by_id("tours", 1, &Vec::new(), doc(json!({ "name": "c", "__v": 40 })))
            .await
            .unwrap()
            .expect("document exists");
        assert_eq!(updated["name"], json!("c"));
        assert_eq!(updated[VERSION_FIELD], json!(1));
    }

    #[tokio::test]
    async fn find_applies_sort_then_pagination_then_projection() {
        let store = MemoryStore::new();
        for (name, price) in [("a", 300), ("b", 100), ("c", 200), ("d", 400)] {
            store
                .insert("tours", doc(json!({ "name": name, "price": price })))
                .await
                .unwrap();
        }

        let query = QuerySpec {
            collection: "tours".into(),
            filter: vec![Predicate::compare("price", crate::query::Comparison::Gte, 200)],
            sort: vec![SortKey::parse("price").unwrap()],
            projection: Projection::Include(vec!["name".into()]),
            pagination: Some(Pagination { skip: 1, limit: 1 }),
        };
        let found = store.find(&query).await.unwrap();
        assert_eq!(found, vec![doc(json!({ "id": 1, "name": "a" }))]);
    }

    #[tokio::test]
    async fn scoped_lookups_hide_out_of_scope_documents() {
        let store = MemoryStore::new();
        let secret = store
            .insert("tours", doc(json!({ "name": "hidden", "secretTour": true })))
            .await
            .unwrap();
        let id = secret["id"].as_i64().unwrap();
        let scope = vec![Predicate::ne("secretTour", true)];

        assert!(store.find_by_id("tours", id, &scope).await.unwrap().is_none());
        assert!(store.delete_by_id("tours", id, &scope).await.unwrap().is_none());
        assert!(store.find_by_id("tours", id, &Vec::new()).await.unwrap().is_some());
        assert_eq!(store.count("tours", &scope).await.unwrap(), 0);
    }
}
