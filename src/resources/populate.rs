use serde_json::Value;
use std::collections::HashMap;

use crate::query::{Document, ID_FIELD, Predicate, QuerySpec, SortKey};
use crate::resources::{CollectionRules, Populate, rules_for};
use crate::store::{DocumentId, DocumentStore, StoreResult};

/// Resolve every directive on `documents` in place.
///
/// Documents pulled in through a virtual directive get their own collection's
/// reference directives applied, one level deep.
pub async fn populate(
    store: &dyn DocumentStore,
    documents: &mut [Document],
    directives: &[Populate],
) -> StoreResult<()> {
    for directive in directives {
        match *directive {
            Populate::Reference {
                path,
                collection,
                select,
            } => populate_reference(store, documents, path, collection, select).await?,
            Populate::Virtual {
                path,
                collection,
                foreign_field,
            } => populate_virtual(store, documents, path, collection, foreign_field).await?,
        }
    }
    Ok(())
}

async fn populate_reference(
    store: &dyn DocumentStore,
    documents: &mut [Document],
    path: &str,
    collection: &str,
    select: &[&str],
) -> StoreResult<()> {
    let rules = rules_for(collection);
    let mut cache: HashMap<DocumentId, Option<Value>> = HashMap::new();

    for document in documents.iter_mut() {
        let Some(current) = document.get(path).cloned() else {
            continue;
        };

        let resolved = match current {
            Value::Array(items) => {
                let mut found = Vec::with_capacity(items.len());
                for id in items.iter().filter_map(Value::as_i64) {
                    if let Some(related) =
                        lookup(store, &rules, collection, select, id, &mut cache).await?
                    {
                        found.push(related);
                    }
                }
                Value::Array(found)
            }
            other => match other.as_i64() {
                Some(id) => lookup(store, &rules, collection, select, id, &mut cache)
                    .await?
                    .unwrap_or(Value::Null),
                None => continue,
            },
        };
        document.insert(path.to_string(), resolved);
    }
    Ok(())
}

async fn lookup(
    store: &dyn DocumentStore,
    rules: &CollectionRules,
    collection: &str,
    select: &[&str],
    id: DocumentId,
    cache: &mut HashMap<DocumentId, Option<Value>>,
) -> StoreResult<Option<Value>> {
    if let Some(hit) = cache.get(&id) {
        return Ok(hit.clone());
    }
    let found = store
        .find_by_id(collection, id, &rules.scope)
        .await?
        .map(|document| Value::Object(rules.present(document, select)));
    cache.insert(id, found.clone());
    Ok(found)
}

async fn populate_virtual(
    store: &dyn DocumentStore,
    documents: &mut [Document],
    path: &str,
    collection: &str,
    foreign_field: &str,
) -> StoreResult<()> {
    let rules = rules_for(collection);

    for document in documents.iter_mut() {
        let Some(id) = document.get(ID_FIELD).and_then(Value::as_i64) else {
            continue;
        };

        let mut filter = rules.scope.clone();
        filter.push(Predicate::eq(foreign_field, id));
        let query = QuerySpec::find(collection, filter).with_sort(vec![SortKey::newest_first()]);
        let mut related = store.find(&query).await?;

        for directive in rules.populate {
            if let Populate::Reference {
                path,
                collection,
                select,
            } = *directive
            {
                populate_reference(store, &mut related, path, collection, select).await?;
            }
        }

        let related = related
            .into_iter()
            .map(|item| Value::Object(rules.present(item, &[])))
            .collect();
        document.insert(path.to_string(), Value::Array(related));
    }
    Ok(())
}
