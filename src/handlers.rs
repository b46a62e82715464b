//! Generic CRUD operations shared by every resource.
//!
//! [`ResourceHandlers`] borrows the store and query configuration from the
//! application state and applies a [`Resource`]'s schema, scope, hidden fields,
//! unique keys and hooks around each store call. Routes stay thin: they pick
//! the resource, check roles and wrap the returned documents in the JSON
//! envelope.

use serde_json::Value;

use crate::config::QueryConfig;
use crate::error::{ApiError, ApiResult};
use crate::query::{Document, Filter, ID_FIELD, Pagination, ParameterMap, Predicate, QueryBuilder, QuerySpec, SortKey};
use crate::resources::populate::populate;
use crate::resources::schema::{apply_defaults, sanitize, validate};
use crate::resources::{Populate, Resource, strip_hidden};
use crate::store::{DocumentId, DocumentStore, VERSION_FIELD};

pub struct ResourceHandlers<'a, R: Resource> {
    resource: &'a R,
    store: &'a dyn DocumentStore,
    config: &'a QueryConfig,
}

impl<'a, R: Resource> ResourceHandlers<'a, R> {
    pub fn new(resource: &'a R, store: &'a dyn DocumentStore, config: &'a QueryConfig) -> Self {
        Self {
            resource,
            store,
            config,
        }
    }

    /// Scope, `pre_filter` and the client's parameters shaped into one query.
    pub async fn list(&self, pre_filter: Filter, params: &ParameterMap) -> ApiResult<Vec<Document>> {
        let mut filter = R::scope();
        filter.extend(pre_filter);
        let query = QueryBuilder::shape(QuerySpec::find(R::COLLECTION, filter), params, self.config);

        let mut documents = self.store.find(&query).await?;
        populate(self.store, &mut documents, R::populate()).await?;

        // Projection already dropped the version field unless it was asked for.
        for document in &mut documents {
            strip_hidden(document, R::hidden_fields());
            self.resource.decorate(document);
        }
        log::debug!(
            "listed {} {} documents (skip {:?})",
            documents.len(),
            R::COLLECTION,
            query.pagination.map(|page| page.skip)
        );
        Ok(documents)
    }

    /// Every document in scope matching `pre_filter`, newest first, as stored.
    pub async fn fetch_all(&self, pre_filter: Filter) -> ApiResult<Vec<Document>> {
        let mut filter = R::scope();
        filter.extend(pre_filter);
        let query = QuerySpec::find(R::COLLECTION, filter).with_sort(vec![SortKey::newest_first()]);
        Ok(self.store.find(&query).await?)
    }

    /// Populate and reduce stored documents to their client-facing form.
    pub async fn present_all(&self, mut documents: Vec<Document>) -> ApiResult<Vec<Document>> {
        populate(self.store, &mut documents, R::populate()).await?;
        Ok(documents
            .into_iter()
            .map(|document| self.present(document))
            .collect())
    }

    /// One document with the resource's references plus `extra` directives resolved.
    pub async fn read(&self, raw_id: &str, extra: &[Populate]) -> ApiResult<Document> {
        let id = parse_id(raw_id)?;
        let document = self
            .store
            .find_by_id(R::COLLECTION, id, &R::scope())
            .await?
            .ok_or_else(not_found::<R>)?;

        let mut documents = vec![document];
        populate(self.store, &mut documents, R::populate()).await?;
        populate(self.store, &mut documents, extra).await?;

        let document = documents.pop().ok_or_else(not_found::<R>)?;
        Ok(self.present(document))
    }

    pub async fn create(&self, body: Value) -> ApiResult<Document> {
        let mut document = sanitize(R::schema(), body)?;
        apply_defaults(R::schema(), &mut document);

        let mut issues = validate(R::schema(), &document, None);
        issues.extend(self.resource.validate_document(&document));
        if !issues.is_empty() {
            return Err(ApiError::validation(issues));
        }

        self.ensure_unique(&document, None, None).await?;
        self.resource.before_insert(&mut document).await?;

        let created = self.store.insert(R::COLLECTION, document).await?;
        self.resource.after_write(self.store, &created, None).await?;
        log::info!("created {} {}", R::LABEL, display_id(&created));
        Ok(self.present(created))
    }

    /// Persist only the supplied fields; rules run against the merged document.
    pub async fn update(&self, raw_id: &str, body: Value) -> ApiResult<Document> {
        let id = parse_id(raw_id)?;
        let mut changes = sanitize(R::schema(), body)?;
        self.resource.before_update(&mut changes)?;

        let current = self
            .store
            .find_by_id(R::COLLECTION, id, &R::scope())
            .await?
            .ok_or_else(not_found::<R>)?;
        let previous = current.clone();
        let mut merged = current;
        merged.extend(changes.clone());

        let mut issues = validate(R::schema(), &merged, Some(&changes));
        issues.extend(self.resource.validate_document(&merged));
        if !issues.is_empty() {
            return Err(ApiError::validation(issues));
        }
        self.ensure_unique(&merged, Some(id), Some(&changes)).await?;

        let updated = self
            .store
            .update_by_id(R::COLLECTION, id, &R::scope(), changes)
            .await?
            .ok_or_else(not_found::<R>)?;
        self.resource.after_write(self.store, &updated, Some(&previous)).await?;
        Ok(self.present(updated))
    }

    pub async fn delete(&self, raw_id: &str) -> ApiResult<()> {
        let id = parse_id(raw_id)?;
        let removed = self
            .store
            .delete_by_id(R::COLLECTION, id, &R::scope())
            .await?
            .ok_or_else(not_found::<R>)?;
        self.resource.after_write(self.store, &removed, None).await?;
        log::info!("deleted {} {id}", R::LABEL);
        Ok(())
    }

    /// Unique keys are checked across the whole collection, scope ignored.
    /// With `changes`, only keys touching a changed field are checked.
    async fn ensure_unique(
        &self,
        document: &Document,
        exclude: Option<DocumentId>,
        changes: Option<&Document>,
    ) -> ApiResult<()> {
        'keys: for key in R::unique_keys() {
            if changes.is_some_and(|changes| !key.fields.iter().any(|field| changes.contains_key(*field))) {
                continue;
            }

            let mut filter = Vec::with_capacity(key.fields.len());
            let mut values = Vec::with_capacity(key.fields.len());
            for field in key.fields {
                match document.get(*field) {
                    Some(value) if !value.is_null() => {
                        filter.push(Predicate::eq(field, value.clone()));
                        values.push((*field, value));
                    }
                    _ => continue 'keys,
                }
            }

            let mut query = QuerySpec::find(R::COLLECTION, filter);
            query.pagination = Some(Pagination { skip: 0, limit: 2 });
            let clashes = self.store.find(&query).await?;
            if clashes
                .iter()
                .any(|clash| clash.get(ID_FIELD).and_then(Value::as_i64) != exclude)
            {
                return Err(ApiError::BadRequest(format!(
                    "Duplicate field value: {}",
                    describe_values(&values)
                )));
            }
        }
        Ok(())
    }

    fn present(&self, mut document: Document) -> Document {
        strip_hidden(&mut document, R::hidden_fields());
        document.remove(VERSION_FIELD);
        self.resource.decorate(&mut document);
        document
    }
}

pub fn parse_id(raw: &str) -> ApiResult<DocumentId> {
    raw.trim()
        .parse::<DocumentId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid id: {raw}")))
}

fn not_found<R: Resource>() -> ApiError {
    ApiError::NotFound(format!("No {} found with that ID", R::LABEL))
}

fn display_id(document: &Document) -> String {
    document
        .get(ID_FIELD)
        .map(ToString::to_string)
        .unwrap_or_else(|| "?".to_string())
}

fn describe_values(values: &[(&str, &Value)]) -> String {
    let text = |value: &Value| match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    match values {
        [(_, value)] => text(value),
        _ => values
            .iter()
            .map(|(field, value)| format!("{field}={}", text(value)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}
