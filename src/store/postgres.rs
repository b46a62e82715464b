//! PostgreSQL implementation of [`DocumentStore`] over a single JSONB table.
//!
//! Every collection shares the `documents` table. Predicates and sort keys are rendered
//! as SQL over `body #> path` expressions, casting each stored value by its JSON type so
//! comparisons behave the same as the in-memory evaluator: numbers compare numerically,
//! strings bytewise (`COLLATE "C"`), booleans as booleans, and arrays match when any
//! element does. The `id` field maps onto the `id` column.

use rocket_db_pools::sqlx::postgres::PgRow;
use rocket_db_pools::sqlx::types::Json;
use rocket_db_pools::sqlx::{self, PgPool, Postgres, QueryBuilder, Row};
use serde_json::Value;

use crate::query::eval::project;
use crate::query::{
    Comparison, Document, FieldPath, Filter, FilterValue, ID_FIELD, Predicate, QuerySpec,
    SortDirection, SortKey,
};
use crate::store::{
    DocumentId, DocumentStore, StoreError, StoreResult, VERSION_FIELD, strip_managed_fields,
};

const SELECT_COLUMNS: &str = "SELECT id, body, version FROM documents";

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[rocket::async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find(&self, query: &QuerySpec) -> StoreResult<Vec<Document>> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        push_scope(&mut builder, &query.collection, &query.filter);
        push_order(&mut builder, &query.sort);
        if let Some(pagination) = query.pagination {
            builder
                .push(" OFFSET ")
                .push_bind(clamp_i64(pagination.skip))
                .push(" LIMIT ")
                .push_bind(clamp_i64(pagination.limit));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                document_from_row(&query.collection, row)
                    .map(|document| project(document, &query.projection))
            })
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_scope(&mut builder, collection, filter);
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
    ) -> StoreResult<Option<Document>> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        push_scope(&mut builder, collection, scope);
        builder.push(" AND id = ").push_bind(id);

        let row = builder.build().fetch_optional(&self.pool).await?;
        row.map(|row| document_from_row(collection, &row)).transpose()
    }

    async fn insert(&self, collection: &str, mut document: Document) -> StoreResult<Document> {
        strip_managed_fields(&mut document);
        let row = sqlx::query(
            "INSERT INTO documents (collection, body) VALUES ($1, $2) RETURNING id, body, version",
        )
        .bind(collection)
        .bind(Json(Value::Object(document)))
        .fetch_one(&self.pool)
        .await?;

        document_from_row(collection, &row)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
        mut changes: Document,
    ) -> StoreResult<Option<Document>> {
        strip_managed_fields(&mut changes);
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE documents SET body = body || ");
        builder
            .push_bind(Json(Value::Object(changes)))
            .push(", version = version + 1");
        push_scope(&mut builder, collection, scope);
        builder
            .push(" AND id = ")
            .push_bind(id)
            .push(" RETURNING id, body, version");

        let row = builder.build().fetch_optional(&self.pool).await?;
        row.map(|row| document_from_row(collection, &row)).transpose()
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        scope: &Filter,
    ) -> StoreResult<Option<Document>> {
        let mut builder = QueryBuilder::<Postgres>::new("DELETE FROM documents");
        push_scope(&mut builder, collection, scope);
        builder
            .push(" AND id = ")
            .push_bind(id)
            .push(" RETURNING id, body, version");

        let row = builder.build().fetch_optional(&self.pool).await?;
        row.map(|row| document_from_row(collection, &row)).transpose()
    }

    async fn clear(&self, collection: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1")
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn document_from_row(collection: &str, row: &PgRow) -> StoreResult<Document> {
    let id: i64 = row.try_get("id")?;
    let version: i32 = row.try_get("version")?;
    let Json(body): Json<Value> = row.try_get("body")?;

    let Value::Object(mut document) = body else {
        return Err(StoreError::Corrupt {
            collection: collection.to_string(),
            id,
        });
    };
    document.insert(ID_FIELD.to_string(), Value::from(id));
    document.insert(VERSION_FIELD.to_string(), Value::from(version));
    Ok(document)
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, collection: &str, filter: &[Predicate]) {
    builder
        .push(" WHERE collection = ")
        .push_bind(collection.to_string());
    for predicate in filter {
        builder.push(" AND ");
        push_predicate(builder, predicate);
    }
}

fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    if predicate.op == Comparison::Eq && !predicate.alternatives.is_empty() {
        builder.push("(");
        for (index, operand) in predicate.operands().enumerate() {
            if index > 0 {
                builder.push(" OR ");
            }
            push_operand(builder, &predicate.field, Comparison::Eq, operand);
        }
        builder.push(")");
        return;
    }
    push_operand(builder, &predicate.field, predicate.op, &predicate.value);
}

fn push_operand(
    builder: &mut QueryBuilder<'_, Postgres>,
    field: &FieldPath,
    op: Comparison,
    value: &FilterValue,
) {
    if field.is_id() {
        push_id_match(builder, op, value);
        return;
    }

    match op {
        Comparison::Ne => {
            builder.push("NOT ");
            push_match(builder, field, Comparison::Eq, value);
        }
        op => push_match(builder, field, op, value),
    }
}

fn push_id_match(builder: &mut QueryBuilder<'_, Postgres>, op: Comparison, value: &FilterValue) {
    match value.as_f64() {
        Some(number) => {
            builder
                .push("id::float8 ")
                .push(op.sql_operator())
                .push(" ")
                .push_bind(number);
        }
        None if op == Comparison::Ne => {
            builder.push("TRUE");
        }
        None => {
            builder.push("FALSE");
        }
    }
}

/// The value itself or any element of an array value satisfies `op`; missing is false.
fn push_match(
    builder: &mut QueryBuilder<'_, Postgres>,
    field: &FieldPath,
    op: Comparison,
    value: &FilterValue,
) {
    builder.push("COALESCE((");
    push_scalar_match(builder, Target::Path(field), op, value);
    builder.push(") OR EXISTS (SELECT 1 FROM jsonb_array_elements(CASE WHEN jsonb_typeof(");
    push_path(builder, field);
    builder.push(") = 'array' THEN ");
    push_path(builder, field);
    builder.push(" ELSE '[]'::jsonb END) AS element(value) WHERE ");
    push_scalar_match(builder, Target::Element, op, value);
    builder.push("), FALSE)");
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Path(&'a FieldPath),
    Element,
}

fn push_target(builder: &mut QueryBuilder<'_, Postgres>, target: Target<'_>) {
    match target {
        Target::Path(field) => push_path(builder, field),
        Target::Element => {
            builder.push("element.value");
        }
    }
}

fn push_path(builder: &mut QueryBuilder<'_, Postgres>, field: &FieldPath) {
    builder
        .push("(body #> ")
        .push_bind(field.segments().to_vec())
        .push(")");
}

// Casts sit inside CASE branches so they only run on values of the matching type.
fn push_scalar_match(
    builder: &mut QueryBuilder<'_, Postgres>,
    target: Target<'_>,
    op: Comparison,
    value: &FilterValue,
) {
    let operator = op.sql_operator();

    builder.push("CASE jsonb_typeof(");
    push_target(builder, target);
    builder.push(")");

    if let Some(number) = value.as_f64() {
        builder.push(" WHEN 'number' THEN (");
        push_target(builder, target);
        builder
            .push(")::float8 ")
            .push(operator)
            .push(" ")
            .push_bind(number);
    }

    builder.push(" WHEN 'string' THEN (");
    push_target(builder, target);
    builder
        .push(" #>> '{}') COLLATE \"C\" ")
        .push(operator)
        .push(" ")
        .push_bind(value.raw().to_string());

    if let Some(flag) = value.as_bool() {
        builder.push(" WHEN 'boolean' THEN (");
        push_target(builder, target);
        builder
            .push(")::boolean ")
            .push(operator)
            .push(" ")
            .push_bind(flag);
    }

    builder.push(" ELSE FALSE END");
}

/// Orders by JSON type first (missing/null, number, string, object, array, boolean),
/// then by value within the type, then by insertion order.
fn push_order(builder: &mut QueryBuilder<'_, Postgres>, sort: &[SortKey]) {
    builder.push(" ORDER BY ");
    for key in sort {
        let direction = match key.direction {
            SortDirection::Ascending => " ASC",
            SortDirection::Descending => " DESC",
        };

        if key.field.is_id() {
            builder.push("id").push(direction).push(", ");
            continue;
        }

        builder.push("CASE jsonb_typeof(");
        push_path(builder, &key.field);
        builder.push(
            ") WHEN 'number' THEN 1 WHEN 'string' THEN 2 WHEN 'object' THEN 3 \
             WHEN 'array' THEN 4 WHEN 'boolean' THEN 5 ELSE 0 END",
        );
        builder.push(direction).push(", ");

        builder.push("CASE WHEN jsonb_typeof(");
        push_path(builder, &key.field);
        builder.push(") = 'number' THEN (");
        push_path(builder, &key.field);
        builder.push(")::float8 END").push(direction).push(", ");

        builder.push("CASE WHEN jsonb_typeof(");
        push_path(builder, &key.field);
        builder.push(") = 'string' THEN ");
        push_path(builder, &key.field);
        builder
            .push(" #>> '{}' END COLLATE \"C\"")
            .push(direction)
            .push(", ");

        builder.push("CASE WHEN jsonb_typeof(");
        push_path(builder, &key.field);
        builder.push(") = 'boolean' THEN (");
        push_path(builder, &key.field);
        builder.push(")::boolean END").push(direction).push(", ");
    }
    builder.push("id ASC");
}
