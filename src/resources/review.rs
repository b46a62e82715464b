use serde_json::Value;

use crate::error::ApiResult;
use crate::query::{Document, Predicate, QuerySpec};
use crate::resources::schema::{DefaultValue, FieldKind, FieldSpec, Schema, object};
use crate::resources::tour::round_rating;
use crate::resources::{Populate, Resource, UniqueKey, number, tour, user};
use crate::store::{DocumentId, DocumentStore, StoreResult};

pub const COLLECTION: &str = "reviews";

const DEFAULT_RATING: f64 = 4.5;

const SCHEMA: &Schema = &[
    FieldSpec::new("review", FieldKind::Text).required("Review content required"),
    FieldSpec::new("rating", FieldKind::Number)
        .required("Review rating required")
        .min(1.0, "Rating must be above 1.0")
        .max(5.0, "Rating must be below 5.0"),
    FieldSpec::new("createdAt", FieldKind::Date).default(DefaultValue::Now),
    FieldSpec::new("tour", FieldKind::Reference).required("Review must belong to a tour"),
    FieldSpec::new("user", FieldKind::Reference).required("Review must belong to a user"),
];

const AUTHOR: Populate = Populate::Reference {
    path: "user",
    collection: user::COLLECTION,
    select: &["name", "photo"],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Reviews;

#[rocket::async_trait]
impl Resource for Reviews {
    const COLLECTION: &'static str = COLLECTION;
    const LABEL: &'static str = "review";

    fn schema() -> &'static Schema {
        SCHEMA
    }

    fn unique_keys() -> &'static [UniqueKey] {
        &[UniqueKey {
            fields: &["tour", "user"],
        }]
    }

    fn populate() -> &'static [Populate] {
        &[AUTHOR]
    }

    async fn after_write(
        &self,
        store: &dyn DocumentStore,
        document: &Document,
        previous: Option<&Document>,
    ) -> ApiResult<()> {
        let current = document.get("tour").and_then(Value::as_i64);
        let moved_from = previous
            .and_then(|previous| previous.get("tour"))
            .and_then(Value::as_i64)
            .filter(|tour_id| Some(*tour_id) != current);

        for tour_id in current.into_iter().chain(moved_from) {
            recalculate_tour_ratings(store, tour_id).await?;
        }
        Ok(())
    }
}

/// Store the review count and mean rating of a tour on the tour itself.
pub async fn recalculate_tour_ratings(store: &dyn DocumentStore, tour_id: DocumentId) -> StoreResult<()> {
    let reviews = store
        .find(&QuerySpec::find(COLLECTION, vec![Predicate::eq("tour", tour_id)]))
        .await?;
    let ratings: Vec<f64> = reviews
        .iter()
        .filter_map(|review| number(review, "rating"))
        .collect();

    let (quantity, average) = if ratings.is_empty() {
        (0, DEFAULT_RATING)
    } else {
        let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;
        (ratings.len(), round_rating(mean))
    };

    log::debug!("tour {tour_id} now has {quantity} ratings averaging {average}");
    store
        .update_by_id(
            tour::COLLECTION,
            tour_id,
            &Vec::new(),
            object([
                ("ratingsQuantity", Value::from(quantity)),
                ("ratingsAverage", Value::from(average)),
            ]),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn aggregates_ratings_onto_the_tour() {
        let store = MemoryStore::new();
        let tour = store
            .insert(tour::COLLECTION, doc(json!({ "name": "The Park Camper" })))
            .await
            .unwrap();
        let tour_id = tour["id"].as_i64().unwrap();
        for rating in [5, 4, 4] {
            store
                .insert(COLLECTION, doc(json!({ "rating": rating, "tour": tour_id })))
                .await
                .unwrap();
        }

        recalculate_tour_ratings(&store, tour_id).await.unwrap();
        let updated = store.find_by_id(tour::COLLECTION, tour_id, &Vec::new()).await.unwrap().unwrap();
        assert_eq!(updated["ratingsQuantity"], json!(3));
        assert_eq!(updated["ratingsAverage"], json!(4.3));
    }

    #[tokio::test]
    async fn resets_to_defaults_without_reviews() {
        let store = MemoryStore::new();
        let tour = store
            .insert(
                tour::COLLECTION,
                doc(json!({ "name": "The Park Camper", "ratingsQuantity": 8, "ratingsAverage": 3.1 })),
            )
            .await
            .unwrap();
        let tour_id = tour["id"].as_i64().unwrap();

        recalculate_tour_ratings(&store, tour_id).await.unwrap();
        let updated = store.find_by_id(tour::COLLECTION, tour_id, &Vec::new()).await.unwrap().unwrap();
        assert_eq!(updated["ratingsQuantity"], json!(0));
        assert_eq!(updated["ratingsAverage"], json!(4.5));
    }
}
