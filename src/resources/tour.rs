use serde_json::Value;

use crate::error::ApiResult;
use crate::query::{Document, Filter, Predicate};
use crate::resources::schema::{DefaultValue, FieldKind, FieldSpec, Schema};
use crate::resources::{FieldIssue, Populate, Resource, UniqueKey, number, review, user};

pub const COLLECTION: &str = "tours";

pub const DIFFICULTIES: &[&str] = &["easy", "medium", "difficult"];

const SCHEMA: &Schema = &[
    FieldSpec::new("name", FieldKind::Text)
        .required("A tour must have a name")
        .trim()
        .max_length(40, "The name of a tour must have 40 or less characters.")
        .min_length(10, "The name of a tour must have 10 or more characters."),
    FieldSpec::new("slug", FieldKind::Text),
    FieldSpec::new("duration", FieldKind::Number).required("A tour must have a duration"),
    FieldSpec::new("maxGroupSize", FieldKind::Number).required("A tour must have a group size"),
    FieldSpec::new("difficulty", FieldKind::Text)
        .required("A tour must have a difficulty")
        .one_of(DIFFICULTIES, "Difficulty is either: easy, medium or difficult"),
    FieldSpec::new("ratingsAverage", FieldKind::Number)
        .default(DefaultValue::Number(4.5))
        .min(1.0, "Rating must be above 1.0")
        .max(5.0, "Rating must be below 5.0"),
    FieldSpec::new("ratingsQuantity", FieldKind::Number).default(DefaultValue::Integer(0)),
    FieldSpec::new("price", FieldKind::Number).required("A tour must have a price"),
    FieldSpec::new("priceDiscount", FieldKind::Number),
    FieldSpec::new("summary", FieldKind::Text)
        .trim()
        .required("A tour must have a summary"),
    FieldSpec::new("description", FieldKind::Text).trim(),
    FieldSpec::new("imageCover", FieldKind::Text).required("A tour must have a cover image"),
    FieldSpec::new("images", FieldKind::TextList),
    FieldSpec::new("createdAt", FieldKind::Date).default(DefaultValue::Now),
    FieldSpec::new("startDates", FieldKind::DateList),
    FieldSpec::new("secretTour", FieldKind::Boolean).default(DefaultValue::Boolean(false)),
    FieldSpec::new("startLocation", FieldKind::Location),
    FieldSpec::new("locations", FieldKind::LocationList),
    FieldSpec::new("guides", FieldKind::ReferenceList),
];

const GUIDES: Populate = Populate::Reference {
    path: "guides",
    collection: user::COLLECTION,
    select: &["name", "photo", "role"],
};

/// Reviews of a tour, attached when a single tour is read.
pub const REVIEWS: Populate = Populate::Virtual {
    path: "reviews",
    collection: review::COLLECTION,
    foreign_field: "tour",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Tours;

#[rocket::async_trait]
impl Resource for Tours {
    const COLLECTION: &'static str = COLLECTION;
    const LABEL: &'static str = "tour";

    fn schema() -> &'static Schema {
        SCHEMA
    }

    fn scope() -> Filter {
        vec![Predicate::ne("secretTour", true)]
    }

    fn hidden_fields() -> &'static [&'static str] {
        &["createdAt"]
    }

    fn unique_keys() -> &'static [UniqueKey] {
        &[UniqueKey { fields: &["name"] }]
    }

    fn populate() -> &'static [Populate] {
        &[GUIDES]
    }

    fn validate_document(&self, document: &Document) -> Vec<FieldIssue> {
        match (number(document, "priceDiscount"), number(document, "price")) {
            (Some(discount), Some(price)) if discount >= price => vec![FieldIssue::new(
                "priceDiscount",
                "Discount price should be below the regular price",
            )],
            _ => Vec::new(),
        }
    }

    async fn before_insert(&self, document: &mut Document) -> ApiResult<()> {
        if let Some(name) = document.get("name").and_then(Value::as_str) {
            let slug = slugify(name);
            document.insert("slug".to_string(), Value::String(slug));
        }
        round_rating_field(document);
        Ok(())
    }

    fn before_update(&self, changes: &mut Document) -> ApiResult<()> {
        round_rating_field(changes);
        Ok(())
    }

    fn decorate(&self, document: &mut Document) {
        if let Some(duration) = document.get("duration").and_then(Value::as_i64) {
            document.insert(
                "durationWeeks".to_string(),
                Value::String(format!(
                    "Week(s): {}, Days: {}",
                    duration.div_euclid(7),
                    duration.rem_euclid(7)
                )),
            );
        }
    }
}

/// Lowercase, alphanumeric words joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Ratings are kept to one decimal place.
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round_rating_field(document: &mut Document) {
    if let Some(rating) = number(document, "ratingsAverage") {
        document.insert("ratingsAverage".to_string(), Value::from(round_rating(rating)));
    }
}
