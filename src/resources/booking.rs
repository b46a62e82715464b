use crate::resources::schema::{DefaultValue, FieldKind, FieldSpec, Schema};
use crate::resources::{Populate, Resource, tour, user};

pub const COLLECTION: &str = "bookings";

const SCHEMA: &Schema = &[
    FieldSpec::new("tour", FieldKind::Reference).required("Booking must belong to a Tour"),
    FieldSpec::new("user", FieldKind::Reference).required("Booking must belong to a User"),
    FieldSpec::new("price", FieldKind::Number).required("Booking must have a price"),
    FieldSpec::new("createdAt", FieldKind::Date).default(DefaultValue::Now),
    FieldSpec::new("paid", FieldKind::Boolean).default(DefaultValue::Boolean(true)),
];

const POPULATE: &[Populate] = &[
    Populate::Reference {
        path: "user",
        collection: user::COLLECTION,
        select: &[],
    },
    Populate::Reference {
        path: "tour",
        collection: tour::COLLECTION,
        select: &["name"],
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Bookings;

#[rocket::async_trait]
impl Resource for Bookings {
    const COLLECTION: &'static str = COLLECTION;
    const LABEL: &'static str = "booking";

    fn schema() -> &'static Schema {
        SCHEMA
    }

    fn populate() -> &'static [Populate] {
        POPULATE
    }
}
