//! Generic list-query pipeline: raw parameters in, a bounded [`QuerySpec`] out.

pub mod builder;
pub mod eval;
pub mod params;
pub mod spec;

pub use builder::QueryBuilder;
pub use eval::Document;
pub use params::ParameterMap;
pub use spec::{
    Comparison, FieldPath, Filter, FilterValue, ID_FIELD, Pagination, Predicate, Projection,
    QuerySpec, SortDirection, SortKey,
};
