//! Raw query-string parameters captured from a request.
//!
//! [`ParameterMap`] is the untyped input to the [`QueryBuilder`](super::QueryBuilder).
//! Every occurrence of a repeated key is kept. [`ParameterMap::get`] answers with the
//! last one, so duplicates collapse unless the builder is configured to accept
//! several values for that key.

use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::request::OpenApiFromRequest;
use std::collections::BTreeMap;
use std::convert::Infallible;

/// Keys that steer the list pipeline rather than filter documents.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Decoded query-string key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, OpenApiFromRequest)]
pub struct ParameterMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(key, value)` pairs, keeping repeated keys in order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs {
            entries.entry(key.into()).or_default().push(value.into());
        }
        Self { entries }
    }

    /// The last value sent for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    /// Every value sent for `key`, in request order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Replace whatever was sent for `key` with a single value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), vec![value.into()]);
    }

    /// Entries that are not pipeline controls, i.e. candidate filter predicates.
    pub fn filter_entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .filter(|(key, values)| !RESERVED_KEYS.contains(&key.as_str()) && !values.is_empty())
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ParameterMap {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let params = request
            .uri()
            .query()
            .map(|query| ParameterMap::from_pairs(query.segments()))
            .unwrap_or_default();
        Outcome::Success(params)
    }
}
