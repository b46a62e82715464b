//! Translates a [`ParameterMap`] into a bounded [`QuerySpec`].
//!
//! The four steps must run in the order filter, sort, field selection, paginate:
//! pagination acts on the filtered and sorted set, and field selection must not drop
//! a field an earlier sort still refers to. [`QueryBuilder::shape`] applies them in that
//! order; the individual steps stay public for callers that only need some of them.
//!
//! Nothing here performs I/O or fails. Unknown filter keys become literal equality
//! predicates that simply match nothing, and malformed pagination input falls back
//! to the configured defaults.

use crate::config::QueryConfig;
use crate::query::params::ParameterMap;
use crate::query::spec::{
    Comparison, FieldPath, FilterValue, Pagination, Predicate, Projection, QuerySpec, SortKey,
};

pub struct QueryBuilder<'a> {
    query: QuerySpec,
    params: &'a ParameterMap,
    config: &'a QueryConfig,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(query: QuerySpec, params: &'a ParameterMap, config: &'a QueryConfig) -> Self {
        Self {
            query,
            params,
            config,
        }
    }

    /// Run all four transformations in order and return the finished query.
    pub fn shape(query: QuerySpec, params: &'a ParameterMap, config: &'a QueryConfig) -> QuerySpec {
        Self::new(query, params, config)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .build()
    }

    /// Turn every non-reserved parameter into a predicate. A repeated key keeps its
    /// last value unless it is configured as repeatable, in which case any of the
    /// values may match.
    pub fn filter(mut self) -> Self {
        let config = self.config;
        let predicates = self.params.filter_entries().filter_map(|(key, values)| {
            if values.len() > 1 && config.repeatable_keys.iter().any(|allowed| allowed == key) {
                let field = FieldPath::parse(key)?;
                Predicate::any_of(field, values.iter().map(|value| FilterValue::coerce(value.as_str())))
            } else {
                parse_predicate(key, values.last()?)
            }
        });
        self.query.filter.extend(predicates);
        self
    }

    pub fn sort(mut self) -> Self {
        let keys: Vec<SortKey> = self
            .params
            .get("sort")
            .map(|raw| raw.split(',').filter_map(SortKey::parse).collect())
            .unwrap_or_default();

        self.query.sort = if keys.is_empty() {
            vec![SortKey::newest_first()]
        } else {
            keys
        };
        self
    }

    pub fn limit_fields(mut self) -> Self {
        let version_field = FieldPath::from(self.config.version_field.as_str());
        let requested: Vec<&str> = self
            .params
            .get("fields")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        self.query.projection = if requested.is_empty() {
            Projection::Exclude(vec![version_field])
        } else if requested.iter().all(|name| name.starts_with('-')) {
            let mut excluded: Vec<FieldPath> = requested
                .iter()
                .copied()
                .filter_map(|name| FieldPath::parse(name.trim_start_matches('-')))
                .collect();
            if !excluded.contains(&version_field) {
                excluded.push(version_field);
            }
            Projection::Exclude(excluded)
        } else {
            // Mixed lists keep only the inclusions.
            Projection::Include(
                requested
                    .iter()
                    .copied()
                    .filter(|name| !name.starts_with('-'))
                    .filter_map(|name| FieldPath::parse(name.trim_start_matches('+')))
                    .collect(),
            )
        };
        self
    }

    pub fn paginate(mut self) -> Self {
        let page = positive_param(self.params.get("page")).unwrap_or(1);
        let mut limit = positive_param(self.params.get("limit")).unwrap_or(self.config.default_limit);
        if let Some(max) = self.config.max_limit {
            limit = limit.min(max);
        }
        let skip = (page - 1).saturating_mul(limit);

        self.query.pagination = Some(Pagination { skip, limit });
        self
    }

    pub fn build(self) -> QuerySpec {
        self.query
    }
}

/// `price[gte]` becomes a comparison; anything else is a literal equality on the key.
fn parse_predicate(key: &str, value: &str) -> Option<Predicate> {
    let (field, op) = match split_operator(key) {
        Some((field, op)) => (field, op),
        None => (key, Comparison::Eq),
    };

    FieldPath::parse(field).map(|field| Predicate {
        field,
        op,
        value: FilterValue::coerce(value),
        alternatives: Vec::new(),
    })
}

fn split_operator(key: &str) -> Option<(&str, Comparison)> {
    let inner = key.strip_suffix(']')?;
    let open = inner.rfind('[')?;
    let field = &inner[..open];
    let op = Comparison::from_token(&inner[open + 1..])?;
    if field.is_empty() {
        return None;
    }
    Some((field, op))
}

fn positive_param(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}
