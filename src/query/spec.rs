//! The in-progress description of a collection query.

use serde_json::Value;
use std::fmt;

/// Name of the store-assigned identifier field.
pub const ID_FIELD: &str = "id";

/// Dotted path addressing a (possibly nested) document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse `a.b.c`; returns `None` for empty input or empty segments.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let segments: Vec<String> = trimmed.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        Some(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Top-level field name.
    pub fn root(&self) -> &str {
        &self.0[0]
    }

    pub fn is_id(&self) -> bool {
        self.0.len() == 1 && self.0[0] == ID_FIELD
    }
}

impl From<&str> for FieldPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| Self(vec![raw.to_string()]))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Comparison applied by a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// Operator suffixes a client may put in a filter key (`price[gte]`).
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gte" => Some(Comparison::Gte),
            "gt" => Some(Comparison::Gt),
            "lte" => Some(Comparison::Lte),
            "lt" => Some(Comparison::Lt),
            _ => None,
        }
    }

    pub fn sql_operator(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }

    pub fn accepts(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Comparison::Eq => ordering == Equal,
            Comparison::Ne => ordering != Equal,
            Comparison::Gt => ordering == Greater,
            Comparison::Gte => ordering != Less,
            Comparison::Lt => ordering == Less,
            Comparison::Lte => ordering != Greater,
        }
    }
}

/// Predicate operand: the raw client string plus its scalar interpretation.
///
/// The store compares against whichever form matches the stored field's type, the
/// way a schema-aware driver would cast a query value.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterValue {
    raw: String,
    typed: Value,
}

impl FilterValue {
    pub fn coerce(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        let typed = if let Ok(int) = trimmed.parse::<i64>() {
            Value::from(int)
        } else if let Some(number) = trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .and_then(serde_json::Number::from_f64)
        {
            Value::Number(number)
        } else if trimmed == "true" {
            Value::Bool(true)
        } else if trimmed == "false" {
            Value::Bool(false)
        } else {
            Value::String(raw.clone())
        };
        Self { raw, typed }
    }

    /// Operand taken from an already-typed JSON value (route pre-filters, scopes).
    pub fn from_json(value: Value) -> Self {
        let raw = match &value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Self { raw, typed: value }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn typed(&self) -> &Value {
        &self.typed
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.typed.as_f64()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.typed.as_i64()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.typed.as_bool()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: FieldPath,
    pub op: Comparison,
    pub value: FilterValue,
    /// Further operands for an equality; the predicate holds when any operand matches.
    pub alternatives: Vec<FilterValue>,
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: FieldPath::from(field),
            op: Comparison::Eq,
            value: FilterValue::from_json(value.into()),
            alternatives: Vec::new(),
        }
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: FieldPath::from(field),
            op: Comparison::Ne,
            value: FilterValue::from_json(value.into()),
            alternatives: Vec::new(),
        }
    }

    /// Equality with any of `values`; `None` when there is nothing to match.
    pub fn any_of(field: FieldPath, values: impl IntoIterator<Item = FilterValue>) -> Option<Self> {
        let mut values = values.into_iter();
        let value = values.next()?;
        Some(Self {
            field,
            op: Comparison::Eq,
            value,
            alternatives: values.collect(),
        })
    }

    /// The first operand followed by any alternatives.
    pub fn operands(&self) -> impl Iterator<Item = &FilterValue> {
        std::iter::once(&self.value).chain(&self.alternatives)
    }

    pub fn compare(field: &str, op: Comparison, value: impl Into<Value>) -> Self {
        Self {
            field: FieldPath::from(field),
            op,
            value: FilterValue::from_json(value.into()),
            alternatives: Vec::new(),
        }
    }
}

/// Conjunction of predicates.
pub type Filter = Vec<Predicate>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: FieldPath,
    pub direction: SortDirection,
}

impl SortKey {
    /// Parse `price` or `-price`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (direction, name) = match raw.strip_prefix('-') {
            Some(rest) => (SortDirection::Descending, rest),
            None => (SortDirection::Ascending, raw.strip_prefix('+').unwrap_or(raw)),
        };
        FieldPath::parse(name).map(|field| Self { field, direction })
    }

    /// Newest first: identifiers grow with insertion order.
    pub fn newest_first() -> Self {
        Self {
            field: FieldPath::from(ID_FIELD),
            direction: SortDirection::Descending,
        }
    }
}

/// Which fields survive into the result documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Every field except these.
    Exclude(Vec<FieldPath>),
    /// Exactly these fields plus the identifier.
    Include(Vec<FieldPath>),
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Exclude(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub skip: u64,
    pub limit: u64,
}

/// A query against one collection, built up step by step before execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub collection: String,
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub pagination: Option<Pagination>,
}

impl QuerySpec {
    /// Unsorted, unpaginated query over `collection` restricted by `filter`.
    pub fn find(collection: impl Into<String>, filter: Filter) -> Self {
        Self {
            collection: collection.into(),
            filter,
            sort: Vec::new(),
            projection: Projection::default(),
            pagination: None,
        }
    }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_scalar_operands() {
        assert_eq!(FilterValue::coerce("100").typed(), &Value::from(100));
        assert_eq!(FilterValue::coerce("4.5").as_f64(), Some(4.5));
        assert_eq!(FilterValue::coerce("true").as_bool(), Some(true));
        assert_eq!(
            FilterValue::coerce("easy").typed(),
            &Value::String("easy".into())
        );
        assert_eq!(FilterValue::coerce("NaN").typed(), &Value::String("NaN".into()));
    }

    #[test]
    fn parses_sort_keys_and_paths() {
        let key = SortKey::parse("-ratingsAverage").unwrap();
        assert_eq!(key.direction, SortDirection::Descending);
        assert_eq!(key.field.to_string(), "ratingsAverage");

        assert!(SortKey::parse("-").is_none());
        assert!(FieldPath::parse("startLocation..address").is_none());
        assert_eq!(
            FieldPath::parse("startLocation.address").unwrap().segments(),
            ["startLocation", "address"]
        );
    }
}
