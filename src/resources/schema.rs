//! Declarative field rules for resource documents.
//!
//! A schema is a static slice of [`FieldSpec`]s. Writes go through [`sanitize`] (drop
//! unknown keys, normalize values), [`apply_defaults`] on create, and [`validate`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ApiError, ApiResult};
use crate::query::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Date,
    /// Identifier of a document in another collection.
    Reference,
    TextList,
    DateList,
    ReferenceList,
    /// GeoJSON point with optional address, description and day.
    Location,
    LocationList,
}

impl FieldKind {
    fn label(self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::TextList => "String",
            FieldKind::Number => "Number",
            FieldKind::Boolean => "Boolean",
            FieldKind::Date | FieldKind::DateList => "Date",
            FieldKind::Reference | FieldKind::ReferenceList => "Reference",
            FieldKind::Location | FieldKind::LocationList => "Location",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Text(&'static str),
    Now,
}

impl DefaultValue {
    fn to_value(self) -> Value {
        match self {
            DefaultValue::Integer(value) => Value::from(value),
            DefaultValue::Number(value) => Value::from(value),
            DefaultValue::Boolean(value) => Value::Bool(value),
            DefaultValue::Text(value) => Value::String(value.to_string()),
            DefaultValue::Now => Value::String(format_date(Utc::now())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: Option<&'static str>,
    pub trim: bool,
    pub lowercase: bool,
    pub min_length: Option<(usize, &'static str)>,
    pub max_length: Option<(usize, &'static str)>,
    pub min: Option<(f64, &'static str)>,
    pub max: Option<(f64, &'static str)>,
    pub one_of: Option<(&'static [&'static str], &'static str)>,
    pub default: Option<DefaultValue>,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: None,
            trim: false,
            lowercase: false,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            one_of: None,
            default: None,
        }
    }

    pub const fn required(mut self, message: &'static str) -> Self {
        self.required = Some(message);
        self
    }

    pub const fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub const fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub const fn min_length(mut self, length: usize, message: &'static str) -> Self {
        self.min_length = Some((length, message));
        self
    }

    pub const fn max_length(mut self, length: usize, message: &'static str) -> Self {
        self.max_length = Some((length, message));
        self
    }

    pub const fn min(mut self, value: f64, message: &'static str) -> Self {
        self.min = Some((value, message));
        self
    }

    pub const fn max(mut self, value: f64, message: &'static str) -> Self {
        self.max = Some((value, message));
        self
    }

    pub const fn one_of(mut self, values: &'static [&'static str], message: &'static str) -> Self {
        self.one_of = Some((values, message));
        self
    }

    pub const fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    fn normalize(&self, value: Value) -> Value {
        match self.kind {
            FieldKind::Text => self.normalize_text(value),
            FieldKind::Number => normalize_number(value),
            FieldKind::Boolean => normalize_boolean(value),
            FieldKind::Date => normalize_date(value),
            FieldKind::Reference => normalize_reference(value),
            FieldKind::TextList => map_list(value, |item| self.normalize_text(item)),
            FieldKind::DateList => map_list(value, normalize_date),
            FieldKind::ReferenceList => map_list(value, normalize_reference),
            FieldKind::Location => normalize_location(value),
            FieldKind::LocationList => map_list(value, normalize_location),
        }
    }

    fn normalize_text(&self, value: Value) -> Value {
        match value {
            Value::String(text) => {
                let text = if self.trim { text.trim().to_string() } else { text };
                let text = if self.lowercase { text.to_lowercase() } else { text };
                Value::String(text)
            }
            other => other,
        }
    }

    fn check(&self, value: &Value, issues: &mut Vec<FieldIssue>) {
        match self.kind {
            FieldKind::Text => self.check_text(value, issues),
            FieldKind::Number => match value.as_f64() {
                Some(number) => self.check_range(number, issues),
                None => issues.push(self.cast_issue(value)),
            },
            FieldKind::Boolean if !value.is_boolean() => issues.push(self.cast_issue(value)),
            FieldKind::Date if !is_date(value) => issues.push(self.cast_issue(value)),
            FieldKind::Reference if value.as_i64().is_none() => {
                issues.push(self.cast_issue(value))
            }
            FieldKind::Location => check_location(self.name, value, issues),
            FieldKind::TextList | FieldKind::DateList | FieldKind::ReferenceList
            | FieldKind::LocationList => {
                let Some(items) = value.as_array() else {
                    issues.push(self.cast_issue(value));
                    return;
                };
                for item in items {
                    let valid = match self.kind {
                        FieldKind::TextList => item.is_string(),
                        FieldKind::DateList => is_date(item),
                        FieldKind::ReferenceList => item.as_i64().is_some(),
                        _ => true,
                    };
                    if !valid {
                        issues.push(self.cast_issue(item));
                    } else if self.kind == FieldKind::LocationList {
                        check_location(self.name, item, issues);
                    }
                }
            }
            _ => {}
        }
    }

    fn check_text(&self, value: &Value, issues: &mut Vec<FieldIssue>) {
        let Some(text) = value.as_str() else {
            issues.push(self.cast_issue(value));
            return;
        };
        if text.is_empty() {
            if let Some(message) = self.required {
                issues.push(FieldIssue::new(self.name, message));
            }
            return;
        }
        let length = text.chars().count();
        if let Some((min, message)) = self.min_length {
            if length < min {
                issues.push(FieldIssue::new(self.name, message));
            }
        }
        if let Some((max, message)) = self.max_length {
            if length > max {
                issues.push(FieldIssue::new(self.name, message));
            }
        }
        if let Some((allowed, message)) = self.one_of {
            if !allowed.contains(&text) {
                issues.push(FieldIssue::new(self.name, message));
            }
        }
    }

    fn check_range(&self, number: f64, issues: &mut Vec<FieldIssue>) {
        if let Some((min, message)) = self.min {
            if number < min {
                issues.push(FieldIssue::new(self.name, message));
            }
        }
        if let Some((max, message)) = self.max {
            if number > max {
                issues.push(FieldIssue::new(self.name, message));
            }
        }
    }

    fn cast_issue(&self, value: &Value) -> FieldIssue {
        FieldIssue::new(
            self.name,
            format!("Cast to {} failed for value {}", self.kind.label(), value),
        )
    }
}

/// One failed constraint on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub type Schema = [FieldSpec];

/// Keep only schema fields, normalizing each value. Rejects non-object bodies.
pub fn sanitize(schema: &Schema, body: Value) -> ApiResult<Document> {
    let Value::Object(body) = body else {
        return Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };

    let mut document = Document::new();
    for (key, value) in body {
        if let Some(spec) = schema.iter().find(|spec| spec.name == key) {
            let value = spec.normalize(value);
            document.insert(key, value);
        }
    }
    Ok(document)
}

pub fn apply_defaults(schema: &Schema, document: &mut Document) {
    for spec in schema {
        if let Some(default) = spec.default {
            if document.get(spec.name).is_none_or(Value::is_null) {
                document.insert(spec.name.to_string(), default.to_value());
            }
        }
    }
}

/// Check every field, or only those present in `changed` when given.
pub fn validate(schema: &Schema, document: &Document, changed: Option<&Document>) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    for spec in schema {
        if changed.is_some_and(|changes| !changes.contains_key(spec.name)) {
            continue;
        }
        match document.get(spec.name) {
            None | Some(Value::Null) => {
                if let Some(message) = spec.required {
                    issues.push(FieldIssue::new(spec.name, message));
                }
            }
            Some(value) => spec.check(value, &mut issues),
        }
    }
    issues
}

pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d,%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight))
}

/// Canonical stored form, e.g. `2021-04-25T09:00:00.000Z`.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_date(value: &Value) -> bool {
    value.as_str().and_then(parse_date).is_some()
}

fn normalize_number(value: Value) -> Value {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                Value::from(int)
            } else if let Some(number) = trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                Value::Number(number)
            } else {
                Value::String(text)
            }
        }
        other => other,
    }
}

fn normalize_boolean(value: Value) -> Value {
    match value {
        Value::String(text) if text == "true" => Value::Bool(true),
        Value::String(text) if text == "false" => Value::Bool(false),
        other => other,
    }
}

fn normalize_date(value: Value) -> Value {
    match &value {
        Value::String(text) => parse_date(text)
            .map(|date| Value::String(format_date(date)))
            .unwrap_or(value),
        Value::Number(millis) => millis
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|date| Value::String(format_date(date)))
            .unwrap_or(value),
        _ => value,
    }
}

fn normalize_reference(value: Value) -> Value {
    match value {
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(text)),
        other => other,
    }
}

fn normalize_location(value: Value) -> Value {
    match value {
        Value::Object(mut location) => {
            location
                .entry("type")
                .or_insert_with(|| Value::String("Point".to_string()));
            if let Some(coordinates) = location.remove("coordinates") {
                location.insert(
                    "coordinates".to_string(),
                    map_list(coordinates, normalize_number),
                );
            }
            Value::Object(location)
        }
        other => other,
    }
}

fn map_list(value: Value, normalize: impl Fn(Value) -> Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn check_location(field: &str, value: &Value, issues: &mut Vec<FieldIssue>) {
    let Some(location) = value.as_object() else {
        issues.push(FieldIssue::new(
            field,
            format!("Cast to Location failed for value {value}"),
        ));
        return;
    };
    if location.get("type").and_then(Value::as_str) != Some("Point") {
        issues.push(FieldIssue::new(field, "Location type must be Point"));
    }
    if let Some(coordinates) = location.get("coordinates") {
        if !valid_coordinates(coordinates) {
            issues.push(FieldIssue::new(
                field,
                "Coordinates must be [longitude, latitude]",
            ));
        }
    }
    if let Some(day) = location.get("day") {
        if !day.is_number() {
            issues.push(FieldIssue::new(field, format!("Cast to Number failed for value {day}")));
        }
    }
}

fn valid_coordinates(value: &Value) -> bool {
    match value.as_array().map(Vec::as_slice) {
        Some([lng, lat]) => matches!(
            (lng.as_f64(), lat.as_f64()),
            (Some(lng), Some(lat)) if (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
        ),
        _ => false,
    }
}

/// `[lng, lat]` of a GeoJSON point.
pub fn point_coordinates(location: &Value) -> Option<(f64, f64)> {
    let coordinates = location.get("coordinates")?.as_array()?;
    match coordinates.as_slice() {
        [lng, lat] => Some((lng.as_f64()?, lat.as_f64()?)),
        _ => None,
    }
}

pub(crate) fn object(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Document {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect::<Map<String, Value>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &Schema = &[
        FieldSpec::new("name", FieldKind::Text)
            .required("A thing must have a name")
            .trim()
            .min_length(3, "Name too short"),
        FieldSpec::new("email", FieldKind::Text).trim().lowercase(),
        FieldSpec::new("price", FieldKind::Number)
            .required("A thing must have a price")
            .min(1.0, "Price must be positive"),
        FieldSpec::new("level", FieldKind::Text).one_of(&["easy", "hard"], "Level is easy or hard"),
        FieldSpec::new("paid", FieldKind::Boolean).default(DefaultValue::Boolean(true)),
        FieldSpec::new("startDates", FieldKind::DateList),
        FieldSpec::new("owner", FieldKind::Reference),
    ];

    #[test]
    fn sanitize_drops_unknown_fields_and_normalizes() {
        let document = sanitize(
            SCHEMA,
            json!({
                "name": "  Sea Explorer ",
                "email": " Ann@Example.COM ",
                "price": "497",
                "owner": "12",
                "startDates": ["2021-04-25,10:00"],
                "id": 5,
                "__v": 2,
                "isAdmin": true
            }),
        )
        .unwrap();

        assert_eq!(document["name"], json!("Sea Explorer"));
        assert_eq!(document["email"], json!("ann@example.com"));
        assert_eq!(document["price"], json!(497));
        assert_eq!(document["owner"], json!(12));
        assert_eq!(document["startDates"], json!(["2021-04-25T10:00:00.000Z"]));
        assert!(!document.contains_key("id"));
        assert!(!document.contains_key("__v"));
        assert!(!document.contains_key("isAdmin"));
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert!(matches!(sanitize(SCHEMA, json!([1, 2])), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn defaults_fill_missing_fields_only() {
        let mut document = sanitize(SCHEMA, json!({ "name": "abc", "price": 3 })).unwrap();
        apply_defaults(SCHEMA, &mut document);
        assert_eq!(document["paid"], json!(true));

        let mut document = sanitize(SCHEMA, json!({ "paid": false })).unwrap();
        apply_defaults(SCHEMA, &mut document);
        assert_eq!(document["paid"], json!(false));
    }

    #[test]
    fn reports_each_failed_constraint() {
        let document = sanitize(
            SCHEMA,
            json!({ "name": "ab", "price": "cheap", "level": "medium", "owner": "x" }),
        )
        .unwrap();
        let issues = validate(SCHEMA, &document, None);
        let fields: Vec<&str> = issues.iter().map(|issue| issue.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "price", "level", "owner"]);
        assert_eq!(issues[0].message, "Name too short");
        assert_eq!(issues[1].message, "Cast to Number failed for value \"cheap\"");
    }

    #[test]
    fn missing_required_fields_are_named() {
        let issues = validate(SCHEMA, &Document::new(), None);
        assert_eq!(
            issues,
            vec![
                FieldIssue::new("name", "A thing must have a name"),
                FieldIssue::new("price", "A thing must have a price"),
            ]
        );
    }

    #[test]
    fn partial_validation_only_checks_changed_fields() {
        let merged = object([("price", json!(0)), ("level", json!("unknown"))]);
        let changes = object([("price", json!(0))]);
        let issues = validate(SCHEMA, &merged, Some(&changes));
        assert_eq!(issues, vec![FieldIssue::new("price", "Price must be positive")]);
    }

    #[test]
    fn parses_supported_date_formats() {
        let expected = "2021-06-19T09:00:00.000Z";
        for raw in ["2021-06-19T09:00:00Z", "2021-06-19T09:00:00.000", "2021-06-19,09:00"] {
            assert_eq!(parse_date(raw).map(format_date).as_deref(), Some(expected), "{raw}");
        }
        assert!(parse_date("next tuesday").is_none());
    }
}
