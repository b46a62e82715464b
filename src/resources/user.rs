use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

use crate::auth::PasswordService;
use crate::error::{ApiError, ApiResult};
use crate::query::{Document, Filter, Predicate};
use crate::resources::schema::{DefaultValue, FieldKind, FieldSpec, Schema};
use crate::resources::{FieldIssue, Resource, UniqueKey};

pub const COLLECTION: &str = "users";

pub const PASSWORD_UPDATE_REJECTED: &str =
    "This route is not for password updates. Please use /update-password.";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

const SCHEMA: &Schema = &[
    FieldSpec::new("name", FieldKind::Text)
        .required("A user must have a name")
        .trim()
        .max_length(40, "The name of a user must have 40 or less characters.")
        .min_length(3, "The name of a user must have 3 or more characters."),
    FieldSpec::new("email", FieldKind::Text)
        .required("A user must have a email")
        .trim()
        .lowercase(),
    FieldSpec::new("password", FieldKind::Text)
        .required("A user must have a password")
        .trim()
        .max_length(15, "The password of a user must have 15 or less characters.")
        .min_length(8, "The password of a user must have 8 or more characters."),
    FieldSpec::new("passwordConfirm", FieldKind::Text).required("Password confirmation needed"),
    FieldSpec::new("photo", FieldKind::Text).default(DefaultValue::Text("default.jpg")),
    FieldSpec::new("role", FieldKind::Text)
        .default(DefaultValue::Text("user"))
        .one_of(
            &["user", "guide", "lead-guide", "admin"],
            "Role is either: user, guide, lead-guide or admin",
        ),
    FieldSpec::new("active", FieldKind::Boolean).default(DefaultValue::Boolean(true)),
    FieldSpec::new("passwordChangedAt", FieldKind::Date),
];

/// Field-level rules for a password chosen outside the generic create path.
pub(crate) fn password_rules() -> &'static Schema {
    &SCHEMA[2..4]
}

pub struct Users {
    passwords: Arc<PasswordService>,
}

impl Users {
    pub fn new(passwords: Arc<PasswordService>) -> Self {
        Self { passwords }
    }
}

#[rocket::async_trait]
impl Resource for Users {
    const COLLECTION: &'static str = COLLECTION;
    const LABEL: &'static str = "user";

    fn schema() -> &'static Schema {
        SCHEMA
    }

    fn scope() -> Filter {
        vec![Predicate::ne("active", false)]
    }

    fn hidden_fields() -> &'static [&'static str] {
        &["password", "passwordConfirm", "active", "passwordChangedAt"]
    }

    fn unique_keys() -> &'static [UniqueKey] {
        &[UniqueKey { fields: &["email"] }]
    }

    fn validate_document(&self, document: &Document) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if let Some(email) = document.get("email").and_then(Value::as_str) {
            if !EMAIL.is_match(email) {
                issues.push(FieldIssue::new("email", "Invalid email."));
            }
        }
        issues.extend(confirmation_issue(document));
        issues
    }

    async fn before_insert(&self, document: &mut Document) -> ApiResult<()> {
        document.remove("passwordConfirm");
        if let Some(password) = document.get("password").and_then(Value::as_str) {
            let hash = self.passwords.hash_password(password)?;
            document.insert("password".to_string(), Value::String(hash));
        }
        Ok(())
    }

    fn before_update(&self, changes: &mut Document) -> ApiResult<()> {
        if changes.contains_key("password") || changes.contains_key("passwordConfirm") {
            return Err(ApiError::BadRequest(PASSWORD_UPDATE_REJECTED.to_string()));
        }
        Ok(())
    }
}

pub(crate) fn confirmation_issue(document: &Document) -> Option<FieldIssue> {
    let password = document.get("password").and_then(Value::as_str)?;
    let confirm = document.get("passwordConfirm").and_then(Value::as_str)?;
    (password != confirm).then(|| FieldIssue::new("passwordConfirm", "Invalid password."))
}
