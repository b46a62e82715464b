use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::Document;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Role::User),
            "guide" => Some(Role::Guide),
            "lead-guide" => Some(Role::LeadGuide),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

/// Fields are optional so that omissions surface as validation messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

impl SignupRequest {
    /// The account document handed to the users resource. A requested role
    /// is never accepted here.
    pub fn into_document(self) -> Value {
        let mut body = Map::new();
        for (key, value) in [
            ("name", self.name),
            ("email", self.email),
            ("password", self.password),
            ("passwordConfirm", self.password_confirm),
        ] {
            if let Some(value) = value {
                body.insert(key.to_string(), Value::String(value));
            }
        }
        Value::Object(body)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UserData {
    pub user: Document,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuthResponse {
    pub status: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UserData>,
}

impl AuthResponse {
    pub fn token(token: String) -> Self {
        Self {
            status: "success".into(),
            token,
            data: None,
        }
    }

    pub fn with_user(token: String, user: Document) -> Self {
        Self {
            data: Some(UserData { user }),
            ..Self::token(token)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UserResponse {
    pub status: String,
    pub data: UserData,
}

impl UserResponse {
    pub fn success(user: Document) -> Self {
        Self {
            status: "success".into(),
            data: UserData { user },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_round_trip_through_their_names() {
        for role in [Role::User, Role::Guide, Role::LeadGuide, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
            assert_eq!(serde_json::to_value(role).unwrap(), json!(role.as_str()));
        }
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn signup_document_only_carries_provided_fields() {
        let request: SignupRequest = serde_json::from_value(json!({
            "name": "Laura",
            "email": "laura@example.com",
            "passwordConfirm": "pass1234",
            "role": "admin"
        }))
        .unwrap();
        assert_eq!(
            request.into_document(),
            json!({ "name": "Laura", "email": "laura@example.com", "passwordConfirm": "pass1234" })
        );
    }
}
