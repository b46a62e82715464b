use rocket::Request;
use rocket::State;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::request::OpenApiFromRequest;
use serde_json::Value;

use crate::auth::responses::Role;
use crate::auth::{AuthError, AuthResult};
use crate::error::{ApiError, ApiResult};
use crate::query::Document;
use crate::resources::schema::parse_date;
use crate::resources::{Resource, Users, user};
use crate::state::AppState;
use crate::store::DocumentId;

/// The logged-in caller, resolved from a Bearer token or the session cookie.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthUser {
    pub id: DocumentId,
    pub role: Role,
    /// The stored account, hidden fields included.
    pub profile: Document,
}

impl AuthUser {
    /// Fail with 403 unless the caller holds one of `roles`.
    pub fn restrict_to(&self, roles: &[Role]) -> ApiResult<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::from(AuthError::Forbidden))
        }
    }
}

/// Message of a failed authentication, read back by the 401/403 catchers.
#[derive(Debug, Clone, Default)]
pub struct GuardRejection(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match extract_user(request).await {
            Ok(user) => Outcome::Success(user),
            Err(err) => {
                let status = err.status();
                if status == Status::InternalServerError {
                    log::error!("authentication failed: {err}");
                } else {
                    log::debug!("authentication rejected: {err}");
                    let message = err.to_string();
                    request.local_cache(|| GuardRejection(Some(message)));
                }
                Outcome::Error((status, err))
            }
        }
    }
}

async fn extract_user(request: &Request<'_>) -> AuthResult<AuthUser> {
    let state = request
        .guard::<&State<AppState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AppState missing from state".into()))?;

    let token = token_from_request(request, &state.auth.config.cookie_name)
        .ok_or(AuthError::NotLoggedIn)?;
    let claims = state.auth.jwt_service.decode_token(&token)?;
    let user_id: DocumentId = claims.sub.parse().map_err(|_| AuthError::TokenInvalid)?;

    let profile = state
        .store
        .find_by_id(user::COLLECTION, user_id, &Users::scope())
        .await?
        .ok_or(AuthError::UserGone)?;

    if changed_password_after(&profile, claims.iat) {
        return Err(AuthError::PasswordChanged);
    }

    let role = profile
        .get("role")
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .unwrap_or(Role::User);

    Ok(AuthUser {
        id: user_id,
        role,
        profile,
    })
}

/// The Authorization header wins over the cookie.
fn token_from_request(request: &Request<'_>, cookie_name: &str) -> Option<String> {
    if let Some(header) = request.headers().get_one("Authorization") {
        let mut parts = header.splitn(2, ' ');
        let scheme = parts.next().unwrap_or_default();
        let token = parts.next().unwrap_or_default().trim();
        if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
            return Some(token.to_string());
        }
    }

    request
        .cookies()
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty() && token != "loggedout")
}

/// Whether the password was changed after a token issued at `issued_at` (seconds).
pub(crate) fn changed_password_after(profile: &Document, issued_at: i64) -> bool {
    profile
        .get("passwordChangedAt")
        .and_then(Value::as_str)
        .and_then(parse_date)
        .is_some_and(|changed| changed.timestamp() > issued_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tokens_older_than_a_password_change_are_stale() {
        let profile = json!({ "passwordChangedAt": "2024-05-01T10:00:00.000Z" })
            .as_object()
            .cloned()
            .unwrap();
        let changed = 1_714_557_600;
        assert!(changed_password_after(&profile, changed - 60));
        assert!(!changed_password_after(&profile, changed));
        assert!(!changed_password_after(&Document::new(), changed - 60));
    }

    #[test]
    fn restriction_checks_the_role() {
        let guide = AuthUser {
            id: 1,
            role: Role::Guide,
            profile: Document::new(),
        };
        assert!(guide.restrict_to(&[Role::Admin, Role::Guide]).is_ok());
        assert!(matches!(
            guide.restrict_to(&[Role::Admin]),
            Err(ApiError::Forbidden(_))
        ));
    }
}
