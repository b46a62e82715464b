use chrono::{Duration, Utc};
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde_json::Value;
use time::Duration as TimeDuration;

use crate::auth::guards::AuthUser;
use crate::auth::responses::{AuthResponse, LoginRequest, SignupRequest, UpdatePasswordRequest};
use crate::auth::{AuthError, AuthState, Role};
use crate::error::{ApiError, ApiResult};
use crate::models::StatusResponse;
use crate::query::{ID_FIELD, Predicate, QuerySpec};
use crate::resources::schema::{self, format_date, object};
use crate::resources::user::{self, confirmation_issue, password_rules};
use crate::resources::{Resource, Users};
use crate::state::AppState;
use crate::store::DocumentId;

#[openapi(tag = "Auth")]
#[post("/users/signup", data = "<payload>")]
pub async fn signup(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    payload: Json<SignupRequest>,
) -> ApiResult<status::Created<Json<AuthResponse>>> {
    let created = state.users().create(payload.into_inner().into_document()).await?;
    let id = created
        .get(ID_FIELD)
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::Internal("created user has no id".into()))?;
    let role = created
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or(Role::User.as_str());

    let token = issue_session(&state.auth, cookies, id, role)?;
    log::info!("auth: user {id} signed up");
    Ok(status::Created::new(format!("/api/v1/users/{id}"))
        .body(Json(AuthResponse::with_user(token, created))))
}

#[openapi(tag = "Auth")]
#[post("/users/login", data = "<payload>")]
pub async fn login(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    payload: Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let payload = payload.into_inner();
    let email = payload.email.as_deref().map(str::trim).unwrap_or_default().to_lowercase();
    let password = payload.password.as_deref().unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials.into());
    }

    let mut filter = Users::scope();
    filter.push(Predicate::eq("email", email.as_str()));
    let account = state
        .store
        .find(&QuerySpec::find(user::COLLECTION, filter))
        .await?
        .into_iter()
        .next();

    let Some(account) = account else {
        return Err(AuthError::InvalidCredentials.into());
    };
    let stored = account.get("password").and_then(Value::as_str);
    if !state.auth.password_service.matches(password, stored) {
        log::debug!("auth: rejected login for {email}");
        return Err(AuthError::InvalidCredentials.into());
    }

    let id = account
        .get(ID_FIELD)
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::Internal("stored user has no id".into()))?;
    let role = account
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or(Role::User.as_str());
    let token = issue_session(&state.auth, cookies, id, role)?;
    Ok(Json(AuthResponse::token(token)))
}

#[openapi(tag = "Auth")]
#[get("/users/logout")]
pub async fn logout(state: &State<AppState>, cookies: &CookieJar<'_>) -> Json<StatusResponse> {
    clear_auth_cookie(cookies, &state.auth);
    Json(StatusResponse::success())
}

/// Change the caller's password after re-checking the current one. Tokens issued
/// before the change stop working.
#[openapi(tag = "Auth")]
#[patch("/users/update-password", data = "<payload>")]
pub async fn update_password(
    user: AuthUser,
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    payload: Json<UpdatePasswordRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let payload = payload.into_inner();
    let stored = user.profile.get("password").and_then(Value::as_str);
    let current = payload.current_password.as_deref().unwrap_or_default();
    if !state.auth.password_service.matches(current, stored) {
        return Err(AuthError::WrongPassword.into());
    }

    let mut body = serde_json::Map::new();
    if let Some(password) = payload.new_password {
        body.insert("password".to_string(), Value::String(password));
    }
    if let Some(confirm) = payload.password_confirm {
        body.insert("passwordConfirm".to_string(), Value::String(confirm));
    }
    let candidate = schema::sanitize(password_rules(), Value::Object(body))?;
    let mut issues = schema::validate(password_rules(), &candidate, None);
    issues.extend(confirmation_issue(&candidate));
    if !issues.is_empty() {
        return Err(ApiError::validation(issues));
    }

    let password = candidate
        .get("password")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let hash = state.auth.password_service.hash_password(password)?;
    // Backdated so a token issued in the same second stays valid.
    let changed_at = format_date(Utc::now() - Duration::seconds(1));
    state
        .store
        .update_by_id(
            user::COLLECTION,
            user.id,
            &Users::scope(),
            object([
                ("password", Value::String(hash)),
                ("passwordChangedAt", Value::String(changed_at)),
            ]),
        )
        .await?
        .ok_or(AuthError::UserGone)?;

    let token = issue_session(&state.auth, cookies, user.id, user.role.as_str())?;
    log::info!("auth: user {} changed their password", user.id);
    Ok(Json(AuthResponse::token(token)))
}

fn issue_session(
    auth: &AuthState,
    cookies: &CookieJar<'_>,
    user_id: DocumentId,
    role: &str,
) -> ApiResult<String> {
    let signed = auth.jwt_service.issue_token(user_id, role)?;
    set_auth_cookie(cookies, auth, &signed.token);
    Ok(signed.token)
}

fn set_auth_cookie(cookies: &CookieJar<'_>, auth: &AuthState, token: &str) {
    let cookie = Cookie::build((auth.config.cookie_name.clone(), token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(auth.config.cookie_secure)
        .max_age(TimeDuration::seconds(auth.config.token_ttl_secs))
        .build();
    cookies.add(cookie);
}

fn clear_auth_cookie(cookies: &CookieJar<'_>, auth: &AuthState) {
    cookies.remove(Cookie::build((auth.config.cookie_name.clone(), "")).path("/").build());
}
