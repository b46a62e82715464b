//! The caller's own account and admin user management. Signup, login,
//! logout and password changes live in `auth::routes`.

use rocket::State;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde_json::{Map, Value};

use crate::auth::responses::UserResponse;
use crate::auth::{AuthUser, Role};
use crate::error::{ApiError, ApiResult};
use crate::models::{ApiResponse, DocumentListResponse, DocumentResponse, document_response};
use crate::query::ParameterMap;
use crate::resources::schema::object;
use crate::resources::user::{self, PASSWORD_UPDATE_REJECTED};
use crate::resources::{Resource, Users};
use crate::state::AppState;

/// Fields a user may change on their own account.
const SELF_EDITABLE: &[&str] = &["name", "email"];

#[openapi(tag = "Users")]
#[get("/users/me")]
pub async fn get_me(user: AuthUser, state: &State<AppState>) -> ApiResult<Json<DocumentResponse>> {
    let me = state.users().read(&user.id.to_string(), &[]).await?;
    Ok(Json(document_response(me)))
}

#[openapi(tag = "Users")]
#[patch("/users/update-me", data = "<body>")]
pub async fn update_me(
    user: AuthUser,
    state: &State<AppState>,
    body: Json<Value>,
) -> ApiResult<Json<UserResponse>> {
    let body = body.into_inner();
    if body.get("password").is_some() || body.get("passwordConfirm").is_some() {
        return Err(ApiError::BadRequest(PASSWORD_UPDATE_REJECTED.to_string()));
    }

    let allowed: Map<String, Value> = body
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(key, _)| SELF_EDITABLE.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    let updated = state
        .users()
        .update(&user.id.to_string(), Value::Object(allowed))
        .await?;
    Ok(Json(UserResponse::success(updated)))
}

/// Deactivate the caller's account; it disappears from every lookup.
#[openapi(tag = "Users")]
#[delete("/users/delete-me")]
pub async fn delete_me(user: AuthUser, state: &State<AppState>) -> ApiResult<Status> {
    state
        .store
        .update_by_id(
            user::COLLECTION,
            user.id,
            &Users::scope(),
            object([("active", Value::Bool(false))]),
        )
        .await?;
    log::info!("user {} deactivated their account", user.id);
    Ok(Status::NoContent)
}

#[openapi(tag = "Users")]
#[get("/users")]
pub async fn list_users(
    user: AuthUser,
    state: &State<AppState>,
    params: ParameterMap,
) -> ApiResult<Json<DocumentListResponse>> {
    user.restrict_to(&[Role::Admin])?;
    let users = state.users().list(Vec::new(), &params).await?;
    Ok(Json(ApiResponse::listed(users)))
}

#[openapi(tag = "Users")]
#[get("/users/<id>")]
pub async fn get_user(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
) -> ApiResult<Json<DocumentResponse>> {
    user.restrict_to(&[Role::Admin])?;
    let found = state.users().read(id, &[]).await?;
    Ok(Json(document_response(found)))
}

#[openapi(tag = "Users")]
#[patch("/users/<id>", data = "<body>")]
pub async fn update_user(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
    body: Json<Value>,
) -> ApiResult<Json<DocumentResponse>> {
    user.restrict_to(&[Role::Admin])?;
    let updated = state.users().update(id, body.into_inner()).await?;
    Ok(Json(document_response(updated)))
}

#[openapi(tag = "Users")]
#[delete("/users/<id>")]
pub async fn delete_user(user: AuthUser, state: &State<AppState>, id: &str) -> ApiResult<Status> {
    user.restrict_to(&[Role::Admin])?;
    state.users().delete(id).await?;
    Ok(Status::NoContent)
}
