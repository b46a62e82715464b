//! Reviews, both top-level and nested under a tour. Every route requires a
//! logged-in caller.

use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde_json::Value;

use crate::auth::{AuthUser, Role};
use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_id;
use crate::models::{ApiResponse, DocumentListResponse, DocumentResponse, document_response};
use crate::query::{ParameterMap, Predicate};
use crate::state::AppState;
use crate::store::DocumentId;

const REVIEW_EDITORS: &[Role] = &[Role::User, Role::Admin];

#[openapi(tag = "Reviews")]
#[get("/reviews")]
pub async fn list_reviews(
    _user: AuthUser,
    state: &State<AppState>,
    params: ParameterMap,
) -> ApiResult<Json<DocumentListResponse>> {
    let reviews = state.reviews().list(Vec::new(), &params).await?;
    Ok(Json(ApiResponse::listed(reviews)))
}

/// Reviews of one tour.
#[openapi(tag = "Reviews")]
#[get("/tours/<tour_id>/reviews", rank = 2)]
pub async fn list_tour_reviews(
    _user: AuthUser,
    state: &State<AppState>,
    tour_id: &str,
    params: ParameterMap,
) -> ApiResult<Json<DocumentListResponse>> {
    let tour_id = parse_id(tour_id)?;
    let reviews = state
        .reviews()
        .list(vec![Predicate::eq("tour", tour_id)], &params)
        .await?;
    Ok(Json(ApiResponse::listed(reviews)))
}

#[openapi(tag = "Reviews")]
#[post("/reviews", data = "<body>")]
pub async fn create_review(
    user: AuthUser,
    state: &State<AppState>,
    body: Json<Value>,
) -> ApiResult<status::Created<Json<DocumentResponse>>> {
    create_for(&user, state, None, body.into_inner()).await
}

/// Review a tour; `tour` defaults to the route's tour and `user` to the caller.
#[openapi(tag = "Reviews")]
#[post("/tours/<tour_id>/reviews", data = "<body>")]
pub async fn create_tour_review(
    user: AuthUser,
    state: &State<AppState>,
    tour_id: &str,
    body: Json<Value>,
) -> ApiResult<status::Created<Json<DocumentResponse>>> {
    let tour_id = parse_id(tour_id)?;
    create_for(&user, state, Some(tour_id), body.into_inner()).await
}

async fn create_for(
    user: &AuthUser,
    state: &AppState,
    tour_id: Option<DocumentId>,
    mut body: Value,
) -> ApiResult<status::Created<Json<DocumentResponse>>> {
    user.restrict_to(&[Role::User])?;
    let Some(fields) = body.as_object_mut() else {
        return Err(ApiError::BadRequest("Request body must be a JSON object".to_string()));
    };
    if let Some(tour_id) = tour_id {
        if fields.get("tour").is_none_or(Value::is_null) {
            fields.insert("tour".to_string(), Value::from(tour_id));
        }
    }
    if fields.get("user").is_none_or(Value::is_null) {
        fields.insert("user".to_string(), Value::from(user.id));
    }

    let review = state.reviews().create(body).await?;
    let location = format!("/api/v1/reviews/{}", review.get("id").cloned().unwrap_or_default());
    Ok(status::Created::new(location).body(Json(document_response(review))))
}

#[openapi(tag = "Reviews")]
#[get("/reviews/<id>")]
pub async fn get_review(
    _user: AuthUser,
    state: &State<AppState>,
    id: &str,
) -> ApiResult<Json<DocumentResponse>> {
    let review = state.reviews().read(id, &[]).await?;
    Ok(Json(document_response(review)))
}

#[openapi(tag = "Reviews")]
#[patch("/reviews/<id>", data = "<body>")]
pub async fn update_review(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
    body: Json<Value>,
) -> ApiResult<Json<DocumentResponse>> {
    user.restrict_to(REVIEW_EDITORS)?;
    let review = state.reviews().update(id, body.into_inner()).await?;
    Ok(Json(document_response(review)))
}

#[openapi(tag = "Reviews")]
#[delete("/reviews/<id>")]
pub async fn delete_review(user: AuthUser, state: &State<AppState>, id: &str) -> ApiResult<Status> {
    user.restrict_to(REVIEW_EDITORS)?;
    state.reviews().delete(id).await?;
    Ok(Status::NoContent)
}
