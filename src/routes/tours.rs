//! Tour catalogue: CRUD, reports and geo queries. Writes need an admin or lead guide.

use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde_json::Value;

use crate::auth::{AuthUser, Role};
use crate::error::{ApiError, ApiResult};
use crate::geo::{self, DistanceUnit, LatLng};
use crate::models::{
    ApiResponse, DataEnvelope, DistanceResponse, DocumentListResponse, DocumentResponse, PlanData,
    StatsData, document_response,
};
use crate::query::ParameterMap;
use crate::reports;
use crate::resources::tour;
use crate::state::AppState;

const TOUR_MANAGERS: &[Role] = &[Role::Admin, Role::LeadGuide];

/// List tours with filtering, sorting, field selection and paging from the query string.
#[openapi(tag = "Tours")]
#[get("/tours")]
pub async fn list_tours(
    state: &State<AppState>,
    params: ParameterMap,
) -> ApiResult<Json<DocumentListResponse>> {
    let tours = state.tours().list(Vec::new(), &params).await?;
    Ok(Json(ApiResponse::listed(tours)))
}

/// The five cheapest tours.
#[openapi(tag = "Tours")]
#[get("/tours/top-5-cheap")]
pub async fn top_cheap_tours(
    state: &State<AppState>,
    params: ParameterMap,
) -> ApiResult<Json<DocumentListResponse>> {
    let tours = state
        .tours()
        .list(Vec::new(), &reports::top_cheap_params(&params))
        .await?;
    Ok(Json(ApiResponse::listed(tours)))
}

#[openapi(tag = "Tours")]
#[get("/tours/tour-stats")]
pub async fn tour_stats(state: &State<AppState>) -> ApiResult<Json<ApiResponse<StatsData>>> {
    let tours = state.tours().fetch_all(Vec::new()).await?;
    Ok(Json(ApiResponse::success(StatsData {
        stats: reports::tour_stats(&tours),
    })))
}

#[openapi(tag = "Tours")]
#[get("/tours/monthly-plan/<year>")]
pub async fn monthly_plan(
    user: AuthUser,
    state: &State<AppState>,
    year: &str,
) -> ApiResult<Json<ApiResponse<PlanData>>> {
    user.restrict_to(&[Role::Admin, Role::LeadGuide, Role::Guide])?;
    let year = reports::parse_year(year)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid year: {year}")))?;

    let tours = state.tours().fetch_all(Vec::new()).await?;
    Ok(Json(ApiResponse::success(PlanData {
        plan: reports::monthly_plan(&tours, year),
    })))
}

/// Tours starting within `distance` of `latlng`.
#[openapi(tag = "Tours")]
#[get("/tours/tours-within/<distance>/center/<latlng>/unit/<unit>")]
pub async fn tours_within(
    state: &State<AppState>,
    distance: &str,
    latlng: &str,
    unit: &str,
) -> ApiResult<Json<DocumentListResponse>> {
    let center = LatLng::parse(latlng)?;
    let distance = distance
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|distance| distance.is_finite() && *distance >= 0.0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid distance: {distance}")))?;

    let handlers = state.tours();
    let candidates = handlers.fetch_all(Vec::new()).await?;
    let inside = geo::within(candidates, center, distance, DistanceUnit::parse(unit));
    let tours = handlers.present_all(inside).await?;
    Ok(Json(ApiResponse::listed(tours)))
}

/// Distance from `latlng` to the start of every tour, nearest first.
#[openapi(tag = "Tours")]
#[get("/tours/distances/<latlng>/unit/<unit>")]
pub async fn tour_distances(
    state: &State<AppState>,
    latlng: &str,
    unit: &str,
) -> ApiResult<Json<DistanceResponse>> {
    let center = LatLng::parse(latlng)?;
    let tours = state.tours().fetch_all(Vec::new()).await?;
    let distances = geo::distances(&tours, center, DistanceUnit::parse(unit));
    Ok(Json(ApiResponse::success(DataEnvelope::new(distances))))
}

/// A tour with its guides and reviews.
#[openapi(tag = "Tours")]
#[get("/tours/<id>")]
pub async fn get_tour(state: &State<AppState>, id: &str) -> ApiResult<Json<DocumentResponse>> {
    let tour = state.tours().read(id, &[tour::REVIEWS]).await?;
    Ok(Json(document_response(tour)))
}

#[openapi(tag = "Tours")]
#[post("/tours", data = "<body>")]
pub async fn create_tour(
    user: AuthUser,
    state: &State<AppState>,
    body: Json<Value>,
) -> ApiResult<status::Created<Json<DocumentResponse>>> {
    user.restrict_to(TOUR_MANAGERS)?;
    let tour = state.tours().create(body.into_inner()).await?;
    let location = format!("/api/v1/tours/{}", tour.get("id").cloned().unwrap_or_default());
    Ok(status::Created::new(location).body(Json(document_response(tour))))
}

#[openapi(tag = "Tours")]
#[patch("/tours/<id>", data = "<body>")]
pub async fn update_tour(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
    body: Json<Value>,
) -> ApiResult<Json<DocumentResponse>> {
    user.restrict_to(TOUR_MANAGERS)?;
    let tour = state.tours().update(id, body.into_inner()).await?;
    Ok(Json(document_response(tour)))
}

#[openapi(tag = "Tours")]
#[delete("/tours/<id>")]
pub async fn delete_tour(user: AuthUser, state: &State<AppState>, id: &str) -> ApiResult<Status> {
    user.restrict_to(TOUR_MANAGERS)?;
    state.tours().delete(id).await?;
    Ok(Status::NoContent)
}
