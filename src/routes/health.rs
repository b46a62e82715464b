//! Lightweight service health endpoint used for readiness checks and tests.

use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::resources::tour;
use crate::state::AppState;

/// Basic response payload describing API health.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    /// `ok` once the document store answers.
    pub status: String,
}

/// Health check; fails with 500 when the document store is unreachable.
#[openapi(tag = "Health")]
#[get("/health")]
pub async fn health_check(state: &State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.store.count(tour::COLLECTION, &Vec::new()).await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}
