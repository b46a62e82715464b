//! JSON envelopes shared by the route handlers.

use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geo::TourDistance;
use crate::query::Document;
use crate::reports::{DifficultyStats, MonthPlan};

/// `{ "status": "success", "results"?: n, "data": ... }`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            results: None,
            data,
        }
    }
}

impl<T> ApiResponse<DataEnvelope<Vec<T>>> {
    /// A list with its length reported as `results`.
    pub fn listed(items: Vec<T>) -> Self {
        Self {
            status: "success".to_string(),
            results: Some(items.len()),
            data: DataEnvelope { data: items },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DataEnvelope<T> {
    pub data: T,
}

impl<T> DataEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

pub type DocumentResponse = ApiResponse<DataEnvelope<Document>>;
pub type DocumentListResponse = ApiResponse<DataEnvelope<Vec<Document>>>;

pub fn document_response(document: Document) -> DocumentResponse {
    ApiResponse::success(DataEnvelope::new(document))
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StatsData {
    pub stats: Vec<DifficultyStats>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PlanData {
    pub plan: Vec<MonthPlan>,
}

pub type DistanceResponse = ApiResponse<DataEnvelope<Vec<TourDistance>>>;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckoutResponse {
    pub status: String,
    pub session: Value,
}

/// Bare `{ "status": "success" }`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}
