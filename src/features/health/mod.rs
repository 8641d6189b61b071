//! Liveness probe

use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::shared::types::ApiResponse;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthDto {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Report that the service is up
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is running", body = ApiResponse<HealthDto>)
    )
)]
pub async fn health_check() -> Json<ApiResponse<HealthDto>> {
    Json(ApiResponse::success(
        Some(HealthDto {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
        }),
        None,
        None,
    ))
}

pub fn routes() -> Router {
    Router::new().route("/health", get(health_check))
}
