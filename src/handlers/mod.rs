pub mod file;
pub mod share;

use axum::Json;

use crate::error::ApiResponse;

/// Liveness probe
/// GET /api/v1/health
pub async fn health() -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::success_message("ok"))
}
