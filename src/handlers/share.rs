use axum::{
    extract::{Path, State},
    response::Response,
    Extension, Json,
};

use crate::error::{ApiResponse, AppError, Result};
use crate::handlers::file::file_response;
use crate::models::{CreateShareRequest, CurrentUser, FileRecord, PublicShareInfo, ShareGrant};
use crate::services::{FileService, ShareService};
use crate::AppState;

/// Create a new share grant
/// POST /api/v1/shares
pub async fn create_share(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<CreateShareRequest>,
) -> Result<Json<ApiResponse<ShareGrant>>> {
    let grant = ShareService::create_grant(
        &state.db,
        req.file_id,
        &current_user.id,
        req.target,
        req.role,
        req.expires_hours,
    )
    .await?;
    Ok(Json(ApiResponse::success(grant)))
}

/// List live grants on the caller's files
/// GET /api/v1/shares/my
pub async fn list_my_shares(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<ShareGrant>>>> {
    let grants = ShareService::list_grants(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success(grants)))
}

/// Revoke a grant
/// DELETE /api/v1/shares/:token
pub async fn delete_share(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    if !ShareService::revoke_grant(&state.db, &token, &current_user.id).await? {
        return Err(AppError::NotFound("Share not found".to_string()));
    }
    Ok(Json(ApiResponse::<()>::success_message("Share revoked")))
}

/// Resolve a public link; targeted grants are only usable by their recipient
async fn public_share(state: &AppState, token: &str) -> Result<(ShareGrant, FileRecord)> {
    match ShareService::resolve_share(&state.db, token).await? {
        Some((grant, file)) if grant.is_public() => Ok((grant, file)),
        _ => Err(AppError::NotFound("Share not found".to_string())),
    }
}

/// Get public share info
/// GET /api/v1/public/share/:token
pub async fn get_public_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<PublicShareInfo>>> {
    let (grant, file) = public_share(&state, &token).await?;
    Ok(Json(ApiResponse::success(PublicShareInfo {
        file,
        role: grant.role,
        expires_at: grant.expires_at,
    })))
}

/// Download through a public link
/// GET /api/v1/public/share/:token/download
pub async fn download_public_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response> {
    let (_grant, file) = public_share(&state, &token).await?;
    let data = FileService::read_contents(&state.storage, &file).await?;
    file_response(&file, data, "attachment")
}
