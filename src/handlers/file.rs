use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    Extension, Json,
};
use bytes::Bytes;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{CurrentUser, FileRecord, NewFile, StorageUsage};
use crate::services::FileService;
use crate::AppState;

/// List the caller's files
/// GET /api/v1/files
pub async fn list_files(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<FileRecord>>>> {
    let files = FileService::list_files(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success(files)))
}

/// Storage used by the caller
/// GET /api/v1/files/usage
pub async fn storage_usage(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<StorageUsage>>> {
    let usage = FileService::storage_used(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success(usage)))
}

/// File metadata, for owners and analyzers
/// GET /api/v1/files/:id
pub async fn inspect_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<FileRecord>>> {
    let file = FileService::inspect(&state.db, &current_user.id, id).await?;
    Ok(Json(ApiResponse::success(file)))
}

/// Upload a file
/// POST /api/v1/files/upload
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<FileRecord>>> {
    let mut data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut display_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::Validation(format!("Failed to process multipart: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                content_type = field.content_type().map(|s| s.to_string());
                data = Some(field.bytes().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read file: {}", e))
                })?);
            }
            "name" => {
                let text = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read name: {}", e))
                })?;
                if !text.trim().is_empty() {
                    display_name = Some(text.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let data = data.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    let original_name =
        file_name.ok_or_else(|| AppError::Validation("No file name provided".to_string()))?;
    let mime_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    let new = NewFile {
        owner_id: current_user.id,
        name: display_name.unwrap_or_else(|| original_name.clone()),
        original_name,
        mime_type,
    };

    let file = FileService::create_file(
        &state.db,
        &state.storage,
        state.config.storage.max_file_size,
        new,
        data,
    )
    .await?;
    Ok(Json(ApiResponse::success(file)))
}

/// Download a file
/// GET /api/v1/files/:id/download
pub async fn download_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response> {
    let (file, data) =
        FileService::download(&state.db, &state.storage, &current_user.id, id).await?;
    file_response(&file, data, "attachment")
}

/// Render a file inline
/// GET /api/v1/files/:id/preview
pub async fn preview_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response> {
    let (file, data) = FileService::preview(&state.db, &state.storage, &current_user.id, id).await?;
    file_response(&file, data, "inline")
}

/// Delete a file
/// DELETE /api/v1/files/:id
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    if !FileService::delete_file(&state.db, &state.storage, id, &current_user.id).await? {
        return Err(AppError::NotFound("File not found".to_string()));
    }
    Ok(Json(ApiResponse::<()>::success_message("File deleted")))
}

/// Build a response carrying decrypted file bytes
pub(crate) fn file_response(file: &FileRecord, data: Bytes, disposition: &str) -> Result<Response> {
    let fallback_name = file.name.replace(['"', '\\'], "_");
    let encoded_name = urlencoding::encode(&file.name);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.mime_type.as_str())
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "{}; filename=\"{}\"; filename*=UTF-8''{}",
                disposition, fallback_name, encoded_name
            ),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}
