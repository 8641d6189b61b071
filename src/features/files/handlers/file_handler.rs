use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, AppQuery};
use crate::features::files::dtos::{
    BatchGetFilesDto, BatchOperationDto, BatchResultsDto, DateRangeQuery, DeleteFileResponseDto,
    FileDetailDto, FileResponseDto, ListFilesQuery, UpdateFileDto, UploadFileDto,
};
use crate::features::files::services::FileService;
use crate::shared::constants::{DEFAULT_CONTENT_TYPE, UNNAMED_FILE};
use crate::shared::types::{ApiResponse, Meta};

/// Upload a file
///
/// Accepts multipart/form-data with a `file` part. The part's filename and
/// content type are recorded as metadata.
#[utoipa::path(
    post,
    path = "/api/files/upload",
    tag = "files",
    request_body(
        content = UploadFileDto,
        content_type = "multipart/form-data",
        description = "File upload form",
    ),
    responses(
        (status = 201, description = "File uploaded successfully", body = ApiResponse<FileResponseDto>),
        (status = 400, description = "Missing file part or malformed multipart body"),
        (status = 413, description = "File too large"),
        (status = 503, description = "Blob or metadata store unavailable")
    )
)]
pub async fn upload_file(
    State(service): State<Arc<FileService>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<FileResponseDto>>)> {
    let mut upload: Option<(Vec<u8>, String, String)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        debug!("Failed to read multipart field: {}", e);
        AppError::BadRequest(format!("Failed to read multipart data: {}", e))
    })? {
        if field.name() != Some("file") {
            debug!("Ignoring multipart field: {:?}", field.name());
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let file_name = field
            .file_name()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| UNNAMED_FILE.to_string());

        let data = field.bytes().await.map_err(|e| {
            debug!("Failed to read file bytes: {}", e);
            AppError::BadRequest(format!("Failed to read file data: {}", e))
        })?;

        upload = Some((data.to_vec(), file_name, content_type));
    }

    let (data, file_name, content_type) =
        upload.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let record = service.upload_file(data, &file_name, &content_type).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            Some(record.into()),
            Some("File uploaded successfully".to_string()),
            None,
        )),
    ))
}

/// List active files
///
/// Pages are cursor based. Ordering across pages is not guaranteed; follow
/// `meta.next_cursor` until it is absent.
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "One page of files", body = ApiResponse<Vec<FileResponseDto>>),
        (status = 400, description = "Invalid limit or cursor")
    )
)]
pub async fn list_files(
    State(service): State<Arc<FileService>>,
    AppQuery(query): AppQuery<ListFilesQuery>,
) -> Result<Json<ApiResponse<Vec<FileResponseDto>>>> {
    query
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let page = service
        .list_files(query.limit, query.cursor.as_deref())
        .await?;

    let items: Vec<FileResponseDto> = page.items.into_iter().map(Into::into).collect();
    let meta = Meta {
        count: items.len() as i64,
        next_cursor: page.next_cursor.map(|c| c.encode()),
    };
    Ok(Json(ApiResponse::success(Some(items), None, Some(meta))))
}

/// Find files by creation time
#[utoipa::path(
    get,
    path = "/api/files/search",
    tag = "files",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Files created in the range, oldest first", body = ApiResponse<Vec<FileResponseDto>>),
        (status = 400, description = "Invalid range")
    )
)]
pub async fn search_files(
    State(service): State<Arc<FileService>>,
    AppQuery(query): AppQuery<DateRangeQuery>,
) -> Result<Json<ApiResponse<Vec<FileResponseDto>>>> {
    query
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let records = service
        .query_by_date_range(query.start, query.end, query.limit)
        .await?;
    let dtos: Vec<FileResponseDto> = records.into_iter().map(Into::into).collect();
    let meta = Meta {
        count: dtos.len() as i64,
        next_cursor: None,
    };
    Ok(Json(ApiResponse::success(Some(dtos), None, Some(meta))))
}

/// Fetch metadata for many files; unknown ids are left out
#[utoipa::path(
    post,
    path = "/api/files/lookup",
    tag = "files",
    request_body = BatchGetFilesDto,
    responses(
        (status = 200, description = "Metadata of the files that exist", body = ApiResponse<Vec<FileResponseDto>>),
        (status = 400, description = "Validation error")
    )
)]
pub async fn lookup_files(
    State(service): State<Arc<FileService>>,
    AppJson(dto): AppJson<BatchGetFilesDto>,
) -> Result<Json<ApiResponse<Vec<FileResponseDto>>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let records = service.get_files(&dto.ids).await?;
    let dtos: Vec<FileResponseDto> = records.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(Some(dtos), None, None)))
}

/// Get file metadata and a download link
#[utoipa::path(
    get,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "File metadata with presigned download URL", body = ApiResponse<FileDetailDto>),
        (status = 404, description = "File not found")
    )
)]
pub async fn get_file(
    State(service): State<Arc<FileService>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FileDetailDto>>> {
    let detail = service.get_file(&id).await?;
    Ok(Json(ApiResponse::success(Some(detail), None, None)))
}

/// Update file metadata
///
/// Only `name`, `description` and `tags` are applied. Send the `version`
/// you last read to reject the write if someone else changed the file since.
#[utoipa::path(
    put,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "File id")
    ),
    request_body = UpdateFileDto,
    responses(
        (status = 200, description = "File updated", body = ApiResponse<FileResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 404, description = "File not found"),
        (status = 409, description = "Version conflict; re-read and retry")
    )
)]
pub async fn update_file(
    State(service): State<Arc<FileService>>,
    Path(id): Path<String>,
    AppJson(body): AppJson<Map<String, Value>>,
) -> Result<Json<ApiResponse<FileResponseDto>>> {
    let expected_version = expected_version(&body)?;

    let record = service.update_file(&id, &body, expected_version).await?;
    Ok(Json(ApiResponse::success(
        Some(record.into()),
        Some("File updated successfully".to_string()),
        None,
    )))
}

fn expected_version(body: &Map<String, Value>) -> Result<Option<i64>> {
    match body.get("version") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| AppError::Validation("version must be an integer".to_string())),
    }
}

/// Delete a file and its stored content
#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "File deleted", body = ApiResponse<DeleteFileResponseDto>),
        (status = 404, description = "File not found"),
        (status = 409, description = "File changed between the existence check and the tombstone write; retry"),
        (status = 503, description = "Blob or metadata store unavailable; retrying resumes the delete")
    )
)]
pub async fn delete_file(
    State(service): State<Arc<FileService>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeleteFileResponseDto>>> {
    service.delete_file(&id).await?;
    Ok(Json(ApiResponse::success(
        Some(DeleteFileResponseDto {
            file_id: id,
            deleted: true,
        }),
        Some("File deleted successfully".to_string()),
        None,
    )))
}

/// Run several operations; each entry reports its own outcome
#[utoipa::path(
    post,
    path = "/api/files/batch",
    tag = "files",
    request_body = Vec<BatchOperationDto>,
    responses(
        (status = 200, description = "Per-operation results in request order", body = ApiResponse<BatchResultsDto>),
        (status = 400, description = "Body is not a list of operations")
    )
)]
pub async fn batch_operations(
    State(service): State<Arc<FileService>>,
    AppJson(operations): AppJson<Vec<BatchOperationDto>>,
) -> Result<Json<ApiResponse<BatchResultsDto>>> {
    let results = service.batch_operate(operations).await;
    Ok(Json(ApiResponse::success(
        Some(BatchResultsDto { results }),
        None,
        None,
    )))
}

#[cfg(test)]
mod tests {
    use crate::features::files::routes;
    use crate::shared::test_helpers::memory_file_service;
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};

    fn server() -> TestServer {
        TestServer::new(routes(memory_file_service(), 1024 * 1024)).unwrap()
    }

    async fn upload(server: &TestServer, name: &str, body: &[u8]) -> Value {
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(body.to_vec())
                .file_name(name)
                .mime_type("text/plain"),
        );
        let response = server.post("/api/files/upload").multipart(form).await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["data"].clone()
    }

    #[tokio::test]
    async fn test_upload_then_get_with_download_link() {
        let server = server();
        let created = upload(&server, "notes.txt", b"hello").await;
        let id = created["id"].as_str().unwrap();

        assert_eq!(created["name"], "notes.txt");
        assert_eq!(created["size"], 5);
        assert_eq!(created["content_type"], "text/plain");
        assert_eq!(created["version"], 1);
        assert_eq!(created["status"], "active");

        let response = server.get(&format!("/api/files/{}", id)).await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["metadata"]["id"], id);
        assert_eq!(body["data"]["expires_in"], 3600);
        assert!(body["data"]["download_url"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_upload_without_file_part_is_bad_request() {
        let server = server();
        let form = MultipartForm::new().add_text("note", "no file here");

        let response = server.post("/api/files/upload").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["success"], false);
    }

    #[tokio::test]
    async fn test_get_unknown_file_is_not_found() {
        let server = server();

        let response = server.get("/api/files/does-not-exist").await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_ignores_protected_fields_and_detects_conflicts() {
        let server = server();
        let created = upload(&server, "x.txt", b"0123456789").await;
        let id = created["id"].as_str().unwrap();
        let path = format!("/api/files/{}", id);

        let response = server
            .put(&path)
            .json(&json!({ "name": "y.txt", "size": 1, "content_type": "image/png", "version": 1 }))
            .await;
        response.assert_status_ok();
        let updated = response.json::<Value>()["data"].clone();
        assert_eq!(updated["name"], "y.txt");
        assert_eq!(updated["size"], 10);
        assert_eq!(updated["content_type"], "text/plain");
        assert_eq!(updated["version"], 2);

        let stale = server
            .put(&path)
            .json(&json!({ "name": "z.txt", "version": 1 }))
            .await;
        stale.assert_status(StatusCode::CONFLICT);

        let bad_version = server
            .put(&path)
            .json(&json!({ "name": "z.txt", "version": "two" }))
            .await;
        bad_version.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let server = server();
        let created = upload(&server, "gone.txt", b"bye").await;
        let path = format!("/api/files/{}", created["id"].as_str().unwrap());

        let response = server.delete(&path).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["deleted"], true);

        server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
        server
            .delete(&path)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_follows_cursor_to_the_end() {
        let server = server();
        for i in 0..3 {
            upload(&server, &format!("f{}.txt", i), b"x").await;
        }

        let first = server
            .get("/api/files")
            .add_query_param("limit", 2)
            .await
            .json::<Value>();
        assert_eq!(first["meta"]["count"], 2);
        let cursor = first["meta"]["next_cursor"].as_str().unwrap().to_string();

        let second = server
            .get("/api/files")
            .add_query_param("limit", 2)
            .add_query_param("cursor", cursor)
            .await
            .json::<Value>();
        assert_eq!(second["meta"]["count"], 1);
        assert!(second["meta"]["next_cursor"].is_null());
    }

    #[tokio::test]
    async fn test_list_rejects_out_of_range_limit() {
        let server = server();

        let response = server.get("/api/files").add_query_param("limit", 0).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_lookup_omits_unknown_ids() {
        let server = server();
        let created = upload(&server, "a.txt", b"a").await;

        let response = server
            .post("/api/files/lookup")
            .json(&json!({ "ids": [created["id"], "missing"] }))
            .await;

        response.assert_status_ok();
        let data = response.json::<Value>()["data"].clone();
        assert_eq!(data.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_rejects_inverted_range() {
        let server = server();

        let response = server
            .get("/api/files/search")
            .add_query_param("start", "2025-02-01T00:00:00Z")
            .add_query_param("end", "2025-01-01T00:00:00Z")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_reports_per_item_status() {
        let server = server();
        let created = upload(&server, "a.txt", b"a").await;

        let response = server
            .post("/api/files/batch")
            .json(&json!([
                { "type": "delete", "file_id": created["id"] },
                { "type": "rename", "file_id": created["id"] },
                { "type": "delete", "file_id": "missing" }
            ]))
            .await;

        response.assert_status_ok();
        let results = response.json::<Value>()["data"]["results"].clone();
        assert_eq!(results[0]["status"], "success");
        assert_eq!(results[1]["status"], "unsupported");
        assert_eq!(results[2]["status"], "failed");
        assert!(results[2]["error"].as_str().is_some());
    }
}
