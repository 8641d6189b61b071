use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::features::files::handlers::{
    batch_operations, delete_file, get_file, list_files, lookup_files, search_files, update_file,
    upload_file,
};
use crate::features::files::services::FileService;

/// Create routes for the files feature
pub fn routes(file_service: Arc<FileService>, max_body_size: usize) -> Router {
    Router::new()
        .route(
            "/api/files/upload",
            // Allow the configured payload size plus room for multipart overhead
            post(upload_file).layer(DefaultBodyLimit::max(max_body_size + 1024 * 1024)),
        )
        .route("/api/files", get(list_files))
        .route("/api/files/search", get(search_files))
        .route("/api/files/lookup", post(lookup_files))
        .route("/api/files/batch", post(batch_operations))
        .route(
            "/api/files/{id}",
            get(get_file).put(update_file).delete(delete_file),
        )
        .with_state(file_service)
}
