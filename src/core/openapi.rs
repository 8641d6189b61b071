use utoipa::{Modify, OpenApi};

use crate::features::files::{
    dtos as files_dtos, handlers as files_handlers, models as files_models,
};
use crate::features::health;
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        // Files
        files_handlers::upload_file,
        files_handlers::list_files,
        files_handlers::search_files,
        files_handlers::lookup_files,
        files_handlers::get_file,
        files_handlers::update_file,
        files_handlers::delete_file,
        files_handlers::batch_operations,
    ),
    components(
        schemas(
            Meta,
            health::HealthDto,
            files_models::FileStatus,
            files_dtos::UploadFileDto,
            files_dtos::FileResponseDto,
            files_dtos::FileDetailDto,
            files_dtos::UpdateFileDto,
            files_dtos::BatchGetFilesDto,
            files_dtos::BatchOperationDto,
            files_dtos::BatchItemStatus,
            files_dtos::BatchOperationResultDto,
            files_dtos::BatchResultsDto,
            files_dtos::DeleteFileResponseDto,
            ApiResponse<health::HealthDto>,
            ApiResponse<files_dtos::FileResponseDto>,
            ApiResponse<Vec<files_dtos::FileResponseDto>>,
            ApiResponse<files_dtos::FileDetailDto>,
            ApiResponse<files_dtos::DeleteFileResponseDto>,
            ApiResponse<files_dtos::BatchResultsDto>,
        )
    ),
    tags(
        (name = "health", description = "Service liveness"),
        (name = "files", description = "File upload, metadata and lifecycle"),
    ),
    info(
        title = "File Vault API",
        version = "0.1.0",
        description = "Blob storage with versioned file metadata",
    )
)]
pub struct ApiDoc;

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
