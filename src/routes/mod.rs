pub mod debug;
pub mod jobs;

use crate::{
    job::{store::JobStoreError, JobState},
    state::AppState,
    workflow::{
        client::SubmitError,
        payload::{
            fastwan::FastWanPayload, infinite_talk::InfiniteTalkPayload,
            qwen_edit::QwenEditPayload, wan_loras::WanLorasPayload, Deployment,
            GenerationPayload, ValidationError,
        },
        template::TemplateError,
    },
};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

// Create our own JSON extractor by wrapping `axum::Json`. This makes it easy to override the
// rejection and provide our own which formats errors to match our application.
//
// `axum::Json` responds with plain text if the input is invalid.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(T);

impl<T> IntoResponse for AppJson<T>
where
    axum::Json<T>: IntoResponse,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug)]
pub enum AppError {
    JsonRejection(JsonRejection),
    Validation(ValidationError),
    Configuration(anyhow::Error),
    BackendUnavailable(anyhow::Error),
    BackendRejected(anyhow::Error),
    NotFoundError(anyhow::Error),
    InvalidState(String),
    InternalServerError(anyhow::Error),
}

/// Body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    message: String,
    /// Request field that failed validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

// Tell axum how `AppError` should be converted into a response.
//
// This is also a convenient place to log errors.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut field = None;

        let (status, message) = match self {
            AppError::JsonRejection(rejection) => {
                // This error is caused by bad user input so don't log it
                (rejection.status(), rejection.body_text())
            }
            AppError::Validation(error) => {
                field = Some(error.field.to_string());
                (StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
            }
            AppError::Configuration(error) => {
                tracing::error!("configuration error: {:#}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Configuration error: {}", error),
                )
            }
            AppError::BackendUnavailable(error) => {
                tracing::warn!("backend unavailable: {:#}", error);
                (StatusCode::BAD_GATEWAY, error.to_string())
            }
            AppError::BackendRejected(error) => {
                tracing::warn!("backend rejected workflow: {:#}", error);
                (StatusCode::BAD_GATEWAY, error.to_string())
            }
            AppError::NotFoundError(error) => {
                (StatusCode::NOT_FOUND, format!("Not found: {}", error))
            }
            AppError::InvalidState(message) => (StatusCode::BAD_REQUEST, message),
            AppError::InternalServerError(error) => {
                tracing::error!("internal server error: {:#}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, AppJson(ErrorResponse { message, field })).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::JsonRejection(rejection)
    }
}

impl From<ValidationError> for AppError {
    fn from(error: ValidationError) -> Self {
        Self::Validation(error)
    }
}

impl From<TemplateError> for AppError {
    fn from(error: TemplateError) -> Self {
        Self::Configuration(error.into())
    }
}

impl From<SubmitError> for AppError {
    fn from(error: SubmitError) -> Self {
        match &error {
            SubmitError::Unavailable(_) | SubmitError::EventStream(_) => {
                Self::BackendUnavailable(error.into())
            }
            SubmitError::Rejected { .. } | SubmitError::InvalidResponse(_) => {
                Self::BackendRejected(error.into())
            }
        }
    }
}

impl From<JobStoreError> for AppError {
    fn from(error: JobStoreError) -> Self {
        Self::InternalServerError(error.into())
    }
}

#[derive(Serialize, ToSchema)]
pub struct RootResponse {
    status: String,
    message: String,
}

/// Service banner
#[utoipa::path(
    get,
    path = "/",
    responses((status = OK, body = RootResponse)),
    tag = "Service"
)]
pub async fn root(State(app_state): State<Arc<AppState>>) -> AppJson<RootResponse> {
    AppJson(RootResponse {
        status: "running".to_string(),
        message: app_state.deployment().title().to_string(),
    })
}

pub async fn health_check() -> &'static str {
    "ok"
}

#[derive(OpenApi)]
#[openapi(
    paths(
        root,
        jobs::generate,
        jobs::job_status,
        jobs::download,
        jobs::list_jobs,
        jobs::delete_job,
        debug::debug_files,
        debug::debug_job,
    ),
    components(schemas(
        ErrorResponse,
        RootResponse,
        JobState,
        GenerationPayload,
        FastWanPayload,
        InfiniteTalkPayload,
        QwenEditPayload,
        WanLorasPayload,
        jobs::GenerateResponse,
        jobs::JobView,
        jobs::ArtifactView,
        jobs::JobStatusResponse,
        jobs::JobsResponse,
        jobs::MessageResponse,
        debug::DebugFile,
        debug::DebugFilesResponse,
        debug::DebugJobResponse,
    ))
)]
pub struct ApiDoc;

/// The OpenAPI document for one deployment: its title, and its submit route
/// in place of the generic `/generate`.
pub fn api_doc(deployment: Deployment) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = deployment.title().to_string();

    let submit_path = deployment.submit_path();
    if submit_path != jobs::GENERATE_PATH {
        if let Some(item) = doc.paths.paths.remove(jobs::GENERATE_PATH) {
            doc.paths.paths.insert(submit_path.to_string(), item);
        }
    }

    doc
}
