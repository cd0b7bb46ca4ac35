use super::{
    jobs::{job_not_found, locate_artifact, JobView},
    AppError, AppJson, ErrorResponse,
};
use crate::{artifact::walk_files, job::store::JobStore, state::AppState};
use axum::extract::{Path, State};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

const OPENAPI_TAG: &str = "Debug";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DebugFile {
    path: String,
    name: String,
    /// `root`, or the folder relative to the output directory.
    location: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DebugFilesResponse {
    output_dir: String,
    files: Vec<DebugFile>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DebugJobResponse {
    #[serde(flatten)]
    job: JobView,
    searched_path: Option<String>,
    file_exists: bool,
    potential_files: Vec<String>,
}

/// List output files
#[utoipa::path(
    get,
    path = "/debug/files",
    responses((status = OK, body = DebugFilesResponse)),
    tag = OPENAPI_TAG
)]
pub async fn debug_files(State(app_state): State<Arc<AppState>>) -> AppJson<DebugFilesResponse> {
    let output_dir = app_state.resolver().output_dir();

    let files = walk_files(output_dir, true)
        .await
        .into_iter()
        .map(|path| {
            let location = path
                .parent()
                .and_then(|parent| parent.strip_prefix(output_dir).ok())
                .filter(|relative| !relative.as_os_str().is_empty())
                .map(|relative| relative.display().to_string())
                .unwrap_or_else(|| "root".to_string());

            DebugFile {
                name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path: path.display().to_string(),
                location,
            }
        })
        .collect();

    AppJson(DebugFilesResponse {
        output_dir: output_dir.display().to_string(),
        files,
    })
}

/// Explain artifact lookup for a job
///
/// Where the resolver looked, and every output file whose name mentions the job.
#[utoipa::path(
    get,
    path = "/debug/job/{job_id}",
    responses(
        (status = OK, body = DebugJobResponse),
        (status = NOT_FOUND, description = "Job not found.", body = ErrorResponse),
    ),
    tag = OPENAPI_TAG
)]
pub async fn debug_job(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<AppJson<DebugJobResponse>, AppError> {
    let record = app_state
        .jobs()
        .get(&job_id)
        .await
        .ok_or_else(|| job_not_found(&job_id))?;

    let searched = locate_artifact(&app_state, &record, false).await;
    let file_exists = match &searched {
        Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
        None => false,
    };

    let potential_files = walk_files(app_state.resolver().output_dir(), true)
        .await
        .into_iter()
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().contains(job_id.as_str()))
        })
        .map(|path| path.display().to_string())
        .collect();

    Ok(AppJson(DebugJobResponse {
        job: JobView::from(&record),
        searched_path: searched.map(|path| path.display().to_string()),
        file_exists,
        potential_files,
    }))
}
