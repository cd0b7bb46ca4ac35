use super::{AppError, AppJson, ErrorResponse};
use crate::{
    artifact::{media::MediaKind, resolve_with_retry, ArtifactResolver},
    job::{store::JobStore, JobRecord, JobState},
    state::AppState,
    workflow::{fetch::fetch_inputs, payload::GenerationPayload, watcher::CompletionWatcher},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    path::{Path as FsPath, PathBuf},
    sync::Arc,
};
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;
use uuid::Uuid;

const OPENAPI_TAG: &str = "Jobs";

/// Route the OpenAPI document lists the submit handler under.
pub const GENERATE_PATH: &str = "/generate";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GenerateResponse {
    job_id: String,
    status: JobState,
    message: String,
}

/// What is known about a job without looking at the output folder.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobView {
    job_id: String,
    status: JobState,
    /// Percentage in `[0, 100]`.
    progress: f32,
    /// Run id assigned by ComfyUI.
    prompt_id: String,
    #[schema(value_type = String)]
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    input_files: Vec<String>,
}

impl From<&JobRecord> for JobView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id().to_string(),
            status: record.state(),
            progress: record.progress(),
            prompt_id: record.backend_run_id().to_string(),
            created_at: record.created_at(),
            error: record.error_detail().map(str::to_string),
            input_files: record.input_files().to_vec(),
        }
    }
}

/// Artifact readiness of a completed job. Empty for every other state.
/// Video deployments fill the `video_*` fields, image deployments the
/// `image_*` ones.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ArtifactView {
    #[serde(skip_serializing_if = "Option::is_none")]
    video_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ArtifactView {
    fn ready(kind: MediaKind, job_id: &str, path: &FsPath, file_size: u64) -> Self {
        let path = Some(path.display().to_string());
        let mut view = Self {
            download_url: Some(format!("/download/{}", job_id)),
            file_size: Some(file_size),
            ..Default::default()
        };
        match kind {
            MediaKind::Video => {
                view.video_ready = Some(true);
                view.video_path = path;
            }
            MediaKind::Image => {
                view.image_ready = Some(true);
                view.image_path = path;
            }
        }
        view
    }

    fn not_ready(kind: MediaKind, message: String) -> Self {
        let mut view = Self {
            message: Some(message),
            ..Default::default()
        };
        match kind {
            MediaKind::Video => view.video_ready = Some(false),
            MediaKind::Image => view.image_ready = Some(false),
        }
        view
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    job: JobView,
    #[serde(flatten)]
    artifact: ArtifactView,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobsResponse {
    jobs: BTreeMap<String, JobView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

pub(super) fn job_not_found(job_id: &str) -> AppError {
    AppError::NotFoundError(anyhow::anyhow!("job {} not found", job_id))
}

/// Where the job's artifact is on disk. A cached path is reused while the
/// file still exists; otherwise the output folder is searched, once more
/// after a short delay when `retry` is set, and a hit is cached.
pub(super) async fn locate_artifact(
    app_state: &AppState,
    record: &JobRecord,
    retry: bool,
) -> Option<PathBuf> {
    if let Some(path) = record.artifact_path() {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Some(path.to_path_buf());
        }
    }

    let resolver = app_state.resolver();
    let found = if retry {
        resolve_with_retry(
            resolver,
            record.id(),
            app_state.config().artifact_retry_delay(),
        )
        .await
    } else {
        resolver.resolve(record.id()).await
    };

    if let Some(path) = &found {
        app_state.jobs().set_artifact(record.id(), path).await;
    }
    found
}

fn is_named_for(path: &FsPath, job_id: &str) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().contains(job_id))
}

async fn remove_inputs(app_state: &AppState, names: &[String]) {
    for name in names {
        let path = app_state.config().input_dir.join(name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!("cleanup of {} skipped: {}", path.display(), e);
        }
    }
}

/// Submit a job
///
/// Validate the request, fetch its input media, fill in the workflow and
/// queue it on ComfyUI. Image deployments serve this under `/edit-image`.
#[utoipa::path(
    post,
    path = "/generate",
    request_body(content = GenerationPayload, content_type = "application/json"),
    responses(
        (status = OK, body = GenerateResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request.", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "ComfyUI unreachable or rejected the workflow.", body = ErrorResponse),
    ),
    tag = OPENAPI_TAG
)]
pub async fn generate(
    State(app_state): State<Arc<AppState>>,
    AppJson(body): AppJson<Value>,
) -> Result<AppJson<GenerateResponse>, AppError> {
    let deployment = app_state.deployment();
    let payload = deployment.parse_payload(body)?;

    let job_id = Uuid::new_v4().to_string();

    let input_files = fetch_inputs(
        app_state.client().http(),
        &payload.remote_inputs(&job_id),
        &app_state.config().input_dir,
    )
    .await?;

    let submitted = async {
        let prompt = payload.into_comfy_prompt(app_state.template(), &job_id)?;
        let events = app_state.client().connect_events(&job_id).await?;
        let run_id = app_state.client().submit(&prompt.prompt, &job_id).await?;
        Ok::<_, AppError>((prompt, events, run_id))
    }
    .await;

    let (prompt, events, run_id) = match submitted {
        Ok(submitted) => submitted,
        Err(e) => {
            remove_inputs(&app_state, &input_files).await;
            return Err(e);
        }
    };

    let record = JobRecord::new(&job_id, &run_id, input_files);
    let cancel = record.cancel_token();
    app_state.jobs().insert(record).await?;
    tracing::info!(job_id = %job_id, run_id = %run_id, "job queued");

    let watcher = CompletionWatcher::new(
        app_state.jobs().clone(),
        &job_id,
        &run_id,
        &prompt.output_node_id,
    );
    tokio::spawn(watcher.run(events, cancel, app_state.config().job_timeout()));

    Ok(AppJson(GenerateResponse {
        job_id,
        status: JobState::Queued,
        message: deployment.started_message().to_string(),
    }))
}

/// Check a job
///
/// Current state of a job. Once completed, also whether its artifact is
/// ready for download.
#[utoipa::path(
    get,
    path = "/status/{job_id}",
    responses(
        (status = OK, body = JobStatusResponse),
        (status = NOT_FOUND, description = "Job not found.", body = ErrorResponse),
    ),
    tag = OPENAPI_TAG
)]
pub async fn job_status(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<AppJson<JobStatusResponse>, AppError> {
    let record = app_state
        .jobs()
        .get(&job_id)
        .await
        .ok_or_else(|| job_not_found(&job_id))?;

    let artifact = if record.state() == JobState::Completed {
        artifact_view(&app_state, &record).await
    } else {
        ArtifactView::default()
    };

    Ok(AppJson(JobStatusResponse {
        job: JobView::from(&record),
        artifact,
    }))
}

async fn artifact_view(app_state: &AppState, record: &JobRecord) -> ArtifactView {
    let kind = app_state.deployment().media();

    let Some(path) = locate_artifact(app_state, record, true).await else {
        return ArtifactView::not_ready(
            kind,
            format!("{} generation completed but file not found", kind.noun()),
        );
    };

    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.len() > 0 => {
            ArtifactView::ready(kind, record.id(), &path, metadata.len())
        }
        Ok(_) => ArtifactView::not_ready(kind, format!("{} file is empty", kind.noun())),
        Err(e) => ArtifactView::not_ready(
            kind,
            format!("Error accessing {} file: {}", kind.noun().to_lowercase(), e),
        ),
    }
}

/// Download an artifact
///
/// Stream the file a completed job produced.
#[utoipa::path(
    get,
    path = "/download/{job_id}",
    responses(
        (status = OK, description = "The generated media file.", content_type = "application/octet-stream"),
        (status = BAD_REQUEST, description = "Job has not completed.", body = ErrorResponse),
        (status = NOT_FOUND, description = "Job or file not found.", body = ErrorResponse),
    ),
    tag = OPENAPI_TAG
)]
pub async fn download(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let record = app_state
        .jobs()
        .get(&job_id)
        .await
        .ok_or_else(|| job_not_found(&job_id))?;
    let kind = app_state.deployment().media();

    if record.state() != JobState::Completed {
        return Err(AppError::InvalidState(format!(
            "{} not ready. Current status: {}",
            kind.noun(),
            record.state()
        )));
    }

    let path = locate_artifact(&app_state, &record, false)
        .await
        .ok_or_else(|| {
            AppError::NotFoundError(anyhow::anyhow!(
                "{} file not found in output directory",
                kind.noun()
            ))
        })?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        AppError::NotFoundError(anyhow::anyhow!(
            "{} file not found at path {}: {}",
            kind.noun(),
            path.display(),
            e
        ))
    })?;
    let file_size = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .len();

    let file_name = kind.download_name(&job_id, &path);
    tracing::debug!("streaming {} as {}", path.display(), file_name);

    let headers = [
        (header::CONTENT_TYPE, kind.content_type(&path).to_string()),
        (header::CONTENT_LENGTH, file_size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        ),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// List jobs
#[utoipa::path(
    get,
    path = "/jobs",
    responses((status = OK, body = JobsResponse)),
    tag = OPENAPI_TAG
)]
pub async fn list_jobs(State(app_state): State<Arc<AppState>>) -> AppJson<JobsResponse> {
    let jobs = app_state
        .jobs()
        .list()
        .await
        .iter()
        .map(|record| (record.id().to_string(), JobView::from(record)))
        .collect();

    AppJson(JobsResponse { jobs })
}

/// Delete a job
///
/// Forget the job, stop watching it and remove its artifact if the file is
/// named after the job.
/// The run itself is not cancelled on ComfyUI.
#[utoipa::path(
    delete,
    path = "/jobs/{job_id}",
    responses(
        (status = OK, body = MessageResponse),
        (status = NOT_FOUND, description = "Job not found.", body = ErrorResponse),
    ),
    tag = OPENAPI_TAG
)]
pub async fn delete_job(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<AppJson<MessageResponse>, AppError> {
    let record = app_state
        .jobs()
        .remove(&job_id)
        .await
        .ok_or_else(|| job_not_found(&job_id))?;
    record.cancel_token().cancel();

    // a file found only by the freshness fallback may belong to another job
    if record.state() == JobState::Completed {
        if let Some(path) = locate_artifact(&app_state, &record, false).await {
            if is_named_for(&path, &job_id) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => tracing::info!(job_id = %job_id, "removed {}", path.display()),
                    Err(e) => tracing::debug!("cleanup of {} skipped: {}", path.display(), e),
                }
            } else {
                tracing::info!(job_id = %job_id, "kept {}, not named after the job", path.display());
            }
        }
    }

    Ok(AppJson(MessageResponse {
        message: "Job deleted".to_string(),
    }))
}
