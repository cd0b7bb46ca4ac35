pub mod artifact;
pub mod config;
pub mod job;
mod routes;
pub mod state;
pub mod workflow;

use axum::{
    extract::Request,
    routing::{delete, get, post},
    Router, ServiceExt,
};
use routes::{
    api_doc,
    debug::{debug_files, debug_job},
    jobs::{delete_job, download, generate, job_status, list_jobs},
};
use state::AppState;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tower::{Layer, ServiceBuilder};
use tower_http::cors::{Any, CorsLayer};
use tower_http::{normalize_path::NormalizePathLayer, trace::TraceLayer};
use utoipa_rapidoc::RapiDoc;

/// All routes of the service for the configured deployment.
pub fn app(app_state: AppState) -> Router {
    let deployment = app_state.deployment();

    let app = Router::new()
        .route("/", get(routes::root))
        .route(deployment.submit_path(), post(generate))
        .route("/status/:job_id", get(job_status))
        .route("/download/:job_id", get(download))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id", delete(delete_job))
        .route("/debug/files", get(debug_files))
        .route("/debug/job/:job_id", get(debug_job))
        .route("/health_check", get(routes::health_check))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", api_doc(deployment)).path("/docs"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(Arc::new(app_state));

    #[cfg(debug_assertions)]
    let app = app.layer(
        CorsLayer::new()
            .allow_headers(Any)
            .allow_origin(Any)
            .allow_methods(Any),
    );

    app
}

pub async fn run(app_state: AppState) -> anyhow::Result<()> {
    let config = app_state.config().clone();

    let app = NormalizePathLayer::trim_trailing_slash().layer(app(app_state));

    let addr = SocketAddr::from_str(format!("{}:{}", &config.host, &config.port).as_str())?;

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        "{} listening on http://{}, ComfyUI at {}",
        config.deployment,
        listener.local_addr()?,
        config.comfy_url
    );

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(signal_shutdown())
        .await?;

    Ok(())
}

async fn signal_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("signal shutdown");
}
