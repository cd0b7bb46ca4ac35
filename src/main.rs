use comfy_jobs::config::AppConfig;
use comfy_jobs::run;
use comfy_jobs::state::AppState;
use tracing::{debug, error};

#[cfg(debug_assertions)]
use dotenv::dotenv;

#[tokio::main]
async fn main() {
    #[cfg(debug_assertions)]
    dotenv().ok();

    tracing_subscriber::fmt::init();

    if let Err(e) = start().await {
        error!("failed to start app: {:#}", e);
        std::process::exit(1);
    }
}

async fn start() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    debug!("config: {:?}", config);
    let state = AppState::new(config).await?;

    run(state).await
}
