use crate::{
    artifact::PatternResolver,
    config::AppConfig,
    job::store::MemoryJobStore,
    workflow::{client::ComfyClient, payload::Deployment, template::WorkflowTemplate},
};
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct AppState {
    config: AppConfig,
    template: Arc<WorkflowTemplate>,
    jobs: MemoryJobStore,
    resolver: Arc<PatternResolver>,
    client: ComfyClient,
}

impl AppState {
    /// Prepare the input and output folders and load the workflow template
    /// named by the config. Fails if the template does not fit the deployment.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        for dir in [&config.input_dir, &config.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }

        let template = WorkflowTemplate::load(&config.workflow_path).await?;
        Self::with_template(config, template)
    }

    pub fn with_template(config: AppConfig, template: WorkflowTemplate) -> anyhow::Result<Self> {
        config
            .deployment
            .validate_template(&template)
            .with_context(|| {
                format!(
                    "workflow template does not fit the {} deployment",
                    config.deployment
                )
            })?;
        tracing::info!(
            "loaded {} workflow with {} nodes",
            config.deployment,
            template.node_count()
        );

        let client = ComfyClient::new(&config.comfy_url)
            .with_context(|| format!("invalid ComfyUI url {}", config.comfy_url))?;
        let resolver = PatternResolver::new(&config.output_dir, config.deployment.artifact_profile());

        Ok(Self {
            config,
            template: Arc::new(template),
            jobs: MemoryJobStore::new(),
            resolver: Arc::new(resolver),
            client,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn deployment(&self) -> Deployment {
        self.config.deployment
    }

    pub fn template(&self) -> &WorkflowTemplate {
        &self.template
    }

    pub fn jobs(&self) -> &MemoryJobStore {
        &self.jobs
    }

    pub fn resolver(&self) -> &PatternResolver {
        &self.resolver
    }

    pub fn client(&self) -> &ComfyClient {
        &self.client
    }
}
