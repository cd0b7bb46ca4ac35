use super::{
    random_seed, require_http_url, require_positive, require_positive_f64, require_text,
    ComfyUIPrompt, RemoteInput, ValidationError,
};
use crate::{
    artifact::{media::IMAGE_EXTENSIONS, ArtifactProfile},
    workflow::template::{NodeField, TemplateError, WorkflowTemplate},
};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

pub const OUTPUT_NODE: &str = "60";
pub const OUTPUT_SUBFOLDER: &str = "QwenEdit";
pub const OUTPUT_PREFIX: &str = "api_";

pub struct QwenEditNodes {
    pub image: NodeField,
    pub positive: NodeField,
    pub negative: NodeField,
    pub seed: NodeField,
    pub steps: NodeField,
    pub cfg: NodeField,
    pub megapixels: NodeField,
    pub filename_prefix: NodeField,
}

pub const NODES: QwenEditNodes = QwenEditNodes {
    image: NodeField::new("78", "image"),
    positive: NodeField::new("76", "prompt"),
    negative: NodeField::new("77", "prompt"),
    seed: NodeField::new("3", "seed"),
    steps: NodeField::new("3", "steps"),
    cfg: NodeField::new("3", "cfg"),
    megapixels: NodeField::new("93", "megapixels"),
    filename_prefix: NodeField::new(OUTPUT_NODE, "filename_prefix"),
};

impl QwenEditNodes {
    pub fn fields(&self) -> Vec<NodeField> {
        vec![
            self.image,
            self.positive,
            self.negative,
            self.seed,
            self.steps,
            self.cfg,
            self.megapixels,
            self.filename_prefix,
        ]
    }
}

pub fn artifact_profile() -> ArtifactProfile {
    ArtifactProfile {
        prefix: OUTPUT_PREFIX,
        subfolder: Some(OUTPUT_SUBFOLDER),
        recursive: false,
        extensions: IMAGE_EXTENSIONS,
        marker: None,
        freshness: None,
    }
}

pub fn image_file_name(job_id: &str) -> String {
    format!("image_{}.jpg", job_id)
}

fn default_steps() -> u32 {
    8
}

fn default_cfg() -> f64 {
    1.0
}

fn default_megapixels() -> f64 {
    1.0
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QwenEditPayload {
    #[schema(value_type = String)]
    pub image_url: Url,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// Random when omitted.
    pub seed: Option<u64>,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg")]
    pub cfg: f64,
    #[serde(default = "default_megapixels")]
    pub megapixels: f64,
}

impl QwenEditPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_http_url("image_url", &self.image_url)?;
        require_text("prompt", &self.prompt)?;
        require_positive("steps", Some(self.steps))?;
        require_positive_f64("cfg", Some(self.cfg))?;
        require_positive_f64("megapixels", Some(self.megapixels))
    }

    pub fn remote_inputs(&self, job_id: &str) -> Vec<RemoteInput> {
        vec![RemoteInput {
            field: "image_url",
            url: self.image_url.clone(),
            file_name: image_file_name(job_id),
        }]
    }

    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    pub fn into_comfy_prompt(
        &self,
        template: &WorkflowTemplate,
        job_id: &str,
    ) -> Result<ComfyUIPrompt, TemplateError> {
        let mut document = template.instantiate();

        document.set(NODES.image, image_file_name(job_id))?;
        document.set(NODES.positive, self.prompt.as_str())?;
        document.set(NODES.negative, self.negative_prompt.as_str())?;

        let seed = self.seed.unwrap_or_else(random_seed);
        tracing::debug!("seed: {}", seed);
        document.set(NODES.seed, seed)?;
        document.set(NODES.steps, self.steps)?;
        document.set(NODES.cfg, self.cfg)?;
        document.set(NODES.megapixels, self.megapixels)?;

        document.set(
            NODES.filename_prefix,
            format!("{}/{}{}", OUTPUT_SUBFOLDER, OUTPUT_PREFIX, job_id),
        )?;

        Ok(ComfyUIPrompt {
            prompt: document.into_value(),
            output_node_id: OUTPUT_NODE.to_string(),
        })
    }
}
