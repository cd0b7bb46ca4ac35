use super::{require_positive, require_positive_f64, require_text, ComfyUIPrompt, ValidationError};
use crate::{
    artifact::{media::VIDEO_EXTENSIONS, ArtifactProfile},
    workflow::template::{NodeField, TemplateError, WorkflowTemplate},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const OUTPUT_NODE: &str = "58";
pub const OUTPUT_SUBFOLDER: &str = "FastWan";
pub const OUTPUT_PREFIX: &str = "api_";

pub struct FastWanNodes {
    pub positive: NodeField,
    pub negative: NodeField,
    pub seed: NodeField,
    pub steps: NodeField,
    pub cfg: NodeField,
    pub width: NodeField,
    pub height: NodeField,
    pub length: NodeField,
    pub fps: NodeField,
    pub filename_prefix: NodeField,
}

pub const NODES: FastWanNodes = FastWanNodes {
    positive: NodeField::new("6", "text"),
    negative: NodeField::new("7", "text"),
    seed: NodeField::new("3", "seed"),
    steps: NodeField::new("3", "steps"),
    cfg: NodeField::new("3", "cfg"),
    width: NodeField::new("55", "width"),
    height: NodeField::new("55", "height"),
    length: NodeField::new("55", "length"),
    fps: NodeField::new("57", "fps"),
    filename_prefix: NodeField::new(OUTPUT_NODE, "filename_prefix"),
};

impl FastWanNodes {
    pub fn fields(&self) -> Vec<NodeField> {
        vec![
            self.positive,
            self.negative,
            self.seed,
            self.steps,
            self.cfg,
            self.width,
            self.height,
            self.length,
            self.fps,
            self.filename_prefix,
        ]
    }
}

pub fn artifact_profile() -> ArtifactProfile {
    ArtifactProfile {
        prefix: OUTPUT_PREFIX,
        subfolder: Some(OUTPUT_SUBFOLDER),
        recursive: false,
        extensions: VIDEO_EXTENSIONS,
        marker: None,
        freshness: None,
    }
}

/// Text-to-video. Anything left out keeps the workflow's own value
/// (8 steps, cfg 1.0, 1280x704, 121 frames at 24 fps in the stock workflow).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FastWanPayload {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub seed: Option<u64>,
    pub steps: Option<u32>,
    pub cfg: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub length: Option<u32>,
    pub fps: Option<u32>,
}

impl FastWanPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("prompt", &self.prompt)?;
        require_positive("steps", self.steps)?;
        require_positive_f64("cfg", self.cfg)?;
        require_positive("width", self.width)?;
        require_positive("height", self.height)?;
        require_positive("length", self.length)?;
        require_positive("fps", self.fps)
    }

    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    pub fn into_comfy_prompt(
        &self,
        template: &WorkflowTemplate,
        job_id: &str,
    ) -> Result<ComfyUIPrompt, TemplateError> {
        let mut document = template.instantiate();

        document.set(NODES.positive, self.prompt.as_str())?;
        document.set_opt(
            NODES.negative,
            self.negative_prompt.as_deref().filter(|text| !text.is_empty()),
        )?;

        document.set_opt(NODES.seed, self.seed)?;
        document.set_opt(NODES.steps, self.steps)?;
        document.set_opt(NODES.cfg, self.cfg)?;

        document.set_opt(NODES.width, self.width)?;
        document.set_opt(NODES.height, self.height)?;
        document.set_opt(NODES.length, self.length)?;
        document.set_opt(NODES.fps, self.fps)?;

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
