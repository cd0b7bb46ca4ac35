use super::{
    require_http_url, require_positive, require_positive_f64, require_text, ComfyUIPrompt,
    RemoteInput, ValidationError,
};
use crate::{
    artifact::ArtifactProfile,
    workflow::template::{NodeField, TemplateError, WorkflowTemplate},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use utoipa::ToSchema;

pub const OUTPUT_NODE: &str = "131";

/// The video combine node writes both a silent and a muxed (`-audio`) file,
/// sometimes as animated gif.
const EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "webm", "mkv", "gif"];

pub struct InfiniteTalkNodes {
    pub image: NodeField,
    pub audio: NodeField,
    pub positive: NodeField,
    pub negative: NodeField,
    pub seed: NodeField,
    pub steps: NodeField,
    pub cfg: NodeField,
    pub shift: NodeField,
    pub scheduler: NodeField,
    pub width: NodeField,
    pub height: NodeField,
    pub max_frames: NodeField,
    pub fps: NodeField,
    pub filename_prefix: NodeField,
    pub frame_rate: NodeField,
}

pub const NODES: InfiniteTalkNodes = InfiniteTalkNodes {
    image: NodeField::new("284", "image"),
    audio: NodeField::new("125", "audio"),
    positive: NodeField::new("241", "positive_prompt"),
    negative: NodeField::new("241", "negative_prompt"),
    seed: NodeField::new("128", "seed"),
    steps: NodeField::new("128", "steps"),
    cfg: NodeField::new("128", "cfg"),
    shift: NodeField::new("128", "shift"),
    scheduler: NodeField::new("128", "scheduler"),
    width: NodeField::new("245", "value"),
    height: NodeField::new("246", "value"),
    max_frames: NodeField::new("270", "value"),
    fps: NodeField::new("194", "fps"),
    filename_prefix: NodeField::new(OUTPUT_NODE, "filename_prefix"),
    frame_rate: NodeField::new(OUTPUT_NODE, "frame_rate"),
};

impl InfiniteTalkNodes {
    pub fn fields(&self) -> Vec<NodeField> {
        vec![
            self.image,
            self.audio,
            self.positive,
            self.negative,
            self.seed,
            self.steps,
            self.cfg,
            self.shift,
            self.scheduler,
            self.width,
            self.height,
            self.max_frames,
            self.fps,
            self.filename_prefix,
            self.frame_rate,
        ]
    }
}

pub fn artifact_profile() -> ArtifactProfile {
    ArtifactProfile {
        prefix: "",
        subfolder: None,
        recursive: true,
        extensions: EXTENSIONS,
        marker: Some("-audio"),
        freshness: Some(Duration::from_secs(300)),
    }
}

pub fn image_file_name(job_id: &str) -> String {
    format!("image_{}.jpg", job_id)
}

pub fn audio_file_name(job_id: &str) -> String {
    format!("audio_{}.mp3", job_id)
}

fn default_prompt() -> String {
    "The video shows a young man singing a song.".to_string()
}

fn default_negative_prompt() -> String {
    "bright tones, overexposed, static, blurred details, subtitles, style, works, paintings, \
     images, static, overall gray, worst quality, low quality, JPEG compression residue, ugly, \
     incomplete, extra fingers, poorly drawn hands, poorly drawn faces, deformed, disfigured, \
     misshapen limbs, fused fingers, still picture, messy background, three legs, many people \
     in the background, walking backwards"
        .to_string()
}

fn default_seed() -> u64 {
    2
}

fn default_steps() -> u32 {
    6
}

fn default_cfg() -> f64 {
    1.0
}

fn default_shift() -> u32 {
    5
}

fn default_scheduler() -> String {
    "lcm".to_string()
}

fn default_width() -> u32 {
    450
}

fn default_height() -> u32 {
    800
}

fn default_max_frames() -> u32 {
    10000
}

fn default_fps() -> u32 {
    25
}

/// Lip-synced talking video from a portrait and a voice track.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct InfiniteTalkPayload {
    #[schema(value_type = String)]
    pub image_url: Url,
    #[schema(value_type = String)]
    pub audio_url: Url,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg")]
    pub cfg: f64,
    #[serde(default = "default_shift")]
    pub shift: u32,
    #[serde(default = "default_scheduler")]
    pub scheduler: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl InfiniteTalkPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_http_url("image_url", &self.image_url)?;
        require_http_url("audio_url", &self.audio_url)?;
        require_text("prompt", &self.prompt)?;
        require_text("scheduler", &self.scheduler)?;
        require_positive("steps", Some(self.steps))?;
        require_positive_f64("cfg", Some(self.cfg))?;
        require_positive("width", Some(self.width))?;
        require_positive("height", Some(self.height))?;
        require_positive("max_frames", Some(self.max_frames))?;
        require_positive("fps", Some(self.fps))
    }

    pub fn remote_inputs(&self, job_id: &str) -> Vec<RemoteInput> {
        vec![
            RemoteInput {
                field: "image_url",
                url: self.image_url.clone(),
                file_name: image_file_name(job_id),
            },
            RemoteInput {
                field: "audio_url",
                url: self.audio_url.clone(),
                file_name: audio_file_name(job_id),
            },
        ]
    }

    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    pub fn into_comfy_prompt(
        &self,
        template: &WorkflowTemplate,
        job_id: &str,
    ) -> Result<ComfyUIPrompt, TemplateError> {
        let mut document = template.instantiate();

        document.set(NODES.image, image_file_name(job_id))?;
        document.set(NODES.audio, audio_file_name(job_id))?;

        document.set(NODES.positive, self.prompt.as_str())?;
        document.set(NODES.negative, self.negative_prompt.as_str())?;

        document.set(NODES.seed, self.seed)?;
        document.set(NODES.steps, self.steps)?;
        document.set(NODES.cfg, self.cfg)?;
        document.set(NODES.shift, self.shift)?;
        document.set(NODES.scheduler, self.scheduler.as_str())?;

        document.set(NODES.width, self.width)?;
        document.set(NODES.height, self.height)?;
        document.set(NODES.max_frames, self.max_frames)?;
        document.set(NODES.fps, self.fps)?;

        document.set(NODES.filename_prefix, job_id)?;
        document.set(NODES.frame_rate, self.fps)?;

        Ok(ComfyUIPrompt {
            prompt: document.into_value(),
            output_node_id: OUTPUT_NODE.to_string(),
        })
    }
}
