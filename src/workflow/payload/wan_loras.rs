use super::{
    require_http_url, require_positive, require_positive_f64, require_text, url_extension,
    ComfyUIPrompt, RemoteInput, ValidationError,
};
use crate::{
    artifact::{media::VIDEO_EXTENSIONS, ArtifactProfile},
    workflow::template::{NodeField, TemplateError, WorkflowTemplate},
};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

pub const OUTPUT_NODE: &str = "39";
pub const OUTPUT_SUBFOLDER: &str = "wan22_t2v";
pub const OUTPUT_PREFIX: &str = "wan22_t2v_";

pub struct WanLorasNodes {
    pub image: NodeField,
    pub positive: NodeField,
    pub negative: NodeField,
    pub cfg_high_noise: NodeField,
    pub cfg_low_noise: NodeField,
    pub seed: NodeField,
    pub steps: NodeField,
    pub frames: NodeField,
    pub width: NodeField,
    pub height: NodeField,
    pub frame_rate: NodeField,
    pub filename_prefix: NodeField,
}

pub const NODES: WanLorasNodes = WanLorasNodes {
    image: NodeField::new("3", "image"),
    positive: NodeField::new("34", "text"),
    negative: NodeField::new("4", "text"),
    cfg_high_noise: NodeField::new("36", "cfg_high_noise"),
    cfg_low_noise: NodeField::new("36", "cfg_low_noise"),
    seed: NodeField::new("36", "noise_seed"),
    steps: NodeField::new("101", "value"),
    frames: NodeField::new("103", "value"),
    width: NodeField::new("106", "width"),
    height: NodeField::new("106", "height"),
    frame_rate: NodeField::new(OUTPUT_NODE, "frame_rate"),
    filename_prefix: NodeField::new(OUTPUT_NODE, "filename_prefix"),
};

impl WanLorasNodes {
    pub fn fields(&self) -> Vec<NodeField> {
        vec![
            self.image,
            self.positive,
            self.negative,
            self.cfg_high_noise,
            self.cfg_low_noise,
            self.seed,
            self.steps,
            self.frames,
            self.width,
            self.height,
            self.frame_rate,
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

fn default_negative_prompt() -> String {
    "slow, slow motion, 色调艳丽，过曝，静态，细节模糊不清，字幕，风格，作品，画作，画面，静止，\
     整体发灰，最差质量，低质量，JPEG压缩残留，丑陋的，残缺的，多余的手指，画得不好的手部，\
     画得不好的脸部，畸形的，毁容的，形态畸形的肢体，手指融合，静止不动的画面，杂乱的背景，\
     三条腿，背景人很多，倒着走"
        .to_string()
}

fn default_seed() -> u64 {
    1
}

fn default_steps() -> u32 {
    6
}

fn default_cfg() -> f64 {
    3.5
}

fn default_side() -> u32 {
    640
}

fn default_frames() -> u32 {
    81
}

fn default_fps() -> u32 {
    16
}

/// Image-to-video with the two-stage (high/low noise) LoRA sampler.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WanLorasPayload {
    #[schema(value_type = String)]
    pub image_url: Url,
    pub prompt: String,
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg")]
    pub cfg_high_noise: f64,
    #[serde(default = "default_cfg")]
    pub cfg_low_noise: f64,
    #[serde(default = "default_side")]
    pub width: u32,
    #[serde(default = "default_side")]
    pub height: u32,
    #[serde(default = "default_frames")]
    pub frames: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl WanLorasPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_http_url("image_url", &self.image_url)?;
        require_text("prompt", &self.prompt)?;
        require_positive("steps", Some(self.steps))?;
        require_positive_f64("cfg_high_noise", Some(self.cfg_high_noise))?;
        require_positive_f64("cfg_low_noise", Some(self.cfg_low_noise))?;
        require_positive("width", Some(self.width))?;
        require_positive("height", Some(self.height))?;
        require_positive("frames", Some(self.frames))?;
        require_positive("fps", Some(self.fps))
    }

    /// `{job_id}_input` plus the URL's extension, `.jpg` when it has none.
    pub fn image_file_name(&self, job_id: &str) -> String {
        let extension = url_extension(&self.image_url).unwrap_or_else(|| ".jpg".to_string());
        format!("{}_input{}", job_id, extension)
    }

    pub fn remote_inputs(&self, job_id: &str) -> Vec<RemoteInput> {
        vec![RemoteInput {
            field: "image_url",
            url: self.image_url.clone(),
            file_name: self.image_file_name(job_id),
        }]
    }

    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    pub fn into_comfy_prompt(
        &self,
        template: &WorkflowTemplate,
        job_id: &str,
    ) -> Result<ComfyUIPrompt, TemplateError> {
        let mut document = template.instantiate();

        document.set(NODES.image, self.image_file_name(job_id))?;
        document.set(NODES.positive, self.prompt.as_str())?;
        document.set(NODES.negative, self.negative_prompt.as_str())?;

        document.set(NODES.cfg_high_noise, self.cfg_high_noise)?;
        document.set(NODES.cfg_low_noise, self.cfg_low_noise)?;
        document.set(NODES.seed, self.seed)?;
        document.set(NODES.steps, self.steps)?;

        document.set(NODES.frames, self.frames)?;
        document.set(NODES.width, self.width)?;
        document.set(NODES.height, self.height)?;
        document.set(NODES.frame_rate, self.fps)?;

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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> WorkflowTemplate {
        WorkflowTemplate::from_value(json!({
            "3": {"inputs": {"image": "example.png"}},
            "4": {"inputs": {"text": ""}},
            "34": {"inputs": {"text": ""}},
            "36": {"inputs": {"cfg_high_noise": 1.0, "cfg_low_noise": 1.0, "noise_seed": 0}},
            "39": {"inputs": {"filename_prefix": "wan22", "frame_rate": 24}},
            "101": {"inputs": {"value": 4}},
            "103": {"inputs": {"value": 33}},
            "106": {"inputs": {"width": 512, "height": 512}}
        }))
        .unwrap()
    }

    fn payload(image_url: &str) -> WanLorasPayload {
        serde_json::from_value(json!({"image_url": image_url, "prompt": "a dancing fox"})).unwrap()
    }

    #[test]
    fn input_name_keeps_url_extension() {
        assert_eq!(
            payload("https://example.com/img/fox.png").image_file_name("job-1"),
            "job-1_input.png"
        );
        assert_eq!(
            payload("https://example.com/render?id=4").image_file_name("job-1"),
            "job-1_input.jpg"
        );
    }

    #[test]
    fn patches_sampler_and_output_nodes() {
        let prompt = payload("https://example.com/fox.webp")
            .into_comfy_prompt(&template(), "job-1")
            .unwrap();
        let nodes = &prompt.prompt;

        assert_eq!(nodes["3"]["inputs"]["image"], "job-1_input.webp");
        assert_eq!(nodes["34"]["inputs"]["text"], "a dancing fox");
        assert!(nodes["4"]["inputs"]["text"]
            .as_str()
            .unwrap()
            .starts_with("slow, slow motion"));
        assert_eq!(nodes["36"]["inputs"]["cfg_high_noise"], 3.5);
        assert_eq!(nodes["36"]["inputs"]["noise_seed"], 1);
        assert_eq!(nodes["101"]["inputs"]["value"], 6);
        assert_eq!(nodes["103"]["inputs"]["value"], 81);
        assert_eq!(nodes["106"]["inputs"]["width"], 640);
        assert_eq!(nodes["39"]["inputs"]["frame_rate"], 16);
        assert_eq!(
            nodes["39"]["inputs"]["filename_prefix"],
            "wan22_t2v/wan22_t2v_job-1"
        );
    }

    #[test]
    fn rejects_zero_frames() {
        let mut payload = payload("https://example.com/fox.png");
        payload.frames = 0;
        assert_eq!(payload.validate().unwrap_err().field, "frames");
    }
}
