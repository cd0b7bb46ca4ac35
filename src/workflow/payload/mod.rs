pub mod fastwan;
pub mod infinite_talk;
pub mod qwen_edit;
pub mod wan_loras;

use super::template::{NodeField, TemplateError, WorkflowTemplate};
use crate::artifact::{media::MediaKind, ArtifactProfile};
use fastwan::FastWanPayload;
use infinite_talk::InfiniteTalkPayload;
use qwen_edit::QwenEditPayload;
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, path::PathBuf, str::FromStr};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;
use wan_loras::WanLorasPayload;

/// The workflow a running instance serves. Chosen once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deployment {
    #[serde(rename = "fastwan")]
    FastWan,
    #[serde(rename = "infinite_talk")]
    InfiniteTalk,
    #[serde(rename = "qwen_image_edit")]
    QwenImageEdit,
    #[serde(rename = "wan_loras")]
    WanLoras,
}

#[derive(Error, Debug)]
#[error("unknown deployment {0:?}, expected one of fastwan, infinite_talk, qwen_image_edit, wan_loras")]
pub struct UnknownDeployment(String);

impl FromStr for Deployment {
    type Err = UnknownDeployment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastwan" | "fastwan2.2-5b" => Ok(Deployment::FastWan),
            "infinite_talk" | "infinite-talk" | "infinitetalk" => Ok(Deployment::InfiniteTalk),
            "qwen_image_edit" | "qwen-image-edit" => Ok(Deployment::QwenImageEdit),
            "wan_loras" | "wan-loras" | "wan2.2-14b-loras" => Ok(Deployment::WanLoras),
            _ => Err(UnknownDeployment(s.to_string())),
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Deployment::FastWan => "fastwan",
            Deployment::InfiniteTalk => "infinite_talk",
            Deployment::QwenImageEdit => "qwen_image_edit",
            Deployment::WanLoras => "wan_loras",
        })
    }
}

impl Deployment {
    pub fn title(self) -> &'static str {
        match self {
            Deployment::FastWan => "FastWAN 2.2-5B Video Generation API",
            Deployment::InfiniteTalk => "InfiniteTalk Video Generation API",
            Deployment::QwenImageEdit => "Qwen Image Edit API",
            Deployment::WanLoras => "WAN 2.2-14B LoRAs Image-to-Video API",
        }
    }

    pub fn submit_path(self) -> &'static str {
        match self {
            Deployment::QwenImageEdit => "/edit-image",
            _ => "/generate",
        }
    }

    pub fn started_message(self) -> &'static str {
        match self {
            Deployment::FastWan => "Video generation started",
            Deployment::InfiniteTalk => "Talking video generation started",
            Deployment::QwenImageEdit => "Image editing started",
            Deployment::WanLoras => "Image-to-video generation started",
        }
    }

    pub fn media(self) -> MediaKind {
        match self {
            Deployment::QwenImageEdit => MediaKind::Image,
            _ => MediaKind::Video,
        }
    }

    /// Node whose `executed` message marks the job as done.
    pub fn output_node_id(self) -> &'static str {
        match self {
            Deployment::FastWan => fastwan::OUTPUT_NODE,
            Deployment::InfiniteTalk => infinite_talk::OUTPUT_NODE,
            Deployment::QwenImageEdit => qwen_edit::OUTPUT_NODE,
            Deployment::WanLoras => wan_loras::OUTPUT_NODE,
        }
    }

    /// Every template field this deployment writes.
    pub fn node_fields(self) -> Vec<NodeField> {
        match self {
            Deployment::FastWan => fastwan::NODES.fields(),
            Deployment::InfiniteTalk => infinite_talk::NODES.fields(),
            Deployment::QwenImageEdit => qwen_edit::NODES.fields(),
            Deployment::WanLoras => wan_loras::NODES.fields(),
        }
    }

    pub fn artifact_profile(self) -> ArtifactProfile {
        match self {
            Deployment::FastWan => fastwan::artifact_profile(),
            Deployment::InfiniteTalk => infinite_talk::artifact_profile(),
            Deployment::QwenImageEdit => qwen_edit::artifact_profile(),
            Deployment::WanLoras => wan_loras::artifact_profile(),
        }
    }

    pub fn validate_template(self, template: &WorkflowTemplate) -> Result<(), TemplateError> {
        template.validate(&self.node_fields())
    }

    /// Decode a request body into this deployment's payload and validate it.
    pub fn parse_payload(self, body: Value) -> Result<GenerationPayload, ValidationError> {
        let payload = match self {
            Deployment::FastWan => GenerationPayload::FastWan(decode(body)?),
            Deployment::InfiniteTalk => GenerationPayload::InfiniteTalk(decode(body)?),
            Deployment::QwenImageEdit => GenerationPayload::QwenImageEdit(decode(body)?),
            Deployment::WanLoras => GenerationPayload::WanLoras(decode(body)?),
        };
        payload.validate()?;
        Ok(payload)
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ValidationError> {
    serde_json::from_value(body).map_err(|e| ValidationError::new("body", e.to_string()))
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A request body, one variant per deployment.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum GenerationPayload {
    FastWan(FastWanPayload),
    InfiniteTalk(InfiniteTalkPayload),
    QwenImageEdit(QwenEditPayload),
    WanLoras(WanLorasPayload),
}

impl GenerationPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            GenerationPayload::FastWan(payload) => payload.validate(),
            GenerationPayload::InfiniteTalk(payload) => payload.validate(),
            GenerationPayload::QwenImageEdit(payload) => payload.validate(),
            GenerationPayload::WanLoras(payload) => payload.validate(),
        }
    }

    /// Media that must be copied into the backend's input folder before
    /// the workflow can reference it.
    pub fn remote_inputs(&self, job_id: &str) -> Vec<RemoteInput> {
        match self {
            GenerationPayload::FastWan(_) => vec![],
            GenerationPayload::InfiniteTalk(payload) => payload.remote_inputs(job_id),
            GenerationPayload::QwenImageEdit(payload) => payload.remote_inputs(job_id),
            GenerationPayload::WanLoras(payload) => payload.remote_inputs(job_id),
        }
    }

    pub fn into_comfy_prompt(
        &self,
        template: &WorkflowTemplate,
        job_id: &str,
    ) -> Result<ComfyUIPrompt, TemplateError> {
        match self {
            GenerationPayload::FastWan(payload) => payload.into_comfy_prompt(template, job_id),
            GenerationPayload::InfiniteTalk(payload) => payload.into_comfy_prompt(template, job_id),
            GenerationPayload::QwenImageEdit(payload) => payload.into_comfy_prompt(template, job_id),
            GenerationPayload::WanLoras(payload) => payload.into_comfy_prompt(template, job_id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ComfyUIPrompt {
    pub prompt: Value,
    pub output_node_id: String,
}

/// A URL to fetch into the input folder under `file_name`.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteInput {
    /// Request field the URL came from, for error reporting.
    pub field: &'static str,
    pub url: Url,
    pub file_name: String,
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

fn require_positive(field: &'static str, value: Option<u32>) -> Result<(), ValidationError> {
    if value == Some(0) {
        return Err(ValidationError::new(field, "must be greater than 0"));
    }
    Ok(())
}

fn require_positive_f64(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !(v.is_finite() && v > 0.0) => {
            Err(ValidationError::new(field, "must be greater than 0"))
        }
        _ => Ok(()),
    }
}

fn require_http_url(field: &'static str, url: &Url) -> Result<(), ValidationError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ValidationError::new(
            field,
            format!("unsupported URL scheme {:?}", scheme),
        )),
    }
}

/// Extension of the last URL path segment, including the dot.
fn url_extension(url: &Url) -> Option<String> {
    let file_name = url.path_segments()?.last()?;
    let extension = PathBuf::from(file_name).extension()?.to_string_lossy().to_string();
    Some(format!(".{}", extension))
}

/// A seed for requests that did not ask for one, kept in the 31-bit range
/// samplers accept.
fn random_seed() -> u64 {
    rand::rng().random_range(0..2_147_483_647)
}
