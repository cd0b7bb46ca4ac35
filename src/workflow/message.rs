use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: Value,
    pub sid: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionStartMessage {
    pub prompt_id: String,
    pub timestamp: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionCachedMessage {
    #[serde(default)]
    pub nodes: Vec<String>,
    pub prompt_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutingMessage {
    /// `None` once the whole prompt has finished.
    pub node: Option<String>,
    pub display_node: Option<String>,
    pub prompt_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub value: f64,
    pub max: f64,
    pub prompt_id: Option<String>,
    pub node: Option<String>,
}

impl ProgressMessage {
    /// Progress as a percentage in `[0, 100]`. A non-positive `max` counts as 1.
    pub fn percent(&self) -> f32 {
        let max = if self.max > 0.0 { self.max } else { 1.0 };
        (self.value / max * 100.0).clamp(0.0, 100.0) as f32
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutedMessage {
    pub node: String,
    pub prompt_id: String,
    #[serde(default)]
    pub output: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionSuccessMessage {
    pub prompt_id: String,
    pub timestamp: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionErrorMessage {
    pub prompt_id: Option<String>,
    pub node_id: Option<String>,
    pub node_type: Option<String>,
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
    // traceback and input snapshots are not needed
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "data")]
#[non_exhaustive]
pub enum WorkflowMessage {
    Status(StatusMessage),
    ExecutionStart(ExecutionStartMessage),
    ExecutionCached(ExecutionCachedMessage),
    Executing(ExecutingMessage),
    Progress(ProgressMessage),
    Executed(ExecutedMessage),
    ExecutionSuccess(ExecutionSuccessMessage),
    ExecutionError(ExecutionErrorMessage),
}
