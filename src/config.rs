use crate::workflow::payload::Deployment;
use anyhow::Context;
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub deployment: Deployment,
    pub comfy_url: Url,
    pub workflow_path: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Upper bound for a single job's watcher. `None` waits forever.
    pub job_timeout_secs: Option<u64>,
    pub artifact_retry_ms: u64,
}

trait FromEnvWithDefault: Sized {
    fn from_env_or_default(key: &str, default: Self) -> Self;
}

impl FromEnvWithDefault for u16 {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for u64 {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for String {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key).unwrap_or(default)
    }
}

impl FromEnvWithDefault for PathBuf {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var_os(key).map(PathBuf::from).unwrap_or(default)
    }
}

impl<T> FromEnvWithDefault for Option<T>
where
    T: FromStr,
{
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .or(default)
    }
}

// unparsable values are an error, not a fallback to the default
fn parse_env_strict<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("invalid value for {}: {:?}", key, raw))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: String::from_env_or_default("HOST", "0.0.0.0".into()),
            port: u16::from_env_or_default("PORT", 8189),
            deployment: parse_env_strict("DEPLOYMENT", "fastwan")?,
            comfy_url: parse_env_strict("COMFY_URL", "http://localhost:8188")?,
            workflow_path: PathBuf::from_env_or_default(
                "WORKFLOW_PATH",
                "/workspace/workflow_api.json".into(),
            ),
            input_dir: PathBuf::from_env_or_default("INPUT_DIR", "/workspace/ComfyUI/input".into()),
            output_dir: PathBuf::from_env_or_default(
                "OUTPUT_DIR",
                "/workspace/ComfyUI/output".into(),
            ),
            job_timeout_secs: Option::<u64>::from_env_or_default("JOB_TIMEOUT_SECS", None),
            artifact_retry_ms: u64::from_env_or_default("ARTIFACT_RETRY_MS", 1000),
        })
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    pub fn artifact_retry_delay(&self) -> Duration {
        Duration::from_millis(self.artifact_retry_ms)
    }
}
