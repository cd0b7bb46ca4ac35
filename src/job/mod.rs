pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the backend told us about a job.
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    Started,
    /// Percentage, already clamped to `[0, 100]`.
    Progress(f32),
    Completed,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct JobRecord {
    id: String,
    state: JobState,
    progress: f32,
    backend_run_id: String,
    error_detail: Option<String>,
    artifact_path: Option<PathBuf>,
    input_files: Vec<String>,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl JobRecord {
    pub fn new(id: &str, backend_run_id: &str, input_files: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            state: JobState::Queued,
            progress: 0.0,
            backend_run_id: backend_run_id.to_string(),
            error_detail: None,
            artifact_path: None,
            input_files,
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn backend_run_id(&self) -> &str {
        &self.backend_run_id
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn input_files(&self) -> &[String] {
        &self.input_files
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Token observed by the job's completion watcher.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Apply an event, returning `true` if the record changed.
    ///
    /// Terminal records are frozen: every event is ignored once a job has
    /// completed or failed. Progress never moves backwards.
    pub fn apply(&mut self, event: JobEvent) -> bool {
        if self.state.is_terminal() {
            return false;
        }

        match event {
            JobEvent::Started => {
                if self.state == JobState::Queued {
                    self.state = JobState::Processing;
                    self.progress = 0.0;
                    true
                } else {
                    false
                }
            }
            JobEvent::Progress(value) => {
                let value = value.clamp(0.0, 100.0);
                let changed = self.state != JobState::Processing || value > self.progress;
                self.state = JobState::Processing;
                if value > self.progress {
                    self.progress = value;
                }
                changed
            }
            JobEvent::Completed => {
                self.state = JobState::Completed;
                self.progress = 100.0;
                true
            }
            JobEvent::Failed(detail) => {
                self.state = JobState::Failed;
                self.error_detail = Some(detail);
                true
            }
        }
    }

    pub(crate) fn set_artifact_path(&mut self, path: &Path) {
        self.artifact_path = Some(path.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new("job-1", "run-1", vec![])
    }

    #[test]
    fn new_record_is_queued_at_zero() {
        let record = record();
        assert_eq!(record.state(), JobState::Queued);
        assert_eq!(record.progress(), 0.0);
        assert!(record.error_detail().is_none());
        assert!(record.artifact_path().is_none());
    }

    #[test]
    fn terminal_state_is_frozen() {
        let mut record = record();
        assert!(record.apply(JobEvent::Started));
        assert!(record.apply(JobEvent::Completed));

        assert!(!record.apply(JobEvent::Failed("late error".into())));
        assert!(!record.apply(JobEvent::Progress(10.0)));
        assert!(!record.apply(JobEvent::Started));

        assert_eq!(record.state(), JobState::Completed);
        assert_eq!(record.progress(), 100.0);
        assert!(record.error_detail().is_none());
    }

    #[test]
    fn failure_keeps_error_text_and_ignores_completion() {
        let mut record = record();
        record.apply(JobEvent::Failed("CUDA OOM".into()));
        assert!(!record.apply(JobEvent::Completed));

        assert_eq!(record.state(), JobState::Failed);
        assert_eq!(record.error_detail(), Some("CUDA OOM"));
    }

    #[test]
    fn progress_is_clamped_and_never_decreases() {
        let mut record = record();
        record.apply(JobEvent::Progress(40.0));
        assert_eq!(record.state(), JobState::Processing);

        assert!(!record.apply(JobEvent::Progress(20.0)));
        assert_eq!(record.progress(), 40.0);

        record.apply(JobEvent::Progress(250.0));
        assert_eq!(record.progress(), 100.0);
        assert_eq!(record.state(), JobState::Processing);
    }

    #[test]
    fn start_is_a_noop_while_processing() {
        let mut record = record();
        record.apply(JobEvent::Progress(30.0));
        assert!(!record.apply(JobEvent::Started));
        assert_eq!(record.progress(), 30.0);
    }
}
