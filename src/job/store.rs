use super::{JobEvent, JobRecord, JobState};
use std::{collections::HashMap, future::Future, path::Path, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("job {0} already exists")]
    Duplicate(String),
}

/// Storage for job records, shared between request handlers and watchers.
pub trait JobStore: Send + Sync {
    /// Insert a new record. Ids are never reused.
    fn insert(
        &self,
        record: JobRecord,
    ) -> impl Future<Output = Result<(), JobStoreError>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Option<JobRecord>> + Send;

    fn list(&self) -> impl Future<Output = Vec<JobRecord>> + Send;

    fn remove(&self, id: &str) -> impl Future<Output = Option<JobRecord>> + Send;

    /// Apply an event to the job with given id.
    /// Returns `false` if the job is unknown or the event changed nothing.
    fn apply(&self, id: &str, event: JobEvent) -> impl Future<Output = bool> + Send;

    /// Remember where a completed job's artifact was found.
    fn set_artifact(&self, id: &str, path: &Path) -> impl Future<Output = ()> + Send;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    async fn insert(&self, record: JobRecord) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(record.id()) {
            return Err(JobStoreError::Duplicate(record.id().to_string()));
        }

        inner.insert(record.id().to_string(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<JobRecord> {
        self.inner.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<JobRecord> {
        self.inner.read().await.values().cloned().collect()
    }

    async fn remove(&self, id: &str) -> Option<JobRecord> {
        self.inner.write().await.remove(id)
    }

    async fn apply(&self, id: &str, event: JobEvent) -> bool {
        let mut inner = self.inner.write().await;
        match inner.get_mut(id) {
            Some(record) => {
                let changed = record.apply(event);
                if changed {
                    tracing::debug!(
                        job_id = id,
                        "job is now {} ({:.1}%)",
                        record.state(),
                        record.progress()
                    );
                }
                changed
            }
            None => false,
        }
    }

    async fn set_artifact(&self, id: &str, path: &Path) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.get_mut(id) {
            if record.state() == JobState::Completed {
                record.set_artifact_path(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let store = MemoryJobStore::new();
        store
            .insert(JobRecord::new("a", "run-a", vec![]))
            .await
            .unwrap();

        let err = store
            .insert(JobRecord::new("a", "run-other", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::Duplicate(id) if id == "a"));
        assert_eq!(store.get("a").await.unwrap().backend_run_id(), "run-a");
    }

    #[tokio::test]
    async fn removed_jobs_are_gone() {
        let store = MemoryJobStore::new();
        store
            .insert(JobRecord::new("a", "run-a", vec![]))
            .await
            .unwrap();

        assert!(store.remove("a").await.is_some());
        assert!(store.get("a").await.is_none());
        assert!(store.remove("a").await.is_none());
        assert!(!store.apply("a", JobEvent::Completed).await);
    }

    #[tokio::test]
    async fn artifact_is_only_recorded_for_completed_jobs() {
        let store = MemoryJobStore::new();
        store
            .insert(JobRecord::new("a", "run-a", vec![]))
            .await
            .unwrap();
        let path = PathBuf::from("/tmp/out/api_a.mp4");

        store.set_artifact("a", &path).await;
        assert!(store.get("a").await.unwrap().artifact_path().is_none());

        assert!(store.apply("a", JobEvent::Completed).await);
        store.set_artifact("a", &path).await;
        assert_eq!(
            store.get("a").await.unwrap().artifact_path(),
            Some(path.as_path())
        );
    }

    #[tokio::test]
    async fn list_returns_every_record() {
        let store = MemoryJobStore::new();
        for id in ["a", "b", "c"] {
            store.insert(JobRecord::new(id, id, vec![])).await.unwrap();
        }

        let mut ids: Vec<_> = store
            .list()
            .await
            .into_iter()
            .map(|r| r.id().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
