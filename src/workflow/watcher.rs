use super::message::WorkflowMessage;
use crate::job::{store::JobStore, JobEvent};
use futures_util::{Stream, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

/// Follows one job on the ComfyUI event stream and records what happens to
/// it in the store.
pub struct CompletionWatcher<S: JobStore> {
    store: S,
    job_id: String,
    run_id: String,
    output_node_id: String,
}

enum Outcome {
    Finished,
    Cancelled,
    TimedOut(Duration),
}

impl<S: JobStore> CompletionWatcher<S> {
    pub fn new(store: S, job_id: &str, run_id: &str, output_node_id: &str) -> Self {
        Self {
            store,
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
            output_node_id: output_node_id.to_string(),
        }
    }

    fn is_other_run(&self, prompt_id: Option<&str>) -> bool {
        prompt_id.is_some_and(|id| id != self.run_id)
    }

    /// Update the job when a new message comes in. Return `true` if the job is done.
    async fn on_message(&mut self, message: WorkflowMessage) -> bool {
        tracing::trace!("workflow on_message: {:?}", &message);

        match message {
            WorkflowMessage::ExecutionStart(data) => {
                if data.prompt_id == self.run_id {
                    tracing::debug!("execution start");
                    self.store.apply(&self.job_id, JobEvent::Started).await;
                }
            }
            WorkflowMessage::Progress(data) => {
                if !self.is_other_run(data.prompt_id.as_deref()) {
                    self.store
                        .apply(&self.job_id, JobEvent::Progress(data.percent()))
                        .await;
                }
            }
            WorkflowMessage::Executed(data) => {
                if data.prompt_id == self.run_id && data.node == self.output_node_id {
                    tracing::info!("output node {} executed", data.node);
                    self.store.apply(&self.job_id, JobEvent::Completed).await;
                    return true;
                }
            }
            WorkflowMessage::ExecutionError(error) => {
                if !self.is_other_run(error.prompt_id.as_deref()) {
                    tracing::info!("execution error: {:?}", error);
                    let detail = error
                        .exception_message
                        .unwrap_or_else(|| "Unknown execution error".to_string());
                    self.store
                        .apply(&self.job_id, JobEvent::Failed(detail))
                        .await;
                    return true;
                }
            }
            WorkflowMessage::ExecutionSuccess(data) => {
                if data.prompt_id == self.run_id {
                    tracing::debug!("execution success, waiting for output node");
                }
            }
            WorkflowMessage::Status(_)
            | WorkflowMessage::ExecutionCached(_)
            | WorkflowMessage::Executing(_) => {
                // safely ignore
            }
        }

        false
    }

    /// Read frames until the job finishes or the stream ends.
    /// A read error fails the job; a close frame leaves it as it is.
    pub async fn consume<St>(&mut self, mut stream: St)
    where
        St: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<WorkflowMessage>(&text) {
                    Ok(data) => {
                        if self.on_message(data).await {
                            return;
                        }
                    }
                    Err(_) => {
                        tracing::debug!("ignored message: {}", text);
                    }
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!("event stream closed: {:?}", frame);
                    return;
                }
                Ok(_) => {
                    // binary previews and control frames
                }
                Err(e) => {
                    tracing::warn!("websocket error: {}", e);
                    self.store
                        .apply(&self.job_id, JobEvent::Failed(e.to_string()))
                        .await;
                    return;
                }
            }
        }
    }

    async fn watch<St>(&mut self, events: St)
    where
        St: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        self.store.apply(&self.job_id, JobEvent::Started).await;
        self.consume(events).await;
    }

    /// Follow the job on an already open event stream until it finishes,
    /// `cancel` fires, or `timeout` elapses. A timeout fails the job.
    #[tracing::instrument(skip_all, fields(job_id = %self.job_id))]
    pub async fn run<St>(mut self, events: St, cancel: CancellationToken, timeout: Option<Duration>)
    where
        St: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        tracing::debug!("watching run {}", self.run_id);

        let outcome = {
            let watch = self.watch(events);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Outcome::Cancelled,
                finished = async {
                    match timeout {
                        Some(limit) => tokio::time::timeout(limit, watch).await.map_err(|_| limit),
                        None => {
                            watch.await;
                            Ok(())
                        }
                    }
                } => match finished {
                    Ok(()) => Outcome::Finished,
                    Err(limit) => Outcome::TimedOut(limit),
                },
            }
        };

        match outcome {
            Outcome::Finished => tracing::debug!("watcher finished"),
            Outcome::Cancelled => tracing::info!("watcher cancelled"),
            Outcome::TimedOut(limit) => {
                tracing::warn!("no result after {:?}", limit);
                self.store
                    .apply(
                        &self.job_id,
                        JobEvent::Failed(format!(
                            "timed out after {}s waiting for backend",
                            limit.as_secs()
                        )),
                    )
                    .await;
            }
        }
    }
}
