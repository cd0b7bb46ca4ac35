use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use url::Url;

/// A subscription to ComfyUI's event stream for one client id.
pub type EventStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("ComfyUI is unreachable: {0}")]
    Unavailable(#[source] reqwest::Error),
    #[error("failed to connect to ComfyUI event stream: {0}")]
    EventStream(#[source] tungstenite::Error),
    #[error("ComfyUI rejected the workflow ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("invalid response from ComfyUI: {0}")]
    InvalidResponse(String),
}

/// HTTP side of the ComfyUI API, plus the address of its event stream.
#[derive(Clone, Debug)]
pub struct ComfyClient {
    http: Client,
    prompt_url: Url,
    ws_base: Url,
}

impl ComfyClient {
    pub fn new(base: &Url) -> Result<Self, url::ParseError> {
        let prompt_url = base.join("/prompt")?;

        let mut ws_base = base.join("/ws")?;
        let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is always an allowed scheme change
        let _ = ws_base.set_scheme(scheme);

        Ok(Self {
            http: Client::new(),
            prompt_url,
            ws_base,
        })
    }

    /// Shared connection pool, also used for fetching input media.
    pub fn http(&self) -> &Client {
        &self.http
    }

    fn ws_url(&self, client_id: &str) -> Url {
        let mut url = self.ws_base.clone();
        url.set_query(Some(&format!("clientId={}", client_id)));
        url
    }

    /// Subscribe to the events for `client_id`. ComfyUI only delivers events
    /// to sockets open at the time they are sent, so this must happen before
    /// the prompt is queued.
    pub async fn connect_events(&self, client_id: &str) -> Result<EventStream, SubmitError> {
        let ws_url = self.ws_url(client_id);
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(SubmitError::EventStream)?;
        tracing::debug!("subscribed to {}", ws_url);
        Ok(ws_stream)
    }

    /// Queue `prompt` and return the backend's `prompt_id`. Never retried.
    #[tracing::instrument(skip_all, fields(client_id = %client_id))]
    pub async fn submit(&self, prompt: &Value, client_id: &str) -> Result<String, SubmitError> {
        let response = self
            .http
            .post(self.prompt_url.clone())
            .json(&json!({
                "prompt": prompt,
                "client_id": client_id
            }))
            .send()
            .await
            .map_err(SubmitError::Unavailable)?;

        let status = response.status();
        let body = response.text().await.map_err(SubmitError::Unavailable)?;
        tracing::debug!("response: {} {}", status, body);

        if !status.is_success() {
            return Err(SubmitError::Rejected { status, body });
        }

        let response_json = serde_json::from_str::<Value>(&body)
            .map_err(|_| SubmitError::InvalidResponse(body.clone()))?;

        let prompt_id = response_json
            .get("prompt_id")
            .ok_or(SubmitError::InvalidResponse(
                "cannot find prompt_id".to_string(),
            ))?;
        let prompt_id = prompt_id
            .as_str()
            .ok_or(SubmitError::InvalidResponse(format!(
                "invalid prompt_id ({})",
                prompt_id
            )))?;

        tracing::info!("prompt_id: {}", prompt_id);

        Ok(prompt_id.to_string())
    }
}
