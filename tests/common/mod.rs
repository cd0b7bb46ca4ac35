#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use comfy_jobs::{
    config::AppConfig, state::AppState, workflow::payload::Deployment,
    workflow::template::WorkflowTemplate,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::{path::Path, sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::sync::{broadcast, Mutex};
use tower::ServiceExt;
use url::Url;

pub const RUN_ID: &str = "run-1";

/// An in-process stand-in for ComfyUI. Like the real server, it only
/// delivers events to sockets that are open when they are emitted: the
/// scripted frames are broadcast the moment a prompt is queued.
pub struct FakeComfy {
    pub url: Url,
    pub prompts: Arc<Mutex<Vec<Value>>>,
}

struct FakeState {
    prompts: Arc<Mutex<Vec<Value>>>,
    frames: Vec<String>,
    reject: bool,
    events: broadcast::Sender<String>,
}

async fn queue_prompt(State(fake): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    fake.prompts.lock().await.push(body);

    if fake.reject {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"type": "prompt_outputs_failed_validation"}})),
        )
            .into_response();
    }

    for frame in &fake.frames {
        // no subscriber means the frame is lost
        let _ = fake.events.send(frame.clone());
    }

    Json(json!({"prompt_id": RUN_ID, "number": 0, "node_errors": {}})).into_response()
}

async fn events(State(fake): State<Arc<FakeState>>, ws: WebSocketUpgrade) -> Response {
    // subscribe before the upgrade response goes out
    let mut frames = fake.events.subscribe();

    ws.on_upgrade(move |mut socket| async move {
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(frame) => {
                        if socket.send(Message::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => return,
                },
                incoming = socket.recv() => {
                    if !matches!(incoming, Some(Ok(_))) {
                        return;
                    }
                }
            }
        }
    })
}

async fn spawn(frames: Vec<String>, reject: bool) -> FakeComfy {
    let prompts = Arc::new(Mutex::new(vec![]));
    let (events_tx, _) = broadcast::channel(64);
    let state = Arc::new(FakeState {
        prompts: prompts.clone(),
        frames,
        reject,
        events: events_tx,
    });

    let app = Router::new()
        .route("/prompt", post(queue_prompt))
        .route("/ws", get(events))
        .route("/media/cat.png", get(|| async { "cat-image-bytes" }))
        .route("/media/voice.mp3", get(|| async { "voice-bytes" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeComfy {
        url: Url::parse(&format!("http://{}", addr)).unwrap(),
        prompts,
    }
}

pub async fn fake_comfy(frames: Vec<String>) -> FakeComfy {
    spawn(frames, false).await
}

pub async fn rejecting_comfy() -> FakeComfy {
    spawn(vec![], true).await
}

pub fn progress(value: u32, max: u32) -> String {
    json!({
        "type": "progress",
        "data": {"value": value, "max": max, "prompt_id": RUN_ID, "node": "3"}
    })
    .to_string()
}

pub fn executed(node: &str) -> String {
    json!({
        "type": "executed",
        "data": {"node": node, "prompt_id": RUN_ID, "output": {}}
    })
    .to_string()
}

pub fn execution_error(message: &str) -> String {
    json!({
        "type": "execution_error",
        "data": {"prompt_id": RUN_ID, "exception_message": message}
    })
    .to_string()
}

pub fn fastwan_template() -> WorkflowTemplate {
    WorkflowTemplate::from_value(json!({
        "3": {"class_type": "KSampler", "inputs": {"seed": 1, "steps": 8, "cfg": 1.0}},
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
        "7": {"class_type": "CLIPTextEncode", "inputs": {"text": "blurry"}},
        "55": {"class_type": "Wan22ImageToVideoLatent", "inputs": {"width": 1280, "height": 704, "length": 121}},
        "57": {"class_type": "CreateVideo", "inputs": {"fps": 24}},
        "58": {"class_type": "SaveVideo", "inputs": {"filename_prefix": "video/ComfyUI"}}
    }))
    .unwrap()
}

pub fn qwen_template() -> WorkflowTemplate {
    WorkflowTemplate::from_value(json!({
        "3": {"inputs": {"seed": 0, "steps": 20, "cfg": 4.0}},
        "60": {"inputs": {"filename_prefix": "ComfyUI"}},
        "76": {"inputs": {"prompt": ""}},
        "77": {"inputs": {"prompt": ""}},
        "78": {"inputs": {"image": "example.png"}},
        "93": {"inputs": {"megapixels": 1.0}}
    }))
    .unwrap()
}

pub fn infinite_talk_template() -> WorkflowTemplate {
    WorkflowTemplate::from_value(json!({
        "125": {"inputs": {"audio": "example.mp3"}},
        "128": {"inputs": {"seed": 0, "steps": 4, "cfg": 1.0, "shift": 5, "scheduler": "lcm"}},
        "131": {"inputs": {"filename_prefix": "InfiniteTalk", "frame_rate": 25}},
        "194": {"inputs": {"fps": 25}},
        "241": {"inputs": {"positive_prompt": "", "negative_prompt": ""}},
        "245": {"inputs": {"value": 640}},
        "246": {"inputs": {"value": 640}},
        "270": {"inputs": {"value": 1000}},
        "284": {"inputs": {"image": "example.png"}}
    }))
    .unwrap()
}

pub fn test_config(comfy_url: &Url, dir: &TempDir, deployment: Deployment) -> AppConfig {
    let input_dir = dir.path().join("input");
    let output_dir = dir.path().join("output");
    std::fs::create_dir_all(&input_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();

    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        deployment,
        comfy_url: comfy_url.clone(),
        workflow_path: dir.path().join("workflow_api.json"),
        input_dir,
        output_dir,
        job_timeout_secs: None,
        artifact_retry_ms: 50,
    }
}

pub fn build_app(config: AppConfig, template: WorkflowTemplate) -> Router {
    comfy_jobs::app(AppState::with_template(config, template).unwrap())
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body.to_vec())
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let (status, _, body) = send(app, request).await;
    (status, json_body(&body))
}

pub async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _, body) = send(app, request).await;
    (status, json_body(&body))
}

pub async fn delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::delete(uri).body(Body::empty()).unwrap();
    let (status, _, body) = send(app, request).await;
    (status, json_body(&body))
}

/// Poll `/status/{job_id}` until the job reaches `state`, for at most 5s.
pub async fn wait_for_status(app: &Router, job_id: &str, state: &str) -> Value {
    let uri = format!("/status/{}", job_id);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    loop {
        let (status, body) = get_json(app, &uri).await;
        assert_eq!(status, StatusCode::OK, "unexpected status body: {}", body);
        if body["status"] == state {
            return body;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("job {} never became {}, last seen: {}", job_id, state, body);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn write_file(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
