mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use comfy_jobs::workflow::payload::Deployment;
use common::*;
use serde_json::json;
use tempfile::tempdir;

#[tokio::test]
async fn video_job_runs_to_download() {
    let comfy = fake_comfy(vec![progress(50, 100), executed("58")]).await;
    let dir = tempdir().unwrap();
    let config = test_config(&comfy.url, &dir, Deployment::FastWan);
    let output_dir = config.output_dir.clone();
    let app = build_app(config, fastwan_template());

    let (status, body) = post_json(&app, "/generate", json!({"prompt": "a cat", "steps": 8})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "queued");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let prompts = comfy.prompts.lock().await.clone();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0]["client_id"], job_id.as_str());
    let workflow = &prompts[0]["prompt"];
    assert_eq!(workflow["6"]["inputs"]["text"], "a cat");
    assert_eq!(workflow["3"]["inputs"]["steps"], 8);
    assert_eq!(
        workflow["58"]["inputs"]["filename_prefix"],
        format!("FastWan/api_{}", job_id)
    );

    let video = output_dir.join("FastWan").join(format!("api_{}_00001_.mp4", job_id));
    write_file(&video, b"fake-mp4-bytes");

    let status = wait_for_status(&app, &job_id, "completed").await;
    assert_eq!(status["progress"], 100.0);
    assert_eq!(status["prompt_id"], RUN_ID);
    assert_eq!(status["video_ready"], true);
    assert_eq!(status["file_size"], 14);
    assert_eq!(status["download_url"], format!("/download/{}", job_id));

    let request = Request::get(format!("/download/{}", job_id))
        .body(Body::empty())
        .unwrap();
    let (status, headers, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"fake-mp4-bytes");
    assert_eq!(headers["content-type"], "video/mp4");
    assert_eq!(headers["content-length"], "14");
    assert_eq!(
        headers["content-disposition"],
        format!("attachment; filename=\"generated_video_{}.mp4\"", job_id).as_str()
    );
}

#[tokio::test]
async fn fully_cached_run_is_not_missed() {
    // every event is emitted while the prompt is being queued
    let comfy = fake_comfy(vec![
        json!({"type": "execution_start", "data": {"prompt_id": RUN_ID}}).to_string(),
        json!({"type": "execution_cached", "data": {"nodes": ["3", "6", "58"], "prompt_id": RUN_ID}})
            .to_string(),
        executed("58"),
        json!({"type": "execution_success", "data": {"prompt_id": RUN_ID}}).to_string(),
    ])
    .await;
    let dir = tempdir().unwrap();
    let app = build_app(
        test_config(&comfy.url, &dir, Deployment::FastWan),
        fastwan_template(),
    );

    let (status, body) = post_json(&app, "/generate", json!({"prompt": "a cat"})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let status = wait_for_status(&app, &job_id, "completed").await;
    assert_eq!(status["progress"], 100.0);
}

#[tokio::test]
async fn completed_job_without_file_reports_not_ready() {
    let comfy = fake_comfy(vec![executed("58")]).await;
    let dir = tempdir().unwrap();
    let app = build_app(
        test_config(&comfy.url, &dir, Deployment::FastWan),
        fastwan_template(),
    );

    let (_, body) = post_json(&app, "/generate", json!({"prompt": "a cat"})).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let status = wait_for_status(&app, &job_id, "completed").await;
    assert_eq!(status["video_ready"], false);
    assert_eq!(status["message"], "Video generation completed but file not found");

    let (status, _) = get_json(&app, &format!("/download/{}", job_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn execution_error_fails_the_job() {
    let comfy = fake_comfy(vec![progress(10, 100), execution_error("CUDA out of memory")]).await;
    let dir = tempdir().unwrap();
    let app = build_app(
        test_config(&comfy.url, &dir, Deployment::FastWan),
        fastwan_template(),
    );

    let (_, body) = post_json(&app, "/generate", json!({"prompt": "a cat"})).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let status = wait_for_status(&app, &job_id, "failed").await;
    assert_eq!(status["error"], "CUDA out of memory");
    assert!(status.get("video_ready").is_none());

    let (status, body) = get_json(&app, &format!("/download/{}", job_id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Video not ready. Current status: failed");
}

#[tokio::test]
async fn silent_backend_times_out() {
    let comfy = fake_comfy(vec![]).await;
    let dir = tempdir().unwrap();
    let mut config = test_config(&comfy.url, &dir, Deployment::FastWan);
    config.job_timeout_secs = Some(1);
    let app = build_app(config, fastwan_template());

    let (_, body) = post_json(&app, "/generate", json!({"prompt": "a cat"})).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let status = wait_for_status(&app, &job_id, "failed").await;
    assert_eq!(status["error"], "timed out after 1s waiting for backend");
}

#[tokio::test]
async fn image_edit_fetches_input_and_serves_image() {
    let comfy = fake_comfy(vec![executed("60")]).await;
    let dir = tempdir().unwrap();
    let config = test_config(&comfy.url, &dir, Deployment::QwenImageEdit);
    let input_dir = config.input_dir.clone();
    let output_dir = config.output_dir.clone();
    let app = build_app(config, qwen_template());

    let image_url = comfy.url.join("/media/cat.png").unwrap();
    let (status, body) = post_json(
        &app,
        "/edit-image",
        json!({"image_url": image_url.as_str(), "prompt": "make it blue", "seed": 7}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let input_name = format!("image_{}.jpg", job_id);
    let fetched = std::fs::read(input_dir.join(&input_name)).unwrap();
    assert_eq!(fetched, b"cat-image-bytes");

    let prompts = comfy.prompts.lock().await.clone();
    let workflow = &prompts[0]["prompt"];
    assert_eq!(workflow["78"]["inputs"]["image"], input_name.as_str());
    assert_eq!(workflow["76"]["inputs"]["prompt"], "make it blue");
    assert_eq!(workflow["3"]["inputs"]["seed"], 7);

    write_file(
        &output_dir.join("QwenEdit").join(format!("api_{}_00001_.png", job_id)),
        b"png",
    );

    let status = wait_for_status(&app, &job_id, "completed").await;
    assert_eq!(status["image_ready"], true);
    assert_eq!(status["input_files"], json!([input_name]));

    let request = Request::get(format!("/download/{}", job_id))
        .body(Body::empty())
        .unwrap();
    let (status, headers, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"png");
    assert_eq!(headers["content-type"], "image/png");
    assert_eq!(
        headers["content-disposition"],
        format!("attachment; filename=\"edited_image_{}.png\"", job_id).as_str()
    );
}
