//! Integration tests for the `/api/v1/jobs` and webhook endpoints.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, build_test_app, default_app, get, post_empty, post_json, wait_for, wait_terminal,
    ScriptedBackend,
};
use mediaflow_core::job::{BackendRole, JobStatus, CANCELLED_REASON};
use mediaflow_core::types::JobId;
use serde_json::json;

async fn submit(app: &common::TestApp, body: serde_json::Value) -> JobId {
    let response = post_json(app, "/api/v1/jobs", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["id"].as_str().unwrap().parse().unwrap()
}

fn hanging_video_app() -> common::TestApp {
    build_test_app(vec![ScriptedBackend::hanging("vid", BackendRole::Video)])
}

// ---------------------------------------------------------------------------
// Submit and get
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submitted_image_job_completes_with_stored_output() {
    let app = default_app();

    let response = post_json(
        &app,
        "/api/v1/jobs",
        json!({ "type": "image", "prompt": "a lighthouse at dusk" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "queued");
    let id: JobId = json["data"]["id"].as_str().unwrap().parse().unwrap();

    wait_terminal(&app.pipeline, id).await;

    let response = get(&app, &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(
        json["data"]["outputs"],
        json!([format!("mem://image/{id}/image-1.png")])
    );
    assert!(json["data"]["error"].is_null());
}

#[tokio::test]
async fn invalid_options_return_validation_error() {
    let app = default_app();

    let response = post_json(
        &app,
        "/api/v1/jobs",
        json!({ "type": "image", "prompt": "tiny", "width": 10 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(app.pipeline.list().await.is_empty());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let app = default_app();

    let response = post_json(&app, "/api/v1/jobs", json!({ "type": "image" })).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let app = default_app();

    let response = get(&app, &format!("/api/v1/jobs/{}", JobId::now_v7())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = build_test_app(vec![
        ScriptedBackend::immediate("img", BackendRole::Image, "https://p/img.png"),
        ScriptedBackend::hanging("vid", BackendRole::Video),
    ]);

    let image = submit(&app, json!({ "type": "image", "prompt": "a fox" })).await;
    let video = submit(
        &app,
        json!({ "type": "video", "prompt": "waves", "single_shot": true }),
    )
    .await;
    wait_terminal(&app.pipeline, image).await;
    wait_for(&app.pipeline, video, |j| j.status == JobStatus::Running).await;

    let json = body_json(get(&app, "/api/v1/jobs").await).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let json = body_json(get(&app, "/api/v1/jobs?status=completed").await).await;
    let jobs = json["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], image.to_string());
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_running_job_fails_it_with_cancel_reason() {
    let app = hanging_video_app();
    let id = submit(
        &app,
        json!({ "type": "video", "prompt": "slow waves", "single_shot": true }),
    )
    .await;
    wait_for(&app.pipeline, id, |j| j.manifest.active_prediction.is_some()).await;

    let response = post_empty(&app, &format!("/api/v1/jobs/{id}/cancel")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "failed");
    assert_eq!(json["data"]["error"], CANCELLED_REASON);
}

#[tokio::test]
async fn cancel_finished_job_returns_it_unchanged() {
    let app = default_app();
    let id = submit(&app, json!({ "type": "image", "prompt": "a fox" })).await;
    let done = wait_terminal(&app.pipeline, id).await;

    let response = post_empty(&app, &format!("/api/v1/jobs/{id}/cancel")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["outputs"], json!(done.outputs));
}

// ---------------------------------------------------------------------------
// Scene regeneration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn regenerate_scene_reopens_finished_video() {
    let app = default_app();
    let id = submit(
        &app,
        json!({ "type": "video", "prompt": "two acts", "scenes": ["act one", "act two"] }),
    )
    .await;
    let first = wait_terminal(&app.pipeline, id).await;
    assert_eq!(first.outputs, vec!["https://stitched/1.mp4".to_string()]);

    let response = post_empty(&app, &format!("/api/v1/jobs/{id}/scenes/1/regenerate")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "queued");
    assert_eq!(json["data"]["manifest"]["regenerating_scene_index"], 1);

    let job = wait_terminal(&app.pipeline, id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.outputs, vec!["https://stitched/2.mp4".to_string()]);
}

#[tokio::test]
async fn regenerate_scene_on_running_job_conflicts() {
    let app = hanging_video_app();
    let id = submit(&app, json!({ "type": "video", "prompt": "two acts" })).await;

    let response = post_empty(&app, &format!("/api/v1/jobs/{id}/scenes/0/regenerate")).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Prediction webhook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn webhook_records_persisted_output_on_running_job() {
    let app = hanging_video_app();
    let id = submit(
        &app,
        json!({ "type": "video", "prompt": "waves", "single_shot": true }),
    )
    .await;
    wait_for(&app.pipeline, id, |j| j.manifest.active_prediction.is_some()).await;

    let response = post_json(
        &app,
        &format!("/api/v1/webhooks/predictions/{id}"),
        json!({ "url": "https://cdn/final.mp4" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let job = app.pipeline.get(id).await.unwrap();
    assert_eq!(
        job.manifest.persisted_output.as_deref(),
        Some("https://cdn/final.mp4")
    );
}

#[tokio::test]
async fn webhook_rejects_non_http_url() {
    let app = hanging_video_app();
    let id = submit(
        &app,
        json!({ "type": "video", "prompt": "waves", "single_shot": true }),
    )
    .await;

    let response = post_json(
        &app,
        &format!("/api/v1/webhooks/predictions/{id}"),
        json!({ "url": "ftp://cdn/final.mp4" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_for_finished_job_conflicts() {
    let app = default_app();
    let id = submit(&app, json!({ "type": "image", "prompt": "a fox" })).await;
    wait_terminal(&app.pipeline, id).await;

    let response = post_json(
        &app,
        &format!("/api/v1/webhooks/predictions/{id}"),
        json!({ "url": "https://cdn/late.png" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
