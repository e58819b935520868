//! Download, diagnostics and health integration tests.
//!
//! Run with: `cargo test -p statusnap-api --test download_test`

mod helpers;

use helpers::{
    download_link, files_in, setup_test_app, setup_test_app_with, setup_test_server_with_invoker,
    video_form, wait_for, FakeInvoker,
};
use axum::http::Method;
use statusnap_processing::FfmpegInvoker;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_download_streams_artifact_then_removes_it() {
    let app = setup_test_app_with(FakeInvoker::writing(8192), |_| {}).await;

    let page = app
        .client()
        .post("/process-video")
        .multipart(video_form(vec![1u8; 4096], &[]))
        .await
        .text();
    let link = download_link(&page).expect("page should link the artifact");
    let file_name = link.trim_start_matches("/download/").to_string();

    let response = app.client().get(&link).await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("content-type"), "video/mp4");
    let disposition = response.header("content-disposition");
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains(&file_name));
    assert_eq!(response.as_bytes().len(), 8192);

    let output_dir = app.output_dir().to_path_buf();
    let removed = wait_for(|| files_in(&output_dir).is_empty(), Duration::from_secs(5)).await;
    assert!(removed, "artifact should be deleted after the grace period");
}

#[tokio::test]
async fn test_download_is_kept_during_grace_period() {
    let app = setup_test_app_with(FakeInvoker::default(), |config| {
        config.download_grace_secs = 3600;
    })
    .await;

    let page = app
        .client()
        .post("/process-video")
        .multipart(video_form(vec![1u8; 4096], &[]))
        .await
        .text();
    let link = download_link(&page).unwrap();

    assert_eq!(app.client().get(&link).await.status_code(), 200);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(files_in(app.output_dir()).len(), 1);
    assert_eq!(app.client().get(&link).await.status_code(), 200);
}

#[tokio::test]
async fn test_head_request_keeps_artifact() {
    let app = setup_test_app().await;

    let page = app
        .client()
        .post("/process-video")
        .multipart(video_form(vec![1u8; 4096], &[]))
        .await
        .text();
    let link = download_link(&page).unwrap();

    let response = app.client().method(Method::HEAD, &link).await;
    assert_eq!(response.status_code(), 200);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(files_in(app.output_dir()).len(), 1);

    let response = app.client().get(&link).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.as_bytes().len(), 64 * 1024);
}

#[tokio::test]
async fn test_unknown_download_is_not_found() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/download/StatusSnap-0-deadbeef.mp4")
        .await;

    assert_eq!(response.status_code(), 404);
    assert!(response.text().contains("That video is no longer available."));
}

#[tokio::test]
async fn test_download_rejects_traversal() {
    let app = setup_test_app().await;
    std::fs::write(app._temp_dir.path().join("secret.txt"), b"secret").unwrap();

    let response = app
        .client()
        .get("/download/..%2Fsecret.txt")
        .await;

    assert_eq!(response.status_code(), 404);
    assert!(!response.text().contains("secret"));
}

#[tokio::test]
async fn test_health() {
    let app = setup_test_app().await;

    let response = app.client().get("/health").await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_encoder_diagnostics_reports_version() {
    let app = setup_test_app().await;

    let response = app.client().get("/test-ffmpeg").await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["backend"], "fake");
    assert_eq!(body["available"], true);
    assert_eq!(body["version"], "fake encoder 1.0");
}

#[tokio::test]
async fn test_encoder_diagnostics_reports_missing_binary() {
    let invoker = Arc::new(FfmpegInvoker::new("/nonexistent/bin/ffmpeg"));
    let (server, _temp_dir) = setup_test_server_with_invoker(invoker).await;

    let response = server.get("/test-ffmpeg").await;

    assert_eq!(response.status_code(), 503);
    let body: serde_json::Value = response.json();
    assert_eq!(body["backend"], "ffmpeg");
    assert_eq!(body["available"], false);
    assert!(body["error"].is_string());
}
