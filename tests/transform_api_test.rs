//! HTTP API integration tests for the transform and job routes.
//!
//! External tools are shell-script stand-ins (see `common`), so these tests
//! exercise the full orchestration path — validation, staging, duration
//! guard, queue or synchronous execution, streaming, cleanup — without a
//! real ffmpeg install.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use common::TestHarness;
use reqwest::multipart;
use tf_av::ToolRegistry;
use tf_core::config::Config;

/// Stand-in upload payload; the fake ffmpeg never parses it.
const FAKE_WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt fake-audio-payload";

async fn post_transform(
    addr: SocketAddr,
    file: Option<(&str, &[u8])>,
    fields: &[(&str, &str)],
) -> reqwest::Response {
    let mut form = multipart::Form::new();
    if let Some((name, data)) = file {
        form = form.part(
            "file",
            multipart::Part::bytes(data.to_vec()).file_name(name.to_string()),
        );
    }
    for (key, value) in fields {
        form = form.text(key.to_string(), value.to_string());
    }

    reqwest::Client::new()
        .post(format!("http://{addr}/api/transform"))
        .multipart(form)
        .send()
        .await
        .expect("request failed")
}

async fn error_code(resp: reqwest::Response) -> String {
    let json: serde_json::Value = resp.json().await.unwrap();
    json["code"].as_str().unwrap_or_default().to_string()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_200() {
    let (_h, addr) =
        TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

// ---------------------------------------------------------------------------
// Upload validation (steps 1-3: no artifact is ever written)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_file_is_rejected() {
    let (h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(addr, None, &[("speed", "1.5")]).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "invalid_request");
    assert_eq!(h.artifact_count(), 0);
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let (h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(addr, Some(("", FAKE_WAV)), &[]).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "invalid_request");
    assert_eq!(h.artifact_count(), 0);
}

#[tokio::test]
async fn empty_file_is_rejected() {
    let (h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(addr, Some(("song.wav", &b""[..])), &[]).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "invalid_request");
    assert_eq!(h.artifact_count(), 0);
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let (h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(addr, Some(("song.ogg", FAKE_WAV)), &[]).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "unsupported_format");
    assert_eq!(h.artifact_count(), 0);
}

#[tokio::test]
async fn speed_below_range_is_rejected() {
    let (h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(
        addr,
        Some(("song.wav", FAKE_WAV)),
        &[("speed", "0.499999")],
    )
    .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "invalid_parameter");
    assert_eq!(h.artifact_count(), 0);
}

#[tokio::test]
async fn speed_above_range_is_rejected() {
    let (_h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(
        addr,
        Some(("song.wav", FAKE_WAV)),
        &[("speed", "2.000001")],
    )
    .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "invalid_parameter");
}

#[tokio::test]
async fn volume_out_of_range_is_rejected() {
    let (_h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(
        addr,
        Some(("song.wav", FAKE_WAV)),
        &[("volume", "2.000001")],
    )
    .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "invalid_parameter");

    let resp = post_transform(addr, Some(("song.wav", FAKE_WAV)), &[("volume", "-0.1")]).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn non_numeric_parameter_is_rejected() {
    let (_h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(addr, Some(("song.wav", FAKE_WAV)), &[("speed", "fast")]).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "invalid_parameter");
}

#[tokio::test]
async fn unknown_effect_is_rejected() {
    let (_h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = post_transform(addr, Some(("song.wav", FAKE_WAV)), &[("effect", "robot")]).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "invalid_parameter");
}

// ---------------------------------------------------------------------------
// Synchronous mode (queue disabled at startup)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sync_mode_streams_result_directly() {
    let temp = tempfile::tempdir().unwrap();
    let tools = common::copying_tools(temp.path());
    let (h, addr) = TestHarness::with_server(common::sync_config(), tools).await;

    let resp = post_transform(
        addr,
        Some(("song.wav", FAKE_WAV)),
        &[("speed", "1.15"), ("volume", "1.0")],
    )
    .await;
    assert_eq!(resp.status(), 200);

    let disposition = resp
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        disposition.contains("attachment") && disposition.contains("speedup_song.wav"),
        "unexpected disposition: {disposition}"
    );
    assert_eq!(resp.headers()["content-type"], "audio/wav");

    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], FAKE_WAV, "fake ffmpeg copies input to output");

    // Input released after the transform, output when the body dropped.
    h.wait_for_empty_artifacts(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn sync_mode_boundary_speeds_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let tools = common::copying_tools(temp.path());
    let (_h, addr) = TestHarness::with_server(common::sync_config(), tools).await;

    for speed in ["0.5", "2.0"] {
        let resp =
            post_transform(addr, Some(("song.mp3", FAKE_WAV)), &[("speed", speed)]).await;
        assert_eq!(resp.status(), 200, "speed {speed} should be accepted");
    }
}

#[tokio::test]
async fn sync_mode_failure_is_generic_500_and_cleans_up() {
    let temp = tempfile::tempdir().unwrap();
    let tools =
        ToolRegistry::with_paths([("ffmpeg".to_string(), common::failing_ffmpeg(temp.path()))]);
    let (h, addr) = TestHarness::with_server(common::sync_config(), tools).await;

    let resp = post_transform(addr, Some(("song.wav", FAKE_WAV)), &[]).await;
    assert_eq!(resp.status(), 500);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["code"], "processing_failed");
    // The stand-in's stderr must not leak into the response body.
    assert_eq!(json["error"], "audio processing failed");

    h.wait_for_empty_artifacts(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn sync_mode_missing_tool_is_500() {
    let (h, addr) =
        TestHarness::with_server(common::sync_config(), ToolRegistry::default()).await;

    let resp = post_transform(addr, Some(("song.wav", FAKE_WAV)), &[]).await;
    assert_eq!(resp.status(), 500);
    assert_eq!(error_code(resp).await, "processing_failed");

    h.wait_for_empty_artifacts(Duration::from_secs(5)).await;
}

// ---------------------------------------------------------------------------
// Duration guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duration_over_ceiling_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let tools = ToolRegistry::with_paths([
        ("ffmpeg".to_string(), common::copying_ffmpeg(temp.path())),
        (
            "ffprobe".to_string(),
            common::fixed_duration_ffprobe(temp.path(), 721.0),
        ),
    ]);
    let (h, addr) = TestHarness::with_server(common::sync_config(), tools).await;

    let resp = post_transform(addr, Some(("long.wav", FAKE_WAV)), &[]).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "duration_exceeded");

    // The staged input was released before responding.
    h.wait_for_empty_artifacts(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn duration_at_ceiling_is_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let tools = ToolRegistry::with_paths([
        ("ffmpeg".to_string(), common::copying_ffmpeg(temp.path())),
        (
            "ffprobe".to_string(),
            common::fixed_duration_ffprobe(temp.path(), 720.0),
        ),
    ]);
    let (_h, addr) = TestHarness::with_server(common::sync_config(), tools).await;

    let resp = post_transform(addr, Some(("edge.wav", FAKE_WAV)), &[]).await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn unknown_duration_is_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let tools = ToolRegistry::with_paths([
        ("ffmpeg".to_string(), common::copying_ffmpeg(temp.path())),
        ("ffprobe".to_string(), common::silent_ffprobe(temp.path())),
    ]);
    let (_h, addr) = TestHarness::with_server(common::sync_config(), tools).await;

    let resp = post_transform(addr, Some(("mystery.wav", FAKE_WAV)), &[]).await;
    assert_eq!(resp.status(), 200, "probe failure must not block the request");
}

// ---------------------------------------------------------------------------
// Asynchronous mode: submit, poll, download
// ---------------------------------------------------------------------------

async fn poll_until_status(
    addr: SocketAddr,
    job_id: &str,
    wanted: &str,
) -> serde_json::Value {
    let client = reqwest::Client::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let resp = client
            .get(format!("http://{addr}/api/jobs/{job_id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json: serde_json::Value = resp.json().await.unwrap();
        if json["status"] == wanted {
            return json;
        }
        assert_ne!(
            json["status"], "failed",
            "job failed while waiting for {wanted}: {json}"
        );
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for status {wanted}, last: {json}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn async_submit_poll_download_roundtrip() {
    let temp = tempfile::tempdir().unwrap();
    let tools = common::copying_tools(temp.path());
    let (h, addr) = TestHarness::with_server(Config::default(), tools).await;

    let resp = post_transform(
        addr,
        Some(("three-minutes.mp3", FAKE_WAV)),
        &[("speed", "1.15"), ("volume", "1.0")],
    )
    .await;
    assert_eq!(resp.status(), 202);

    let receipt: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(receipt["status"], "queued");
    let job_id = receipt["job_id"].as_str().unwrap().to_string();
    assert_eq!(
        receipt["status_url"],
        format!("/api/jobs/{job_id}").as_str()
    );

    let status = poll_until_status(addr, &job_id, "completed").await;
    assert_eq!(status["progress"], 1.0);
    assert_eq!(
        status["download_url"],
        format!("/api/jobs/{job_id}/download").as_str()
    );

    let resp = reqwest::get(format!("http://{addr}/api/jobs/{job_id}/download"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("speedup_three-minutes.mp3"));
    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], FAKE_WAV);

    // The output is claimed exactly once.
    let resp = reqwest::get(format!("http://{addr}/api/jobs/{job_id}/download"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Status remains visible after the download, until TTL expiry.
    let resp = reqwest::get(format!("http://{addr}/api/jobs/{job_id}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    h.wait_for_empty_artifacts(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn async_failure_is_reported_via_status() {
    let temp = tempfile::tempdir().unwrap();
    let tools =
        ToolRegistry::with_paths([("ffmpeg".to_string(), common::failing_ffmpeg(temp.path()))]);
    let (h, addr) = TestHarness::with_server(Config::default(), tools).await;

    let resp = post_transform(addr, Some(("song.wav", FAKE_WAV)), &[]).await;
    assert_eq!(resp.status(), 202, "failures surface via status, not submit");
    let receipt: serde_json::Value = resp.json().await.unwrap();
    let job_id = receipt["job_id"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let status = loop {
        let json: serde_json::Value = client
            .get(format!("http://{addr}/api/jobs/{job_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if json["status"] == "failed" {
            break json;
        }
        assert!(std::time::Instant::now() < deadline, "job never failed: {json}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert_eq!(status["error"], "audio processing failed");

    // Download of a failed job is a 404.
    let resp = reqwest::get(format!("http://{addr}/api/jobs/{job_id}/download"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    h.wait_for_empty_artifacts(Duration::from_secs(5)).await;
}

// ---------------------------------------------------------------------------
// Job lookup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_id_is_404() {
    let (_h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = reqwest::get(format!(
        "http://{addr}/api/jobs/00000000-0000-4000-8000-000000000001"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "not_found");
}

#[tokio::test]
async fn malformed_job_id_is_404() {
    let (_h, addr) = TestHarness::with_server(Config::default(), ToolRegistry::default()).await;

    let resp = reqwest::get(format!("http://{addr}/api/jobs/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(format!("http://{addr}/api/jobs/not-a-uuid/download"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ---------------------------------------------------------------------------
// Upload size ceiling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversized_upload_is_rejected_before_staging() {
    let mut config = common::sync_config();
    config.server.max_upload_bytes = 64;
    let (h, addr) = TestHarness::with_server(config, ToolRegistry::default()).await;

    let big = vec![0u8; 4096];
    let resp = post_transform(addr, Some(("big.wav", big.as_slice())), &[]).await;
    assert!(
        resp.status().is_client_error(),
        "expected 4xx, got {}",
        resp.status()
    );
    assert_eq!(h.artifact_count(), 0);
}
