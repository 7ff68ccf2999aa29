//! End-to-end pipeline tests over HTTP: upload, start, poll to terminal,
//! failure classification, retry resume, cancellation, and duplicate-start
//! protection.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{FakePlan, TestHarness};
use lectern_core::config::Config;

#[tokio::test]
async fn upload_start_poll_to_completed() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let job_id = h.upload_text(addr, "paper.txt", "concise", "none").await;

    // Freshly created job is pending with zero progress.
    let resp = client
        .get(format!("http://{addr}/api/jobs/{job_id}"))
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "pending");
    assert_eq!(json["progress"], 0);

    let resp = client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    // Poll and record every observed (status, progress) pair.
    let allowed = [
        "pending",
        "parsing",
        "generating_script",
        "generating_slides",
        "generating_audio",
        "composing_video",
        "completed",
    ];
    let mut last_progress = -1i64;
    let mut last_stage_idx = 0usize;
    let final_json = loop {
        let json: serde_json::Value = client
            .get(format!("http://{addr}/api/jobs/{job_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let status = json["status"].as_str().unwrap().to_string();
        let progress = json["progress"].as_i64().unwrap();

        // Progress is monotonically non-decreasing for the whole run.
        assert!(
            progress >= last_progress,
            "progress regressed: {last_progress} -> {progress}"
        );
        last_progress = progress;

        // Status only walks forward along the automaton.
        let idx = allowed
            .iter()
            .position(|s| *s == status)
            .unwrap_or_else(|| panic!("unexpected status {status}"));
        assert!(idx >= last_stage_idx, "status moved backwards to {status}");
        last_stage_idx = idx;

        if status == "completed" {
            break json;
        }
        assert_ne!(status, "failed", "job failed: {:?}", json["error_message"]);
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    // Progress reaches exactly 100 iff completed.
    assert_eq!(final_json["progress"], 100);
    assert!(final_json["video_path"].as_str().is_some());
    assert!(final_json["video_duration"].as_i64().unwrap() > 0);
    assert!(final_json["completed_at"].as_str().is_some());
    assert_eq!(
        final_json["slides_content"].as_array().unwrap().len(),
        2,
        "slide script is returned to polling clients"
    );

    // Each stage executed exactly once (two slides for render/narrate).
    assert_eq!(h.calls.parse.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.script.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.render.load(Ordering::SeqCst), 2);
    assert_eq!(h.calls.narrate.load(Ordering::SeqCst), 2);
    assert_eq!(h.calls.compose.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_audio_failure_then_retry_resumes() {
    let plan = FakePlan {
        narration_failures: AtomicUsize::new(1),
        ..FakePlan::default()
    };
    let (h, addr) = TestHarness::with_server_plan(Config::default(), plan).await;
    let client = reqwest::Client::new();

    let job_id = h.upload_text(addr, "paper.txt", "concise", "none").await;
    client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();

    let json = h.wait_terminal(addr, &job_id).await;
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error_kind"], "transient");
    assert!(json["error_message"].as_str().unwrap().contains("rate limited"));

    // Artifacts from the stages completed before the failure are retained.
    let id: lectern_core::JobId = job_id.parse().unwrap();
    assert!(h.store.exists(id, "parsed/content.json"));
    assert!(h.store.exists(id, "script/slides.json"));
    assert!(h.store.exists(id, "slides/slide_001.png"));

    let parses = h.calls.parse.load(Ordering::SeqCst);
    let renders = h.calls.render.load(Ordering::SeqCst);

    // Retry clears the error and reaches completed.
    let resp = client
        .post(format!("http://{addr}/api/jobs/{job_id}/retry"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let json = h.wait_terminal(addr, &job_id).await;
    assert_eq!(json["status"], "completed");
    assert!(json["error_message"].is_null());
    assert!(json["error_kind"].is_null());

    // Execution resumed at the audio stage: no re-parse, no re-render.
    assert_eq!(h.calls.parse.load(Ordering::SeqCst), parses);
    assert_eq!(h.calls.render.load(Ordering::SeqCst), renders);
}

#[tokio::test]
async fn fatal_parse_failure_is_classified() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    // Empty file parses to nothing; the fake parser reports Fatal.
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(Vec::new()).file_name("empty.txt"),
    );
    let resp = client
        .post(format!("http://{addr}/api/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let json: serde_json::Value = resp.json().await.unwrap();
    let job_id = json["id"].as_str().unwrap().to_string();

    client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();

    let json = h.wait_terminal(addr, &job_id).await;
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error_kind"], "fatal");
}

#[tokio::test]
async fn double_start_reports_already_running() {
    let plan = FakePlan {
        parse_delay: Duration::from_millis(300),
        ..FakePlan::default()
    };
    let (h, addr) = TestHarness::with_server_plan(Config::default(), plan).await;
    let client = reqwest::Client::new();

    let job_id = h.upload_text(addr, "paper.txt", "concise", "none").await;

    let first = client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 202);

    // Second start in quick succession: exactly one active execution.
    let second = client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);

    let json = h.wait_terminal(addr, &job_id).await;
    assert_eq!(json["status"], "completed");

    // No duplicated stage work.
    assert_eq!(h.calls.parse.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.compose.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancel_during_run_fails_job_and_keeps_prior_artifacts() {
    let plan = FakePlan {
        parse_delay: Duration::from_millis(400),
        ..FakePlan::default()
    };
    let (h, addr) = TestHarness::with_server_plan(Config::default(), plan).await;
    let client = reqwest::Client::new();

    let job_id = h.upload_text(addr, "paper.txt", "concise", "none").await;
    client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let resp = client
        .post(format!("http://{addr}/api/jobs/{job_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let json = h.wait_terminal(addr, &job_id).await;
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error_message"], "Cancelled by user");

    // The uploaded source artifact survives cancellation.
    let id: lectern_core::JobId = job_id.parse().unwrap();
    assert!(h.store.exists(id, "source/paper.txt"));
}

#[tokio::test]
async fn cancel_without_active_run_conflicts() {
    let (h, addr) = TestHarness::with_server().await;
    let job_id = h.upload_text(addr, "paper.txt", "concise", "none").await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/jobs/{job_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn retry_requires_failed_state() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let job_id = h.upload_text(addr, "paper.txt", "concise", "none").await;

    // Pending job cannot be retried.
    let resp = client
        .post(format!("http://{addr}/api/jobs/{job_id}/retry"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Completed job cannot be retried either.
    client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();
    let json = h.wait_terminal(addr, &job_id).await;
    assert_eq!(json["status"], "completed");

    let resp = client
        .post(format!("http://{addr}/api/jobs/{job_id}/retry"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn start_completed_job_conflicts() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let job_id = h.upload_text(addr, "paper.txt", "concise", "none").await;
    client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();
    h.wait_terminal(addr, &job_id).await;

    let resp = client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn avatar_option_produces_overlay_artifact() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let job_id = h.upload_text(addr, "paper.txt", "detailed", "svg").await;
    client
        .post(format!("http://{addr}/api/jobs/{job_id}/start"))
        .send()
        .await
        .unwrap();

    let json = h.wait_terminal(addr, &job_id).await;
    assert_eq!(json["status"], "completed");

    let id: lectern_core::JobId = job_id.parse().unwrap();
    assert!(h.store.exists(id, "avatar/overlay.mp4"));
}
