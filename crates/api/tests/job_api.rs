//! Integration tests for `/api/jobs`.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, get, post_empty, post_json};
use serde_json::{json, Value};
use snipgate_api::config::ServerConfig;
use snipgate_core::job::JobStatus;

/// Config with no operation cap, so `loop {}` spins until stopped.
fn unbounded_config() -> ServerConfig {
    ServerConfig {
        snippet_max_operations: 0,
        ..common::test_config()
    }
}

async fn start(app: &axum::Router, job_type: &str, source: &str) -> (StatusCode, Value) {
    let response = post_json(
        app,
        "/api/jobs",
        &json!({"job_type": job_type, "source": source}),
    )
    .await;
    let status = response.status();
    (status, body_json(response).await["data"].clone())
}

// ---------------------------------------------------------------------------
// Test: start, single flight, stop
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_of_running_type_is_a_no_op() {
    let (app, _) = common::build_test_app_with(unbounded_config());

    let (status, first) = start(&app, "sync", "loop {}").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["status"], "started");
    let job_id = first["job_id"].as_i64().unwrap();

    let (status, second) = start(&app, "sync", "value = 1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "already_running");
    assert_eq!(second["job_id"], job_id);

    let stopped = post_empty(&app, &format!("/api/jobs/{job_id}/stop")).await;
    assert_eq!(stopped.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_fails_the_job_and_logs_a_warning() {
    let (app, state) = common::build_test_app_with(unbounded_config());

    let (_, started) = start(&app, "spin", r#"log("spinning"); loop {}"#).await;
    let job_id = started["job_id"].as_i64().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = post_empty(&app, &format!("/api/jobs/{job_id}/stop")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await["data"].clone();
    assert_eq!(job["status"], "failed");
    assert_eq!(job["error_message"], "stopped by user");
    assert!(job["completed_at"].is_string());

    // The worker is preempted and the status stays as the stop wrote it.
    let settled = common::wait_for_job(&state, job_id).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let again = state.stores.jobs.find(job_id).await.unwrap().unwrap();
    assert_eq!(again.status, JobStatus::Failed);
    assert_eq!(again.error_message, settled.error_message);

    let logs = body_json(get(&app, &format!("/api/jobs/{job_id}/logs")).await).await;
    let entries = logs["data"].as_array().unwrap();
    assert!(entries
        .iter()
        .any(|e| e["level"] == "warning" && e["message"] == "Stop requested by user"));

    // Stopping a terminal job returns it unchanged.
    let repeat = body_json(post_empty(&app, &format!("/api/jobs/{job_id}/stop")).await).await;
    assert_eq!(repeat["data"]["error_message"], "stopped by user");

    // The type is free again.
    let (status, _) = start(&app, "spin", "value = 1").await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

// ---------------------------------------------------------------------------
// Test: completion and failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_job_carries_its_summary() {
    let (app, state) = common::build_test_app();

    let (_, started) = start(&app, "report", r#"step(1, "counting"); value = #{rows: 3};"#).await;
    let job_id = started["job_id"].as_i64().unwrap();
    let job = common::wait_for_job(&state, job_id).await;
    assert_eq!(job.status, JobStatus::Completed);

    let json = body_json(get(&app, &format!("/api/jobs/{job_id}")).await).await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["result_summary"], json!({"rows": 3}));

    let logs = body_json(get(&app, &format!("/api/jobs/{job_id}/logs")).await).await;
    let entries = logs["data"].as_array().unwrap();
    assert_eq!(entries[0]["message"], "counting");
    assert_eq!(entries[0]["step_number"], 1);
    assert_eq!(entries.last().unwrap()["level"], "success");
}

#[tokio::test]
async fn failing_job_records_the_error() {
    let (app, state) = common::build_test_app();

    let (_, started) = start(&app, "broken", r#"throw "bad input";"#).await;
    let job = common::wait_for_job(&state, started["job_id"].as_i64().unwrap()).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("bad input"));
}

// ---------------------------------------------------------------------------
// Test: listing and log cursors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_is_newest_first_and_limited() {
    let (app, state) = common::build_test_app();

    let mut ids = Vec::new();
    for kind in ["a", "b", "c"] {
        let (_, started) = start(&app, kind, "value = 0").await;
        let id = started["job_id"].as_i64().unwrap();
        common::wait_for_job(&state, id).await;
        ids.push(id);
    }

    let all = body_json(get(&app, "/api/jobs").await).await;
    let listed: Vec<i64> = all["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, [ids[2], ids[1], ids[0]]);

    let limited = body_json(get(&app, "/api/jobs?limit=2").await).await;
    assert_eq!(limited["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn logs_resume_after_a_cursor() {
    let (app, state) = common::build_test_app();

    let (_, started) = start(&app, "steps", r#"log("one"); log("two"); log("three");"#).await;
    let job_id = started["job_id"].as_i64().unwrap();
    common::wait_for_job(&state, job_id).await;

    let all = body_json(get(&app, &format!("/api/jobs/{job_id}/logs")).await).await;
    let first_id = all["data"][0]["id"].as_i64().unwrap();

    let rest = body_json(
        get(
            &app,
            &format!("/api/jobs/{job_id}/logs?after_id={first_id}&limit=1"),
        )
        .await,
    )
    .await;
    let rest = rest["data"].as_array().unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0]["message"], "two");
}

// ---------------------------------------------------------------------------
// Test: validation and unknown jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_rejects_blank_type_or_source() {
    let (app, _) = common::build_test_app();

    let (status, _) = start(&app, "  ", "value = 1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = start(&app, "x", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = start(&app, &"t".repeat(101), "value = 1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let (app, _) = common::build_test_app();

    for uri in ["/api/jobs/999", "/api/jobs/999/logs", "/api/jobs/999/stream"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
    let response = post_empty(&app, "/api/jobs/999/stop").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}
