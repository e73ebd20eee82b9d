//! Integration tests for the `/api/manage` artifact registry.

mod common;

use axum::http::StatusCode;
use common::{body_json, create_artifact, delete, get, post_empty, post_json, put_json};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: create, read, list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_get_and_list() {
    let (app, _) = common::build_test_app();

    let created = create_artifact(&app, "/sum", "get", "value = 1 + 1").await;
    assert_eq!(created["method"], "GET");
    assert_eq!(created["enabled"], true);
    let id = created["id"].as_i64().unwrap();

    let response = get(&app, &format!("/api/manage/artifacts/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["path"], "/sum");

    let list = body_json(get(&app, "/api/manage/artifacts").await).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: duplicate (path, method) is rejected with 409
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_route_returns_409() {
    let (app, _) = common::build_test_app();
    create_artifact(&app, "/dup", "POST", "value = 1").await;

    let body = json!({"name": "again", "path": "/dup", "method": "post", "source": "value = 2"});
    let response = post_json(&app, "/api/manage/artifacts", &body).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");

    // Same path under another method is a different route.
    create_artifact(&app, "/dup", "GET", "value = 3").await;
}

// ---------------------------------------------------------------------------
// Test: invalid definitions are rejected with 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reserved_or_malformed_paths_are_rejected() {
    let (app, _) = common::build_test_app();

    for path in ["/api/jobs/x", "/health", "no-slash"] {
        let body = json!({"name": "bad", "path": path, "method": "GET", "source": "1"});
        let response = post_json(&app, "/api/manage/artifacts", &body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "path {path}");
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }

    let body = json!({"name": "  ", "path": "/ok", "method": "GET", "source": "1"});
    let response = post_json(&app, "/api/manage/artifacts", &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: update, toggle, delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_update_only_bumps_updated_at() {
    let (app, _) = common::build_test_app();
    let created = create_artifact(&app, "/same", "GET", "value = 1").await;
    let id = created["id"].as_i64().unwrap();

    let response = put_json(&app, &format!("/api/manage/artifacts/{id}"), &json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();

    for field in ["id", "name", "path", "method", "source", "enabled", "created_at"] {
        assert_eq!(updated[field], created[field], "field {field} changed");
    }
    let before = chrono::DateTime::parse_from_rfc3339(created["updated_at"].as_str().unwrap()).unwrap();
    let after = chrono::DateTime::parse_from_rfc3339(updated["updated_at"].as_str().unwrap()).unwrap();
    assert!(after >= before);
}

#[tokio::test]
async fn toggle_twice_restores_enabled() {
    let (app, _) = common::build_test_app();
    let created = create_artifact(&app, "/flip", "GET", "value = 1").await;
    let id = created["id"].as_i64().unwrap();
    let uri = format!("/api/manage/artifacts/{id}/toggle");

    let first = body_json(post_empty(&app, &uri).await).await;
    assert_eq!(first["data"]["enabled"], false);
    let second = body_json(post_empty(&app, &uri).await).await;
    assert_eq!(second["data"]["enabled"], true);
}

#[tokio::test]
async fn delete_then_missing_returns_404() {
    let (app, _) = common::build_test_app();
    let created = create_artifact(&app, "/gone", "DELETE", "value = 1").await;
    let uri = format!("/api/manage/artifacts/{}", created["id"]);

    assert_eq!(delete(&app, &uri).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(delete(&app, &uri).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(get(&app, &uri).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        post_empty(&app, &format!("{uri}/toggle")).await.status(),
        StatusCode::NOT_FOUND
    );

    let response = put_json(&app, &uri, &json!({"source": "value = 2"})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: POST /api/manage/test runs unregistered source
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_returns_full_result() {
    let (app, _) = common::build_test_app();

    let response = post_json(
        &app,
        "/api/manage/test",
        &json!({"source": r#"print("checking"); value = #{ n: 3 };"#}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let data = body_json(response).await["data"].clone();
    assert_eq!(data["value"], json!({"n": 3}));
    assert_eq!(data["stdout"], "checking\n");
    assert_eq!(data["stderr"], "");
    assert_eq!(data["success"], true);
    assert!(data["correlation_id"].is_string());
}

#[tokio::test]
async fn test_run_reports_failures_in_body() {
    let (app, _) = common::build_test_app();

    let response = post_json(&app, "/api/manage/test", &json!({"source": "let x = ;"})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let data = body_json(response).await["data"].clone();
    assert_eq!(data["success"], false);
    assert!(!data["stderr"].as_str().unwrap().is_empty());
    assert_eq!(data["value"]["value_set"], false);
}
