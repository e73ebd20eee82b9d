//! Integration tests for dynamic dispatch to registered artifacts.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, create_artifact, delete, get, post_empty, post_json, put_json};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: a registered artifact serves its route
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registered_artifact_returns_value() {
    let (app, _) = common::build_test_app();
    create_artifact(&app, "/sum", "GET", "value = 1 + 1").await;

    let response = get(&app, "/sum").await;
    assert_eq!(response.status(), StatusCode::OK);

    let correlation_id = response
        .headers()
        .get("x-correlation-id")
        .expect("dynamic responses carry x-correlation-id")
        .to_str()
        .unwrap()
        .to_string();

    let json = body_json(response).await;
    assert_eq!(json["result"], 2);
    assert_eq!(json["stdout"], "");

    let record = body_json(get(&app, &format!("/api/executions/{correlation_id}")).await).await;
    assert_eq!(record["data"]["success"], true);
    assert_eq!(record["data"]["stderr"], "");
    assert_eq!(record["data"]["value"], 2);
}

// ---------------------------------------------------------------------------
// Test: a failing snippet yields 500 with its stderr
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_artifact_returns_500_with_stderr() {
    let (app, _) = common::build_test_app();
    create_artifact(
        &app,
        "/boom",
        "GET",
        r#"print("before"); throw "upstream unavailable";"#,
    )
    .await;

    let response = get(&app, "/boom").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let correlation_id = response.headers()["x-correlation-id"]
        .to_str()
        .unwrap()
        .to_string();

    let json = body_json(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("upstream unavailable"));
    assert_eq!(json["stdout"], "before\n");

    let record = body_json(get(&app, &format!("/api/executions/{correlation_id}")).await).await;
    assert_eq!(record["data"]["success"], false);
    assert_eq!(record["data"]["value"]["value_set"], false);
}

// ---------------------------------------------------------------------------
// Test: request data reaches the snippet
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_data_exposes_query_headers_and_body() {
    let (app, _) = common::build_test_app();
    create_artifact(
        &app,
        "/echo",
        "POST",
        r#"
        value = #{
            name: request_data.body.name,
            page: request_data.query_params.page,
            token: request_data.headers["x-token"],
            method: request_data.method,
        };
        "#,
    )
    .await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo?page=4")
        .header("content-type", "application/json")
        .header("x-token", "t-1")
        .body(Body::from(json!({"name": "ada"}).to_string()))
        .unwrap();
    let response = common::send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(
        json["result"],
        json!({"name": "ada", "page": "4", "token": "t-1", "method": "POST"})
    );
}

#[tokio::test]
async fn non_json_body_is_null() {
    let (app, _) = common::build_test_app();
    create_artifact(&app, "/raw", "PUT", "value = request_data.body == ()").await;

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/raw")
        .body(Body::from("not json"))
        .unwrap();
    let json = body_json(common::send(&app, request).await).await;
    assert_eq!(json["result"], true);
}

// ---------------------------------------------------------------------------
// Test: routing follows the registry without a restart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edits_take_effect_immediately() {
    let (app, _) = common::build_test_app();
    let created = create_artifact(&app, "/live", "GET", "value = 1").await;
    let uri = format!("/api/manage/artifacts/{}", created["id"]);

    assert_eq!(body_json(get(&app, "/live").await).await["result"], 1);

    put_json(&app, &uri, &json!({"source": "value = 2"})).await;
    assert_eq!(body_json(get(&app, "/live").await).await["result"], 2);

    post_empty(&app, &format!("{uri}/toggle")).await;
    assert_eq!(get(&app, "/live").await.status(), StatusCode::NOT_FOUND);

    post_empty(&app, &format!("{uri}/toggle")).await;
    assert_eq!(get(&app, "/live").await.status(), StatusCode::OK);

    delete(&app, &uri).await;
    assert_eq!(get(&app, "/live").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unmatched_route_and_method_return_404() {
    let (app, _) = common::build_test_app();
    create_artifact(&app, "/only-get", "GET", "value = 1").await;

    let response = post_json(&app, "/only-get", &json!({})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get("x-correlation-id").is_none());
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    assert_eq!(get(&app, "/nowhere").await.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: dynamic calls are written to the request log
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_log_records_dynamic_calls_only() {
    let (app, _) = common::build_test_app();
    create_artifact(&app, "/logged", "GET", r#"value = "x""#).await;

    get(&app, "/logged?a=1").await;
    get(&app, "/missing").await;
    get(&app, "/api/jobs").await;

    let response = get(&app, "/api/logs").await;
    assert_eq!(response.status(), StatusCode::OK);
    let entries = body_json(response).await["data"].as_array().unwrap().clone();
    assert_eq!(entries.len(), 2);

    // Newest first.
    assert_eq!(entries[0]["path"], "/missing");
    assert_eq!(entries[0]["status_code"], 404);
    assert_eq!(entries[1]["path"], "/logged");
    assert_eq!(entries[1]["status_code"], 200);
    assert_eq!(entries[1]["query_params"]["a"], "1");
    assert_eq!(entries[1]["response_body"], r#"{"result":"x","stdout":""}"#);

    let cleared = body_json(delete(&app, "/api/logs").await).await;
    assert_eq!(cleared["data"]["deleted"], 2);
    let after = body_json(get(&app, "/api/logs").await).await;
    assert!(after["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn request_log_truncates_long_bodies() {
    let (app, _) = common::build_test_app();
    create_artifact(
        &app,
        "/long",
        "GET",
        r#"let s = ""; for i in 0..3000 { s += "y"; } value = s;"#,
    )
    .await;

    get(&app, "/long").await;
    let entries = body_json(get(&app, "/api/logs?limit=1").await).await;
    let body = entries["data"][0]["response_body"].as_str().unwrap();
    assert_eq!(body.chars().count(), 1000);
}

// ---------------------------------------------------------------------------
// Test: the seeded ping endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn seeded_ping_answers_and_seeding_is_idempotent() {
    let (app, state) = common::build_test_app();

    let seeded = snipgate_api::seed::seed_ping_artifact(state.stores.artifacts.as_ref())
        .await
        .unwrap();
    assert!(seeded);
    let again = snipgate_api::seed::seed_ping_artifact(state.stores.artifacts.as_ref())
        .await
        .unwrap();
    assert!(!again);

    let json = body_json(get(&app, snipgate_api::seed::PING_PATH).await).await;
    assert_eq!(json["result"]["status"], "ok");
}
