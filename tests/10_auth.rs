mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn public_endpoints_respond_without_auth() -> Result<()> {
    let app = common::test_app();

    let (status, _, body) = common::request(&app.router, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let (status, _, body) = common::request(&app.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("ok"));

    Ok(())
}

#[tokio::test]
async fn missing_credential_is_rejected_with_trace_header() -> Result<()> {
    let app = common::test_app();

    let (status, headers, body) =
        common::request(&app.router, "GET", "/api/documents", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(body["code"], json!("UNAUTHORIZED"));
    Ok(())
}

#[tokio::test]
async fn garbage_token_is_rejected() -> Result<()> {
    let app = common::test_app();

    let (status, _, _) = common::request(
        &app.router,
        "GET",
        "/api/documents",
        Some("not.a.jwt"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn expired_credential_gets_401_without_consuming_quota() -> Result<()> {
    let app = common::test_app_with_capacity(5);
    let expired = common::mint_token("alice", "free", -600);

    let (status, headers, _) = common::request(
        &app.router,
        "GET",
        "/api/documents",
        Some(&expired),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // Rejected before the limiter: no quota headers on the response.
    assert!(!headers.contains_key("x-ratelimit-limit"));

    // The same subject's first valid request still sees full capacity.
    let valid = common::mint_token("alice", "free", 600);
    let (status, headers, _) =
        common::request(&app.router, "GET", "/api/documents", Some(&valid), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(common::header_i64(&headers, "x-ratelimit-remaining"), Some(4));
    Ok(())
}

#[tokio::test]
async fn provided_request_id_is_echoed() -> Result<()> {
    let app = common::test_app();
    let token = common::mint_token("alice", "free", 600);

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/documents")
        .header("authorization", format!("Bearer {}", token))
        .header("x-request-id", "trace-abc-123")
        .body(axum::body::Body::empty())?;

    use tower::ServiceExt;
    let response = app.router.clone().oneshot(request).await?;
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-abc-123"
    );
    Ok(())
}

#[tokio::test]
async fn every_terminal_state_emits_one_audit_event() -> Result<()> {
    let app = common::test_app();
    let token = common::mint_token("alice", "free", 600);

    // 401, then 200, then 404.
    common::request(&app.router, "GET", "/api/documents", None, None).await;
    common::request(&app.router, "GET", "/api/documents", Some(&token), None).await;
    common::request(
        &app.router,
        "DELETE",
        &format!("/api/documents/{}", uuid_v4()),
        Some(&token),
        None,
    )
    .await;

    let events = app.audit.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].outcome, 401);
    assert!(events[0].tenant_handle.is_none());
    assert_eq!(events[1].outcome, 200);
    assert!(events[1].tenant_handle.is_some());
    assert_eq!(events[2].outcome, 404);
    assert!(events.iter().all(|e| !e.trace_id.is_empty()));
    Ok(())
}

fn uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}
