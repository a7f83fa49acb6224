mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn uploaded_document_is_searchable_by_its_owner_only() -> Result<()> {
    let app = common::test_app();
    let alice = common::mint_token("alice", "free", 600);
    let bob = common::mint_token("bob", "free", 600);

    // Tenant A ingests a document.
    let (status, _, body) = common::request(
        &app.router,
        "POST",
        "/api/documents",
        Some(&alice),
        Some(json!({
            "title": "Q3 security review",
            "body": "findings on the zeppelin incident and remediation steps"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let doc_id = body["data"]["id"].as_str().unwrap().to_string();

    // A searches a term from it: at least one hit, attributed to A's doc.
    let (status, _, body) = common::request(
        &app.router,
        "POST",
        "/api/search",
        Some(&alice),
        Some(json!({ "query": "zeppelin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let hits = body["data"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["id"], json!(doc_id));
    assert_eq!(hits[0]["title"], json!("Q3 security review"));

    // Tenant B searches the same term immediately after: nothing.
    let (status, _, body) = common::request(
        &app.router,
        "POST",
        "/api/search",
        Some(&bob),
        Some(json!({ "query": "zeppelin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn list_and_delete_are_partition_scoped() -> Result<()> {
    let app = common::test_app();
    let alice = common::mint_token("alice", "free", 600);
    let bob = common::mint_token("bob", "free", 600);

    let (_, _, body) = common::request(
        &app.router,
        "POST",
        "/api/documents",
        Some(&alice),
        Some(json!({ "title": "private notes", "body": "only mine" })),
    )
    .await;
    let doc_id = body["data"]["id"].as_str().unwrap().to_string();

    // B sees an empty partition.
    let (status, _, body) =
        common::request(&app.router, "GET", "/api/documents", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    // B cannot delete A's document; the id reads as nonexistent.
    let (status, _, _) = common::request(
        &app.router,
        "DELETE",
        &format!("/api/documents/{}", doc_id),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A still owns it and can delete it.
    let (status, _, body) =
        common::request(&app.router, "GET", "/api/documents", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _, _) = common::request(
        &app.router,
        "DELETE",
        &format!("/api/documents/{}", doc_id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, body) =
        common::request(&app.router, "GET", "/api/documents", Some(&alice), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn same_subject_reaches_the_same_partition_across_requests() -> Result<()> {
    let app = common::test_app();
    let first = common::mint_token("carol", "free", 600);
    // A different token for the same subject maps to the same partition.
    let second = common::mint_token("carol", "pro", 600);

    common::request(
        &app.router,
        "POST",
        "/api/documents",
        Some(&first),
        Some(json!({ "title": "t", "body": "persistent corpus" })),
    )
    .await;

    let (_, _, body) =
        common::request(&app.router, "GET", "/api/documents", Some(&second), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn no_binding_survives_a_finished_request() -> Result<()> {
    let app = common::test_app();
    let alice = common::mint_token("alice", "free", 600);

    // A mix of successful and failing scoped operations.
    common::request(
        &app.router,
        "POST",
        "/api/documents",
        Some(&alice),
        Some(json!({ "title": "t", "body": "b" })),
    )
    .await;
    common::request(&app.router, "GET", "/api/documents", Some(&alice), None).await;
    common::request(
        &app.router,
        "DELETE",
        &format!("/api/documents/{}", uuid::Uuid::new_v4()),
        Some(&alice),
        None,
    )
    .await;
    // Malformed payload fails validation before any session is opened.
    common::request(
        &app.router,
        "POST",
        "/api/documents",
        Some(&alice),
        Some(json!({ "title": "", "body": "" })),
    )
    .await;

    // Every session released its binding, whatever the exit path.
    assert_eq!(app.store.live_bindings(), 0);
    Ok(())
}

#[tokio::test]
async fn responses_never_leak_the_tenant_handle() -> Result<()> {
    let app = common::test_app();
    let alice = common::mint_token("alice", "free", 600);

    let (_, _, body) = common::request(
        &app.router,
        "POST",
        "/api/documents",
        Some(&alice),
        Some(json!({ "title": "t", "body": "b" })),
    )
    .await;

    // The handle is a 64-char hex string; no field in the response matches.
    let serialized = body.to_string();
    let events = app.audit.events();
    let handle = events
        .iter()
        .find_map(|e| e.tenant_handle.clone())
        .expect("audit captured the handle");
    assert!(!serialized.contains(&handle));
    Ok(())
}
