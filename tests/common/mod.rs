#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;

use carrel_api::audit::MemoryAuditSink;
use carrel_api::auth::resolver::PrincipalResolver;
use carrel_api::auth::Claims;
use carrel_api::codec::MetadataCodec;
use carrel_api::config::{JwtKey, LimiterConfig, SecurityConfig};
use carrel_api::limiter::counter::MemoryCounterStore;
use carrel_api::limiter::RateLimiter;
use carrel_api::state::AppState;
use carrel_api::store::memory::MemoryStore;
use carrel_api::tenant::TenantBinder;

pub const JWT_SECRET: &str = "integration-test-verification-secret";
pub const TENANT_SECRET: &str = "integration-test-tenant-secret";
// "integration-root-key-32-bytes!!!"
pub const ROOT_KEY_HEX: &str =
    "696e746567726174696f6e2d726f6f742d6b65792d33322d6279746573212121";

/// In-process application wired with memory backends, so tests exercise the
/// full pipeline without a database.
pub struct TestApp {
    pub router: Router,
    pub audit: Arc<MemoryAuditSink>,
    pub store: Arc<MemoryStore>,
}

pub fn test_app() -> TestApp {
    test_app_with_capacity(100)
}

pub fn test_app_with_capacity(capacity: u32) -> TestApp {
    let security = SecurityConfig {
        jwt_keys: vec![JwtKey {
            kid: "test".to_string(),
            secret: JWT_SECRET.to_string(),
        }],
        jwt_allowed_algs: vec!["HS256".to_string()],
        jwt_expiry_hours: 1,
        tenant_secret: TENANT_SECRET.to_string(),
        codec_root_key: ROOT_KEY_HEX.to_string(),
        stage_timeout_ms: 2_000,
    };
    let stage_timeout = Duration::from_millis(security.stage_timeout_ms);

    let resolver = PrincipalResolver::from_config(&security).expect("resolver");
    let binder =
        TenantBinder::new(TENANT_SECRET.as_bytes().to_vec(), stage_timeout).expect("binder");
    let codec = MetadataCodec::new(ROOT_KEY_HEX).expect("codec");
    let store = Arc::new(MemoryStore::new());
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        LimiterConfig {
            window_secs: 3600,
            free_capacity: capacity,
            pro_capacity: capacity.saturating_mul(10),
            fail_open: false,
        },
        stage_timeout,
    );
    let audit = Arc::new(MemoryAuditSink::new());

    let state = AppState::new(
        resolver,
        binder,
        limiter,
        codec,
        store.clone(),
        audit.clone(),
        100,
    );

    TestApp {
        router: carrel_api::app(state),
        audit,
        store,
    }
}

/// Mint a test token signed by the ring key the test app trusts.
pub fn mint_token(subject: &str, tier: &str, exp_offset_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: Some(subject.to_string()),
        iss: "carrel-test".to_string(),
        scope: "documents:read documents:write".to_string(),
        tier: Some(tier.to_string()),
        exp: now + exp_offset_secs,
        iat: now,
    };
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("test".to_string());
    encode(
        &header,
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token minting")
}

/// Fire one request at the in-process router and collect status, headers,
/// and parsed JSON body.
pub async fn request(
    router: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, value)
}

pub fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
