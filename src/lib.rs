pub mod audit;
pub mod auth;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod middleware;
pub mod state;
pub mod store;
pub mod tenant;

use anyhow::Context;
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Assemble the request pipeline around the given state.
///
/// Layer order, outermost first: trace/cors, request-id (+ audit), then for
/// the protected routes authentication and rate limiting. A request denied
/// by an inner layer still passes back through request-id, so every
/// response carries a trace header and lands in the audit log.
pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/documents",
            post(handlers::documents::upload).get(handlers::documents::list),
        )
        .route("/api/documents/:id", delete(handlers::documents::remove))
        .route("/api/search", post(handlers::search::search))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Tenant-scoped API
        .merge(protected)
        // Global middleware
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_id::request_id_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build state from the config singleton and run the server.
pub async fn serve(port_override: Option<u16>) -> anyhow::Result<()> {
    let config = config::config();
    tracing::info!("Starting Carrel API in {:?} mode", config.environment);

    let state = AppState::from_config(config).await?;
    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = port_override
        .or_else(|| std::env::var("CARREL_PORT").ok().and_then(|s| s.parse().ok()))
        .or_else(|| std::env::var("PORT").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Carrel API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server")?;
    Ok(())
}
