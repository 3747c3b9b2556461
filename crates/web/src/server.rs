//! Web server implementation

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use guacpool_common::Database;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::routes::{api_routes, health_handler, not_found_handler, AppState};

/// Header accepted as an alternative to `Authorization: Bearer`
pub const ADMIN_TOKEN_HEADER: &str = "x-guacpool-admin-token";

/// Build the full application router
pub fn router(state: Arc<AppState>) -> Router {
    let protected_routes = api_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        admin_auth_middleware,
    ));

    let app = Router::new()
        // Public health check
        .route("/api/health", get(health_handler))
        .merge(protected_routes);

    let app = match &state.config.ui_dir {
        Some(dir) => {
            let ui = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
            app.fallback(move |req: Request| ui_fallback(ui.clone(), req))
        }
        None => app.fallback(not_found_handler),
    };

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Serve the UI bundle, but keep unknown API paths as JSON 404s
async fn ui_fallback(ui: ServeDir<ServeFile>, req: Request) -> Response {
    if is_api_path(req.uri().path()) {
        return not_found_handler().await.into_response();
    }

    match ui.oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut v: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        v |= x ^ y;
    }
    v == 0
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    bearer.or_else(|| {
        headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
    })
}

async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.admin_token() else {
        return next.run(req).await;
    };

    let authorized = presented_token(req.headers())
        .map(|token| constant_time_eq(token.trim(), expected))
        .unwrap_or(false);
    if authorized {
        return next.run(req).await;
    }

    warn!("Rejected unauthenticated request to {}", req.uri().path());
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Unauthorized"})),
    )
        .into_response()
}

/// Open the database and serve until Ctrl-C
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)?;
    let addr = config.listen;

    if config.admin_token().is_none() {
        warn!("No admin token configured; the API is open to anyone who can reach {}", addr);
    }

    let state = Arc::new(AppState::new(db, config));

    info!("guacpool web API starting on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("guacpool web API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
