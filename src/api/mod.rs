// HTTP adapter: router assembly, request translation and the public routes.

pub mod request;
pub mod state;

pub use request::{client_ip, mount};
pub use state::AppState;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::apps;
use crate::config::SecurityConfig;
use crate::middleware::session_middleware;
use crate::services::CrudEngine;

/// Full router: `/`, `/health` and the app routes under `/api`.
pub fn app(state: AppState) -> Router {
    let api = apps::routes(&state).layer(axum::middleware::from_fn_with_state(
        state.auth.clone(),
        session_middleware,
    ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health).with_state(state.engine.clone()))
        .nest("/api", api)
        .layer(cors_layer(&state.config.security))
        .layer(TraceLayer::new_for_http())
}

/// Serve until the process is stopped.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("passfoo-api listening on http://{}", addr);
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Human way to manage cryptic passwords",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(engine): State<CrudEngine>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match engine.storage().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok"
            })),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                })),
            )
        }
    }
}
