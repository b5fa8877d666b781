//! Rutas HTTP
//!
//! `/api` para el ciudadano, `/admin` para el panel y `/health`.

pub mod admin_routes;
pub mod public_routes;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::middleware::cors_layer;
use crate::state::AppState;

/// Router completo con sus capas
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/health", get(health))
        .nest("/api", public_routes::create_public_router())
        .nest("/admin", admin_routes::create_admin_router(state.clone()))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "ok",
            Err(e) => {
                error!("❌ Health check de base de datos falló: {}", e);
                "error"
            }
        },
        None => "memory",
    };
    let status = if database == "error" { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "database": database,
            "mirror": state.ledger.mirror().stats(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
