use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bot::{self, AppState};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn router(state: Arc<AppState>) -> Router {
    let webhook_path = state.config.server.webhook_path.clone();
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(&webhook_path, post(webhook))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Telegram retries anything that is not a 2xx, so every update we accept
/// is acknowledged with `{"ok": true}`, including ones we could not parse.
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if let Some(expected) = &state.config.telegram.webhook_secret {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("Rejected webhook call with a missing or wrong secret token");
            return (StatusCode::UNAUTHORIZED, Json(json!({ "ok": false })));
        }
    }

    match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => {
            bot::handle_update(&state, &payload).await;
        }
        Err(e) => debug!("Ignoring webhook body that is not JSON: {}", e),
    }

    (StatusCode::OK, Json(json!({ "ok": true })))
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.server.bind_addr();
    let webhook_path = state.config.server.webhook_path.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {} (webhook at {})", addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
