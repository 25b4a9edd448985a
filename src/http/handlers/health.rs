use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::http::server::AppState;

/// Liveness plus a cheap view of the engine.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let stats = state.engine.stats();
    Json(json!({
        "status": "ok",
        "transactions": stats.transactions.total,
        "started_at": stats.started_at,
    }))
}
