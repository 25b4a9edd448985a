//! Operator API under `/admin`, guarded by a bearer API key.

pub mod auth;
pub mod handlers;

use axum::routing::get;
use axum::{middleware, Router};

use self::auth::admin_auth_middleware;
use self::handlers::{get_stats, get_status};
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
