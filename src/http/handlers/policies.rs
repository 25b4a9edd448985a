use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::policy::{EffectivePolicy, PolicyRules, WalletPolicy};

/// Stored wallet policy next to what is actually enforced.
#[derive(Debug, Serialize)]
pub struct WalletPolicyView {
    pub policy: Option<WalletPolicy>,
    pub effective: EffectivePolicy,
}

pub async fn get_wallet_policy(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<WalletPolicyView>> {
    let Path(wallet_id) = id?;
    let policies = state.engine.policies();
    Ok(Json(WalletPolicyView {
        policy: policies.wallet_policy(wallet_id),
        effective: policies.resolve(wallet_id),
    }))
}

pub async fn put_wallet_policy(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<PolicyRules>, JsonRejection>,
) -> ApiResult<Json<WalletPolicy>> {
    let Path(wallet_id) = id?;
    let Json(rules) = body?;
    Ok(Json(state.engine.policies().set_wallet_policy(wallet_id, rules)?))
}
