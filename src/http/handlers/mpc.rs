use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::mpc::{MpcKeyShare, ThresholdOracle, ThresholdStatus};

/// Share state pushed by the MPC collaborator.
pub async fn report_share(
    State(state): State<AppState>,
    body: Result<Json<MpcKeyShare>, JsonRejection>,
) -> ApiResult<Json<ThresholdStatus>> {
    let Json(share) = body?;
    Ok(Json(state.engine.shares().report(share)?))
}

pub async fn threshold(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ThresholdStatus>> {
    let Path(wallet_id) = id?;
    Ok(Json(state.engine.shares().threshold_status(wallet_id)))
}
