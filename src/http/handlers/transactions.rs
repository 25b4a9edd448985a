use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::amount::Amount;
use crate::approvals::TransactionApproval;
use crate::http::handlers::{ApproveBody, CancelBody, PageParams, RejectBody};
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::pagination::Page;
use crate::transactions::{ApprovalOutcome, Transaction, TransactionFilter, TransactionRequest};

#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    #[serde(default)]
    pub actual_fee: Option<Amount>,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastBody {
    pub tx_hash: String,
}

pub async fn submit(
    State(state): State<AppState>,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let Json(request) = body?;
    let tx = state.engine.transactions().submit(request)?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn list(
    State(state): State<AppState>,
    filter: Result<Query<TransactionFilter>, QueryRejection>,
    page: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<Page<Transaction>>> {
    let Query(filter) = filter?;
    let Query(page) = page?;
    Ok(Json(state.engine.transactions().list(&filter, page.into())))
}

pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Transaction>> {
    let Path(id) = id?;
    Ok(Json(state.engine.transactions().get(id)?))
}

pub async fn approvals(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Vec<TransactionApproval>>> {
    let Path(id) = id?;
    Ok(Json(state.engine.transactions().approvals(id)?))
}

pub async fn approve(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ApproveBody>, JsonRejection>,
) -> ApiResult<Json<ApprovalOutcome>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let outcome = state
        .engine
        .transactions()
        .approve(id, &body.approver_id, body.mfa_verified)?;
    Ok(Json(outcome))
}

pub async fn reject(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RejectBody>, JsonRejection>,
) -> ApiResult<Json<Transaction>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.transactions().reject(id, &body.approver_id, &body.reason)?))
}

pub async fn cancel(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CancelBody>, JsonRejection>,
) -> ApiResult<Json<Transaction>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.transactions().cancel(id, body.reason.as_deref())?))
}

pub async fn retry(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Transaction>> {
    let Path(id) = id?;
    Ok(Json(state.engine.transactions().retry(id)?))
}

pub async fn broadcast(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<BroadcastBody>, JsonRejection>,
) -> ApiResult<Json<Transaction>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.transactions().record_broadcast(id, &body.tx_hash)?))
}

pub async fn complete(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CompleteBody>, JsonRejection>,
) -> ApiResult<Json<Transaction>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let tx = state
        .engine
        .transactions()
        .complete(id, body.actual_fee, body.tx_hash.as_deref())?;
    Ok(Json(tx))
}

pub async fn fail(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<FailBody>, JsonRejection>,
) -> ApiResult<Json<Transaction>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.transactions().mark_failed(id, &body.error)?))
}
