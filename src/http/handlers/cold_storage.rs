use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::approvals::TransactionApproval;
use crate::cold_storage::{ColdApprovalOutcome, ColdStorageFilter, ColdStorageRequest, NewColdStorageRequest};
use crate::http::handlers::{ApproveBody, PageParams, RejectBody};
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::pagination::Page;

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    pub verifier_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteBody {
    #[serde(default)]
    pub tx_hash: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewColdStorageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ColdStorageRequest>)> {
    let Json(request) = body?;
    let created = state.engine.cold_storage().create(request)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list(
    State(state): State<AppState>,
    filter: Result<Query<ColdStorageFilter>, QueryRejection>,
    page: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<Page<ColdStorageRequest>>> {
    let Query(filter) = filter?;
    let Query(page) = page?;
    Ok(Json(state.engine.cold_storage().list(&filter, page.into())))
}

pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ColdStorageRequest>> {
    let Path(id) = id?;
    Ok(Json(state.engine.cold_storage().get(id)?))
}

pub async fn approvals(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Vec<TransactionApproval>>> {
    let Path(id) = id?;
    Ok(Json(state.engine.cold_storage().approvals(id)?))
}

pub async fn approve(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ApproveBody>, JsonRejection>,
) -> ApiResult<Json<ColdApprovalOutcome>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let outcome = state
        .engine
        .cold_storage()
        .approve(id, &body.approver_id, body.mfa_verified)?;
    Ok(Json(outcome))
}

pub async fn reject(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RejectBody>, JsonRejection>,
) -> ApiResult<Json<ColdStorageRequest>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.cold_storage().reject(id, &body.approver_id, &body.reason)?))
}

pub async fn verify(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<VerifyBody>, JsonRejection>,
) -> ApiResult<Json<ColdStorageRequest>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.cold_storage().verify_physical(id, &body.verifier_id)?))
}

pub async fn complete(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CompleteBody>, JsonRejection>,
) -> ApiResult<Json<ColdStorageRequest>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.cold_storage().complete(id, body.tx_hash.as_deref())?))
}
