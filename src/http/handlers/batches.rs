use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::batches::{BatchActionReport, BatchFilter, NewBatch, TransactionBatch};
use crate::http::handlers::{ApproveBody, CancelBody, PageParams};
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::pagination::Page;
use crate::transactions::Transaction;

#[derive(Debug, Serialize)]
pub struct BatchDetail {
    #[serde(flatten)]
    pub batch: TransactionBatch,
    pub transactions: Vec<Transaction>,
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewBatch>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TransactionBatch>)> {
    let Json(request) = body?;
    let batch = state.engine.batches().create_batch(request)?;
    Ok((StatusCode::CREATED, Json(batch)))
}

pub async fn list(
    State(state): State<AppState>,
    filter: Result<Query<BatchFilter>, QueryRejection>,
    page: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<Page<TransactionBatch>>> {
    let Query(filter) = filter?;
    let Query(page) = page?;
    Ok(Json(state.engine.batches().list(&filter, page.into())))
}

pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<BatchDetail>> {
    let Path(id) = id?;
    let batches = state.engine.batches();
    Ok(Json(BatchDetail {
        batch: batches.get(id)?,
        transactions: batches.members(id)?,
    }))
}

pub async fn approve(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ApproveBody>, JsonRejection>,
) -> ApiResult<Json<BatchActionReport>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let report = state
        .engine
        .batches()
        .approve_batch(id, &body.approver_id, body.mfa_verified)?;
    Ok(Json(report))
}

pub async fn cancel(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CancelBody>, JsonRejection>,
) -> ApiResult<Json<BatchActionReport>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.batches().cancel_batch(id, body.reason.as_deref())?))
}
