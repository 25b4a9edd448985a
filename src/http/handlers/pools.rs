use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::http::handlers::PageParams;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::pagination::Page;
use crate::policy::{NewPoolPolicy, PoolPolicy, PoolPolicyFilter};
use crate::pools::{
    HierarchyNode, InternalTransfer, InternalTransferRequest, NewRelationship, PooledWalletRelationship,
    RelationshipFilter, RelationshipStatus, TransferFilter,
};

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: RelationshipStatus,
}

pub async fn create_relationship(
    State(state): State<AppState>,
    body: Result<Json<NewRelationship>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PooledWalletRelationship>)> {
    let Json(request) = body?;
    let relationship = state.engine.pools().create_relationship(request)?;
    Ok((StatusCode::CREATED, Json(relationship)))
}

pub async fn list_relationships(
    State(state): State<AppState>,
    filter: Result<Query<RelationshipFilter>, QueryRejection>,
    page: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<Page<PooledWalletRelationship>>> {
    let Query(filter) = filter?;
    let Query(page) = page?;
    Ok(Json(state.engine.pools().list(&filter, page.into())))
}

pub async fn get_relationship(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<PooledWalletRelationship>> {
    let Path(id) = id?;
    Ok(Json(state.engine.pools().get(id)?))
}

pub async fn update_status(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult<Json<PooledWalletRelationship>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.pools().update_status(id, body.status)?))
}

pub async fn hierarchy(
    State(state): State<AppState>,
    parent_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<HierarchyNode>> {
    let Path(parent_id) = parent_id?;
    Ok(Json(state.engine.pools().hierarchy(parent_id)))
}

pub async fn create_policy(
    State(state): State<AppState>,
    body: Result<Json<NewPoolPolicy>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PoolPolicy>)> {
    let Json(request) = body?;
    let policy = state.engine.policies().create_pool_policy(request)?;
    Ok((StatusCode::CREATED, Json(policy)))
}

pub async fn list_policies(
    State(state): State<AppState>,
    filter: Result<Query<PoolPolicyFilter>, QueryRejection>,
    page: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<Page<PoolPolicy>>> {
    let Query(filter) = filter?;
    let Query(page) = page?;
    Ok(Json(state.engine.policies().list_pool_policies(&filter, page.into())))
}

pub async fn create_transfer(
    State(state): State<AppState>,
    body: Result<Json<InternalTransferRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InternalTransfer>)> {
    let Json(request) = body?;
    let transfer = state.engine.transfers().create(request)?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    filter: Result<Query<TransferFilter>, QueryRejection>,
    page: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<Page<InternalTransfer>>> {
    let Query(filter) = filter?;
    let Query(page) = page?;
    Ok(Json(state.engine.transfers().list(&filter, page.into())))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<InternalTransfer>> {
    let Path(id) = id?;
    Ok(Json(state.engine.transfers().get(id)?))
}
