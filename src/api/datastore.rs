//! Datastore VM endpoints. Administrative only; guarded with `manage:system`
//! and the strict limiter.

use crate::content::{VmData, VmRecord};
use crate::db::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

fn vm_not_found(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound => ApiError::not_found("VM"),
        e => e.into(),
    }
}

#[derive(Debug, Serialize)]
pub struct VmList {
    pub count: usize,
    pub data: Vec<VmRecord>,
}

/// GET /api/v1/datastore/data
pub async fn list_vms(State(state): State<AppState>) -> ApiResult<Json<VmList>> {
    let data = state.vms.list().await?;
    Ok(Json(VmList {
        count: data.len(),
        data,
    }))
}

/// POST /api/v1/datastore/data
pub async fn insert_vm(
    State(state): State<AppState>,
    payload: Result<Json<VmData>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<VmRecord>)> {
    let Json(mut data) = payload?;
    data.validate().map_err(ApiError::Validation)?;
    let record = state.vms.insert(&data).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/datastore/data/:id
pub async fn search_vm(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<VmRecord>> {
    Ok(Json(state.vms.search(id).await.map_err(vm_not_found)?))
}

/// PUT /api/v1/datastore/data/:id
pub async fn update_vm(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<VmData>, JsonRejection>,
) -> ApiResult<Json<VmRecord>> {
    let Json(mut data) = payload?;
    data.validate().map_err(ApiError::Validation)?;
    Ok(Json(state.vms.update(id, &data).await.map_err(vm_not_found)?))
}

/// DELETE /api/v1/datastore/data/:id
pub async fn delete_vm(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<StatusCode> {
    state.vms.delete(id).await.map_err(vm_not_found)?;
    Ok(StatusCode::NO_CONTENT)
}
