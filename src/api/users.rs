//! User management endpoints.
//!
//! The guard has already checked "owner or admin" for the `:id` routes; the
//! handlers only add the rules that depend on the body.

use crate::auth::models::{PrincipalUpdate, Role, UserResponse};
use crate::auth::user_store::USER_SORTS;
use crate::content::{Profile, ProfileUpdate};
use crate::error::{ApiError, ApiResult};
use crate::middleware::guard::Identity;
use crate::pagination::{PageQuery, Paginated};
use crate::state::AppState;
use crate::validation::validate_user_update;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<UserResponse>>> {
    let page = query.resolve(USER_SORTS);
    let (users, total) = state.users.list(&page).await?;
    let data = users.iter().map(UserResponse::from_principal).collect();
    Ok(Json(Paginated::new(data, &page, total)))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<UserResponse>> {
    let principal = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(UserResponse::from_principal(&principal)))
}

/// PUT /api/v1/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<u64>,
    payload: Result<Json<PrincipalUpdate>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    let Json(mut update) = payload?;
    validate_user_update(&mut update).map_err(ApiError::Validation)?;

    if update.is_active.is_some() {
        state
            .authz
            .require_role(identity.principal_id, &Role::ADMIN)
            .await?;
    }

    let principal = state.users.update(id, &update).await?;
    info!(principal_id = id, by = identity.principal_id, "User updated");
    Ok(Json(UserResponse::from_principal(&principal)))
}

/// DELETE /api/v1/users/:id
///
/// Deactivates the account; the row stays.
pub async fn delete_user(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    state.users.deactivate(id).await?;
    info!(principal_id = id, by = identity.principal_id, "User deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/users/:id/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Profile>> {
    let profile = state
        .profiles
        .find(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile"))?;
    Ok(Json(profile))
}

/// PUT /api/v1/users/:id/profile
///
/// Creates the profile on first write and replaces it afterwards.
pub async fn update_profile(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<u64>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<Profile>> {
    let Json(mut update) = payload?;
    update.validate().map_err(ApiError::Validation)?;

    state
        .users
        .find_by_id(id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| ApiError::not_found("User"))?;
    let profile = state.profiles.upsert(id, &update).await?;
    info!(principal_id = id, by = identity.principal_id, "Profile updated");
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub user_id: u64,
    pub roles: Vec<Role>,
}

async fn roles_response(state: &AppState, id: u64) -> ApiResult<Json<RolesResponse>> {
    let roles = state.authz.roles_of(id).await?.into_iter().collect();
    Ok(Json(RolesResponse { user_id: id, roles }))
}

/// GET /api/v1/users/:id/roles
pub async fn list_roles(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<RolesResponse>> {
    roles_response(&state, id).await
}

/// POST /api/v1/users/:id/roles
pub async fn assign_role(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<u64>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> ApiResult<Json<RolesResponse>> {
    let Json(request) = payload?;
    let role: Role = request.role.parse()?;

    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    state.authz.assign_role(id, &role).await?;
    info!(principal_id = id, role = %role, by = identity.principal_id, "Role assigned");

    roles_response(&state, id).await
}

/// DELETE /api/v1/users/:id/roles/:role
pub async fn remove_role(
    State(state): State<AppState>,
    identity: Identity,
    Path((id, role)): Path<(u64, String)>,
) -> ApiResult<Json<RolesResponse>> {
    let role: Role = role.parse()?;

    state.authz.remove_role(id, &role).await?;
    info!(principal_id = id, role = %role, by = identity.principal_id, "Role removed");

    roles_response(&state, id).await
}
