//! Authentication API Endpoints
//! Mission: Registration, login, token refresh and the caller's own profile.

use crate::auth::jwt::{parse_bearer, MintedToken};
use crate::auth::models::{AuthResponse, LoginRequest, Principal, RegisterRequest, UserResponse};
use crate::error::{ApiError, ApiResult, INVALID_TOKEN};
use crate::middleware::guard::Identity;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

fn auth_response(principal: &Principal, minted: MintedToken) -> AuthResponse {
    AuthResponse {
        expires_in: minted.expires_in(),
        token: minted.token,
        user: UserResponse::from_principal(principal),
    }
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let Json(request) = payload?;
    let (principal, minted) = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(auth_response(&principal, minted))))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let Json(credential) = payload?;
    if credential.email.trim().is_empty() || credential.password.is_empty() {
        return Err(ApiError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let (principal, minted) = state.auth.authenticate(&credential).await?;
    Ok(Json(auth_response(&principal, minted)))
}

/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<AuthResponse>> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_bearer)
        .ok_or(ApiError::Unauthorized(INVALID_TOKEN))?;

    let (principal, minted) = state.auth.refresh(token).await?;
    Ok(Json(auth_response(&principal, minted)))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub roles: Vec<String>,
}

/// GET /api/v1/auth/me
pub async fn me(State(state): State<AppState>, identity: Identity) -> ApiResult<Json<MeResponse>> {
    let principal = state
        .users
        .find_by_id(identity.principal_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or(ApiError::Unauthorized(INVALID_TOKEN))?;

    let roles = state
        .authz
        .roles_of(principal.id)
        .await?
        .into_iter()
        .map(|r| r.to_string())
        .collect();

    Ok(Json(MeResponse {
        user: UserResponse::from_principal(&principal),
        roles,
    }))
}
