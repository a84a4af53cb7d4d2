//! Comment endpoints. Comments inherit the visibility of their post.

use crate::api::posts::visible_post;
use crate::auth::models::Role;
use crate::content::comments::COMMENT_SORTS;
use crate::content::{Comment, NewComment};
use crate::db::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::middleware::guard::Identity;
use crate::pagination::{PageQuery, Paginated};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};

/// POST /api/v1/posts/:id/comments
pub async fn create_comment(
    State(state): State<AppState>,
    identity: Identity,
    Path(post_id): Path<u64>,
    payload: Result<Json<NewComment>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let Json(mut comment) = payload?;
    comment.validate().map_err(ApiError::Validation)?;

    visible_post(&state, post_id, Some(&identity)).await?;
    let created = state
        .comments
        .create(post_id, identity.principal_id, &comment)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/posts/:id/comments
pub async fn list_comments(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Path(post_id): Path<u64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Comment>>> {
    visible_post(&state, post_id, identity.as_ref()).await?;

    let page = query.resolve(COMMENT_SORTS);
    let (comments, total) = state.comments.list_for_post(post_id, &page).await?;
    Ok(Json(Paginated::new(comments, &page, total)))
}

/// DELETE /api/v1/comments/:id
pub async fn delete_comment(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    let comment = state.comments.get(id).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::not_found("Comment"),
        e => e.into(),
    })?;
    state
        .authz
        .require_ownership_or_role(identity.principal_id, comment.user_id, &Role::ADMIN)
        .await?;

    state.comments.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
