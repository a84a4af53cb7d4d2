//! Post endpoints.
//!
//! Unpublished posts are visible only to their author and admins; anyone else
//! gets 404 for them.

use crate::auth::models::Role;
use crate::content::posts::POST_SORTS;
use crate::content::{NewPost, Post, PostUpdate, Visibility};
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

/// Load a post the caller may see.
pub(crate) async fn visible_post(
    state: &AppState,
    id: u64,
    viewer: Option<&Identity>,
) -> ApiResult<Post> {
    let post = state.posts.get(id).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::not_found("Post"),
        e => e.into(),
    })?;
    if post.status == "published" {
        return Ok(post);
    }

    let Some(viewer) = viewer else {
        return Err(ApiError::not_found("Post"));
    };
    if viewer.principal_id == post.user_id
        || state.authz.has_role(viewer.principal_id, &Role::ADMIN).await?
    {
        Ok(post)
    } else {
        Err(ApiError::not_found("Post"))
    }
}

/// POST /api/v1/posts
pub async fn create_post(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<NewPost>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let Json(mut post) = payload?;
    post.validate().map_err(ApiError::Validation)?;

    let created = state.posts.create(identity.principal_id, &post).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/posts
pub async fn list_posts(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Post>>> {
    let page = query.resolve(POST_SORTS);
    let visibility = identity.map_or(Visibility::Public, |i| Visibility::Viewer(i.principal_id));
    let (posts, total) = state.posts.list(visibility, &page).await?;
    Ok(Json(Paginated::new(posts, &page, total)))
}

/// GET /api/v1/posts/:id
pub async fn get_post(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Post>> {
    Ok(Json(visible_post(&state, id, identity.as_ref()).await?))
}

/// PUT /api/v1/posts/:id
pub async fn update_post(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<u64>,
    payload: Result<Json<PostUpdate>, JsonRejection>,
) -> ApiResult<Json<Post>> {
    let Json(mut update) = payload?;
    update.validate().map_err(ApiError::Validation)?;

    let post = visible_post(&state, id, Some(&identity)).await?;
    state
        .authz
        .require_ownership_or_role(identity.principal_id, post.user_id, &Role::ADMIN)
        .await?;

    Ok(Json(state.posts.update(id, &update).await?))
}

/// DELETE /api/v1/posts/:id
pub async fn delete_post(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    let post = visible_post(&state, id, Some(&identity)).await?;
    state
        .authz
        .require_ownership_or_role(identity.principal_id, post.user_id, &Role::ADMIN)
        .await?;

    state.posts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
