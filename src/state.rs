//! Shared application state and router assembly.
//!
//! Routes are grouped by guard policy: each group is its own `Router` with the
//! guard as a route layer, and the groups are merged at the end.

use crate::api::{comments, datastore, posts, users};
use crate::auth::models::{Permission, Role};
use crate::auth::{api as auth_api, AuthService, AuthorizationStore, UserStore};
use crate::content::{CommentStore, PostStore, ProfileStore, VmStore};
use crate::db::Database;
use crate::health::{self, HealthChecker};
use crate::middleware::guard::{guard, GuardContext, GuardPolicy};
use crate::middleware::logging::request_logging;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub users: UserStore,
    pub authz: Arc<dyn AuthorizationStore>,
    pub posts: PostStore,
    pub comments: CommentStore,
    pub profiles: ProfileStore,
    pub vms: VmStore,
}

impl AppState {
    pub fn new(db: Database, auth: AuthService) -> Self {
        Self {
            users: auth.users().clone(),
            authz: Arc::clone(auth.authz()),
            posts: PostStore::new(db.clone()),
            comments: CommentStore::new(db.clone()),
            profiles: ProfileStore::new(db.clone()),
            vms: VmStore::new(db),
            auth,
        }
    }
}

/// The three limiter instances, owned by the composition root.
#[derive(Clone)]
pub struct Limiters {
    pub general: Arc<RateLimiter>,
    pub auth: Arc<RateLimiter>,
    pub strict: Arc<RateLimiter>,
}

impl Limiters {
    pub fn new(general: RateLimitConfig, auth: RateLimitConfig, strict: RateLimitConfig) -> Self {
        Self {
            general: Arc::new(RateLimiter::new(general)),
            auth: Arc::new(RateLimiter::new(auth)),
            strict: Arc::new(RateLimiter::new(strict)),
        }
    }

    pub fn all(&self) -> [&Arc<RateLimiter>; 3] {
        [&self.general, &self.auth, &self.strict]
    }
}

impl Default for Limiters {
    fn default() -> Self {
        Self::new(
            RateLimitConfig::general(),
            RateLimitConfig::auth(),
            RateLimitConfig::strict(),
        )
    }
}

fn guarded(
    routes: Router<AppState>,
    guards: &GuardContext,
    policy: GuardPolicy,
) -> Router<AppState> {
    routes.route_layer(from_fn_with_state(guards.guard(policy), guard))
}

pub fn build_router(
    state: AppState,
    guards: &GuardContext,
    limiters: &Limiters,
    health: HealthChecker,
) -> Router {
    let general = || Arc::clone(&limiters.general);
    let needs = |permission: Permission| {
        GuardPolicy::required()
            .permission(permission)
            .limited_by(general())
    };

    // Login and registration: anonymous, metered per client address.
    let auth_public = guarded(
        Router::new()
            .route("/api/v1/auth/register", post(auth_api::register))
            .route("/api/v1/auth/login", post(auth_api::login)),
        guards,
        GuardPolicy::optional().limited_by(Arc::clone(&limiters.auth)),
    );

    let auth_session = guarded(
        Router::new()
            .route("/api/v1/auth/refresh", post(auth_api::refresh))
            .route("/api/v1/auth/me", get(auth_api::me)),
        guards,
        GuardPolicy::required().limited_by(general()),
    );

    let user_directory = guarded(
        Router::new().route("/api/v1/users", get(users::list_users)),
        guards,
        needs(Permission::READ_USER),
    );

    let user_self = guarded(
        Router::new()
            .route(
                "/api/v1/users/:id",
                get(users::get_user)
                    .put(users::update_user)
                    .delete(users::delete_user),
            )
            .route(
                "/api/v1/users/:id/profile",
                get(users::get_profile).put(users::update_profile),
            )
            .route("/api/v1/users/:id/roles", get(users::list_roles)),
        guards,
        GuardPolicy::required()
            .owner_or_role(Role::ADMIN)
            .limited_by(general()),
    );

    let user_roles = guarded(
        Router::new()
            .route("/api/v1/users/:id/roles", post(users::assign_role))
            .route("/api/v1/users/:id/roles/:role", delete(users::remove_role)),
        guards,
        needs(Permission::MANAGE_SYSTEM),
    );

    // Anonymous readers see published posts only; the handlers filter.
    let content_read = guarded(
        Router::new()
            .route("/api/v1/posts", get(posts::list_posts))
            .route("/api/v1/posts/:id", get(posts::get_post))
            .route("/api/v1/posts/:id/comments", get(comments::list_comments)),
        guards,
        GuardPolicy::optional().limited_by(general()),
    );

    let post_create = guarded(
        Router::new().route("/api/v1/posts", post(posts::create_post)),
        guards,
        needs(Permission::CREATE_POST),
    );

    let post_update = guarded(
        Router::new().route("/api/v1/posts/:id", put(posts::update_post)),
        guards,
        needs(Permission::UPDATE_POST),
    );

    let post_delete = guarded(
        Router::new().route("/api/v1/posts/:id", delete(posts::delete_post)),
        guards,
        needs(Permission::DELETE_POST),
    );

    let comment_create = guarded(
        Router::new().route("/api/v1/posts/:id/comments", post(comments::create_comment)),
        guards,
        needs(Permission::CREATE_COMMENT),
    );

    let comment_delete = guarded(
        Router::new().route("/api/v1/comments/:id", delete(comments::delete_comment)),
        guards,
        needs(Permission::DELETE_COMMENT),
    );

    let vm_admin = guarded(
        Router::new()
            .route(
                "/api/v1/datastore/data",
                get(datastore::list_vms).post(datastore::insert_vm),
            )
            .route(
                "/api/v1/datastore/data/:id",
                get(datastore::search_vm)
                    .put(datastore::update_vm)
                    .delete(datastore::delete_vm),
            ),
        guards,
        GuardPolicy::required()
            .permission(Permission::MANAGE_SYSTEM)
            .limited_by(Arc::clone(&limiters.strict)),
    );

    let api = Router::new()
        .merge(auth_public)
        .merge(auth_session)
        .merge(user_directory)
        .merge(user_self)
        .merge(user_roles)
        .merge(content_read)
        .merge(post_create)
        .merge(post_update)
        .merge(post_delete)
        .merge(comment_create)
        .merge(comment_delete)
        .merge(vm_admin)
        .with_state(state);

    Router::new()
        .merge(health::router(health))
        .merge(api)
        .layer(from_fn(request_logging))
        .layer(CorsLayer::permissive())
}
