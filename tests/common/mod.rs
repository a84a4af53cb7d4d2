//! Shared harness: the full router over an in-memory database.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use postbox_backend::{
    auth::{
        AuthService, AuthorizationStore, JwtHandler, PasswordHasher, Role,
        SqliteAuthorizationStore, UserStore,
    },
    clock::ManualClock,
    db::Database,
    health::HealthChecker,
    middleware::{GuardContext, RateLimitConfig},
    state::{build_router, AppState, Limiters},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const PASSWORD: &str = "Str0ng!pass";

pub struct TestApp {
    pub router: Router,
    pub authz: Arc<dyn AuthorizationStore>,
    pub users: UserStore,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_limiters(Limiters::new(
            RateLimitConfig::per_minute(1000),
            RateLimitConfig::per_minute(1000),
            RateLimitConfig::per_minute(1000),
        ))
        .await
    }

    pub async fn with_limiters(limiters: Limiters) -> Self {
        let db = Database::open_in_memory().unwrap();
        let authz: Arc<dyn AuthorizationStore> =
            Arc::new(SqliteAuthorizationStore::new(db.clone()));
        authz.initialize_defaults().await.unwrap();

        let clock = Arc::new(ManualClock::starting_now());
        let jwt = Arc::new(JwtHandler::with_clock(
            "integration-secret",
            chrono::Duration::hours(24),
            clock.clone(),
        ));
        let users = UserStore::new(db.clone());
        let auth = AuthService::new(
            users.clone(),
            authz.clone(),
            jwt.clone(),
            PasswordHasher::with_cost(4),
        );
        let guards = GuardContext {
            jwt,
            authz: authz.clone(),
            deadline: Duration::from_secs(5),
        };
        let router = build_router(
            AppState::new(db.clone(), auth),
            &guards,
            &limiters,
            HealthChecker::new(db),
        );

        Self {
            router,
            authz,
            users,
            clock,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Register an account and return `(id, token)`.
    pub async fn register(&self, username: &str) -> (u64, String) {
        let response = self
            .send(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        (
            body["user"]["id"].as_u64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    pub async fn register_admin(&self, username: &str) -> (u64, String) {
        let (id, token) = self.register(username).await;
        self.authz.assign_role(id, &Role::ADMIN).await.unwrap();
        (id, token)
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
