//! Request guard.
//!
//! One middleware runs the per-route gate in a fixed order: identity
//! extraction, authorization, rate limiting, then dispatch. Routes differ only
//! in their [`GuardPolicy`]:
//!
//! ```text
//! Received -> Authenticating -> Authorizing -> Metering -> Dispatched
//!                 | 401             | 403          | 429
//! ```

use crate::auth::jwt::{parse_bearer, JwtHandler};
use crate::auth::models::{Claims, Permission, Role};
use crate::auth::rbac::{AuthorizationStore, Requirement};
use crate::error::{ApiError, INVALID_TOKEN};
use crate::middleware::rate_limit::RateLimiter;
use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_GUARD_DEADLINE: Duration = Duration::from_secs(5);

/// The authenticated caller, attached to request extensions by the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub principal_id: u64,
    pub name: String,
    pub contact: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            principal_id: claims.user_id,
            name: claims.username,
            contact: claims.email,
        }
    }
}

impl Identity {
    /// Key the rate limiter meters this caller under.
    pub fn limit_key(&self) -> String {
        format!("user:{}", self.principal_id)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(ApiError::Unauthorized(INVALID_TOKEN))
    }
}

/// Client IP from the connection, or `"unknown"` when the server was not
/// started with connect info.
pub fn client_addr<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    /// No valid bearer token means 401.
    Required,
    /// No valid bearer token means an anonymous request.
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Require(Requirement),
    /// Owner is the last numeric segment of the request path.
    OwnerInPathOrRole(Role),
}

#[derive(Clone)]
pub struct GuardPolicy {
    identity: IdentityMode,
    gate: Option<Gate>,
    limiter: Option<Arc<RateLimiter>>,
}

impl GuardPolicy {
    pub fn required() -> Self {
        Self {
            identity: IdentityMode::Required,
            gate: None,
            limiter: None,
        }
    }

    pub fn optional() -> Self {
        Self {
            identity: IdentityMode::Optional,
            ..Self::required()
        }
    }

    pub fn permission(self, permission: Permission) -> Self {
        self.gate(Gate::Require(Requirement::Permission(permission)))
    }

    pub fn role(self, role: Role) -> Self {
        self.gate(Gate::Require(Requirement::Role(role)))
    }

    pub fn any_role(self, roles: Vec<Role>) -> Self {
        self.gate(Gate::Require(Requirement::AnyRole(roles)))
    }

    pub fn owner_or_role(self, role: Role) -> Self {
        self.gate(Gate::OwnerInPathOrRole(role))
    }

    pub fn gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn limited_by(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

/// Collaborators shared by every guarded route.
#[derive(Clone)]
pub struct GuardContext {
    pub jwt: Arc<JwtHandler>,
    pub authz: Arc<dyn AuthorizationStore>,
    /// Budget for authorization-store reads.
    pub deadline: Duration,
}

/// Middleware state: the shared context plus one route's policy.
#[derive(Clone)]
pub struct Guard {
    ctx: GuardContext,
    policy: GuardPolicy,
}

impl GuardContext {
    pub fn guard(&self, policy: GuardPolicy) -> Guard {
        Guard {
            ctx: self.clone(),
            policy,
        }
    }
}

impl Guard {
    fn identify(&self, request: &Request<Body>) -> Result<Option<Identity>, ApiError> {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let outcome = match header {
            None => Err("missing authorization header"),
            Some(value) => match parse_bearer(value) {
                None => Err("authorization scheme is not Bearer"),
                Some(token) => self.ctx.jwt.validate(token).map_err(|e| {
                    debug!(reason = %e, "Bearer token rejected");
                    "token rejected"
                }),
            },
        };

        match (outcome, self.policy.identity) {
            (Ok(claims), _) => Ok(Some(Identity::from(claims))),
            (Err(reason), IdentityMode::Required) => {
                debug!(reason, "Unauthenticated request");
                Err(ApiError::Unauthorized(INVALID_TOKEN))
            }
            (Err(_), IdentityMode::Optional) => Ok(None),
        }
    }

    async fn authorize(
        &self,
        identity: Option<&Identity>,
        path: &str,
    ) -> Result<(), ApiError> {
        let Some(gate) = &self.policy.gate else {
            return Ok(());
        };
        let Some(identity) = identity else {
            return Err(ApiError::Unauthorized(INVALID_TOKEN));
        };

        let requirement = match gate {
            Gate::Require(requirement) => requirement.clone(),
            Gate::OwnerInPathOrRole(role) => match owner_from_path(path) {
                Some(owner_id) => Requirement::OwnershipOrRole {
                    owner_id,
                    role: role.clone(),
                },
                None => Requirement::Role(role.clone()),
            },
        };

        let check = self.ctx.authz.authorize(identity.principal_id, &requirement);
        match tokio::time::timeout(self.ctx.deadline, check).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => {
                warn!(
                    principal_id = identity.principal_id,
                    deadline_ms = self.ctx.deadline.as_millis() as u64,
                    "Authorization check exceeded deadline"
                );
                Err(ApiError::Internal(
                    "authorization store deadline exceeded".to_string(),
                ))
            }
        }
    }
}

fn owner_from_path(path: &str) -> Option<u64> {
    path.rsplit('/').find_map(|segment| segment.parse().ok())
}

/// Guard middleware. Use with `axum::middleware::from_fn_with_state`.
pub async fn guard(State(guard): State<Guard>, mut request: Request<Body>, next: Next) -> Response {
    let identity = match guard.identify(&request) {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    if let Err(e) = guard.authorize(identity.as_ref(), request.uri().path()).await {
        return e.into_response();
    }

    let decision = guard.policy.limiter.as_ref().map(|limiter| {
        let key = identity
            .as_ref()
            .map(Identity::limit_key)
            .unwrap_or_else(|| client_addr(&request));
        let decision = limiter.check(&key);
        if !decision.allowed {
            warn!(key = %key, limit = decision.limit, "Rate limit exceeded");
        }
        decision
    });
    if let Some(decision) = decision.filter(|d| !d.allowed) {
        return decision.into_rejection();
    }

    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }
    let mut response = next.run(request).await;
    if let Some(decision) = decision {
        decision.apply_headers(response.headers_mut());
    }
    response
}
