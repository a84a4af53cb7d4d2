//! Authentication Service
//! Mission: Turn credentials into principals and bearer tokens.
//!
//! Every way a login can fail (unknown contact, deactivated account, wrong
//! secret) reaches the caller as the same [`AuthError::InvalidCredentials`]
//! family; the specific cause is only logged.

use crate::auth::jwt::{JwtHandler, MintedToken, TokenError};
use crate::auth::models::{Claims, LoginRequest, Principal, RegisterRequest, Role};
use crate::auth::password::{PasswordError, PasswordHasher};
use crate::auth::rbac::{AuthorizationStore, AuthzError, Requirement};
use crate::auth::user_store::{PrincipalRecord, UserStore};
use crate::db::StoreError;
use crate::validation::{sanitize, validate_registration, FieldError};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is deactivated")]
    Inactive,
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Authz(#[from] AuthzError),
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Clone)]
pub struct AuthService {
    users: UserStore,
    authz: Arc<dyn AuthorizationStore>,
    jwt: Arc<JwtHandler>,
    hasher: PasswordHasher,
}

impl AuthService {
    pub fn new(
        users: UserStore,
        authz: Arc<dyn AuthorizationStore>,
        jwt: Arc<JwtHandler>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            authz,
            jwt,
            hasher,
        }
    }

    pub fn jwt(&self) -> &Arc<JwtHandler> {
        &self.jwt
    }

    pub fn authz(&self) -> &Arc<dyn AuthorizationStore> {
        &self.authz
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Check a contact/secret pair and mint a token for the principal.
    pub async fn authenticate(
        &self,
        credential: &LoginRequest,
    ) -> Result<(Principal, MintedToken), AuthError> {
        // Same normalization registration applied before storing the contact.
        let contact = sanitize(&credential.email);
        let Some(principal) = self.users.find_by_contact(&contact).await? else {
            info!(email = %contact, success = false, "Login: unknown contact");
            return Err(AuthError::InvalidCredentials);
        };

        if !principal.is_active {
            warn!(
                principal_id = principal.id,
                success = false,
                "Login: account is deactivated"
            );
            return Err(AuthError::Inactive);
        }

        match self.verify(&principal.password_hash, &credential.password).await {
            Ok(()) => {}
            Err(PasswordError::Mismatch) => {
                info!(principal_id = principal.id, success = false, "Login: secret mismatch");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        }

        let token = self.jwt.mint(&principal)?;
        info!(principal_id = principal.id, success = true, "Login");
        Ok((principal, token))
    }

    /// Validate and persist a new active principal holding the `user` role.
    pub async fn register(
        &self,
        mut request: RegisterRequest,
    ) -> Result<(Principal, MintedToken), AuthError> {
        validate_registration(&mut request).map_err(AuthError::Validation)?;

        let password_hash = self.hash(&request.password).await?;
        let principal = self
            .users
            .create(PrincipalRecord {
                username: &request.username,
                email: &request.email,
                password_hash: &password_hash,
                first_name: &request.first_name,
                last_name: &request.last_name,
            })
            .await?;

        self.authz.assign_role(principal.id, &Role::USER).await?;

        let token = self.jwt.mint(&principal)?;
        info!(principal_id = principal.id, email = %principal.email, "Registered");
        Ok((principal, token))
    }

    /// Sliding refresh. The principal must still exist and be active.
    pub async fn refresh(&self, token: &str) -> Result<(Principal, MintedToken), AuthError> {
        let claims = self.jwt.validate(token)?;
        let principal = self
            .users
            .find_by_id(claims.user_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                warn!(principal_id = claims.user_id, "Refresh for missing or inactive principal");
                AuthError::Token(TokenError::Malformed)
            })?;

        let minted = self.jwt.refresh(token)?;
        info!(principal_id = principal.id, "Token refreshed");
        Ok((principal, minted))
    }

    pub fn validate_bearer(&self, header_value: &str) -> Result<Claims, AuthError> {
        Ok(self.jwt.validate_bearer(header_value)?)
    }

    pub async fn authorize(
        &self,
        principal_id: u64,
        requirement: &Requirement,
    ) -> Result<(), AuthError> {
        Ok(self.authz.authorize(principal_id, requirement).await?)
    }

    /// bcrypt is CPU bound, so it runs off the async workers.
    async fn hash(&self, secret: &str) -> Result<String, AuthError> {
        let hasher = self.hasher;
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| AuthError::Internal(format!("hash task: {e}")))?
            .map_err(AuthError::from)
    }

    async fn verify(&self, verifier: &str, candidate: &str) -> Result<(), PasswordError> {
        let hasher = self.hasher;
        let verifier = verifier.to_string();
        let candidate = candidate.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&verifier, &candidate))
            .await
            .unwrap_or(Err(PasswordError::Mismatch))
    }
}
