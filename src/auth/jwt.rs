//! JWT Token Handler
//! Mint, validate and refresh HS256 bearer tokens.

use crate::auth::models::{Claims, Principal};
use crate::clock::{Clock, SystemClock};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Duration;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tokens with at most this much lifetime left may be exchanged for a new one.
pub const REFRESH_WINDOW_SECS: i64 = 3600;

const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token header declares a non-HMAC algorithm")]
    WrongAlgorithm,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token expired")]
    Expired,
    #[error("token has more than one hour remaining")]
    NotRefreshable,
    #[error("failed to sign token")]
    SignFailed,
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub claims: Claims,
}

impl MintedToken {
    pub fn expires_in(&self) -> i64 {
        self.claims.exp - self.claims.iat
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Signs and checks bearer tokens. The secret never changes after construction.
pub struct JwtHandler {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key
    pub fn new(secret: &str) -> Self {
        Self::with_clock(
            secret,
            Duration::hours(DEFAULT_TTL_HOURS),
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(secret: &str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        // Time claims are checked against our own clock below, not the library's.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a token for a principal
    pub fn mint(&self, principal: &Principal) -> Result<MintedToken, TokenError> {
        self.mint_for(principal.id, &principal.username, &principal.email)
    }

    fn mint_for(&self, user_id: u64, username: &str, email: &str) -> Result<MintedToken, TokenError> {
        // One sample for all three timestamps.
        let now = self.clock.now().timestamp();
        let claims = Claims {
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            iat: now,
            nbf: now,
            exp: now + self.ttl.num_seconds(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            warn!(error = %e, user_id, "JWT signing failed");
            TokenError::SignFailed
        })?;

        debug!(
            user_id,
            expires_at = claims.exp,
            "Minted JWT for {}", claims.username
        );

        Ok(MintedToken { token, claims })
    }

    /// Validate a token and extract its claims
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        check_header_algorithm(token)?;

        let decoded = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::WrongAlgorithm
                }
                _ => TokenError::Malformed,
            }
        })?;
        let claims = decoded.claims;

        let now = self.clock.now().timestamp();
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        if now > claims.exp {
            return Err(TokenError::Expired);
        }

        debug!(user_id = claims.user_id, "Validated JWT");
        Ok(claims)
    }

    /// Validate the value of an `Authorization` header.
    pub fn validate_bearer(&self, header_value: &str) -> Result<Claims, TokenError> {
        let token = parse_bearer(header_value).ok_or(TokenError::Malformed)?;
        self.validate(token)
    }

    /// Exchange a near-expiry token for a fresh one carrying the same principal.
    pub fn refresh(&self, token: &str) -> Result<MintedToken, TokenError> {
        let claims = self.validate(token)?;

        let remaining = claims.exp - self.clock.now().timestamp();
        if remaining > REFRESH_WINDOW_SECS {
            return Err(TokenError::NotRefreshable);
        }

        self.mint_for(claims.user_id, &claims.username, &claims.email)
    }
}

/// `Bearer <token>` with exactly one space-separated token.
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Reject anything outside the HMAC-SHA family before the signature is looked at.
fn check_header_algorithm(token: &str) -> Result<(), TokenError> {
    let header_segment = token.split('.').next().ok_or(TokenError::Malformed)?;
    let raw = URL_SAFE_NO_PAD
        .decode(header_segment)
        .map_err(|_| TokenError::Malformed)?;
    let header: RawHeader = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;

    match header.alg.as_str() {
        "HS256" | "HS384" | "HS512" => Ok(()),
        _ => Err(TokenError::WrongAlgorithm),
    }
}
