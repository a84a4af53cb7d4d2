//! Authentication Models
//! Principals, bearer claims, roles and permissions.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Persisted user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: u64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrincipalUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
}

/// JWT Claims payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub username: String,
    pub email: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Role name. The built-in set is `admin`, `user` and `guest`; deployments may
/// declare more.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const USER: Role = Role(Cow::Borrowed("user"));
    pub const GUEST: Role = Role(Cow::Borrowed("guest"));

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid_name(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= 50
            && s.starts_with(|c: char| c.is_ascii_lowercase())
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    }
}

impl FromStr for Role {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "admin" => return Ok(Role::ADMIN),
            "user" => return Ok(Role::USER),
            "guest" => return Ok(Role::GUEST),
            _ => {}
        }
        if Role::is_valid_name(&s) {
            Ok(Role(Cow::Owned(s)))
        } else {
            Err(InvalidName::Role(s))
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fine-grained authority of the form `<verb>:<object>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const CREATE_USER: Permission = Permission(Cow::Borrowed("create:user"));
    pub const READ_USER: Permission = Permission(Cow::Borrowed("read:user"));
    pub const UPDATE_USER: Permission = Permission(Cow::Borrowed("update:user"));
    pub const DELETE_USER: Permission = Permission(Cow::Borrowed("delete:user"));

    pub const CREATE_POST: Permission = Permission(Cow::Borrowed("create:post"));
    pub const READ_POST: Permission = Permission(Cow::Borrowed("read:post"));
    pub const UPDATE_POST: Permission = Permission(Cow::Borrowed("update:post"));
    pub const DELETE_POST: Permission = Permission(Cow::Borrowed("delete:post"));

    pub const CREATE_COMMENT: Permission = Permission(Cow::Borrowed("create:comment"));
    pub const READ_COMMENT: Permission = Permission(Cow::Borrowed("read:comment"));
    pub const UPDATE_COMMENT: Permission = Permission(Cow::Borrowed("update:comment"));
    pub const DELETE_COMMENT: Permission = Permission(Cow::Borrowed("delete:comment"));

    pub const MANAGE_SYSTEM: Permission = Permission(Cow::Borrowed("manage:system"));

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Permission {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let valid_part = |p: &str| {
            !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase() || c == '_')
        };
        let valid = s
            .split_once(':')
            .is_some_and(|(verb, object)| valid_part(verb) && valid_part(object));
        if valid {
            Ok(Permission(Cow::Owned(s)))
        } else {
            Err(InvalidName::Permission(s))
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidName {
    #[error("invalid role name: {0:?}")]
    Role(String),
    #[error("invalid permission {0:?}, expected <verb>:<object>")]
    Permission(String),
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Token response for login, register and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_in: i64, // seconds until expiration
    pub user: UserResponse,
}

/// User response (sanitized)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: String,
}

impl UserResponse {
    pub fn from_principal(p: &Principal) -> Self {
        Self {
            id: p.id,
            username: p.username.clone(),
            email: p.email.clone(),
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            is_active: p.is_active,
            created_at: p.created_at.clone(),
        }
    }
}
