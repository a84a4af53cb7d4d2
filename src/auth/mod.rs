//! Authentication Module
//! Mission: Secure API access with bcrypt credentials, JWT bearer tokens and RBAC

pub mod api;
pub mod jwt;
pub mod models;
pub mod password;
pub mod rbac;
pub mod service;
pub mod user_store;

pub use jwt::JwtHandler;
pub use models::{Claims, Permission, Principal, Role};
pub use password::PasswordHasher;
pub use rbac::{AuthorizationStore, MemoryAuthorizationStore, Requirement, SqliteAuthorizationStore};
pub use service::{AuthError, AuthService};
pub use user_store::UserStore;
