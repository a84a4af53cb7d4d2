//! Postbox Backend Library
//!
//! Users, posts, comments and datastore records behind a per-route request
//! guard (bearer identity, role/permission checks, sliding-window limits).
//! The `postbox` binary wires these modules together; tests drive the same
//! router in process.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod health;
pub mod middleware;
pub mod pagination;
pub mod state;
pub mod validation;

pub use error::{ApiError, ApiResult};
pub use state::{build_router, AppState, Limiters};
