//! HTTP handlers for the CRUD surfaces. Route wiring and guard policies live
//! in [`crate::state::build_router`].

pub mod comments;
pub mod datastore;
pub mod posts;
pub mod users;
