//! Patos API Library
//!
//! Session tokens, organization membership and the account flows built on
//! one-time links, served over axum.

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
