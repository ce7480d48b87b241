//! Patos shared types and utilities
//!
//! Domain records, identifiers, the error taxonomy and database helpers used by
//! the API server and the background worker.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
