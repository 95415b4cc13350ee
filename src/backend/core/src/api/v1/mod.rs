//! V1 API module.
//!
//! - Queue status, job lookup and forced cleanup
//! - Scheduled task listing

pub mod routes;

pub use routes::{v1_router, V1_PREFIX};
