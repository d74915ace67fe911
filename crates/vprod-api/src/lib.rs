//! Axum HTTP API over the task store.
//!
//! This crate provides:
//! - Task submission, query, cancellation and deletion
//! - Liveness and readiness probes (including embedded worker states)
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
