//! Application state.

use std::sync::Arc;

use vprod_store::TaskStore;
use vprod_worker::WorkerPool;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn TaskStore>,
    /// Embedded workers, when this process runs any
    pub workers: Option<Arc<WorkerPool>>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn TaskStore>,
        workers: Option<Arc<WorkerPool>>,
    ) -> Self {
        Self {
            config,
            store,
            workers,
        }
    }
}
