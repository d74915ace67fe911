//! Production worker.
//!
//! Workers pull pending tasks from a shared [`TaskStore`](vprod_store::TaskStore),
//! run the production pipeline (requirement → IR → segment extraction →
//! result) and publish the outcome back to the store.

pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod planner;
pub mod scheduler;

pub use completion::{GeminiClient, TextCompletion};
pub use config::{CompletionConfig, WorkerConfig};
pub use error::{FailureKind, WorkerError, WorkerResult};
pub use executor::{fail_stale_tasks, Worker, WorkerPool, WorkerState};
pub use logging::TaskLogger;
pub use pipeline::Pipeline;
pub use planner::{FallbackReason, IrOrigin, IrPlanner, PlannedIr};
pub use scheduler::Scheduler;
