//! Durable task storage.
//!
//! [`TaskStore`] is the contract shared by the submission surface and the
//! workers; [`JsonTaskStore`] implements it over a single JSON file.

pub mod error;
pub mod json;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use json::JsonTaskStore;
pub use store::{TaskFilter, TaskStore};
