//! Shared data models for the video production engine.
//!
//! This crate provides Serde-serializable types for:
//! - Task records, task kinds and their typed parameters
//! - The production-plan intermediate representation (IR)
//! - Segment extraction requests and results

pub mod ir;
pub mod media;
pub mod task;

// Re-export common types
pub use ir::{Backfill, IrDocument, Validation, REQUIRED_SECTIONS};
pub use media::{MediaSegment, SegmentRequest, VideoInfo};
pub use task::{
    ProduceVideoParams, Task, TaskId, TaskKind, TaskPriority, TaskResult, TaskStatus, TaskType,
    TransitionError,
};
