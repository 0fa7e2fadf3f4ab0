// src/dag/mod.rs

//! Task graph construction and dependency scheduling.
//!
//! - [`graph`] holds the pipeline stages and their dependency edges.
//! - [`splitter`] turns a job into ordered, dependency-annotated tasks.
//! - [`scheduler`] decides which tasks of a job are ready to run and fails
//!   dependents when a task fails.

pub mod graph;
pub mod scheduler;
pub mod splitter;

pub use graph::{PipelineGraph, RESLICED_OUTPUT, SKULL_STRIPPED_OUTPUT, StageKind, StageNode};
pub use scheduler::{Scheduler, SchedulerStep, TaskRunState};
pub use splitter::{JobSplitter, split};
