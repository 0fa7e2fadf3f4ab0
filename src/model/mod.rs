// src/model/mod.rs

//! Data model shared by the client, the graph builder and the executor.
//!
//! - [`file`] identifies files a task needs or produces.
//! - [`task`] holds task identifiers, specifiers and process results.
//! - [`job`] holds jobs, statuses and what the service reports about them.

pub mod file;
pub mod job;
pub mod task;

pub use file::FileSpecifier;
pub use job::{
    IntermediateOutput, Job, JobStatus, JobSubmission, LogEntry, OutputKind, Parameters,
};
pub use task::{
    JobResult, TaskDependency, TaskId, TaskOutputFile, TaskOutputFileKind, TaskProcessResult,
    TaskProcessSuccess, TaskSpecifier,
};
