// src/exec/mod.rs

//! Task execution layer.
//!
//! This module runs the tasks produced by the splitter on a compute node
//! and classifies their outcome.
//!
//! - [`process`] spawns stage processes with `tokio::process::Command`
//!   behind the [`ProcessRunner`] trait.
//! - [`processor`] dispatches a task by its identifier: processing stages
//!   run their script, the merge task writes the completion marker.
//! - [`backend`] provides the `ExecutorBackend` trait the local runtime
//!   dispatches to, and the `ProcessorBackend` used in production.

pub mod backend;
pub mod process;
pub mod processor;

pub use backend::{ExecutorBackend, ProcessorBackend};
pub use process::{Invocation, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use processor::{COMPLETION_FILE, COMPLETION_MARKER, NodeLayout, TaskProcessor};
