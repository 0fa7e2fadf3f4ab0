// src/engine/mod.rs

//! Local execution engine.
//!
//! Runs one job's task graph on the current machine: the scheduler decides
//! what is ready, an [`ExecutorBackend`](crate::exec::ExecutorBackend) runs
//! it, and completions flow back through [`RuntimeEvent`]s until every task
//! is terminal.

use std::collections::BTreeMap;

use crate::model::{JobResult, TaskId, TaskOutputFileKind, TaskProcessResult};

/// Events flowing into the runtime from executors and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task finished with a concrete result.
    TaskCompleted {
        task: TaskId,
        result: TaskProcessResult,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// What happened to a job run locally.
#[derive(Debug, Clone, Default)]
pub struct LocalRunReport {
    /// Results in completion order.
    pub results: Vec<(TaskId, TaskProcessResult)>,
    /// Tasks that never ran because something upstream failed.
    pub blocked: Vec<TaskId>,
    /// Set when the run stopped before every task was terminal.
    pub interrupted: bool,
}

impl LocalRunReport {
    pub fn result_of(&self, task: TaskId) -> Option<&TaskProcessResult> {
        self.results
            .iter()
            .find(|(id, _)| *id == task)
            .map(|(_, r)| r)
    }

    /// Task ids in the order they completed.
    pub fn completed(&self) -> Vec<TaskId> {
        self.results.iter().map(|(id, _)| *id).collect()
    }

    /// Every dispatched task succeeded and nothing was blocked or cut short.
    pub fn succeeded(&self) -> bool {
        !self.interrupted
            && self.blocked.is_empty()
            && self.results.iter().all(|(_, r)| r.succeeded())
    }

    /// The merge task's artifact, if it ran.
    pub fn job_result(&self) -> Option<JobResult> {
        self.result_of(TaskId::Merge)?
            .output_files
            .iter()
            .find(|f| f.kind == TaskOutputFileKind::JobOutput)
            .map(|f| JobResult {
                output_file: f.file_name.clone(),
            })
    }

    /// Per-task diagnostic text, keyed by task.
    pub fn diagnostics(&self) -> BTreeMap<TaskId, &str> {
        self.results
            .iter()
            .map(|(id, r)| (*id, r.processor_output.as_str()))
            .collect()
    }
}

pub mod runtime;

pub use runtime::LocalRuntime;
