// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The local runtime talks to an `ExecutorBackend` instead of calling the
//! task processor directly. This makes it easy to swap in a fake executor
//! in tests while keeping the production implementation in
//! [`ProcessorBackend`].
//!
//! - `ProcessorBackend` runs each dispatched task on its own Tokio task via
//!   a shared [`TaskProcessor`] and reports the result as a
//!   `RuntimeEvent::TaskCompleted`.
//! - Tests can provide their own `ExecutorBackend` that, for example,
//!   records which tasks were dispatched and emits canned results.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::process::ProcessRunner;
use crate::exec::processor::TaskProcessor;
use crate::model::{TaskProcessResult, TaskProcessSuccess, TaskSpecifier};

/// Trait abstracting how ready tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Implementations report each task's outcome back to the runtime as a
    /// `RuntimeEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskSpecifier>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production backend: one Tokio task per dispatched task.
pub struct ProcessorBackend<R> {
    processor: Arc<TaskProcessor<R>>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl<R> ProcessorBackend<R> {
    pub fn new(processor: Arc<TaskProcessor<R>>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            processor,
            runtime_tx,
        }
    }
}

impl<R: ProcessRunner + 'static> ExecutorBackend for ProcessorBackend<R> {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskSpecifier>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        for task in tasks {
            let processor = Arc::clone(&self.processor);
            let tx = self.runtime_tx.clone();

            tokio::spawn(async move {
                let task_id = task.task_id;
                let result = match processor.execute(&task).await {
                    Ok(result) => result,
                    Err(err) => {
                        error!(task = %task_id, error = %err, "task execution error");
                        TaskProcessResult {
                            success: TaskProcessSuccess::PermanentFailure,
                            output_files: Vec::new(),
                            processor_output: format!("task execution error: {err}"),
                        }
                    }
                };

                let _ = tx
                    .send(RuntimeEvent::TaskCompleted {
                        task: task_id,
                        result,
                    })
                    .await;
            });
        }

        Box::pin(async { Ok(()) })
    }
}
