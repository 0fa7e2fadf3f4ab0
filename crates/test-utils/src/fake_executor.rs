use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use niftibatch::engine::RuntimeEvent;
use niftibatch::errors::Result;
use niftibatch::exec::ExecutorBackend;
use niftibatch::model::{TaskId, TaskProcessResult, TaskProcessSuccess, TaskSpecifier};

/// A fake executor that:
/// - records which tasks were "run"
/// - immediately reports `TaskCompleted` for each scheduled task, with
///   `Succeeded` unless an outcome was set for that task.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<TaskId>>>,
    outcomes: HashMap<TaskId, TaskProcessSuccess>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<TaskId>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            outcomes: HashMap::new(),
        }
    }

    pub fn with_outcome(mut self, task: TaskId, outcome: TaskProcessSuccess) -> Self {
        self.outcomes.insert(task, outcome);
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskSpecifier>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let outcomes = self.outcomes.clone();

        Box::pin(async move {
            for t in tasks {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(t.task_id);
                }

                let success = outcomes
                    .get(&t.task_id)
                    .copied()
                    .unwrap_or(TaskProcessSuccess::Succeeded);
                tx.send(RuntimeEvent::TaskCompleted {
                    task: t.task_id,
                    result: TaskProcessResult {
                        success,
                        output_files: Vec::new(),
                        processor_output: format!("fake run of {}", t.task_id),
                    },
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
