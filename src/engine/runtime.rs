// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::Scheduler;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::model::TaskSpecifier;

use super::{LocalRunReport, RuntimeEvent};

/// Drives the scheduler of one job in response to `RuntimeEvent`s and
/// delegates actual task execution to an `ExecutorBackend`.
pub struct LocalRuntime<E: ExecutorBackend> {
    scheduler: Scheduler,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for LocalRuntime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRuntime")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> LocalRuntime<E> {
    pub fn new(scheduler: Scheduler, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            scheduler,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches the initially ready tasks.
    /// - Feeds each completion into the scheduler and dispatches whatever
    ///   became ready.
    /// - Returns once every task is terminal, on shutdown, or when the event
    ///   channel closes.
    pub async fn run(mut self) -> Result<LocalRunReport> {
        info!("local runtime started");
        let mut report = LocalRunReport::default();

        let step = self.scheduler.start();
        report.blocked.extend(step.newly_failed);
        self.dispatch(step.newly_scheduled).await?;

        while !self.scheduler.is_finished() {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!("runtime event channel closed before job finished");
                    report.interrupted = true;
                    break;
                }
            };

            debug!(?event, "runtime received event");

            match event {
                RuntimeEvent::TaskCompleted { task, result } => {
                    let step = self.scheduler.handle_completion(task, result.success);
                    report.results.push((task, result));
                    // The failed task itself is in `results`; the rest never ran.
                    report
                        .blocked
                        .extend(step.newly_failed.into_iter().filter(|id| *id != task));
                    self.dispatch(step.newly_scheduled).await?;
                }
                RuntimeEvent::ShutdownRequested => {
                    info!("shutdown requested; stopping local runtime");
                    report.interrupted = true;
                    break;
                }
            }
        }

        info!(
            succeeded = report.succeeded(),
            completed = ?report.completed(),
            blocked = ?report.blocked,
            "local runtime exiting"
        );
        Ok(report)
    }

    async fn dispatch(&mut self, tasks: Vec<TaskSpecifier>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.task_id).collect();
        debug!(?ids, "dispatching ready tasks");
        self.executor.spawn_ready_tasks(tasks).await
    }
}
