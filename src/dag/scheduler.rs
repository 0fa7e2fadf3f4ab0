use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::model::{TaskId, TaskProcessSuccess, TaskSpecifier};

/// Per-job state of a task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    /// Waiting on dependencies.
    Pending,
    /// Dispatched to an executor.
    Running,
    DoneSuccess,
    /// Failed, or blocked by a failed dependency.
    DoneFailed,
}

/// Public, read-only view of a task's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    Pending,
    Running,
    DoneSuccess,
    DoneFailed,
}

impl From<RunState> for TaskRunState {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Pending => TaskRunState::Pending,
            RunState::Running => TaskRunState::Running,
            RunState::DoneSuccess => TaskRunState::DoneSuccess,
            RunState::DoneFailed => TaskRunState::DoneFailed,
        }
    }
}

#[derive(Debug, Clone)]
struct TaskInfo {
    spec: TaskSpecifier,
    state: RunState,
}

/// Structured result of a single scheduler step.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready and are now `Running`.
    pub newly_scheduled: Vec<TaskSpecifier>,
    /// Tasks newly marked failed: the task that failed plus blocked dependents.
    pub newly_failed: Vec<TaskId>,
    /// Whether every task is now terminal.
    pub job_just_finished: bool,
}

/// Dependency-aware dispatcher for the tasks of one job.
///
/// A task is dispatched only once the task it depends on finished with
/// `Succeeded`. The merge task additionally waits for every other task to
/// succeed. A failed task fails everything downstream of it and leaves
/// independent tasks alone.
#[derive(Debug)]
pub struct Scheduler {
    tasks: BTreeMap<TaskId, TaskInfo>,
    started: bool,
}

impl Scheduler {
    /// Schedule the split tasks of a job plus its optional merge task.
    pub fn new(tasks: Vec<TaskSpecifier>, merge: Option<TaskSpecifier>) -> Self {
        let tasks = tasks
            .into_iter()
            .chain(merge)
            .map(|spec| {
                (
                    spec.task_id,
                    TaskInfo {
                        spec,
                        state: RunState::Pending,
                    },
                )
            })
            .collect();

        Self {
            tasks,
            started: false,
        }
    }

    /// Dispatch the tasks whose dependencies are already satisfied.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler already started; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;
        info!(tasks = self.tasks.len(), "scheduler: starting job run");

        let mut step = SchedulerStep {
            newly_failed: self.fail_orphans(),
            ..SchedulerStep::default()
        };
        step.newly_scheduled = self.collect_new_ready_tasks();
        step.job_just_finished = self.is_finished();
        step
    }

    /// Record the outcome of a running task.
    pub fn handle_completion(&mut self, task: TaskId, outcome: TaskProcessSuccess) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.tasks.get_mut(&task) {
            Some(info) if info.state == RunState::Running => match outcome {
                TaskProcessSuccess::Succeeded => {
                    info.state = RunState::DoneSuccess;
                    debug!(task = %task, "task completed successfully");
                    step.newly_scheduled = self.collect_new_ready_tasks();
                }
                TaskProcessSuccess::PermanentFailure => {
                    info.state = RunState::DoneFailed;
                    warn!(task = %task, "task failed; failing dependents");
                    step.newly_failed.push(task);
                    step.newly_failed.extend(self.mark_dependents_failed(task));
                }
            },
            Some(info) => {
                warn!(task = %task, state = ?info.state, "completion for task that is not running; ignoring");
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
            }
        }

        step.job_just_finished = self.is_finished();
        step
    }

    pub fn run_state_of(&self, task: TaskId) -> Option<TaskRunState> {
        self.tasks.get(&task).map(|info| info.state.into())
    }

    /// All tasks reached `DoneSuccess` or `DoneFailed`.
    pub fn is_finished(&self) -> bool {
        self.tasks
            .values()
            .all(|info| matches!(info.state, RunState::DoneSuccess | RunState::DoneFailed))
    }

    pub fn all_succeeded(&self) -> bool {
        self.tasks
            .values()
            .all(|info| info.state == RunState::DoneSuccess)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    fn deps_satisfied(&self, info: &TaskInfo) -> bool {
        if let Some(dep) = info.spec.depends_on {
            match self.tasks.get(&dep.on) {
                Some(d) if d.state == RunState::DoneSuccess => {}
                Some(_) => return false,
                None => {
                    warn!(task = %info.spec.task_id, dep = %dep.on, "dependency missing from job");
                    return false;
                }
            }
        }

        if info.spec.task_id.is_merge() {
            return self
                .tasks
                .values()
                .filter(|other| !other.spec.task_id.is_merge())
                .all(|other| other.state == RunState::DoneSuccess);
        }

        true
    }

    /// Pending tasks with satisfied dependencies become `Running`.
    fn collect_new_ready_tasks(&mut self) -> Vec<TaskSpecifier> {
        let candidates: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|info| info.state == RunState::Pending && self.deps_satisfied(info))
            .map(|info| info.spec.task_id)
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(info) = self.tasks.get_mut(&id) {
                info!(task = %id, "dependencies satisfied; dispatching task");
                info.state = RunState::Running;
                ready.push(info.spec.clone());
            }
        }
        ready
    }

    /// Fail pending tasks downstream of `failed`, transitively.
    ///
    /// The merge task depends on every stage, so any failure blocks it.
    fn mark_dependents_failed(&mut self, failed: TaskId) -> Vec<TaskId> {
        let mut stack = vec![failed];
        let mut newly_failed = Vec::new();

        while let Some(upstream) = stack.pop() {
            let blocked: Vec<TaskId> = self
                .tasks
                .values()
                .filter(|info| info.state == RunState::Pending)
                .filter(|info| {
                    info.spec.depends_on.map(|d| d.on) == Some(upstream)
                        || info.spec.task_id.is_merge()
                })
                .map(|info| info.spec.task_id)
                .collect();

            for id in blocked {
                if let Some(info) = self.tasks.get_mut(&id) {
                    debug!(task = %id, upstream = %upstream, "blocked by upstream failure");
                    info.state = RunState::DoneFailed;
                    newly_failed.push(id);
                    stack.push(id);
                }
            }
        }

        newly_failed
    }

    /// Tasks depending on a task the job does not contain can never run.
    fn fail_orphans(&mut self) -> Vec<TaskId> {
        let orphans: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|info| {
                info.spec
                    .depends_on
                    .is_some_and(|d| !self.tasks.contains_key(&d.on))
            })
            .map(|info| info.spec.task_id)
            .collect();

        let mut failed = Vec::new();
        for id in orphans {
            if let Some(info) = self.tasks.get_mut(&id) {
                warn!(task = %id, "dependency missing from job; failing task");
                info.state = RunState::DoneFailed;
            }
            failed.push(id);
            failed.extend(self.mark_dependents_failed(id));
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::splitter::JobSplitter;
    use crate::model::{FileSpecifier, Job, JobStatus, Parameters};

    fn scheduler() -> Scheduler {
        let job = Job {
            id: "job-1".to_string(),
            name: String::new(),
            job_type: String::new(),
            status: JobStatus::NotStarted,
            percent_complete: 0,
            files: vec![FileSpecifier::named("brain.nii")],
            parameters: Parameters::new(),
            instance_count: 1,
        };
        let splitter = JobSplitter::default();
        Scheduler::new(splitter.split(&job).unwrap(), splitter.merge_task(&job))
    }

    fn ids(tasks: &[TaskSpecifier]) -> Vec<TaskId> {
        tasks.iter().map(|t| t.task_id).collect()
    }

    #[test]
    fn chain_runs_in_dependency_order_then_merges() {
        let mut s = scheduler();

        let step = s.start();
        assert_eq!(ids(&step.newly_scheduled), vec![TaskId::Reslice]);
        assert_eq!(s.run_state_of(TaskId::SkullStrip), Some(TaskRunState::Pending));

        let step = s.handle_completion(TaskId::Reslice, TaskProcessSuccess::Succeeded);
        assert_eq!(ids(&step.newly_scheduled), vec![TaskId::SkullStrip]);

        let step = s.handle_completion(TaskId::SkullStrip, TaskProcessSuccess::Succeeded);
        assert_eq!(ids(&step.newly_scheduled), vec![TaskId::Merge]);
        assert!(!step.job_just_finished);

        let step = s.handle_completion(TaskId::Merge, TaskProcessSuccess::Succeeded);
        assert!(step.job_just_finished);
        assert!(s.all_succeeded());
    }

    #[test]
    fn failed_first_stage_blocks_everything_downstream() {
        let mut s = scheduler();
        s.start();

        let step = s.handle_completion(TaskId::Reslice, TaskProcessSuccess::PermanentFailure);

        assert!(step.newly_scheduled.is_empty());
        assert_eq!(step.newly_failed[0], TaskId::Reslice);
        assert!(step.newly_failed.contains(&TaskId::SkullStrip));
        assert!(step.newly_failed.contains(&TaskId::Merge));
        assert!(step.job_just_finished);
        assert!(!s.all_succeeded());
    }

    #[test]
    fn stray_completion_is_ignored() {
        let mut s = scheduler();
        s.start();

        let step = s.handle_completion(TaskId::SkullStrip, TaskProcessSuccess::Succeeded);
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(s.run_state_of(TaskId::SkullStrip), Some(TaskRunState::Pending));
    }

    #[test]
    fn task_depending_on_absent_task_fails_at_start() {
        let orphan = TaskSpecifier {
            task_id: TaskId::SkullStrip,
            required_files: vec![FileSpecifier::named("resliced.nii")],
            parameters: Parameters::new(),
            depends_on: Some(crate::model::TaskDependency::on_id(TaskId::Reslice)),
        };
        let mut s = Scheduler::new(vec![orphan], None);

        let step = s.start();
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(step.newly_failed, vec![TaskId::SkullStrip]);
        assert!(step.job_just_finished);
    }
}
