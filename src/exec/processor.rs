// src/exec/processor.rs

//! Runs one task on a compute node.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::dag::{PipelineGraph, StageKind};
use crate::errors::{NiftiBatchError, Result};
use crate::exec::process::{Invocation, ProcessRunner, TokioProcessRunner, path_with_prefix};
use crate::model::{
    JobResult, TaskId, TaskOutputFile, TaskOutputFileKind, TaskProcessResult, TaskProcessSuccess,
    TaskSpecifier,
};

/// Name of the marker the merge task writes into local storage.
pub const COMPLETION_FILE: &str = "completion.txt";
/// Contents of the completion marker.
pub const COMPLETION_MARKER: &str = "done";

/// Extension of stage scripts on this platform.
pub const SCRIPT_EXTENSION: &str = if cfg!(windows) { "bat" } else { "sh" };

/// Where things live on a compute node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLayout {
    /// Directory holding task inputs and outputs.
    pub local_storage: PathBuf,
    /// Directory holding the stage scripts; also their working directory.
    pub install_dir: PathBuf,
    /// Auxiliary binaries the stage scripts call, put first on `PATH`.
    pub bin_dir: PathBuf,
}

impl NodeLayout {
    /// Layout with `bin_dir = <install_dir>/bin`.
    pub fn new(local_storage: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        Self {
            local_storage: local_storage.into(),
            bin_dir: install_dir.join("bin"),
            install_dir,
        }
    }

    /// Path of a stage script, e.g. `<install_dir>/niftiInit.sh`.
    pub fn script_path(&self, program: &str) -> PathBuf {
        self.install_dir
            .join(format!("{program}.{SCRIPT_EXTENSION}"))
    }

    pub fn completion_file(&self) -> PathBuf {
        self.local_storage.join(COMPLETION_FILE)
    }
}

/// Executes tasks of the pipeline described by its [`PipelineGraph`].
#[derive(Debug)]
pub struct TaskProcessor<R = TokioProcessRunner> {
    graph: PipelineGraph,
    layout: NodeLayout,
    runner: R,
}

impl TaskProcessor<TokioProcessRunner> {
    /// Processor for the NIfTI pipeline spawning real processes.
    pub fn new(layout: NodeLayout) -> Self {
        Self::with_runner(PipelineGraph::nifti(), layout, TokioProcessRunner)
    }
}

impl<R: ProcessRunner> TaskProcessor<R> {
    pub fn with_runner(graph: PipelineGraph, layout: NodeLayout, runner: R) -> Self {
        Self {
            graph,
            layout,
            runner,
        }
    }

    /// Run a task and classify its outcome.
    ///
    /// A stage process exiting non-zero is a `PermanentFailure` result, not an
    /// error; errors are reserved for tasks that cannot be run at all (bad
    /// task shape, spawn failure, IO).
    pub async fn execute(&self, task: &TaskSpecifier) -> Result<TaskProcessResult> {
        match task.task_id {
            TaskId::Reslice | TaskId::SkullStrip => self.run_stage(task).await,
            TaskId::Merge => {
                let job_result = self.merge(task).await?;
                Ok(TaskProcessResult {
                    success: TaskProcessSuccess::Succeeded,
                    output_files: vec![TaskOutputFile {
                        file_name: job_result.output_file,
                        kind: TaskOutputFileKind::JobOutput,
                    }],
                    processor_output: String::new(),
                })
            }
        }
    }

    /// Write the completion marker and return it as the job's result.
    pub async fn merge(&self, task: &TaskSpecifier) -> Result<JobResult> {
        if !task.task_id.is_merge() {
            return Err(NiftiBatchError::InvalidTask(format!(
                "{} is not the merge task",
                task.task_id
            )));
        }

        tokio::fs::create_dir_all(&self.layout.local_storage).await?;
        let completion_file = self.layout.completion_file();
        tokio::fs::write(&completion_file, COMPLETION_MARKER).await?;

        info!(file = %completion_file.display(), "merge complete");
        Ok(JobResult {
            output_file: completion_file,
        })
    }

    async fn run_stage(&self, task: &TaskSpecifier) -> Result<TaskProcessResult> {
        let stage = self.graph.stage(task.task_id).ok_or_else(|| {
            NiftiBatchError::InvalidTask(format!("No such task: {}", task.task_id))
        })?;
        let (program, output_name) = match &stage.kind {
            StageKind::Process {
                program,
                output_name,
            } => (program, output_name),
            StageKind::Merge => {
                return Err(NiftiBatchError::InvalidTask(format!(
                    "{} is configured as a merge stage",
                    task.task_id
                )));
            }
        };

        // Required file 0 is the stage input, whatever it is called.
        let input = task.primary_input().ok_or_else(|| {
            NiftiBatchError::InvalidTask(format!("task {} has no required files", task.task_id))
        })?;
        let input_path = self.layout.local_storage.join(&input.name);
        let output_path = self.layout.local_storage.join(output_name);

        let invocation = self.stage_invocation(program, &input_path, &output_path)?;
        let output = self.runner.run(&invocation).await?;
        let success = TaskProcessSuccess::from_exit_code(output.exit_code);

        let output_files = match success {
            TaskProcessSuccess::Succeeded => {
                info!(task = %task.task_id, output = %output_path.display(), "stage succeeded");
                vec![TaskOutputFile {
                    file_name: output_path,
                    kind: TaskOutputFileKind::Output,
                }]
            }
            TaskProcessSuccess::PermanentFailure => {
                warn!(task = %task.task_id, exit_code = output.exit_code, "stage failed");
                Vec::new()
            }
        };

        Ok(TaskProcessResult {
            success,
            output_files,
            processor_output: output.diagnostic_text(),
        })
    }

    fn stage_invocation(
        &self,
        program: &str,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<Invocation> {
        Ok(Invocation {
            program: self.layout.script_path(program),
            args: vec![strip_nii(input_path), strip_nii(output_path)],
            working_dir: self.layout.install_dir.clone(),
            env: vec![("PATH".into(), path_with_prefix(&self.layout.bin_dir)?)],
        })
    }
}

/// Stage scripts take paths without the `.nii` extension.
fn strip_nii(path: &Path) -> String {
    let s = path.to_string_lossy();
    s.strip_suffix(".nii").unwrap_or(&s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use crate::exec::process::ProcessOutput;
    use crate::model::{FileSpecifier, TaskDependency};

    /// Returns a fixed exit code and records invocations.
    struct CannedRunner {
        exit_code: i32,
        seen: Mutex<Vec<Invocation>>,
    }

    impl CannedRunner {
        fn new(exit_code: i32) -> Self {
            Self {
                exit_code,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for CannedRunner {
        fn run<'a>(
            &'a self,
            invocation: &'a Invocation,
        ) -> Pin<Box<dyn Future<Output = Result<ProcessOutput>> + Send + 'a>> {
            self.seen.lock().unwrap().push(invocation.clone());
            let exit_code = self.exit_code;
            Box::pin(async move {
                Ok(ProcessOutput {
                    exit_code,
                    stdout: "ok".to_string(),
                    stderr: String::new(),
                })
            })
        }
    }

    fn layout() -> NodeLayout {
        NodeLayout::new("/node/storage", "/node/mri-processing")
    }

    fn skull_strip_task() -> TaskSpecifier {
        TaskSpecifier {
            task_id: TaskId::SkullStrip,
            required_files: vec![FileSpecifier::named("resliced.nii")],
            parameters: Default::default(),
            depends_on: Some(TaskDependency::on_id(TaskId::Reslice)),
        }
    }

    #[tokio::test]
    async fn zero_exit_code_succeeds_with_one_output() {
        let processor = TaskProcessor::with_runner(PipelineGraph::nifti(), layout(), CannedRunner::new(0));

        let result = processor.execute(&skull_strip_task()).await.unwrap();

        assert_eq!(result.success, TaskProcessSuccess::Succeeded);
        assert_eq!(
            result.output_files,
            vec![TaskOutputFile {
                file_name: PathBuf::from("/node/storage/skull-stripped.nii"),
                kind: TaskOutputFileKind::Output,
            }]
        );
        assert_eq!(result.processor_output, "--- STDOUT --- ok--- STDERR --- ");
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_permanent_failure_with_diagnostics() {
        let processor = TaskProcessor::with_runner(PipelineGraph::nifti(), layout(), CannedRunner::new(2));

        let result = processor.execute(&skull_strip_task()).await.unwrap();

        assert_eq!(result.success, TaskProcessSuccess::PermanentFailure);
        assert!(result.output_files.is_empty());
        assert!(result.processor_output.starts_with("--- STDOUT --- ok"));
    }

    #[tokio::test]
    async fn invocation_uses_positional_paths_without_extension() {
        let runner = CannedRunner::new(0);
        let processor = TaskProcessor::with_runner(PipelineGraph::nifti(), layout(), runner);

        processor.execute(&skull_strip_task()).await.unwrap();

        let seen = processor.runner.seen.lock().unwrap();
        let inv = &seen[0];
        assert_eq!(
            inv.program,
            PathBuf::from(format!("/node/mri-processing/skullStrip.{SCRIPT_EXTENSION}"))
        );
        assert_eq!(
            inv.args,
            vec![
                "/node/storage/resliced".to_string(),
                "/node/storage/skull-stripped".to_string()
            ]
        );
        assert_eq!(inv.working_dir, PathBuf::from("/node/mri-processing"));
        let (key, path) = &inv.env[0];
        assert_eq!(key, "PATH");
        assert_eq!(
            std::env::split_paths(path).next().unwrap(),
            PathBuf::from("/node/mri-processing/bin")
        );
    }

    #[tokio::test]
    async fn stage_without_required_file_is_invalid() {
        let processor = TaskProcessor::with_runner(PipelineGraph::nifti(), layout(), CannedRunner::new(0));
        let mut task = skull_strip_task();
        task.required_files.clear();

        let err = processor.execute(&task).await.unwrap_err();
        assert!(matches!(err, NiftiBatchError::InvalidTask(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn merge_writes_completion_marker() {
        let dir = tempfile::tempdir().unwrap();
        let layout = NodeLayout::new(dir.path().join("storage"), dir.path().join("install"));
        let processor = TaskProcessor::with_runner(PipelineGraph::nifti(), layout, CannedRunner::new(0));
        let merge = TaskSpecifier {
            task_id: TaskId::Merge,
            required_files: Vec::new(),
            parameters: Default::default(),
            depends_on: Some(TaskDependency::on_id(TaskId::SkullStrip)),
        };

        let result = processor.merge(&merge).await.unwrap();

        assert_eq!(result.output_file, dir.path().join("storage").join(COMPLETION_FILE));
        assert_eq!(std::fs::read_to_string(&result.output_file).unwrap(), "done");
        assert!(processor.runner.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn strip_nii_only_removes_trailing_extension() {
        assert_eq!(strip_nii(Path::new("/a/nii.d/brain.nii")), "/a/nii.d/brain");
        assert_eq!(strip_nii(Path::new("/a/brain.img")), "/a/brain.img");
    }
}
