// src/dag/splitter.rs

use tracing::debug;

use crate::dag::graph::PipelineGraph;
use crate::errors::{NiftiBatchError, Result};
use crate::model::{FileSpecifier, Job, TaskDependency, TaskId, TaskSpecifier};

/// Turns a job into the ordered task list the batch service runs.
#[derive(Debug, Clone)]
pub struct JobSplitter {
    graph: PipelineGraph,
}

impl JobSplitter {
    /// Build a splitter over a validated pipeline.
    pub fn new(graph: PipelineGraph) -> Result<Self> {
        graph.validate()?;
        Ok(Self { graph })
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Produce one task per processing stage, in dependency order.
    ///
    /// The first stage takes the job's first input verbatim. Every later
    /// stage depends on its single predecessor and requires a file named
    /// after the predecessor's output. Parameters are copied unchanged.
    pub fn split(&self, job: &Job) -> Result<Vec<TaskSpecifier>> {
        let first_input = job.files.first().ok_or_else(|| {
            NiftiBatchError::ConfigError(format!("job '{}' has no input files", job.id))
        })?;

        let mut tasks = Vec::new();
        for stage in self.graph.processing_stages()? {
            let task = match self.graph.dependencies_of(stage.id).first() {
                None => TaskSpecifier {
                    task_id: stage.id,
                    required_files: vec![first_input.clone()],
                    parameters: job.parameters.clone(),
                    depends_on: None,
                },
                Some(&prev) => {
                    let prev_output = self
                        .graph
                        .stage(prev)
                        .and_then(|s| s.output_name())
                        .ok_or_else(|| {
                            NiftiBatchError::ConfigError(format!(
                                "stage '{}' depends on '{prev}', which has no output",
                                stage.id
                            ))
                        })?;
                    TaskSpecifier {
                        task_id: stage.id,
                        required_files: vec![FileSpecifier::named(prev_output)],
                        parameters: job.parameters.clone(),
                        depends_on: Some(TaskDependency::on_id(prev)),
                    }
                }
            };
            debug!(job = %job.id, task = %task.task_id, depends_on = ?task.depends_on, "split task");
            tasks.push(task);
        }

        Ok(tasks)
    }

    /// The merge task for a job, if the pipeline has a merge stage.
    ///
    /// It carries no files; its dependency is the last processing stage.
    pub fn merge_task(&self, job: &Job) -> Option<TaskSpecifier> {
        self.graph.stage(TaskId::Merge)?;
        let depends_on = self
            .graph
            .dependencies_of(TaskId::Merge)
            .first()
            .copied()
            .map(TaskDependency::on_id);

        Some(TaskSpecifier {
            task_id: TaskId::Merge,
            required_files: Vec::new(),
            parameters: job.parameters.clone(),
            depends_on,
        })
    }
}

impl Default for JobSplitter {
    fn default() -> Self {
        Self {
            graph: PipelineGraph::nifti(),
        }
    }
}

/// Split a job over the default NIfTI pipeline.
pub fn split(job: &Job) -> Result<Vec<TaskSpecifier>> {
    JobSplitter::default().split(job)
}
