// src/model/task.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{NiftiBatchError, Result};
use crate::model::file::FileSpecifier;

/// Identifier of a pipeline stage.
///
/// The set is closed: every stage the executor knows how to run has a
/// variant here, so dispatch on it is exhaustive. Identifiers coming off the
/// wire go through [`TaskId::from_str`], which rejects anything else with
/// [`NiftiBatchError::InvalidTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskId {
    Reslice,
    SkullStrip,
    Merge,
}

impl TaskId {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskId::Reslice => "Reslice",
            TaskId::SkullStrip => "SkullStrip",
            TaskId::Merge => "Merge",
        }
    }

    pub fn is_merge(self) -> bool {
        matches!(self, TaskId::Merge)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskId {
    type Err = NiftiBatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reslice" => Ok(TaskId::Reslice),
            "skullstrip" | "skull-strip" | "skull_strip" => Ok(TaskId::SkullStrip),
            "merge" => Ok(TaskId::Merge),
            other => Err(NiftiBatchError::InvalidTask(format!(
                "No such task: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for TaskId {
    type Error = NiftiBatchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.as_str().to_string()
    }
}

/// Edge "the referenced task must succeed before this one starts".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependency {
    pub on: TaskId,
}

impl TaskDependency {
    pub fn on_id(id: TaskId) -> Self {
        Self { on: id }
    }
}

/// One task of a job as produced by the graph builder.
///
/// `required_files` is positional: the executor reads file 0 as the stage
/// input regardless of its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpecifier {
    pub task_id: TaskId,
    #[serde(default)]
    pub required_files: Vec<FileSpecifier>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<TaskDependency>,
}

/// Wire form of [`TaskSpecifier`] with the identifier still unparsed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTaskSpecifier {
    task_id: String,
    #[serde(default)]
    required_files: Vec<FileSpecifier>,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
    #[serde(default)]
    depends_on: Option<RawTaskDependency>,
}

#[derive(Debug, Deserialize)]
struct RawTaskDependency {
    on: String,
}

impl TryFrom<RawTaskSpecifier> for TaskSpecifier {
    type Error = NiftiBatchError;

    fn try_from(raw: RawTaskSpecifier) -> Result<Self> {
        let depends_on = match raw.depends_on {
            Some(dep) => Some(TaskDependency::on_id(dep.on.parse()?)),
            None => None,
        };

        Ok(Self {
            task_id: raw.task_id.parse()?,
            required_files: raw.required_files,
            parameters: raw.parameters,
            depends_on,
        })
    }
}

impl TaskSpecifier {
    /// Parse a task handed to a compute node.
    ///
    /// Malformed JSON is a [`NiftiBatchError::JsonError`]; a well-formed task
    /// naming an unknown stage is a [`NiftiBatchError::InvalidTask`].
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawTaskSpecifier = serde_json::from_str(json)?;
        TaskSpecifier::try_from(raw)
    }

    /// The positional stage input (required file 0), if any.
    pub fn primary_input(&self) -> Option<&FileSpecifier> {
        self.required_files.first()
    }
}

/// Binary, exit-code-derived classification of a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskProcessSuccess {
    Succeeded,
    PermanentFailure,
}

impl TaskProcessSuccess {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            TaskProcessSuccess::Succeeded
        } else {
            TaskProcessSuccess::PermanentFailure
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutputFileKind {
    /// Per-task output, downloadable while the job runs.
    Output,
    /// The job's final artifact written by the merge task.
    JobOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutputFile {
    pub file_name: PathBuf,
    pub kind: TaskOutputFileKind,
}

/// Outcome of executing one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProcessResult {
    pub success: TaskProcessSuccess,
    pub output_files: Vec<TaskOutputFile>,
    /// Combined stdout/stderr of the stage process, kept for postmortems.
    pub processor_output: String,
}

impl TaskProcessResult {
    pub fn succeeded(&self) -> bool {
        self.success == TaskProcessSuccess::Succeeded
    }
}

/// Final artifact of a job, produced by the merge task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub output_file: PathBuf,
}
