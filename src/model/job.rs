// src/model/job.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::file::FileSpecifier;
use crate::types::HoldPolicy;

/// Job parameters, passed unchanged to every task.
pub type Parameters = BTreeMap<String, String>;

/// Status of a job as reported by the batch service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    NotStarted,
    InProgress,
    Complete,
    Error,
    Cancelled,
    OnHold,
    Cancelling,
}

impl JobStatus {
    /// `NotStarted` and `InProgress` keep the monitor polling.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::NotStarted | JobStatus::InProgress)
    }

    pub fn is_complete(self) -> bool {
        self == JobStatus::Complete
    }

    /// Whether this status counts as a reportable failure.
    ///
    /// `OnHold` and `Cancelling` are not final on the service side; under
    /// [`HoldPolicy::Fail`] they are reported as failures all the same.
    pub fn has_failed(self, policy: HoldPolicy) -> bool {
        match self {
            JobStatus::Error | JobStatus::Cancelled => true,
            JobStatus::OnHold | JobStatus::Cancelling => policy == HoldPolicy::Fail,
            JobStatus::NotStarted | JobStatus::InProgress | JobStatus::Complete => false,
        }
    }

    /// Whether the monitor should poll again after seeing this status.
    pub fn keeps_polling(self, policy: HoldPolicy) -> bool {
        self.is_active()
            || (policy == HoldPolicy::KeepPolling
                && matches!(self, JobStatus::OnHold | JobStatus::Cancelling))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Client-side projection of a job, refreshed by polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    #[serde(default)]
    pub percent_complete: u32,
    #[serde(default)]
    pub files: Vec<FileSpecifier>,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
}

fn default_instance_count() -> u32 {
    1
}

/// Request body for submitting a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub name: String,
    /// Pipeline selector; the service picks the graph builder by this.
    #[serde(rename = "type")]
    pub job_type: String,
    pub required_files: Vec<FileSpecifier>,
    pub parameters: Parameters,
    pub instance_count: u32,
}

impl JobSubmission {
    /// One compute instance per input file.
    pub fn new(
        name: impl Into<String>,
        job_type: impl Into<String>,
        required_files: Vec<FileSpecifier>,
        parameters: Parameters,
    ) -> Self {
        let instance_count = u32::try_from(required_files.len().max(1)).unwrap_or(u32::MAX);
        Self {
            name: name.into(),
            job_type: job_type.into(),
            required_files,
            parameters,
            instance_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    TaskOutput,
    #[serde(other)]
    Other,
}

/// An output the service has made available while the job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateOutput {
    pub name: String,
    pub kind: OutputKind,
    /// Service-assigned task instance id; the monitor's download identity.
    pub task_id: u32,
}

/// One entry of a job's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub task_id: u32,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}
