#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};

use niftibatch::config::{ConfigFile, RawConfigFile};
use niftibatch::model::{
    FileSpecifier, IntermediateOutput, Job, JobStatus, LogEntry, OutputKind, Parameters,
};
use niftibatch::types::HoldPolicy;

/// Builder for `Job` snapshots as the service would report them.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: Job {
                id: id.to_string(),
                name: "AzureBatchNiftiProcessing Test".to_string(),
                job_type: "AzureBatchNiftiProcessing".to_string(),
                status: JobStatus::NotStarted,
                percent_complete: 0,
                files: Vec::new(),
                parameters: Parameters::new(),
                instance_count: 1,
            },
        }
    }

    pub fn file(mut self, name: &str) -> Self {
        self.job.files.push(FileSpecifier::named(name));
        self.job.instance_count = self.job.files.len() as u32;
        self
    }

    pub fn parameter(mut self, key: &str, value: &str) -> Self {
        self.job
            .parameters
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn percent(mut self, percent: u32) -> Self {
        self.job.percent_complete = percent;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Snapshot of `id` with the given status and progress.
pub fn snapshot(id: &str, status: JobStatus, percent: u32) -> Job {
    JobBuilder::new(id).status(status).percent(percent).build()
}

pub fn task_output(name: &str, task_id: u32) -> IntermediateOutput {
    IntermediateOutput {
        name: name.to_string(),
        kind: OutputKind::TaskOutput,
        task_id,
    }
}

pub fn log_entry(task_id: u32, seconds: i64, text: &str) -> LogEntry {
    LogEntry {
        task_id,
        timestamp: fixed_time(seconds),
        text: text.to_string(),
    }
}

/// `2024-01-01T00:00:00Z` plus `seconds`.
pub fn fixed_time(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn service_url(mut self, url: &str) -> Self {
        self.config.service.url = Some(url.to_string());
        self
    }

    pub fn account(mut self, account_id: &str, key: &str, resource: &str) -> Self {
        self.config.auth.account_id = Some(account_id.to_string());
        self.config.auth.account_key = Some(key.to_string());
        self.config.auth.resource = Some(resource.to_string());
        self
    }

    pub fn input(mut self, pattern: &str) -> Self {
        self.config.job.inputs.push(pattern.to_string());
        self
    }

    pub fn poll_interval(mut self, interval: &str) -> Self {
        self.config.monitor.poll_interval = interval.to_string();
        self
    }

    pub fn deadline(mut self, deadline: &str) -> Self {
        self.config.monitor.deadline = Some(deadline.to_string());
        self
    }

    pub fn hold_policy(mut self, policy: HoldPolicy) -> Self {
        self.config.monitor.hold_policy = policy;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
