// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::DEFAULT_AUTHORITY;
use crate::exec::NodeLayout;
use crate::monitor::MonitorOptions;
use crate::types::HoldPolicy;

/// Top-level configuration as read from `Niftibatch.toml`.
///
/// ```toml
/// [service]
/// url = "https://batch.example.com/api"
///
/// [auth]
/// account_id = "ClientId=...;TenantId=..."
/// resource = "https://batch.example.com/"
///
/// [job]
/// inputs = ["scans/brain.nii"]
///
/// [monitor]
/// poll_interval = "5s"
/// hold_policy = "fail"
/// ```
///
/// All sections are optional. `plan`, `run-task` and `run-local` work
/// without `[service]` or `[auth]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub service: RawServiceSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub job: JobSection,
    #[serde(default)]
    pub monitor: RawMonitorSection,
    #[serde(default)]
    pub executor: ExecutorSection,
}

/// `[service]` section, durations still unparsed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawServiceSection {
    /// Base URL of the batch service.
    #[serde(default)]
    pub url: Option<String>,
    /// Per-request HTTP timeout, e.g. `"30s"`.
    #[serde(default = "default_request_timeout")]
    pub timeout: String,
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl Default for RawServiceSection {
    fn default() -> Self {
        Self {
            url: None,
            timeout: default_request_timeout(),
        }
    }
}

/// `[auth]` section.
#[derive(Clone, Deserialize)]
pub struct AuthSection {
    /// `ClientId=...;TenantId=...`; without it requests are unauthenticated.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Client secret. `NIFTIBATCH_ACCOUNT_KEY` takes precedence.
    #[serde(default)]
    pub account_key: Option<String>,
    /// Authority URL template; `{tenant}` is substituted.
    #[serde(default = "default_authority")]
    pub authority: String,
    /// Resource the access token is requested for.
    #[serde(default)]
    pub resource: Option<String>,
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            account_id: None,
            account_key: None,
            authority: default_authority(),
            resource: None,
        }
    }
}

impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSection")
            .field("account_id", &self.account_id)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("authority", &self.authority)
            .field("resource", &self.resource)
            .finish()
    }
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    #[serde(default = "default_job_name")]
    pub name: String,
    /// Pipeline selector sent to the service.
    #[serde(default = "default_job_type", rename = "type")]
    pub job_type: String,
    /// Input paths or glob patterns, relative to the config file.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn default_job_name() -> String {
    "AzureBatchNiftiProcessing Test".to_string()
}

fn default_job_type() -> String {
    "AzureBatchNiftiProcessing".to_string()
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            job_type: default_job_type(),
            inputs: Vec::new(),
            exclude: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }
}

/// `[monitor]` section, durations still unparsed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMonitorSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Optional upper bound on monitoring, e.g. `"2h"`.
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub hold_policy: HoldPolicy,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RawMonitorSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            deadline: None,
            hold_policy: HoldPolicy::default(),
            output_dir: default_output_dir(),
        }
    }
}

/// `[executor]` section: layout of a compute node.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_local_storage")]
    pub local_storage: PathBuf,
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    /// Defaults to `<install_dir>/bin`.
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,
}

fn default_local_storage() -> PathBuf {
    PathBuf::from(".")
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("mri-processing")
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            local_storage: default_local_storage(),
            install_dir: default_install_dir(),
            bin_dir: None,
        }
    }
}

impl ExecutorSection {
    pub fn node_layout(&self) -> NodeLayout {
        let mut layout = NodeLayout::new(&self.local_storage, &self.install_dir);
        if let Some(bin_dir) = &self.bin_dir {
            layout.bin_dir = bin_dir.clone();
        }
        layout
    }
}

/// Validated `[service]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSection {
    pub url: Option<String>,
    pub timeout: Duration,
}

/// Validated configuration. Only constructible through
/// `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    service: ServiceSection,
    auth: AuthSection,
    job: JobSection,
    monitor: MonitorOptions,
    executor: ExecutorSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        service: ServiceSection,
        auth: AuthSection,
        job: JobSection,
        monitor: MonitorOptions,
        executor: ExecutorSection,
    ) -> Self {
        Self {
            service,
            auth,
            job,
            monitor,
            executor,
        }
    }

    pub fn service(&self) -> &ServiceSection {
        &self.service
    }

    pub fn auth(&self) -> &AuthSection {
        &self.auth
    }

    pub fn job(&self) -> &JobSection {
        &self.job
    }

    pub fn monitor(&self) -> &MonitorOptions {
        &self.monitor
    }

    pub fn executor(&self) -> &ExecutorSection {
        &self.executor
    }

    /// Monitor options with the hold policy overridden, e.g. from the CLI.
    pub fn monitor_with(&self, hold_policy: Option<HoldPolicy>) -> MonitorOptions {
        let mut options = self.monitor.clone();
        if let Some(policy) = hold_policy {
            options.hold_policy = policy;
        }
        options
    }
}
