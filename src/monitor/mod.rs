// src/monitor/mod.rs

//! Client-side job lifecycle: submission, polling, output retrieval and
//! failure reporting.
//!
//! - [`submit`] uploads collected inputs and submits the job.
//! - [`poll`] holds the [`JobMonitor`] polling loop.
//!
//! Progress lines go to the monitor's writer (stdout in the binary); the
//! failure log dump goes wherever [`print_job_logs`] is pointed (stderr).

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::Result;
use crate::model::{JobStatus, LogEntry};
use crate::types::HoldPolicy;

pub mod poll;
pub mod submit;

pub use poll::JobMonitor;
pub use submit::submit_job;

/// Default pause between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    /// Give up after this long; `None` polls until the job is terminal.
    pub deadline: Option<Duration>,
    pub hold_policy: HoldPolicy,
    /// Downloads land in `<output_dir>/<logical name>`.
    pub output_dir: PathBuf,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
            hold_policy: HoldPolicy::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Outcome of monitoring one job to a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub job_id: String,
    pub status: JobStatus,
    pub succeeded: bool,
    /// Local paths of downloaded task outputs, in download order.
    pub downloaded: Vec<PathBuf>,
    /// Job log, only fetched when the job failed.
    pub logs: Vec<LogEntry>,
}

/// Print the failure banner and every log entry in service order.
pub fn print_job_logs<W: Write>(out: &mut W, logs: &[LogEntry]) -> Result<()> {
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "-----------Job has failed-------------")?;
    writeln!(out, "----------------logs------------------")?;
    for entry in logs {
        writeln!(out, "TaskId:    {}", entry.task_id)?;
        writeln!(out, "Timestamp: {}", entry.timestamp)?;
        writeln!(out, "Text:      {}", entry.text)?;
        writeln!(out, "-------------------------------------")?;
    }
    Ok(())
}
