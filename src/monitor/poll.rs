// src/monitor/poll.rs

use std::collections::HashSet;
use std::future::Future;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::errors::{NiftiBatchError, Result};
use crate::model::{IntermediateOutput, Job, JobStatus, OutputKind};
use crate::monitor::{MonitorOptions, MonitorReport};
use crate::service::BatchService;

/// Polls one job until it reaches a terminal status.
///
/// Each task's output is downloaded at most once; the service-assigned task
/// id is recorded before the fetch starts, so a failed download is not
/// retried on the next poll.
pub struct JobMonitor<'s, S: ?Sized, W> {
    service: &'s S,
    out: W,
    options: MonitorOptions,
    downloaded_tasks: HashSet<u32>,
}

impl<'s, S, W> JobMonitor<'s, S, W>
where
    S: BatchService + ?Sized,
    W: Write,
{
    pub fn new(service: &'s S, out: W, options: MonitorOptions) -> Self {
        Self {
            service,
            out,
            options,
            downloaded_tasks: HashSet::new(),
        }
    }

    /// Drive `job` to a terminal status.
    ///
    /// Ends with [`NiftiBatchError::MonitorCancelled`] once `cancel` turns
    /// `true`, or [`NiftiBatchError::MonitorTimedOut`] when the configured
    /// deadline passes first. A dropped cancel sender is ignored.
    pub async fn run(&mut self, job: Job, cancel: watch::Receiver<bool>) -> Result<MonitorReport> {
        let started = Instant::now();
        let mut bounds = Bounds {
            started,
            deadline_at: self.options.deadline.map(|d| started + d),
            cancel,
        };
        let policy = self.options.hold_policy;

        writeln!(self.out)?;
        writeln!(self.out, "-----Starting Job-----")?;
        writeln!(self.out, "Job Id: {}", job.id)?;
        writeln!(self.out)?;
        info!(job_id = %job.id, status = %job.status, "monitoring job");

        let job_id = job.id;
        let mut status = job.status;
        let mut downloaded = Vec::new();

        while status.keeps_polling(policy) {
            if *bounds.cancel.borrow() {
                return Err(NiftiBatchError::MonitorCancelled(job_id));
            }

            let poll_interval = self.options.poll_interval;
            bounds
                .within(&job_id, async {
                    sleep(poll_interval).await;
                    Ok(())
                })
                .await?;

            let (polled, saved) = bounds.within(&job_id, self.poll_once(&job_id)).await?;
            status = polled;
            downloaded.extend(saved);
        }

        let succeeded = status.is_complete();
        let logs = if succeeded {
            writeln!(self.out, "-----Job successfully completed-----")?;
            Vec::new()
        } else {
            warn!(job_id = %job_id, %status, "job failed; fetching log");
            self.service.job_log(&job_id).await?
        };

        Ok(MonitorReport {
            job_id,
            status,
            succeeded,
            downloaded,
            logs,
        })
    }

    /// One refresh, then downloads for tasks that finished since the last one.
    async fn poll_once(&mut self, job_id: &str) -> Result<(JobStatus, Vec<PathBuf>)> {
        let snapshot = self.service.refresh(job_id).await?;
        let status = snapshot.status;
        debug!(job_id = %job_id, %status, percent = snapshot.percent_complete, "polled job");
        self.print_status(&snapshot)?;

        if status.has_failed(self.options.hold_policy) {
            return Ok((status, Vec::new()));
        }
        Ok((status, self.download_new_outputs(job_id).await?))
    }

    fn print_status(&mut self, job: &Job) -> Result<()> {
        if job.status == JobStatus::NotStarted {
            writeln!(self.out, "Waiting for compute resource...")?;
        } else {
            writeln!(self.out, "Percent complete: {}", job.percent_complete)?;
        }
        Ok(())
    }

    async fn download_new_outputs(&mut self, job_id: &str) -> Result<Vec<PathBuf>> {
        let outputs = self.service.intermediate_outputs(job_id).await?;
        let mut saved = Vec::new();

        for output in outputs
            .into_iter()
            .filter(|o| o.kind == OutputKind::TaskOutput)
        {
            if !self.downloaded_tasks.insert(output.task_id) {
                continue;
            }
            writeln!(self.out, "Downloading: {}", output.name)?;
            if let Some(path) = self.download(job_id, &output).await? {
                saved.push(path);
            }
        }

        Ok(saved)
    }

    async fn download(&self, job_id: &str, output: &IntermediateOutput) -> Result<Option<PathBuf>> {
        let Some(relative) = relative_output_path(&output.name) else {
            warn!(name = %output.name, "output name is not a plain relative path; skipping");
            return Ok(None);
        };

        let contents = self.service.fetch_output(job_id, &output.name).await?;
        let path = self.options.output_dir.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;

        info!(task_id = output.task_id, path = %path.display(), "downloaded task output");
        Ok(Some(path))
    }
}

/// Deadline and cancel signal that every step of the poll loop runs under.
struct Bounds {
    started: Instant,
    deadline_at: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

impl Bounds {
    async fn within<T>(
        &mut self,
        job_id: &str,
        step: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            res = step => res,
            _ = cancelled(&mut self.cancel) => {
                info!(job_id = %job_id, "monitoring cancelled");
                Err(NiftiBatchError::MonitorCancelled(job_id.to_string()))
            }
            _ = deadline_reached(self.deadline_at) => {
                warn!(job_id = %job_id, "monitoring deadline reached");
                Err(NiftiBatchError::MonitorTimedOut {
                    job_id: job_id.to_string(),
                    elapsed: self.started.elapsed(),
                })
            }
        }
    }
}

/// The logical name as a path below the output dir.
///
/// `None` for empty names and names with root, prefix or `..` components.
fn relative_output_path(name: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

/// Resolves once the flag is `true`; never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn deadline_reached(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
