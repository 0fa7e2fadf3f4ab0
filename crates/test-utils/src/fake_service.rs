use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use niftibatch::errors::{NiftiBatchError, Result};
use niftibatch::model::{FileSpecifier, IntermediateOutput, Job, JobSubmission, LogEntry};
use niftibatch::service::{BatchService, ServiceFuture};

/// A `BatchService` that replays scripted answers and records calls.
///
/// - `refresh` pops the next scripted snapshot; the last one repeats.
/// - `intermediate_outputs` does the same with its own script, so poll N
///   sees listing N.
/// - `fetch_output` serves registered file contents and records the name.
/// - `refresh_delay` makes every `refresh` take that long to answer.
#[derive(Default)]
pub struct ScriptedService {
    snapshots: Mutex<VecDeque<Job>>,
    listings: Mutex<VecDeque<Vec<IntermediateOutput>>>,
    files: HashMap<String, Vec<u8>>,
    logs: Vec<LogEntry>,
    submitted_job: Option<Job>,
    refresh_delay: Duration,
    calls: Mutex<Calls>,
}

/// What the code under test asked for.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub refreshes: usize,
    pub fetched: Vec<String>,
    pub log_requests: usize,
    pub uploaded: Vec<(String, Vec<u8>)>,
    pub submissions: Vec<JobSubmission>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(self, snapshots: impl IntoIterator<Item = Job>) -> Self {
        *self.snapshots.lock().unwrap() = snapshots.into_iter().collect();
        self
    }

    pub fn listings(self, listings: impl IntoIterator<Item = Vec<IntermediateOutput>>) -> Self {
        *self.listings.lock().unwrap() = listings.into_iter().collect();
        self
    }

    pub fn file(mut self, name: &str, contents: &[u8]) -> Self {
        self.files.insert(name.to_string(), contents.to_vec());
        self
    }

    pub fn logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }

    /// The snapshot `submit` answers with.
    pub fn submitted_as(mut self, job: Job) -> Self {
        self.submitted_job = Some(job);
        self
    }

    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl BatchService for ScriptedService {
    fn upload_file<'a>(
        &'a self,
        file: &'a FileSpecifier,
        contents: Vec<u8>,
    ) -> ServiceFuture<'a, ()> {
        self.calls
            .lock()
            .unwrap()
            .uploaded
            .push((file.name.clone(), contents));
        Box::pin(async { Ok(()) })
    }

    fn submit<'a>(&'a self, submission: &'a JobSubmission) -> ServiceFuture<'a, Job> {
        self.calls.lock().unwrap().submissions.push(submission.clone());
        let job = self.submitted_job.clone();
        Box::pin(async move {
            job.ok_or_else(|| NiftiBatchError::ConfigError("no submit answer scripted".into()))
        })
    }

    fn refresh<'a>(&'a self, _job_id: &'a str) -> ServiceFuture<'a, Job> {
        self.calls.lock().unwrap().refreshes += 1;
        let job = Self::next(&self.snapshots);
        let delay = self.refresh_delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            job.ok_or_else(|| NiftiBatchError::ConfigError("no snapshot scripted".into()))
        })
    }

    fn intermediate_outputs<'a>(
        &'a self,
        _job_id: &'a str,
    ) -> ServiceFuture<'a, Vec<IntermediateOutput>> {
        let listing = Self::next(&self.listings).unwrap_or_default();
        Box::pin(async move { Ok(listing) })
    }

    fn fetch_output<'a>(&'a self, _job_id: &'a str, name: &'a str) -> ServiceFuture<'a, Vec<u8>> {
        self.calls.lock().unwrap().fetched.push(name.to_string());
        let contents = self.files.get(name).cloned();
        Box::pin(async move {
            contents.ok_or_else(|| NiftiBatchError::Service {
                status: 404,
                url: format!("/files/{name}"),
                message: "not found".to_string(),
            })
        })
    }

    fn job_log<'a>(&'a self, _job_id: &'a str) -> ServiceFuture<'a, Vec<LogEntry>> {
        self.calls.lock().unwrap().log_requests += 1;
        let logs = self.logs.clone();
        Box::pin(async move { Ok(logs) })
    }
}
