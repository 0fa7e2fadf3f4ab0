// src/service/mod.rs

//! Client side of the batch-compute service.
//!
//! The monitor and the submit command talk to a [`BatchService`] rather than
//! to HTTP directly, so tests can script the service's answers.
//! [`HttpBatchService`] is the production implementation.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::model::{FileSpecifier, IntermediateOutput, Job, JobSubmission, LogEntry};

pub mod http;

pub use http::HttpBatchService;

/// Boxed future returned by [`BatchService`] methods.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Operations the client needs from the batch service.
pub trait BatchService: Send + Sync {
    /// Make an input file available to the service under `file.name`.
    fn upload_file<'a>(&'a self, file: &'a FileSpecifier, contents: Vec<u8>)
    -> ServiceFuture<'a, ()>;

    /// Submit a job; the returned snapshot carries the service-assigned id.
    fn submit<'a>(&'a self, submission: &'a JobSubmission) -> ServiceFuture<'a, Job>;

    /// Current snapshot of a job.
    fn refresh<'a>(&'a self, job_id: &'a str) -> ServiceFuture<'a, Job>;

    /// Outputs made available so far while the job runs.
    fn intermediate_outputs<'a>(&'a self, job_id: &'a str)
    -> ServiceFuture<'a, Vec<IntermediateOutput>>;

    /// Contents of one output file.
    fn fetch_output<'a>(&'a self, job_id: &'a str, name: &'a str) -> ServiceFuture<'a, Vec<u8>>;

    /// The job's log, in service order.
    fn job_log<'a>(&'a self, job_id: &'a str) -> ServiceFuture<'a, Vec<LogEntry>>;
}
