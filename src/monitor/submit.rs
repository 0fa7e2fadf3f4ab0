// src/monitor/submit.rs

use std::io::Write;

use tracing::info;

use crate::errors::{NiftiBatchError, Result};
use crate::inputs::InputFile;
use crate::model::{Job, JobSubmission, Parameters};
use crate::service::BatchService;

/// Upload every input, then submit a job requesting one instance per input.
pub async fn submit_job<S, W>(
    service: &S,
    out: &mut W,
    name: &str,
    job_type: &str,
    inputs: &[InputFile],
    parameters: Parameters,
) -> Result<Job>
where
    S: BatchService + ?Sized,
    W: Write,
{
    if inputs.is_empty() {
        return Err(NiftiBatchError::ConfigError(
            "a job needs at least one input file".to_string(),
        ));
    }

    for input in inputs {
        let contents = tokio::fs::read(&input.path).await?;
        info!(file = %input.spec.name, bytes = contents.len(), "uploading input");
        service.upload_file(&input.spec, contents).await?;
    }

    let submission = JobSubmission::new(
        name,
        job_type,
        inputs.iter().map(|i| i.spec.clone()).collect(),
        parameters,
    );

    writeln!(out, "-----Submitting Job-----")?;
    let job = service.submit(&submission).await?;
    info!(job_id = %job.id, instances = submission.instance_count, "job submitted");
    Ok(job)
}
