// src/service/http.rs

use std::time::Duration;

use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::AccessToken;
use crate::errors::{NiftiBatchError, Result};
use crate::model::{FileSpecifier, IntermediateOutput, Job, JobSubmission, LogEntry};
use crate::service::{BatchService, ServiceFuture};

const BODY_PREVIEW_LIMIT: usize = 512;

/// [`BatchService`] over the service's JSON/HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBatchService {
    http: reqwest::Client,
    base_url: Url,
    token: Option<AccessToken>,
}

impl HttpBatchService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = Url::parse(base_url).map_err(|e| {
            NiftiBatchError::ConfigError(format!("invalid service url '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(NiftiBatchError::ConfigError(format!(
                "service url '{base_url}' cannot be used as a base url"
            )));
        }

        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    /// Send `Authorization: Bearer` with every request when a token is set.
    pub fn with_token(mut self, token: Option<AccessToken>) -> Self {
        self.token = token;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token.secret()),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "GET");
        let resp = self.auth(self.http.get(url)).send().await?;
        parse_json_response(resp).await
    }
}

impl BatchService for HttpBatchService {
    fn upload_file<'a>(
        &'a self,
        file: &'a FileSpecifier,
        contents: Vec<u8>,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let url = self.endpoint(&["files"]);
            debug!(url = %url, file = %file.name, bytes = contents.len(), "uploading input");

            let mut req = self
                .http
                .post(url)
                .query(&[("name", file.name.as_str())])
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(contents);
            if let Some(hash) = &file.hash {
                req = req.query(&[("hash", hash.as_str())]);
            }

            let resp = self.auth(req).send().await?;
            ensure_success(resp).await
        })
    }

    fn submit<'a>(&'a self, submission: &'a JobSubmission) -> ServiceFuture<'a, Job> {
        Box::pin(async move {
            let url = self.endpoint(&["jobs"]);
            debug!(url = %url, name = %submission.name, "submitting job");
            let resp = self.auth(self.http.post(url).json(submission)).send().await?;
            parse_json_response(resp).await
        })
    }

    fn refresh<'a>(&'a self, job_id: &'a str) -> ServiceFuture<'a, Job> {
        Box::pin(self.get_json(self.endpoint(&["jobs", job_id])))
    }

    fn intermediate_outputs<'a>(
        &'a self,
        job_id: &'a str,
    ) -> ServiceFuture<'a, Vec<IntermediateOutput>> {
        Box::pin(self.get_json(self.endpoint(&["jobs", job_id, "outputs", "intermediates"])))
    }

    fn fetch_output<'a>(&'a self, job_id: &'a str, name: &'a str) -> ServiceFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let url = self.endpoint(&["jobs", job_id, "files", name]);
            debug!(url = %url, "downloading output");
            let resp = self.auth(self.http.get(url)).send().await?;
            let resp = check_status(resp).await?;
            Ok(resp.bytes().await?.to_vec())
        })
    }

    fn job_log<'a>(&'a self, job_id: &'a str) -> ServiceFuture<'a, Vec<LogEntry>> {
        Box::pin(self.get_json(self.endpoint(&["jobs", job_id, "log"])))
    }
}

/// Pass successful responses through; turn the rest into
/// [`NiftiBatchError::Service`] with a preview of the body.
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(NiftiBatchError::Service {
        status: status.as_u16(),
        url,
        message: preview_body(&body),
    })
}

async fn ensure_success(resp: Response) -> Result<()> {
    check_status(resp).await.map(|_| ())
}

async fn parse_json_response<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = check_status(resp).await?;
    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}
