// src/config/validate.rs

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;

use crate::auth::Credential;
use crate::config::model::{ConfigFile, RawConfigFile, ServiceSection};
use crate::errors::{NiftiBatchError, Result};
use crate::monitor::MonitorOptions;

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*([a-zA-Z]+)$").unwrap());

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = NiftiBatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let service = validate_service(&raw)?;
        validate_auth(&raw)?;
        validate_job(&raw)?;
        let monitor = validate_monitor(&raw)?;

        if raw.executor.install_dir.as_os_str().is_empty() {
            return Err(NiftiBatchError::ConfigError(
                "[executor].install_dir must not be empty".to_string(),
            ));
        }

        Ok(ConfigFile::new_unchecked(
            service,
            raw.auth,
            raw.job,
            monitor,
            raw.executor,
        ))
    }
}

fn validate_service(cfg: &RawConfigFile) -> Result<ServiceSection> {
    if let Some(url) = &cfg.service.url {
        let parsed = Url::parse(url).map_err(|e| {
            NiftiBatchError::ConfigError(format!("[service].url '{url}' is not a valid URL: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NiftiBatchError::ConfigError(format!(
                "[service].url must be http or https (got '{}')",
                parsed.scheme()
            )));
        }
    }

    let timeout = parse_field("[service].timeout", &cfg.service.timeout)?;
    Ok(ServiceSection {
        url: cfg.service.url.clone(),
        timeout,
    })
}

/// An account id must parse and must come with a key and a resource.
fn validate_auth(cfg: &RawConfigFile) -> Result<()> {
    let Some(account_id) = &cfg.auth.account_id else {
        return Ok(());
    };

    Credential::parse(account_id, "")?;

    if cfg.auth.account_key.as_deref().unwrap_or("").is_empty() {
        return Err(NiftiBatchError::ConfigError(
            "[auth].account_id is set but no account key was given \
             (set [auth].account_key or NIFTIBATCH_ACCOUNT_KEY)"
                .to_string(),
        ));
    }
    if cfg.auth.resource.as_deref().unwrap_or("").is_empty() {
        return Err(NiftiBatchError::ConfigError(
            "[auth].resource is required when [auth].account_id is set".to_string(),
        ));
    }
    Ok(())
}

fn validate_job(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.name.trim().is_empty() {
        return Err(NiftiBatchError::ConfigError(
            "[job].name must not be empty".to_string(),
        ));
    }
    if cfg.job.job_type.trim().is_empty() {
        return Err(NiftiBatchError::ConfigError(
            "[job].type must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_monitor(cfg: &RawConfigFile) -> Result<MonitorOptions> {
    let poll_interval = parse_field("[monitor].poll_interval", &cfg.monitor.poll_interval)?;
    if poll_interval.is_zero() {
        return Err(NiftiBatchError::ConfigError(
            "[monitor].poll_interval must be greater than zero".to_string(),
        ));
    }

    let deadline = cfg
        .monitor
        .deadline
        .as_deref()
        .map(|d| parse_field("[monitor].deadline", d))
        .transpose()?;

    Ok(MonitorOptions {
        poll_interval,
        deadline,
        hold_policy: cfg.monitor.hold_policy,
        output_dir: cfg.monitor.output_dir.clone(),
    })
}

fn parse_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| NiftiBatchError::ConfigError(format!("{field}: {e}")))
}

/// Parse durations like `"250ms"`, `"5s"`, `"1m"` or `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let caps = DURATION
        .captures(s)
        .ok_or_else(|| format!("invalid duration '{s}'; expected e.g. 250ms, 5s, 1m or 2h"))?;
    let value: u64 = caps[1]
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", &caps[1], e))?;

    match caps[2].to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
