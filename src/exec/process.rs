// src/exec/process.rs

//! Spawning external stage processes.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::Result;

/// Everything needed to start one stage process.
///
/// `env` is an overlay applied to this child only; the executor never
/// touches its own process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(OsString, OsString)>,
}

/// Exit code and captured output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Stdout and stderr joined with labelled separators.
    pub fn diagnostic_text(&self) -> String {
        format!("--- STDOUT --- {}--- STDERR --- {}", self.stdout, self.stderr)
    }
}

/// Runs an [`Invocation`] to completion.
///
/// Production code uses [`TokioProcessRunner`]; tests can supply a runner
/// that returns canned exit codes without spawning anything.
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutput>> + Send + 'a>>;
}

/// Runs invocations with `tokio::process::Command`, capturing stdout and
/// stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutput>> + Send + 'a>> {
        Box::pin(async move {
            info!(
                program = %invocation.program.display(),
                args = ?invocation.args,
                cwd = %invocation.working_dir.display(),
                "starting stage process"
            );

            let mut cmd = Command::new(&invocation.program);
            cmd.args(&invocation.args)
                .current_dir(&invocation.working_dir)
                .envs(invocation.env.iter().map(|(k, v)| (k, v)))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let output = cmd.output().await.with_context(|| {
                format!("spawning stage process {:?}", invocation.program)
            })?;

            let exit_code = output.status.code().unwrap_or(-1);
            debug!(
                program = %invocation.program.display(),
                exit_code,
                stdout_bytes = output.stdout.len(),
                stderr_bytes = output.stderr.len(),
                "stage process exited"
            );

            Ok(ProcessOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// `PATH` with `dir` in front of the current search path.
pub fn path_with_prefix(dir: &Path) -> Result<OsString> {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let entries = std::iter::once(dir.to_path_buf()).chain(std::env::split_paths(&current));
    let joined = std::env::join_paths(entries)
        .with_context(|| format!("adding {dir:?} to PATH"))?;
    Ok(joined)
}
