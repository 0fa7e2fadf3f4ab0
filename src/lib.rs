// src/lib.rs

pub mod auth;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod inputs;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod retry;
pub mod service;
pub mod types;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::auth::{AadTokenProvider, Authenticator, Credential, TokenManager};
use crate::cli::{CliArgs, Command, NodeArgs};
use crate::config::{ConfigFile, load_or_default, parse_duration};
use crate::dag::{JobSplitter, Scheduler};
use crate::engine::{LocalRunReport, LocalRuntime, RuntimeEvent};
use crate::errors::NiftiBatchError;
use crate::exec::{NodeLayout, ProcessorBackend, TaskProcessor};
use crate::inputs::{collect_inputs, describe_input};
use crate::model::{FileSpecifier, Job, JobStatus, TaskSpecifier};
use crate::monitor::{JobMonitor, print_job_logs, submit_job};
use crate::service::HttpBatchService;

/// High-level entry point used by `main.rs`.
///
/// Returns whether the job (or task) succeeded; `main` exits with status 1
/// when it did not.
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_or_default(args.config.as_deref())?;
    let config_dir = config_root_dir(args.config.as_deref());

    match args.command {
        Command::Submit {
            inputs,
            hold_policy,
            deadline,
            output_dir,
        } => {
            let mut options = cfg.monitor_with(hold_policy);
            if let Some(deadline) = deadline {
                options.deadline = Some(
                    parse_duration(&deadline)
                        .map_err(|e| NiftiBatchError::ConfigError(format!("--deadline: {e}")))?,
                );
            }
            if let Some(dir) = output_dir {
                options.output_dir = dir;
            }
            let paths = resolve_inputs(&cfg, &config_dir, &inputs)?;
            submit_and_monitor(&cfg, &paths, options).await
        }
        Command::Plan { inputs } => {
            let paths = resolve_inputs(&cfg, &config_dir, &inputs)?;
            print_plan(&cfg, &paths)?;
            Ok(true)
        }
        Command::RunTask { task, node } => run_task(&task, node_layout(&cfg, &node)).await,
        Command::RunLocal { inputs, node } => {
            let paths = resolve_inputs(&cfg, &config_dir, &inputs)?;
            run_local(&cfg, &paths, node_layout(&cfg, &node)).await
        }
    }
}

/// Directory config-relative inputs are resolved against.
fn config_root_dir(config_path: Option<&Path>) -> PathBuf {
    config_path
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// CLI inputs are relative to the working directory, configured ones to
/// the config file.
fn resolve_inputs(cfg: &ConfigFile, config_dir: &Path, cli_inputs: &[String]) -> Result<Vec<PathBuf>> {
    let paths = if cli_inputs.is_empty() {
        collect_inputs(config_dir, &cfg.job().inputs, &cfg.job().exclude)?
    } else {
        collect_inputs(Path::new("."), cli_inputs, &cfg.job().exclude)?
    };
    Ok(paths)
}

fn node_layout(cfg: &ConfigFile, node: &NodeArgs) -> NodeLayout {
    let mut executor = cfg.executor().clone();
    if let Some(dir) = &node.local_storage {
        executor.local_storage = dir.clone();
    }
    if let Some(dir) = &node.install_dir {
        executor.install_dir = dir.clone();
    }
    executor.node_layout()
}

fn local_job(cfg: &ConfigFile, files: Vec<FileSpecifier>) -> Job {
    Job {
        id: "local".to_string(),
        name: cfg.job().name.clone(),
        job_type: cfg.job().job_type.clone(),
        status: JobStatus::NotStarted,
        percent_complete: 0,
        instance_count: u32::try_from(files.len().max(1)).unwrap_or(u32::MAX),
        files,
        parameters: cfg.job().parameters.clone(),
    }
}

async fn submit_and_monitor(
    cfg: &ConfigFile,
    paths: &[PathBuf],
    options: monitor::MonitorOptions,
) -> Result<bool> {
    let url = cfg.service().url.clone().ok_or_else(|| {
        NiftiBatchError::ConfigError("[service].url is required to submit a job".to_string())
    })?;

    let auth_cfg = cfg.auth();
    let credential = match &auth_cfg.account_id {
        Some(account_id) => {
            Credential::parse(account_id, auth_cfg.account_key.clone().unwrap_or_default())?
        }
        None => Credential::empty(),
    };

    let http = reqwest::Client::builder()
        .timeout(cfg.service().timeout)
        .build()
        .context("building HTTP client")?;
    let tokens = TokenManager::with_provider(
        AadTokenProvider::new(http),
        auth_cfg.resource.clone().unwrap_or_default(),
    )
    .with_authority_template(auth_cfg.authority.clone());
    let token = Authenticator::new(tokens).authenticate(&credential).await?;

    let service = HttpBatchService::new(&url, cfg.service().timeout)?.with_token(token);

    let inputs = paths
        .iter()
        .map(|p| describe_input(p))
        .collect::<errors::Result<Vec<_>>>()?;

    let job = submit_job(
        &service,
        &mut io::stdout(),
        &cfg.job().name,
        &cfg.job().job_type,
        &inputs,
        cfg.job().parameters.clone(),
    )
    .await?;

    // Ctrl-C → stop monitoring.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        let _ = cancel_tx.send(true);
    });

    let mut monitor = JobMonitor::new(&service, io::stdout(), options);
    let report = monitor.run(job, cancel_rx).await?;

    if !report.succeeded {
        print_job_logs(&mut io::stderr(), &report.logs)?;
    }
    info!(job_id = %report.job_id, status = %report.status, "job finished");
    Ok(report.succeeded)
}

/// Print the tasks the job would be split into.
fn print_plan(cfg: &ConfigFile, paths: &[PathBuf]) -> Result<()> {
    let files = paths.iter().map(|p| FileSpecifier::from_path(p)).collect();
    let job = local_job(cfg, files);

    let splitter = JobSplitter::default();
    let mut tasks = splitter.split(&job)?;
    tasks.extend(splitter.merge_task(&job));

    let mut out = io::stdout().lock();
    writeln!(out, "niftibatch plan")?;
    writeln!(out, "  job.name = {}", job.name)?;
    writeln!(out, "  job.type = {}", job.job_type)?;
    writeln!(out, "  job.instance_count = {}", job.instance_count)?;
    writeln!(out)?;

    writeln!(out, "tasks ({}):", tasks.len())?;
    for task in &tasks {
        writeln!(out, "  - {}", task.task_id)?;
        if let Some(dep) = &task.depends_on {
            writeln!(out, "      after: {}", dep.on)?;
        }
        if let Some(stage) = splitter.graph().stage(task.task_id) {
            if let Some(program) = stage.program() {
                writeln!(out, "      program: {program}")?;
            }
            if let Some(input) = task.primary_input() {
                writeln!(out, "      input: {}", input.name)?;
            }
            if let Some(output) = stage.output_name() {
                writeln!(out, "      output: {output}")?;
            }
        }
    }
    if !job.parameters.is_empty() {
        writeln!(out)?;
        writeln!(out, "parameters:")?;
        for (key, value) in &job.parameters {
            writeln!(out, "  {key} = {value}")?;
        }
    }

    debug!("plan complete (no execution)");
    Ok(())
}

async fn run_task(task_path: &Path, layout: NodeLayout) -> Result<bool> {
    let json = if task_path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading task from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(task_path)
            .await
            .with_context(|| format!("reading task file {}", task_path.display()))?
    };

    let task = TaskSpecifier::from_json(&json)?;
    info!(task = %task.task_id, "running task");

    let processor = TaskProcessor::new(layout);
    let result = processor.execute(&task).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.succeeded())
}

async fn run_local(cfg: &ConfigFile, paths: &[PathBuf], layout: NodeLayout) -> Result<bool> {
    let files = stage_inputs(paths, &layout.local_storage).await?;
    let job = local_job(cfg, files);

    let splitter = JobSplitter::default();
    let tasks = splitter.split(&job)?;
    let merge = splitter.merge_task(&job);
    let scheduler = Scheduler::new(tasks, merge);

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let processor = Arc::new(TaskProcessor::new(layout));
    let backend = ProcessorBackend::new(processor, rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        let _ = rt_tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    let report = LocalRuntime::new(scheduler, rt_rx, backend).run().await?;
    print_local_report(&report)?;
    Ok(report.succeeded())
}

/// Copy inputs into local storage, where the stages look for them.
async fn stage_inputs(paths: &[PathBuf], storage: &Path) -> Result<Vec<FileSpecifier>> {
    tokio::fs::create_dir_all(storage)
        .await
        .with_context(|| format!("creating local storage {}", storage.display()))?;

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let input = describe_input(path)?;
        let dest = storage.join(&input.spec.name);

        let src = tokio::fs::canonicalize(path).await?;
        let already_staged = tokio::fs::canonicalize(&dest)
            .await
            .map(|d| d == src)
            .unwrap_or(false);
        if !already_staged {
            debug!(from = %path.display(), to = %dest.display(), "staging input");
            tokio::fs::copy(path, &dest)
                .await
                .with_context(|| format!("staging input {}", path.display()))?;
        }
        files.push(input.spec);
    }
    Ok(files)
}

fn print_local_report(report: &LocalRunReport) -> Result<()> {
    let mut out = io::stdout().lock();
    for (task, result) in &report.results {
        writeln!(out, "{task}: {:?}", result.success)?;
    }
    for task in &report.blocked {
        writeln!(out, "{task}: not run")?;
    }

    if report.succeeded() {
        if let Some(job_result) = report.job_result() {
            writeln!(out, "Job output: {}", job_result.output_file.display())?;
        }
        writeln!(out, "-----Job successfully completed-----")?;
        return Ok(());
    }

    let mut err = io::stderr().lock();
    writeln!(err, "-----------Job has failed-------------")?;
    if report.interrupted {
        writeln!(err, "run was interrupted")?;
    }
    for (task, text) in report.diagnostics() {
        if report.result_of(task).is_some_and(|r| !r.succeeded()) {
            writeln!(err, "TaskId:    {task}")?;
            writeln!(err, "Text:      {text}")?;
            writeln!(err, "-------------------------------------")?;
        }
    }
    Ok(())
}
