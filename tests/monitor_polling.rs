// tests/monitor_polling.rs

use std::error::Error;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use niftibatch::errors::NiftiBatchError;
use niftibatch::inputs::describe_input;
use niftibatch::model::{JobStatus, Parameters};
use niftibatch::monitor::{JobMonitor, MonitorOptions, print_job_logs, submit_job};
use niftibatch::types::HoldPolicy;
use niftibatch_test_utils::builders::{JobBuilder, log_entry, snapshot, task_output};
use niftibatch_test_utils::fake_service::ScriptedService;
use niftibatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn options(output_dir: &std::path::Path) -> MonitorOptions {
    MonitorOptions {
        poll_interval: Duration::from_secs(1),
        output_dir: output_dir.to_path_buf(),
        ..MonitorOptions::default()
    }
}

/// A receiver whose sender is already gone; it never cancels.
fn never_cancelled() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test(start_paused = true)]
async fn each_task_output_is_downloaded_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let service = ScriptedService::new()
        .snapshots([
            snapshot("job-1", JobStatus::NotStarted, 0),
            snapshot("job-1", JobStatus::InProgress, 50),
            snapshot("job-1", JobStatus::InProgress, 75),
            snapshot("job-1", JobStatus::Complete, 100),
        ])
        .listings([
            vec![],
            vec![task_output("out/resliced-1.nii", 1)],
            vec![
                task_output("out/resliced-1.nii", 1),
                task_output("skull-stripped-1.nii", 2),
            ],
        ])
        .file("out/resliced-1.nii", b"r")
        .file("skull-stripped-1.nii", b"s");

    let mut out = Vec::new();
    let report = JobMonitor::new(&service, &mut out, options(dir.path()))
        .run(JobBuilder::new("job-1").build(), never_cancelled())
        .await?;
    let text = String::from_utf8(out)?;

    assert!(report.succeeded);
    assert_eq!(report.status, JobStatus::Complete);
    assert_eq!(
        report.downloaded,
        vec![dir.path().join("out/resliced-1.nii"), dir.path().join("skull-stripped-1.nii")]
    );
    assert_eq!(std::fs::read(dir.path().join("out/resliced-1.nii"))?, b"r");
    assert!(report.logs.is_empty());

    let calls = service.calls();
    assert_eq!(calls.refreshes, 4);
    assert_eq!(calls.fetched, vec!["out/resliced-1.nii", "skull-stripped-1.nii"]);
    assert_eq!(calls.log_requests, 0);

    assert!(text.contains("-----Starting Job-----\nJob Id: job-1\n"));
    assert!(text.contains("Waiting for compute resource...\n"));
    assert!(text.contains("Percent complete: 75\n"));
    assert_eq!(text.matches("Downloading: out/resliced-1.nii").count(), 1);
    assert!(text.ends_with("Percent complete: 100\n-----Job successfully completed-----\n"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn outputs_keep_their_logical_directories() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let service = ScriptedService::new()
        .snapshots([snapshot("job-7", JobStatus::Complete, 100)])
        .listings([vec![
            task_output("task1/resliced.nii", 1),
            task_output("task2/resliced.nii", 2),
            task_output("../escape.nii", 3),
            task_output("/tmp/absolute.nii", 4),
        ]])
        .file("task1/resliced.nii", b"first")
        .file("task2/resliced.nii", b"second")
        .file("../escape.nii", b"x")
        .file("/tmp/absolute.nii", b"x");

    let report = JobMonitor::new(&service, std::io::sink(), options(dir.path()))
        .run(JobBuilder::new("job-7").status(JobStatus::InProgress).build(), never_cancelled())
        .await?;

    assert!(report.succeeded);
    assert_eq!(
        report.downloaded,
        vec![dir.path().join("task1/resliced.nii"), dir.path().join("task2/resliced.nii")]
    );
    assert_eq!(std::fs::read(dir.path().join("task1/resliced.nii"))?, b"first");
    assert_eq!(std::fs::read(dir.path().join("task2/resliced.nii"))?, b"second");
    assert!(!dir.path().parent().unwrap().join("escape.nii").exists());
    assert_eq!(
        service.calls().fetched,
        vec!["task1/resliced.nii", "task2/resliced.nii"]
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_job_fetches_logs_instead_of_outputs() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let service = ScriptedService::new()
        .snapshots([snapshot("job-2", JobStatus::Error, 40)])
        .listings([vec![task_output("resliced-1.nii", 1)]])
        .logs(vec![
            log_entry(1, 0, "niftiInit exited with 1"),
            log_entry(2, 3, "skipped"),
        ]);

    let mut out = Vec::new();
    let report = JobMonitor::new(&service, &mut out, options(dir.path()))
        .run(JobBuilder::new("job-2").status(JobStatus::InProgress).build(), never_cancelled())
        .await?;

    assert!(!report.succeeded);
    assert_eq!(report.status, JobStatus::Error);
    assert!(report.downloaded.is_empty());
    assert_eq!(report.logs.len(), 2);

    let calls = service.calls();
    assert!(calls.fetched.is_empty());
    assert_eq!(calls.log_requests, 1);
    assert!(!String::from_utf8(out)?.contains("successfully completed"));

    let mut dump = Vec::new();
    print_job_logs(&mut dump, &report.logs)?;
    let dump = String::from_utf8(dump)?;
    assert!(dump.starts_with("\n\n-----------Job has failed-------------\n"));
    assert!(dump.contains("TaskId:    1\nTimestamp: 2024-01-01 00:00:00 UTC\nText:      niftiInit exited with 1\n"));
    assert_eq!(dump.matches("-------------------------------------\n").count(), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn on_hold_follows_the_hold_policy() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = || {
        ScriptedService::new().snapshots([
            snapshot("job-3", JobStatus::OnHold, 10),
            snapshot("job-3", JobStatus::InProgress, 60),
            snapshot("job-3", JobStatus::Complete, 100),
        ])
    };

    let failing = script();
    let report = JobMonitor::new(&failing, std::io::sink(), options(dir.path()))
        .run(JobBuilder::new("job-3").build(), never_cancelled())
        .await?;
    assert_eq!(report.status, JobStatus::OnHold);
    assert!(!report.succeeded);
    assert_eq!(failing.calls().refreshes, 1);
    assert_eq!(failing.calls().log_requests, 1);

    let patient = script();
    let opts = MonitorOptions {
        hold_policy: HoldPolicy::KeepPolling,
        ..options(dir.path())
    };
    let report = JobMonitor::new(&patient, std::io::sink(), opts)
        .run(JobBuilder::new("job-3").build(), never_cancelled())
        .await?;
    assert!(report.succeeded);
    assert_eq!(patient.calls().refreshes, 3);
    assert_eq!(patient.calls().log_requests, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_ends_monitoring_of_a_stuck_job() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let service =
        ScriptedService::new().snapshots([snapshot("job-4", JobStatus::InProgress, 5)]);

    let opts = MonitorOptions {
        deadline: Some(Duration::from_millis(2500)),
        ..options(dir.path())
    };
    let started = Instant::now();
    let err = JobMonitor::new(&service, std::io::sink(), opts)
        .run(JobBuilder::new("job-4").build(), never_cancelled())
        .await
        .unwrap_err();

    match err {
        NiftiBatchError::MonitorTimedOut { job_id, elapsed } => {
            assert_eq!(job_id, "job-4");
            assert!(elapsed >= Duration::from_millis(2500));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(service.calls().refreshes, 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_signal_stops_polling() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let service =
        ScriptedService::new().snapshots([snapshot("job-5", JobStatus::InProgress, 5)]);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let _ = cancel_tx.send(true);
    });

    let err = JobMonitor::new(&service, std::io::sink(), options(dir.path()))
        .run(JobBuilder::new("job-5").build(), cancel_rx)
        .await
        .unwrap_err();

    assert!(matches!(err, NiftiBatchError::MonitorCancelled(ref id) if id == "job-5"), "got {err:?}");
    assert_eq!(service.calls().refreshes, 1);
    assert_eq!(service.calls().log_requests, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_and_cancel_interrupt_a_slow_refresh() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let slow = || {
        ScriptedService::new()
            .snapshots([snapshot("job-8", JobStatus::InProgress, 5)])
            .refresh_delay(Duration::from_secs(3600))
    };

    let service = slow();
    let opts = MonitorOptions {
        deadline: Some(Duration::from_millis(2500)),
        ..options(dir.path())
    };
    let started = Instant::now();
    let err = JobMonitor::new(&service, std::io::sink(), opts)
        .run(JobBuilder::new("job-8").build(), never_cancelled())
        .await
        .unwrap_err();
    assert!(matches!(err, NiftiBatchError::MonitorTimedOut { .. }), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    assert_eq!(service.calls().refreshes, 1);

    let service = slow();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let _ = cancel_tx.send(true);
    });
    let started = Instant::now();
    let err = JobMonitor::new(&service, std::io::sink(), options(dir.path()))
        .run(JobBuilder::new("job-8").build(), cancel_rx)
        .await
        .unwrap_err();
    assert!(matches!(err, NiftiBatchError::MonitorCancelled(ref id) if id == "job-8"), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(service.calls().log_requests, 0);

    Ok(())
}

#[tokio::test]
async fn submit_uploads_inputs_then_requests_one_instance_each() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a.nii"), b"first")?;
    std::fs::write(dir.path().join("b.nii"), b"second")?;
    let inputs = vec![
        describe_input(&dir.path().join("a.nii"))?,
        describe_input(&dir.path().join("b.nii"))?,
    ];

    let service = ScriptedService::new().submitted_as(JobBuilder::new("job-6").build());
    let mut params = Parameters::new();
    params.insert("quality".to_string(), "high".to_string());

    let mut out = Vec::new();
    let job = submit_job(&service, &mut out, "Nightly", "AzureBatchNiftiProcessing", &inputs, params)
        .await?;

    assert_eq!(job.id, "job-6");
    assert_eq!(String::from_utf8(out)?, "-----Submitting Job-----\n");

    let calls = service.calls();
    assert_eq!(
        calls.uploaded,
        vec![("a.nii".to_string(), b"first".to_vec()), ("b.nii".to_string(), b"second".to_vec())]
    );
    assert_eq!(calls.submissions.len(), 1);
    let submission = &calls.submissions[0];
    assert_eq!(submission.instance_count, 2);
    assert_eq!(submission.job_type, "AzureBatchNiftiProcessing");
    assert!(submission.required_files.iter().all(|f| f.hash.is_some()));
    assert_eq!(submission.parameters.get("quality").map(String::as_str), Some("high"));

    let err = submit_job(&service, &mut std::io::sink(), "Nightly", "x", &[], Parameters::new())
        .await
        .unwrap_err();
    assert!(matches!(err, NiftiBatchError::ConfigError(_)), "got {err:?}");
    assert_eq!(service.calls().submissions.len(), 1);

    Ok(())
}
