// tests/runtime_fake_executor.rs

use niftibatch_test_utils::builders::JobBuilder;
use niftibatch_test_utils::fake_executor::FakeExecutor;
use niftibatch_test_utils::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use niftibatch::dag::{JobSplitter, Scheduler};
use niftibatch::engine::{LocalRuntime, RuntimeEvent};
use niftibatch::model::{TaskId, TaskProcessSuccess};

type TestResult = Result<(), Box<dyn Error>>;

fn nifti_scheduler() -> Scheduler {
    let job = JobBuilder::new("job-1").file("brain.nii").build();
    let splitter = JobSplitter::default();
    let tasks = splitter.split(&job).expect("split");
    Scheduler::new(tasks, splitter.merge_task(&job))
}

#[tokio::test]
async fn runtime_runs_stages_in_dependency_order_then_merges() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    let runtime = LocalRuntime::new(nifti_scheduler(), rt_rx, executor);
    let report = with_timeout(runtime.run()).await?;

    assert!(report.succeeded());
    assert_eq!(
        *executed.lock().unwrap(),
        vec![TaskId::Reslice, TaskId::SkullStrip, TaskId::Merge]
    );
    assert_eq!(report.completed(), vec![TaskId::Reslice, TaskId::SkullStrip, TaskId::Merge]);
    assert!(report.blocked.is_empty());

    Ok(())
}

#[tokio::test]
async fn failed_reslice_never_dispatches_skull_strip() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone())
        .with_outcome(TaskId::Reslice, TaskProcessSuccess::PermanentFailure);

    let runtime = LocalRuntime::new(nifti_scheduler(), rt_rx, executor);
    let report = with_timeout(runtime.run()).await?;

    assert!(!report.succeeded());
    assert_eq!(*executed.lock().unwrap(), vec![TaskId::Reslice]);
    assert_eq!(
        report.result_of(TaskId::Reslice).map(|r| r.success),
        Some(TaskProcessSuccess::PermanentFailure)
    );
    assert_eq!(report.blocked, vec![TaskId::SkullStrip, TaskId::Merge]);
    assert!(report.job_result().is_none());

    Ok(())
}

#[tokio::test]
async fn failed_skull_strip_blocks_only_merge() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone())
        .with_outcome(TaskId::SkullStrip, TaskProcessSuccess::PermanentFailure);

    let report = with_timeout(LocalRuntime::new(nifti_scheduler(), rt_rx, executor).run()).await?;

    assert_eq!(*executed.lock().unwrap(), vec![TaskId::Reslice, TaskId::SkullStrip]);
    assert_eq!(report.blocked, vec![TaskId::Merge]);
    assert!(!report.interrupted);

    Ok(())
}

#[tokio::test]
async fn shutdown_request_interrupts_the_run() -> TestResult {
    init_tracing();

    // An executor that never reports back keeps the job running.
    struct SilentExecutor;
    impl niftibatch::exec::ExecutorBackend for SilentExecutor {
        fn spawn_ready_tasks(
            &mut self,
            _tasks: Vec<niftibatch::model::TaskSpecifier>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = niftibatch::errors::Result<()>> + Send + '_>,
        > {
            Box::pin(async { Ok(()) })
        }
    }

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    rt_tx.send(RuntimeEvent::ShutdownRequested).await?;

    let report = with_timeout(LocalRuntime::new(nifti_scheduler(), rt_rx, SilentExecutor).run()).await?;

    assert!(report.interrupted);
    assert!(report.results.is_empty());
    assert!(!report.succeeded());

    Ok(())
}
