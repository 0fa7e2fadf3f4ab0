// tests/graph_split.rs

use proptest::prelude::*;

use niftibatch::dag::{JobSplitter, PipelineGraph, RESLICED_OUTPUT, StageNode, split};
use niftibatch::errors::NiftiBatchError;
use niftibatch::model::{TaskDependency, TaskId, TaskSpecifier};
use niftibatch_test_utils::builders::JobBuilder;

#[test]
fn single_input_job_splits_into_reslice_then_skull_strip() {
    let job = JobBuilder::new("job-1")
        .file("brain.nii")
        .parameter("quality", "high")
        .build();

    let tasks = split(&job).unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].task_id, TaskId::Reslice);
    assert_eq!(tasks[0].required_files, job.files);
    assert!(tasks[0].depends_on.is_none());

    assert_eq!(tasks[1].task_id, TaskId::SkullStrip);
    assert_eq!(tasks[1].depends_on, Some(TaskDependency::on_id(TaskId::Reslice)));
    assert_eq!(tasks[1].required_files.len(), 1);
    assert_eq!(tasks[1].required_files[0].name, RESLICED_OUTPUT);

    for task in &tasks {
        assert_eq!(task.parameters.get("quality").map(String::as_str), Some("high"));
    }
}

#[test]
fn job_without_inputs_is_a_config_error() {
    let job = JobBuilder::new("empty").build();

    match split(&job) {
        Err(NiftiBatchError::ConfigError(msg)) => assert!(msg.contains("no input files")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn merge_task_follows_last_stage_and_is_not_split() {
    let job = JobBuilder::new("job-1").file("brain.nii").build();
    let splitter = JobSplitter::default();

    let tasks = splitter.split(&job).unwrap();
    assert!(tasks.iter().all(|t| !t.task_id.is_merge()));

    let merge = splitter.merge_task(&job).unwrap();
    assert_eq!(merge.depends_on, Some(TaskDependency::on_id(TaskId::SkullStrip)));
    assert!(merge.required_files.is_empty());
}

#[test]
fn graph_with_two_roots_is_rejected() {
    let mut graph = PipelineGraph::new();
    graph.add_stage(StageNode::process(TaskId::Reslice, "niftiInit", RESLICED_OUTPUT));
    graph.add_stage(StageNode::process(TaskId::SkullStrip, "skullStrip", "out.nii"));

    assert!(JobSplitter::new(graph).is_err());
}

#[test]
fn split_tasks_round_trip_through_wire_json() {
    let job = JobBuilder::new("job-1").file("brain.nii").build();

    for task in split(&job).unwrap() {
        let json = serde_json::to_string(&task).unwrap();
        assert_eq!(TaskSpecifier::from_json(&json).unwrap(), task);
    }
}

#[test]
fn unknown_wire_task_id_is_invalid_task() {
    let err = TaskSpecifier::from_json(r#"{"taskId":"Denoise","requiredFiles":[]}"#).unwrap_err();
    assert!(matches!(err, NiftiBatchError::InvalidTask(_)), "got {err:?}");
}

proptest! {
    #[test]
    fn every_later_task_requires_its_predecessors_output(
        names in proptest::collection::vec("[a-z]{1,8}\\.nii", 1..6),
        params in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..4),
    ) {
        let mut builder = JobBuilder::new("prop");
        for name in &names {
            builder = builder.file(name);
        }
        for (k, v) in &params {
            builder = builder.parameter(k, v);
        }
        let job = builder.build();

        let tasks = split(&job).unwrap();
        let graph = PipelineGraph::nifti();

        prop_assert_eq!(tasks.len(), 2);
        prop_assert_eq!(&tasks[0].required_files[0].name, &names[0]);
        for task in &tasks {
            prop_assert_eq!(&task.parameters, &params);
        }
        for pair in tasks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            prop_assert_eq!(next.depends_on, Some(TaskDependency::on_id(prev.task_id)));
            prop_assert_eq!(next.required_files.len(), 1);
            let prev_output = graph.stage(prev.task_id).and_then(|s| s.output_name());
            prop_assert_eq!(Some(next.required_files[0].name.as_str()), prev_output);
        }
    }
}
