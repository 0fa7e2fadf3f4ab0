// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::errors::{NiftiBatchError, Result};
use crate::model::TaskId;

/// Logical output name of the reslice stage.
pub const RESLICED_OUTPUT: &str = "resliced.nii";
/// Logical output name of the skull-strip stage.
pub const SKULL_STRIPPED_OUTPUT: &str = "skull-stripped.nii";

/// What a stage does when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageKind {
    /// Run `program` (resolved under the install directory) and produce
    /// `output_name` in local storage.
    Process {
        program: String,
        output_name: String,
    },
    /// Finalize the job once every processing stage has succeeded.
    Merge,
}

/// A node of the pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageNode {
    pub id: TaskId,
    pub kind: StageKind,
}

impl StageNode {
    pub fn process(id: TaskId, program: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            id,
            kind: StageKind::Process {
                program: program.into(),
                output_name: output_name.into(),
            },
        }
    }

    pub fn merge() -> Self {
        Self {
            id: TaskId::Merge,
            kind: StageKind::Merge,
        }
    }

    /// Logical output name for processing stages.
    pub fn output_name(&self) -> Option<&str> {
        match &self.kind {
            StageKind::Process { output_name, .. } => Some(output_name),
            StageKind::Merge => None,
        }
    }

    pub fn program(&self) -> Option<&str> {
        match &self.kind {
            StageKind::Process { program, .. } => Some(program),
            StageKind::Merge => None,
        }
    }
}

/// Pipeline stages and their dependency edges.
///
/// Nodes live in an index-addressed `petgraph` graph; edges point from a
/// stage to the stages that depend on it. Adding a stage to the pipeline is
/// a matter of adding a node and an edge, not new control flow.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    graph: DiGraph<StageNode, ()>,
    index: HashMap<TaskId, NodeIndex>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed NIfTI pipeline: Reslice -> SkullStrip -> Merge.
    pub fn nifti() -> Self {
        let mut graph = Self::new();
        graph.add_stage(StageNode::process(TaskId::Reslice, "niftiInit", RESLICED_OUTPUT));
        graph.add_stage(StageNode::process(
            TaskId::SkullStrip,
            "skullStrip",
            SKULL_STRIPPED_OUTPUT,
        ));
        graph.add_stage(StageNode::merge());
        graph.connect(TaskId::Reslice, TaskId::SkullStrip);
        graph.connect(TaskId::SkullStrip, TaskId::Merge);
        graph
    }

    /// Add a stage node; re-adding an id replaces the node's payload.
    pub fn add_stage(&mut self, node: StageNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.id) {
            self.graph[idx] = node;
            return idx;
        }
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        idx
    }

    /// Declare that `dependent` runs after `prerequisite`.
    pub fn add_dependency(&mut self, prerequisite: TaskId, dependent: TaskId) -> Result<()> {
        let from = self.node_index(prerequisite)?;
        let to = self.node_index(dependent)?;
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    fn connect(&mut self, prerequisite: TaskId, dependent: TaskId) {
        if let (Some(&from), Some(&to)) =
            (self.index.get(&prerequisite), self.index.get(&dependent))
        {
            self.graph.update_edge(from, to, ());
        }
    }

    fn node_index(&self, id: TaskId) -> Result<NodeIndex> {
        self.index.get(&id).copied().ok_or_else(|| {
            NiftiBatchError::ConfigError(format!("pipeline has no stage '{id}'"))
        })
    }

    pub fn stage(&self, id: TaskId) -> Option<&StageNode> {
        self.index.get(&id).map(|&idx| &self.graph[idx])
    }

    /// Immediate prerequisites of a stage.
    pub fn dependencies_of(&self, id: TaskId) -> Vec<TaskId> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Immediate dependents of a stage.
    pub fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        self.neighbours(id, Direction::Outgoing)
    }

    fn neighbours(&self, id: TaskId, dir: Direction) -> Vec<TaskId> {
        let Some(&idx) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut ids: Vec<TaskId> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].id)
            .collect();
        ids.sort();
        ids
    }

    /// Stages in dependency order.
    pub fn stages_in_order(&self) -> Result<Vec<&StageNode>> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            NiftiBatchError::ConfigError(format!(
                "cycle detected in pipeline involving stage '{}'",
                self.graph[cycle.node_id()].id
            ))
        })?;
        Ok(order.into_iter().map(|idx| &self.graph[idx]).collect())
    }

    /// Processing stages (everything but merge) in dependency order.
    pub fn processing_stages(&self) -> Result<Vec<&StageNode>> {
        Ok(self
            .stages_in_order()?
            .into_iter()
            .filter(|n| !n.id.is_merge())
            .collect())
    }

    /// Check the shape the splitter and executor rely on:
    /// - acyclic
    /// - exactly one processing stage without prerequisites
    /// - every other processing stage has exactly one prerequisite
    /// - merge, if present, has no dependents
    pub fn validate(&self) -> Result<()> {
        let stages = self.processing_stages()?;
        if stages.is_empty() {
            return Err(NiftiBatchError::ConfigError(
                "pipeline must contain at least one processing stage".to_string(),
            ));
        }

        let roots: Vec<TaskId> = stages
            .iter()
            .filter(|n| self.dependencies_of(n.id).is_empty())
            .map(|n| n.id)
            .collect();
        if roots.len() != 1 {
            return Err(NiftiBatchError::ConfigError(format!(
                "pipeline must have exactly one first stage, found {roots:?}"
            )));
        }

        for stage in &stages {
            let deps = self.dependencies_of(stage.id);
            if stage.id != roots[0] && deps.len() != 1 {
                return Err(NiftiBatchError::ConfigError(format!(
                    "stage '{}' must depend on exactly one stage, found {deps:?}",
                    stage.id
                )));
            }
            if stage.output_name().is_none() {
                return Err(NiftiBatchError::ConfigError(format!(
                    "processing stage '{}' has no output name",
                    stage.id
                )));
            }
        }

        if !self.dependents_of(TaskId::Merge).is_empty() {
            return Err(NiftiBatchError::ConfigError(
                "merge stage cannot have dependents".to_string(),
            ));
        }

        Ok(())
    }
}
