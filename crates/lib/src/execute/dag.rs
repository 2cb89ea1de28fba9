//! Stage dependency graph.
//!
//! Every stage of every pipeline is a node; an edge runs from a dependency to
//! its dependent. Stages of different pipelines are never connected, so
//! pipelines interleave freely across execution waves.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::types::{ExecuteError, StageId};

#[derive(Debug, Default, Clone)]
pub struct StageGraph {
  graph: DiGraph<StageId, ()>,
  nodes: HashMap<StageId, NodeIndex>,
}

impl StageGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a stage. Adding an existing stage is a no-op.
  pub fn add_stage(&mut self, id: StageId) {
    if !self.nodes.contains_key(&id) {
      let idx = self.graph.add_node(id);
      self.nodes.insert(id, idx);
    }
  }

  /// Declare that `dependent` consumes the outputs of `dependency`.
  pub fn add_dependency(&mut self, dependency: StageId, dependent: StageId) -> Result<(), ExecuteError> {
    let from = *self.nodes.get(&dependency).ok_or(ExecuteError::UnknownStage(dependency))?;
    let to = *self.nodes.get(&dependent).ok_or(ExecuteError::UnknownStage(dependent))?;
    self.graph.update_edge(from, to, ());
    Ok(())
  }

  /// Verify that the graph is acyclic.
  pub fn verify_acyclic(&self) -> Result<(), ExecuteError> {
    toposort(&self.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(())
  }

  /// Stages grouped into waves; every dependency of a stage sits in an
  /// earlier wave. Stages within a wave are sorted.
  pub fn execution_waves(&self) -> Result<Vec<Vec<StageId>>, ExecuteError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[idx] == 0).copied().collect();
      if ready.is_empty() {
        return Err(ExecuteError::CycleDetected);
      }

      for idx in &ready {
        remaining.remove(idx);
        for neighbor in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<StageId> = ready.into_iter().map(|idx| self.graph[idx]).collect();
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }

  /// Direct dependencies of a stage, sorted.
  pub fn dependencies(&self, id: &StageId) -> Vec<StageId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Direct dependents of a stage, sorted.
  pub fn dependents(&self, id: &StageId) -> Vec<StageId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: &StageId, direction: Direction) -> Vec<StageId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    let mut out: Vec<StageId> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n])
      .collect();
    out.sort();
    out
  }

  pub fn depends_on(&self, dependent: &StageId, dependency: &StageId) -> bool {
    match (self.nodes.get(dependency), self.nodes.get(dependent)) {
      (Some(&from), Some(&to)) => self.graph.contains_edge(from, to),
      _ => false,
    }
  }

  pub fn contains(&self, id: &StageId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn stages(&self) -> impl Iterator<Item = &StageId> {
    self.nodes.keys()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
