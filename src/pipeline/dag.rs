// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! DAG (Directed Acyclic Graph) of pipeline stages
//!
//! Builds and validates the dependency graph once, when a pipeline is
//! loaded. Node `i` is always the stage declared at position `i`, so the
//! scheduler can index its bookkeeping arena with plain `usize`s.

use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::errors::{PipewrightError, PipewrightResult};
use crate::pipeline::PipelineSpec;

/// Validated stage dependency graph
#[derive(Debug, Clone)]
pub struct StageGraph {
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, usize>,
    names: Vec<String>,
    order: Vec<usize>,
}

impl StageGraph {
    /// Build the graph of a pipeline
    ///
    /// Fails with [`PipewrightError::UnknownDependency`] when a dependency
    /// doesn't name a declared stage and with
    /// [`PipewrightError::CircularDependency`] when no topological order
    /// exists (a stage depending on itself included).
    pub fn build(pipeline: &PipelineSpec) -> PipewrightResult<Self> {
        let mut graph = DiGraph::with_capacity(pipeline.stages.len(), 0);
        let mut name_to_index = HashMap::with_capacity(pipeline.stages.len());
        let mut names = Vec::with_capacity(pipeline.stages.len());

        for (idx, stage) in pipeline.stages.iter().enumerate() {
            graph.add_node(idx);
            name_to_index.insert(stage.name.clone(), idx);
            names.push(stage.name.clone());
        }

        // Edges point from a dependency to the stage that needs it
        for (idx, stage) in pipeline.stages.iter().enumerate() {
            let stage_node = NodeIndex::new(idx);

            for dep_name in &stage.depends_on {
                let dep = *name_to_index.get(dep_name).ok_or_else(|| {
                    PipewrightError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dep_name.clone(),
                    }
                })?;

                let dep_node = NodeIndex::new(dep);
                if !graph.contains_edge(dep_node, stage_node) {
                    graph.add_edge(dep_node, stage_node, ());
                }
            }
        }

        let mut dag = Self {
            graph,
            name_to_index,
            names,
            order: Vec::new(),
        };

        let order = dag.kahn_order().map_err(|_| PipewrightError::CircularDependency {
            stages: dag.cycle_members(),
        })?;
        dag.order = order;

        Ok(dag)
    }

    /// Kahn's algorithm with declaration order breaking ties
    ///
    /// Returns the stages left with unmet dependencies when a cycle exists.
    fn kahn_order(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degree: Vec<usize> = (0..self.len())
            .map(|idx| {
                self.graph
                    .neighbors_directed(NodeIndex::new(idx), Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            for dependent in self.dependents(idx) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() == self.len() {
            Ok(order)
        } else {
            Err((0..self.len()).filter(|idx| in_degree[*idx] > 0).collect())
        }
    }

    /// Names of the stages forming the first cycle, in declaration order
    fn cycle_members(&self) -> Vec<String> {
        let mut cycles: Vec<Vec<usize>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self.graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut members: Vec<usize> = component.into_iter().map(|n| n.index()).collect();
                members.sort_unstable();
                members
            })
            .collect();

        cycles.sort();
        cycles
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|idx| self.names[idx].clone())
            .collect()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the graph has no stages
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of the stage at `idx`
    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    /// Position of a stage by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Topologically sorted stage indices
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    /// Topologically sorted stage names
    pub fn topological_order_names(&self) -> Vec<&str> {
        self.order.iter().map(|idx| self.name(*idx)).collect()
    }

    /// Stages that must finish before `idx`, in declaration order
    pub fn dependencies(&self, idx: usize) -> Vec<usize> {
        self.neighbors(idx, Direction::Incoming)
    }

    /// Stages that directly depend on `idx`, in declaration order
    pub fn dependents(&self, idx: usize) -> Vec<usize> {
        self.neighbors(idx, Direction::Outgoing)
    }

    fn neighbors(&self, idx: usize, direction: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(idx), direction)
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out
    }

    /// Every stage reachable from `idx`, excluding `idx`, in declaration order
    pub fn transitive_dependents(&self, idx: usize) -> Vec<usize> {
        let start = NodeIndex::new(idx);
        let mut bfs = Bfs::new(&self.graph, start);
        let mut out = Vec::new();

        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                out.push(node.index());
            }
        }

        out.sort_unstable();
        out
    }

    /// Check if stage A depends (directly or transitively) on stage B
    pub fn depends_on(&self, stage_a: &str, stage_b: &str) -> bool {
        let (Some(a), Some(b)) = (self.index_of(stage_a), self.index_of(stage_b)) else {
            return false;
        };

        a != b && has_path_connecting(&self.graph, NodeIndex::new(b), NodeIndex::new(a), None)
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for (idx, name) in self.names.iter().enumerate() {
            out.push_str(&format!("    s{}[\"{}\"]\n", idx, name));
        }

        for edge in self.graph.edge_references() {
            out.push_str(&format!(
                "    s{} --> s{}\n",
                edge.source().index(),
                edge.target().index()
            ));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for name in &self.names {
            out.push_str(&format!("    \"{}\";\n", name));
        }

        for edge in self.graph.edge_references() {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                self.names[edge.source().index()],
                self.names[edge.target().index()]
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self, pipeline: &PipelineSpec) -> String {
        let mut out = String::new();

        for (i, idx) in self.order.iter().enumerate() {
            let stage = &pipeline.stages[*idx];
            let deps: Vec<&str> = self
                .dependencies(*idx)
                .into_iter()
                .map(|d| self.name(d))
                .collect();

            out.push_str(&format!("{}. {} ({})", i + 1, stage.name, stage.action_label()));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        out
    }
}
