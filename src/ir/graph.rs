// IR Computation Graph
//
// Represents a dataflow graph of element-wise operations

use crate::core::error::{CodegenError, Result};
use crate::ir::node::{IRNode, NodeId, Operation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Computation graph
///
/// Nodes are kept in a `BTreeMap` so that encoding a graph is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IRGraph {
    /// Nodes indexed by ID
    nodes: BTreeMap<NodeId, IRNode>,
    /// Next available node ID
    next_id: NodeId,
    /// Input nodes, in parameter order
    inputs: Vec<NodeId>,
    /// Output nodes, in result order
    outputs: Vec<NodeId>,
}

impl IRGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, op: Operation, inputs: Vec<NodeId>) -> Result<NodeId> {
        if inputs.len() != op.arity() {
            return Err(CodegenError::InvalidGraph(format!(
                "{} expects {} input(s), got {}",
                op,
                op.arity(),
                inputs.len()
            )));
        }
        // Validate inputs exist
        for &input_id in &inputs {
            if !self.nodes.contains_key(&input_id) {
                return Err(CodegenError::InvalidGraph(format!(
                    "node {} does not exist",
                    input_id
                )));
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        self.nodes.insert(id, IRNode { id, op, inputs });
        Ok(id)
    }

    /// Get a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&IRNode> {
        self.nodes.get(&id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> &BTreeMap<NodeId, IRNode> {
        &self.nodes
    }

    /// Update the inputs of a node
    pub fn update_node_inputs(&mut self, id: NodeId, new_inputs: Vec<NodeId>) -> Result<()> {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.inputs = new_inputs;
                Ok(())
            }
            None => Err(CodegenError::InvalidGraph(format!(
                "node {} does not exist",
                id
            ))),
        }
    }

    /// Replace the operation of a node, dropping its inputs if it becomes a leaf
    pub fn replace_op(&mut self, id: NodeId, op: Operation) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| CodegenError::InvalidGraph(format!("node {} does not exist", id)))?;
        if op.arity() == 0 {
            node.inputs.clear();
        } else if op.arity() != node.inputs.len() {
            return Err(CodegenError::InvalidGraph(format!(
                "cannot replace {} with {}",
                node.op, op
            )));
        }
        node.op = op;
        Ok(())
    }

    /// Remove nodes that no output depends on
    ///
    /// Returns the number of nodes removed.
    pub fn remove_dead_nodes(&mut self) -> usize {
        let mut live = HashMap::new();
        let mut stack: Vec<NodeId> = self.outputs.clone();
        stack.extend(self.inputs.iter().copied());
        while let Some(id) = stack.pop() {
            if live.insert(id, ()).is_some() {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.inputs.iter().copied());
            }
        }
        let before = self.nodes.len();
        self.nodes.retain(|id, _| live.contains_key(id));
        before - self.nodes.len()
    }

    /// Mark a node as an input
    pub fn add_input(&mut self, id: NodeId) -> Result<()> {
        match self.nodes.get(&id) {
            Some(IRNode {
                op: Operation::Input { .. },
                ..
            }) => {}
            _ => {
                return Err(CodegenError::InvalidGraph(format!(
                    "node {} is not an input placeholder",
                    id
                )))
            }
        }
        if !self.inputs.contains(&id) {
            self.inputs.push(id);
        }
        Ok(())
    }

    /// Mark a node as an output
    pub fn add_output(&mut self, id: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(CodegenError::InvalidGraph(format!(
                "node {} does not exist",
                id
            )));
        }
        if !self.outputs.contains(&id) {
            self.outputs.push(id);
        }
        Ok(())
    }

    /// Get input nodes
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Get output nodes
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    /// Names of the input placeholders, in parameter order
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter_map(|id| match self.nodes.get(id).map(|n| &n.op) {
                Some(Operation::Input { name }) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Check structural consistency
    ///
    /// Graphs built through `GraphBuilder` are always valid; graphs that come
    /// out of a decoder are checked before they are executed or compiled.
    pub fn validate(&self) -> Result<()> {
        for (id, node) in &self.nodes {
            if *id != node.id {
                return Err(CodegenError::InvalidGraph(format!(
                    "node stored under {} claims id {}",
                    id, node.id
                )));
            }
            if node.inputs.len() != node.op.arity() {
                return Err(CodegenError::InvalidGraph(format!(
                    "node {} ({}) has {} input(s)",
                    id,
                    node.op,
                    node.inputs.len()
                )));
            }
            for input in &node.inputs {
                if !self.nodes.contains_key(input) {
                    return Err(CodegenError::InvalidGraph(format!(
                        "node {} reads missing node {}",
                        id, input
                    )));
                }
            }
        }
        for id in &self.inputs {
            match self.nodes.get(id) {
                Some(IRNode {
                    op: Operation::Input { .. },
                    ..
                }) => {}
                _ => {
                    return Err(CodegenError::InvalidGraph(format!(
                        "input {} is not an input placeholder",
                        id
                    )))
                }
            }
        }
        for id in &self.outputs {
            if !self.nodes.contains_key(id) {
                return Err(CodegenError::InvalidGraph(format!(
                    "output {} does not exist",
                    id
                )));
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Get topologically sorted node IDs
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut visited = HashMap::new();
        let mut order = Vec::new();

        // BTreeMap keys are already sorted, so results are deterministic
        for &node_id in self.nodes.keys() {
            self.dfs_topo(node_id, &mut visited, &mut order)?;
        }

        // Nodes are pushed after their dependencies, so no reverse is needed
        Ok(order)
    }

    fn dfs_topo(
        &self,
        node_id: NodeId,
        visited: &mut HashMap<NodeId, bool>,
        order: &mut Vec<NodeId>,
    ) -> Result<()> {
        if let Some(&in_progress) = visited.get(&node_id) {
            if in_progress {
                return Err(CodegenError::Cycle);
            }
            return Ok(()); // Already visited
        }

        visited.insert(node_id, true);

        if let Some(node) = self.nodes.get(&node_id) {
            for &input_id in &node.inputs {
                self.dfs_topo(input_id, visited, order)?;
            }
        }

        visited.insert(node_id, false);
        order.push(node_id);
        Ok(())
    }
}

impl Default for IRGraph {
    fn default() -> Self {
        Self::new()
    }
}
