// IR Builder: Public API for composing computation graphs
//
// Provides a fluent interface for building IR graphs

use crate::core::error::{CodegenError, Result};
use crate::ir::graph::IRGraph;
use crate::ir::node::{BinaryOpKind, NodeId, Operation, UnaryOpKind};
use std::collections::HashMap;

/// Builder for constructing IR graphs
pub struct GraphBuilder {
    graph: IRGraph,
    /// Map from user-provided names to node IDs
    named_nodes: HashMap<String, NodeId>,
}

impl GraphBuilder {
    /// Create a new graph builder
    pub fn new() -> Self {
        Self {
            graph: IRGraph::new(),
            named_nodes: HashMap::new(),
        }
    }

    /// Add an input vector placeholder
    ///
    /// Inputs become kernel parameters in the order they are declared.
    pub fn input(&mut self, name: impl Into<String>) -> Result<NodeId> {
        let name = name.into();

        if self.named_nodes.contains_key(&name) {
            return Err(CodegenError::InvalidGraph(format!(
                "input '{}' declared twice",
                name
            )));
        }

        let node_id = self.graph.add_node(Operation::Input { name: name.clone() }, vec![])?;

        self.graph.add_input(node_id)?;
        self.named_nodes.insert(name, node_id);
        Ok(node_id)
    }

    /// Constant broadcast over every element
    pub fn constant(&mut self, value: f64) -> Result<NodeId> {
        self.graph.add_node(Operation::Constant(value), vec![])
    }

    /// Apply unary operator
    pub fn apply(&mut self, a: NodeId, unary_op: UnaryOpKind) -> Result<NodeId> {
        self.graph.add_node(Operation::Unary(unary_op), vec![a])
    }

    /// Apply binary operator
    pub fn binary(&mut self, a: NodeId, b: NodeId, binary_op: BinaryOpKind) -> Result<NodeId> {
        self.graph.add_node(Operation::Binary(binary_op), vec![a, b])
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.binary(a, b, BinaryOpKind::Add)
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.binary(a, b, BinaryOpKind::Mul)
    }

    /// Multiply by a constant factor
    pub fn scale(&mut self, a: NodeId, factor: f64) -> Result<NodeId> {
        let c = self.constant(factor)?;
        self.mul(a, c)
    }

    /// Mark a node as an output
    pub fn output(&mut self, node: NodeId) -> Result<NodeId> {
        let output_id = self.graph.add_node(Operation::Output, vec![node])?;
        self.graph.add_output(output_id)?;
        Ok(output_id)
    }

    /// Get the underlying IR graph
    pub fn graph(&self) -> &IRGraph {
        &self.graph
    }

    /// Consume the builder and return the graph
    pub fn build(self) -> IRGraph {
        self.graph
    }

    /// Get an input node by name
    pub fn get_by_name(&self, name: &str) -> Option<NodeId> {
        self.named_nodes.get(name).copied()
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Helpers for generating common element-wise functions
pub mod templates {
    use super::*;

    /// `y = act(x)`
    pub fn activation(act: UnaryOpKind) -> Result<IRGraph> {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x")?;
        let y = builder.apply(x, act)?;
        builder.output(y)?;
        Ok(builder.build())
    }

    /// `y = x * scale + shift`
    pub fn affine(scale: f64, shift: f64) -> Result<IRGraph> {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x")?;
        let scaled = builder.scale(x, scale)?;
        let c = builder.constant(shift)?;
        let y = builder.add(scaled, c)?;
        builder.output(y)?;
        Ok(builder.build())
    }

    /// Gated non-linearity: `y = x * act(gate)`
    pub fn gate(act: UnaryOpKind) -> Result<IRGraph> {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x")?;
        let gate = builder.input("gate")?;
        let g = builder.apply(gate, act)?;
        let y = builder.mul(x, g)?;
        builder.output(y)?;
        Ok(builder.build())
    }

    /// Normalized activation: `y = act(x) * norm`
    ///
    /// `norm` rescales the activation to unit second moment under a
    /// standard normal input.
    pub fn normalized_activation(act: UnaryOpKind, norm: f64) -> Result<IRGraph> {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x")?;
        let a = builder.apply(x, act)?;
        let y = builder.scale(a, norm)?;
        builder.output(y)?;
        Ok(builder.build())
    }
}
