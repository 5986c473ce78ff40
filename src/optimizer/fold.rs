// Constant Folding Pass
//
// Evaluates operations whose inputs are all constants at compile time and
// replaces them with a single Constant node.

use crate::core::error::Result;
use crate::ir::{IRGraph, NodeId, Operation};
use crate::optimizer::pass::OptimizationPass;

/// Constant folding pass
pub struct ConstantFoldPass;

impl ConstantFoldPass {
    pub fn new() -> Self {
        Self
    }

    fn constant_of(graph: &IRGraph, id: NodeId) -> Option<f64> {
        match graph.get_node(id).map(|n| &n.op) {
            Some(Operation::Constant(v)) => Some(*v),
            _ => None,
        }
    }

    /// Folded value for a node, if every input is constant
    fn fold(graph: &IRGraph, id: NodeId) -> Option<f64> {
        let node = graph.get_node(id)?;
        match &node.op {
            Operation::Unary(op) => {
                let x = Self::constant_of(graph, *node.inputs.first()?)?;
                Some(op.apply(x))
            }
            Operation::Binary(op) => {
                let a = Self::constant_of(graph, *node.inputs.first()?)?;
                let b = Self::constant_of(graph, *node.inputs.get(1)?)?;
                Some(op.apply(a, b))
            }
            _ => None,
        }
    }
}

impl OptimizationPass for ConstantFoldPass {
    fn run(&mut self, graph: &mut IRGraph) -> Result<bool> {
        let mut changed = false;

        // Topological order lets folded results feed later folds
        for node_id in graph.topological_order()? {
            if let Some(value) = Self::fold(graph, node_id) {
                log::trace!("Folding node {} to constant {}", node_id, value);
                graph.replace_op(node_id, Operation::Constant(value))?;
                changed = true;
            }
        }

        Ok(changed)
    }

    fn name(&self) -> &str {
        "constant_fold"
    }
}

impl Default for ConstantFoldPass {
    fn default() -> Self {
        Self::new()
    }
}
