// Common Subexpression Elimination Pass
//
// Identifies and eliminates redundant computations by finding nodes
// with identical operations and inputs.
//
// Two nodes are equivalent if:
// - They have the same operation type
// - They have the same inputs (in the same order)
// - They have the same operation parameters (constant value, op kind)

use crate::core::error::Result;
use crate::ir::{IRGraph, IRNode, NodeId, Operation};
use crate::optimizer::pass::OptimizationPass;
use std::collections::HashMap;

/// Common subexpression elimination pass
pub struct CSEPass;

impl CSEPass {
    /// Create a new CSE pass
    pub fn new() -> Self {
        Self
    }

    /// Check if two operations are semantically equivalent
    fn operations_equal(&self, op1: &Operation, op2: &Operation) -> bool {
        use Operation::*;

        match (op1, op2) {
            // Input/Output nodes are never equivalent (they are the interface)
            (Input { .. }, _) | (_, Input { .. }) => false,
            (Output, _) | (_, Output) => false,

            // Bitwise comparison so that 0.0 and -0.0 stay distinct
            (Constant(a), Constant(b)) => a.to_bits() == b.to_bits(),

            (Unary(op1), Unary(op2)) => op1 == op2,
            (Binary(op1), Binary(op2)) => op1 == op2,

            // Different operation types are never equal
            _ => false,
        }
    }

    /// Check if two nodes are equivalent
    fn nodes_equivalent(&self, node1: &IRNode, node2: &IRNode) -> bool {
        // Must have same inputs in same order
        if node1.inputs != node2.inputs {
            return false;
        }

        self.operations_equal(&node1.op, &node2.op)
    }

    /// Find groups of equivalent nodes
    fn find_equivalence_classes(&self, graph: &IRGraph) -> HashMap<NodeId, NodeId> {
        let mut canonical_map = HashMap::new();
        let topo_order = graph.topological_order().unwrap_or_default();

        // For each node, find if there's an earlier equivalent node
        for (i, &node_id) in topo_order.iter().enumerate() {
            let Some(node) = graph.get_node(node_id) else {
                continue;
            };
            // Skip nodes that shouldn't be eliminated
            if matches!(node.op, Operation::Input { .. } | Operation::Output) {
                continue;
            }

            // Inputs may already have been remapped to a canonical node
            let mut temp_node = node.clone();
            temp_node.inputs = node
                .inputs
                .iter()
                .map(|&input| canonical_map.get(&input).copied().unwrap_or(input))
                .collect();

            let found_canonical = topo_order
                .iter()
                .take(i)
                .filter(|earlier| !canonical_map.contains_key(*earlier))
                .find(|&&earlier_id| {
                    graph
                        .get_node(earlier_id)
                        .is_some_and(|earlier| self.nodes_equivalent(earlier, &temp_node))
                })
                .copied();

            // Map this node to its canonical representative
            if let Some(canonical_id) = found_canonical {
                canonical_map.insert(node_id, canonical_id);
            }
        }

        canonical_map
    }
}

impl OptimizationPass for CSEPass {
    fn run(&mut self, graph: &mut IRGraph) -> Result<bool> {
        let canonical_map = self.find_equivalence_classes(graph);

        if canonical_map.is_empty() {
            return Ok(false);
        }

        // Rewire all uses of redundant nodes to canonical nodes
        let node_ids: Vec<NodeId> = graph.nodes().keys().copied().collect();

        for node_id in node_ids {
            let Some(node) = graph.get_node(node_id) else {
                continue;
            };

            let new_inputs: Vec<NodeId> = node
                .inputs
                .iter()
                .map(|&input_id| canonical_map.get(&input_id).copied().unwrap_or(input_id))
                .collect();

            if new_inputs != node.inputs {
                graph.update_node_inputs(node_id, new_inputs)?;
            }
        }

        Ok(true)
    }

    fn name(&self) -> &str {
        "cse"
    }
}

impl Default for CSEPass {
    fn default() -> Self {
        Self::new()
    }
}
