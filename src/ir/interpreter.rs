// IR Interpreter
//
// Executes IR graphs directly, element by element. This is how symbolic
// units run, and the reference the JIT-compiled kernels are tested against.

use crate::core::error::{CodegenError, Result};
use crate::ir::graph::IRGraph;
use crate::ir::node::{NodeId, Operation};
use std::collections::HashMap;

/// Simple IR interpreter
pub struct Interpreter {
    /// Input values provided by user
    inputs: HashMap<String, Vec<f64>>,
    /// Computed values during execution
    values: HashMap<NodeId, Vec<f64>>,
}

impl Interpreter {
    /// Create a new interpreter
    pub fn new() -> Self {
        Self {
            inputs: HashMap::new(),
            values: HashMap::new(),
        }
    }

    /// Set an input value
    pub fn set_input(&mut self, name: impl Into<String>, value: Vec<f64>) {
        self.inputs.insert(name.into(), value);
    }

    /// Bind inputs by position, in the graph's parameter order
    pub fn bind_positional(&mut self, graph: &IRGraph, args: &[&[f64]]) -> Result<()> {
        let names = graph.input_names();
        if names.len() != args.len() {
            return Err(CodegenError::InvalidGraph(format!(
                "graph takes {} input(s), {} given",
                names.len(),
                args.len()
            )));
        }
        for (name, arg) in names.into_iter().zip(args) {
            self.set_input(name, arg.to_vec());
        }
        Ok(())
    }

    /// Execute the graph and return output values
    pub fn execute(&mut self, graph: &IRGraph) -> Result<Vec<Vec<f64>>> {
        let len = self.common_length(graph)?;
        self.values.clear();

        // Get topological order
        let topo_order = graph.topological_order()?;

        // Execute each node in order
        for &node_id in &topo_order {
            let Some(node) = graph.get_node(node_id) else {
                continue;
            };
            let result = match &node.op {
                Operation::Input { name } => self
                    .inputs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CodegenError::MissingInput(name.clone()))?,

                // Output nodes just pass through their input
                Operation::Output => self.operand(&node.inputs, 0)?.clone(),

                Operation::Constant(v) => vec![*v; len],

                Operation::Unary(op) => self
                    .operand(&node.inputs, 0)?
                    .iter()
                    .map(|&x| op.apply(x))
                    .collect(),

                Operation::Binary(op) => {
                    let lhs = self.operand(&node.inputs, 0)?;
                    let rhs = self.operand(&node.inputs, 1)?;
                    lhs.iter()
                        .zip(rhs.iter())
                        .map(|(&a, &b)| op.apply(a, b))
                        .collect()
                }
            };

            self.values.insert(node_id, result);
        }

        // Collect output values
        graph
            .outputs()
            .iter()
            .map(|id| {
                self.values.get(id).cloned().ok_or_else(|| {
                    CodegenError::InvalidGraph(format!("output {} was not computed", id))
                })
            })
            .collect()
    }

    /// Length shared by every bound input (1 for graphs without inputs)
    fn common_length(&self, graph: &IRGraph) -> Result<usize> {
        let mut len = None;
        for name in graph.input_names() {
            let value = self
                .inputs
                .get(name)
                .ok_or_else(|| CodegenError::MissingInput(name.to_string()))?;
            match len {
                None => len = Some(value.len()),
                Some(expected) if expected != value.len() => {
                    return Err(CodegenError::LengthMismatch {
                        expected,
                        found: value.len(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(len.unwrap_or(1))
    }

    fn operand(&self, inputs: &[NodeId], index: usize) -> Result<&Vec<f64>> {
        inputs
            .get(index)
            .and_then(|id| self.values.get(id))
            .ok_or_else(|| CodegenError::InvalidGraph("operand not computed".to_string()))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{templates, GraphBuilder};
    use crate::ir::node::{BinaryOpKind, UnaryOpKind};

    #[test]
    fn test_interpreter_binary() {
        let mut builder = GraphBuilder::new();
        let a = builder.input("a").unwrap();
        let b = builder.input("b").unwrap();
        let c = builder.binary(a, b, BinaryOpKind::Sub).unwrap();
        builder.output(c).unwrap();
        let graph = builder.build();

        let mut interp = Interpreter::new();
        interp.set_input("a", vec![5.0, 7.0]);
        interp.set_input("b", vec![1.0, 2.0]);

        let outputs = interp.execute(&graph).unwrap();
        assert_eq!(outputs, vec![vec![4.0, 5.0]]);
    }

    #[test]
    fn test_interpreter_affine() {
        let graph = templates::affine(2.0, 1.0).unwrap();

        let mut interp = Interpreter::new();
        interp.bind_positional(&graph, &[&[0.0, 1.0, -2.0]]).unwrap();

        let outputs = interp.execute(&graph).unwrap();
        assert_eq!(outputs[0], vec![1.0, 3.0, -3.0]);
    }

    #[test]
    fn test_interpreter_gate() {
        let graph = templates::gate(UnaryOpKind::Relu).unwrap();

        let mut interp = Interpreter::new();
        interp
            .bind_positional(&graph, &[&[2.0, 2.0], &[-1.0, 3.0]])
            .unwrap();

        let outputs = interp.execute(&graph).unwrap();
        assert_eq!(outputs[0], vec![0.0, 6.0]);
    }

    #[test]
    fn test_interpreter_missing_input() {
        let graph = templates::activation(UnaryOpKind::Abs).unwrap();
        let mut interp = Interpreter::new();
        assert!(matches!(
            interp.execute(&graph),
            Err(CodegenError::MissingInput(name)) if name == "x"
        ));
    }

    #[test]
    fn test_interpreter_length_mismatch() {
        let graph = templates::gate(UnaryOpKind::Tanh).unwrap();
        let mut interp = Interpreter::new();
        interp.set_input("x", vec![1.0, 2.0]);
        interp.set_input("gate", vec![1.0]);
        assert!(matches!(
            interp.execute(&graph),
            Err(CodegenError::LengthMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_interpreter_constant_only_graph() {
        let mut builder = GraphBuilder::new();
        let c = builder.constant(3.5).unwrap();
        builder.output(c).unwrap();
        let graph = builder.build();

        let outputs = Interpreter::new().execute(&graph).unwrap();
        assert_eq!(outputs, vec![vec![3.5]]);
    }
}
