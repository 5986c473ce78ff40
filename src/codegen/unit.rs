// Generated Units
//
// A generated unit exists in one of two forms:
//   - symbolic: an IR graph run by the interpreter, plain serde data
//   - compiled: a native kernel produced by the JIT, not serializable
//
// Every dispatch over the two forms is an exhaustive match on GeneratedUnit.

use crate::compiler::{CacheKey, CompiledFunction};
use crate::core::error::Result;
use crate::ir::{IRGraph, Interpreter};
use crate::optimizer::PassManager;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unit in symbolic form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolicUnit {
    graph: IRGraph,
    /// Optimizer passes already applied, in order
    passes: Vec<String>,
}

impl SymbolicUnit {
    pub fn new(graph: IRGraph) -> Self {
        Self {
            graph,
            passes: Vec::new(),
        }
    }

    pub fn graph(&self) -> &IRGraph {
        &self.graph
    }

    pub fn passes(&self) -> &[String] {
        &self.passes
    }

    pub fn is_optimized(&self) -> bool {
        !self.passes.is_empty()
    }

    /// Run an optimizer pipeline over a copy of the graph
    ///
    /// The result is still symbolic and encodes exactly like the input.
    pub fn optimized(&self, passes: &mut PassManager) -> Result<Self> {
        let mut graph = self.graph.clone();
        let applied = passes.run_all(&mut graph)?;
        let mut history = self.passes.clone();
        history.extend(applied);
        Ok(Self {
            graph,
            passes: history,
        })
    }

    /// Evaluate with the interpreter
    pub fn call(&self, inputs: &[&[f64]]) -> Result<Vec<Vec<f64>>> {
        let mut interp = Interpreter::new();
        interp.bind_positional(&self.graph, inputs)?;
        interp.execute(&self.graph)
    }
}

impl From<IRGraph> for SymbolicUnit {
    fn from(graph: IRGraph) -> Self {
        Self::new(graph)
    }
}

/// Unit in compiled form
///
/// Holds the graph it was built from so the compiler can archive it.
#[derive(Clone)]
pub struct CompiledUnit {
    graph: Arc<IRGraph>,
    key: CacheKey,
    function: Arc<CompiledFunction>,
}

impl CompiledUnit {
    pub(crate) fn from_parts(graph: IRGraph, key: CacheKey, function: Arc<CompiledFunction>) -> Self {
        Self {
            graph: Arc::new(graph),
            key,
            function,
        }
    }

    pub fn graph(&self) -> &IRGraph {
        &self.graph
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.key
    }

    pub fn code_size(&self) -> usize {
        self.function.code_size()
    }

    /// Run the native kernel
    pub fn call(&self, inputs: &[&[f64]]) -> Result<Vec<Vec<f64>>> {
        self.function.execute(inputs)
    }

    /// Symbolic unit over the same graph
    pub fn to_symbolic(&self) -> SymbolicUnit {
        SymbolicUnit::new((*self.graph).clone())
    }
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("key", &format_args!("{}", self.key))
            .field("inputs", &self.function.num_inputs())
            .field("outputs", &self.function.num_outputs())
            .field("code_size", &self.function.code_size())
            .finish()
    }
}

/// A generated unit in either form
#[derive(Debug, Clone)]
pub enum GeneratedUnit {
    Symbolic(SymbolicUnit),
    Compiled(CompiledUnit),
}

impl GeneratedUnit {
    /// Tag naming the form, as written to encoded-unit records
    pub fn kind(&self) -> &'static str {
        match self {
            GeneratedUnit::Symbolic(_) => "symbolic",
            GeneratedUnit::Compiled(_) => "compiled",
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, GeneratedUnit::Compiled(_))
    }

    pub fn graph(&self) -> &IRGraph {
        match self {
            GeneratedUnit::Symbolic(unit) => unit.graph(),
            GeneratedUnit::Compiled(unit) => unit.graph(),
        }
    }

    pub fn call(&self, inputs: &[&[f64]]) -> Result<Vec<Vec<f64>>> {
        match self {
            GeneratedUnit::Symbolic(unit) => unit.call(inputs),
            GeneratedUnit::Compiled(unit) => unit.call(inputs),
        }
    }
}

impl From<SymbolicUnit> for GeneratedUnit {
    fn from(unit: SymbolicUnit) -> Self {
        GeneratedUnit::Symbolic(unit)
    }
}

impl From<CompiledUnit> for GeneratedUnit {
    fn from(unit: CompiledUnit) -> Self {
        GeneratedUnit::Compiled(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{templates, GraphBuilder, UnaryOpKind};

    #[test]
    fn test_symbolic_call() {
        let unit = SymbolicUnit::new(templates::affine(2.0, 0.5).unwrap());
        let out = unit.call(&[&[1.0, 2.0]]).unwrap();
        assert_eq!(out, vec![vec![2.5, 4.5]]);
        assert!(!unit.is_optimized());
    }

    #[test]
    fn test_optimized_records_passes() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x").unwrap();
        let a = builder.apply(x, UnaryOpKind::Tanh).unwrap();
        let b = builder.apply(x, UnaryOpKind::Tanh).unwrap();
        let sum = builder.add(a, b).unwrap();
        builder.output(sum).unwrap();
        let unit = SymbolicUnit::new(builder.build());

        let optimized = unit.optimized(&mut PassManager::standard()).unwrap();
        assert!(optimized.is_optimized());
        assert_eq!(optimized.passes(), ["constant_fold", "cse"]);
        assert!(optimized.graph().nodes().len() < unit.graph().nodes().len());

        let x = [0.1, -0.4, 2.0];
        assert_eq!(unit.call(&[&x]).unwrap(), optimized.call(&[&x]).unwrap());
    }

    #[test]
    fn test_generated_unit_kind() {
        let unit: GeneratedUnit = SymbolicUnit::new(templates::activation(UnaryOpKind::Relu).unwrap()).into();
        assert_eq!(unit.kind(), "symbolic");
        assert!(!unit.is_compiled());
        assert_eq!(unit.call(&[&[-1.0, 1.0]]).unwrap(), vec![vec![0.0, 1.0]]);
    }
}
