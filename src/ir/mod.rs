// IR Module: Intermediate Representation for generated units

pub mod builder;
pub mod graph;
pub mod interpreter;
pub mod node;

// Re-exports
pub use builder::{templates, GraphBuilder};
pub use graph::IRGraph;
pub use interpreter::Interpreter;
pub use node::{BinaryOpKind, IRNode, NodeId, Operation, UnaryOpKind};
