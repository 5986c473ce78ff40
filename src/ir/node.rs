// IR Node Types
//
// Defines all operations that can be represented in the IR.
// Every operation is element-wise over f64 vectors of a common length.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique node identifier in a computation graph
pub type NodeId = usize;

/// IR Node representing an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IRNode {
    /// Unique identifier
    pub id: NodeId,
    /// Operation kind
    pub op: Operation,
    /// Input node IDs
    pub inputs: Vec<NodeId>,
}

/// Operation types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    // ===== Input/Output Operations =====
    /// Input placeholder (for function parameters)
    Input { name: String },

    /// Output (marks a result)
    Output,

    /// Constant broadcast to every element
    Constant(f64),

    // ===== Element-wise Operations =====
    /// Apply unary operator
    Unary(UnaryOpKind),

    /// Apply binary operator
    Binary(BinaryOpKind),
}

impl Operation {
    /// Number of inputs the operation consumes
    pub fn arity(&self) -> usize {
        match self {
            Operation::Input { .. } | Operation::Constant(_) => 0,
            Operation::Output | Operation::Unary(_) => 1,
            Operation::Binary(_) => 2,
        }
    }
}

/// Binary operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

impl BinaryOpKind {
    /// Evaluate on scalars
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOpKind::Add => lhs + rhs,
            BinaryOpKind::Sub => lhs - rhs,
            BinaryOpKind::Mul => lhs * rhs,
            BinaryOpKind::Div => lhs / rhs,
            BinaryOpKind::Min => lhs.min(rhs),
            BinaryOpKind::Max => lhs.max(rhs),
        }
    }
}

/// Unary operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOpKind {
    // Arithmetic
    Neg,
    Abs,
    Sqrt,

    // Rounding
    Floor,
    Ceil,

    // Transcendental
    Exp,
    Log,
    Tanh,

    // Activations
    Sigmoid,
    Relu,
}

impl UnaryOpKind {
    /// Evaluate on a scalar
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOpKind::Neg => -x,
            UnaryOpKind::Abs => x.abs(),
            UnaryOpKind::Sqrt => x.sqrt(),
            UnaryOpKind::Floor => x.floor(),
            UnaryOpKind::Ceil => x.ceil(),
            UnaryOpKind::Exp => x.exp(),
            UnaryOpKind::Log => x.ln(),
            UnaryOpKind::Tanh => x.tanh(),
            UnaryOpKind::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOpKind::Relu => x.max(0.0),
        }
    }
}

impl fmt::Display for BinaryOpKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BinaryOpKind::Add => write!(f, "add"),
            BinaryOpKind::Sub => write!(f, "sub"),
            BinaryOpKind::Mul => write!(f, "mul"),
            BinaryOpKind::Div => write!(f, "div"),
            BinaryOpKind::Min => write!(f, "min"),
            BinaryOpKind::Max => write!(f, "max"),
        }
    }
}

impl fmt::Display for UnaryOpKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryOpKind::Neg => write!(f, "neg"),
            UnaryOpKind::Abs => write!(f, "abs"),
            UnaryOpKind::Sqrt => write!(f, "sqrt"),
            UnaryOpKind::Floor => write!(f, "floor"),
            UnaryOpKind::Ceil => write!(f, "ceil"),
            UnaryOpKind::Exp => write!(f, "exp"),
            UnaryOpKind::Log => write!(f, "log"),
            UnaryOpKind::Tanh => write!(f, "tanh"),
            UnaryOpKind::Sigmoid => write!(f, "sigmoid"),
            UnaryOpKind::Relu => write!(f, "relu"),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Input { name } => write!(f, "input({})", name),
            Operation::Output => write!(f, "output"),
            Operation::Constant(v) => write!(f, "const({})", v),
            Operation::Unary(op) => write!(f, "{}", op),
            Operation::Binary(op) => write!(f, "{}", op),
        }
    }
}
