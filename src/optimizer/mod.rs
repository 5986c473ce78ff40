// Optimizer Module: IR optimization passes

pub mod cse;
pub mod fold;
pub mod pass;

// Re-exports
pub use cse::CSEPass;
pub use fold::ConstantFoldPass;
pub use pass::{OptimizationPass, PassManager};
