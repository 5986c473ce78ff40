// Optimization Pass Infrastructure

use crate::core::error::Result;
use crate::ir::IRGraph;
use crate::optimizer::cse::CSEPass;
use crate::optimizer::fold::ConstantFoldPass;

/// Optimization pass trait
pub trait OptimizationPass {
    /// Run the pass on a graph
    /// Returns true if the graph was modified
    fn run(&mut self, graph: &mut IRGraph) -> Result<bool>;

    /// Get pass name
    fn name(&self) -> &str;
}

/// Pass manager for running multiple passes
pub struct PassManager {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Standard pipeline applied to generated units before installation
    pub fn standard() -> Self {
        let mut manager = Self::new();
        manager.add_pass(Box::new(ConstantFoldPass::new()));
        manager.add_pass(Box::new(CSEPass::new()));
        manager
    }

    pub fn add_pass(&mut self, pass: Box<dyn OptimizationPass>) {
        self.passes.push(pass);
    }

    /// Run every pass once, then drop nodes no output depends on
    ///
    /// Returns the names of the passes that ran, in order.
    pub fn run_all(&mut self, graph: &mut IRGraph) -> Result<Vec<String>> {
        let mut applied = Vec::with_capacity(self.passes.len());
        for pass in &mut self.passes {
            log::debug!("Running optimization pass: {}", pass.name());
            let changed = pass.run(graph)?;
            if changed {
                log::debug!("Pass '{}' modified the graph", pass.name());
            } else {
                log::trace!("Pass '{}' made no changes", pass.name());
            }
            applied.push(pass.name().to_string());
        }
        let removed = graph.remove_dead_nodes();
        if removed > 0 {
            log::debug!("Removed {} dead node(s)", removed);
        }
        Ok(applied)
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}
