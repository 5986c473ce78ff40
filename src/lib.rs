// graphgen: generated compute units that survive serialization
//
// Small element-wise programs are built as IR graphs, optionally optimized,
// and installed into a host either symbolically (interpreted) or compiled to
// native code with Cranelift. Compiled code cannot be serialized, so hosts
// snapshot each unit as a tagged record and rebuild it on restore.
//
// Architecture:
// - ir: graph IR, builder and reference interpreter
// - optimizer: constant folding and CSE passes
// - compiler: Cranelift backend, kernel cache, IR archive, compiler service
// - codegen: generated units, the unit manager and the host module
// - config: process-wide optimization defaults

pub mod core;
pub mod config;

// JIT compilation infrastructure
pub mod ir;
pub mod optimizer;
pub mod compiler;

pub mod codegen;

// Re-export commonly used items for convenience
pub use codegen::{
    BaseStateProvider, CompiledUnit, EncodedUnit, GeneratedUnit, GeneratedUnitManager, Module,
    StateBlob, SymbolicUnit, UnitEncoding, VersionStamp,
};
pub use compiler::{shared_compiler, CompilerService, JitCompiler};
pub use config::{optimization_defaults, JitMode, OptimizationDefaults};
pub use crate::core::{CodegenError, Result};
