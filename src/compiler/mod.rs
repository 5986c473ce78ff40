// Compiler Module: JIT compilation infrastructure

pub mod archive;
pub mod backend;
pub mod cache;
pub mod cranelift_backend;
pub mod service;

// Re-exports
pub use backend::{Backend, CompiledFunction};
pub use cache::{CacheKey, CacheStats, CachedKernel, KernelCache};
pub use cranelift_backend::CraneliftBackend;
pub use service::{shared_compiler, CompilerService, JitCompiler};
