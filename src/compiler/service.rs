// Compiler Service: symbolic unit -> compiled unit, and the IR codec
//
// The manager talks to the compiler only through `CompilerService`, so hosts
// can swap in their own compiler (or a failing one in tests).

use crate::codegen::unit::{CompiledUnit, SymbolicUnit};
use crate::compiler::archive;
use crate::compiler::backend::Backend;
use crate::compiler::cache::{CacheKey, KernelCache};
use crate::compiler::cranelift_backend::CraneliftBackend;
use crate::core::error::Result;
use crate::ir::IRGraph;
use std::sync::Arc;

/// Compiles symbolic units and persists compiled ones as IR
pub trait CompilerService: Send + Sync {
    /// Compile a symbolic unit to native code
    fn compile(&self, unit: &SymbolicUnit) -> Result<CompiledUnit>;

    /// Encode a compiled unit as a portable IR archive
    fn encode_ir(&self, unit: &CompiledUnit) -> Result<Vec<u8>>;

    /// Rebuild a compiled unit from an IR archive
    fn decode_ir(&self, bytes: &[u8]) -> Result<CompiledUnit>;
}

/// Cranelift-backed compiler with a kernel cache
pub struct JitCompiler {
    backend: Box<dyn Backend>,
    cache: KernelCache,
}

impl JitCompiler {
    pub fn new() -> Self {
        Self::with_backend(Box::new(CraneliftBackend::new()), KernelCache::default())
    }

    pub fn with_backend(backend: Box<dyn Backend>, cache: KernelCache) -> Self {
        Self { backend, cache }
    }

    pub fn cache(&self) -> &KernelCache {
        &self.cache
    }

    fn compile_graph(&self, graph: &IRGraph) -> Result<CompiledUnit> {
        graph.validate()?;
        let key = CacheKey::from_graph(graph);

        // Try to get cached kernel
        let function = if let Some(cached_fn) = self.cache.get(&key) {
            log::debug!("Kernel cache hit for {}", key);
            cached_fn
        } else {
            log::debug!("Kernel cache miss for {}, compiling with {}", key, self.backend.name());
            let compiled = self.backend.compile(graph)?;
            let size = compiled.code_size();
            self.cache.insert(key, compiled, size)
        };

        Ok(CompiledUnit::from_parts(graph.clone(), key, function))
    }
}

impl Default for JitCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerService for JitCompiler {
    fn compile(&self, unit: &SymbolicUnit) -> Result<CompiledUnit> {
        self.compile_graph(unit.graph())
    }

    fn encode_ir(&self, unit: &CompiledUnit) -> Result<Vec<u8>> {
        archive::encode_graph(unit.graph())
    }

    fn decode_ir(&self, bytes: &[u8]) -> Result<CompiledUnit> {
        let graph = archive::decode_graph(bytes)?;
        self.compile_graph(&graph)
    }
}

lazy_static::lazy_static! {
    /// Process-wide compiler, shared by every host that does not bring its own
    static ref SHARED_COMPILER: Arc<JitCompiler> = Arc::new(JitCompiler::new());
}

/// Handle to the process-wide compiler
pub fn shared_compiler() -> Arc<dyn CompilerService> {
    let compiler: Arc<JitCompiler> = SHARED_COMPILER.clone();
    compiler
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CodegenError;
    use crate::ir::{templates, UnaryOpKind};

    #[test]
    fn test_compile_matches_symbolic() {
        let compiler = JitCompiler::new();
        let unit = SymbolicUnit::new(templates::gate(UnaryOpKind::Sigmoid).unwrap());
        let compiled = compiler.compile(&unit).unwrap();

        let x = [0.5, -1.0, 4.0];
        let g = [0.0, 2.0, -2.0];
        let expected = unit.call(&[&x, &g]).unwrap();
        let actual = compiled.call(&[&x, &g]).unwrap();
        for (a, b) in actual[0].iter().zip(&expected[0]) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_compile_uses_cache() {
        let compiler = JitCompiler::new();
        let unit = SymbolicUnit::new(templates::activation(UnaryOpKind::Abs).unwrap());
        compiler.compile(&unit).unwrap();
        compiler.compile(&unit).unwrap();
        assert_eq!(compiler.cache().stats().num_entries, 1);
    }

    #[test]
    fn test_ir_roundtrip_recompiles() {
        let compiler = JitCompiler::new();
        let unit = SymbolicUnit::new(templates::affine(-1.0, 4.0).unwrap());
        let compiled = compiler.compile(&unit).unwrap();

        let bytes = compiler.encode_ir(&compiled).unwrap();
        let restored = compiler.decode_ir(&bytes).unwrap();
        assert_eq!(restored.cache_key(), compiled.cache_key());
        assert_eq!(restored.call(&[&[1.0, 2.0]]).unwrap(), vec![vec![3.0, 2.0]]);
    }

    #[test]
    fn test_decode_ir_rejects_garbage() {
        let compiler = JitCompiler::new();
        assert!(matches!(
            compiler.decode_ir(b"definitely not an archive, just bytes padded out to length"),
            Err(CodegenError::Decode(_))
        ));
    }

    #[test]
    fn test_shared_compiler_is_shared() {
        let a = shared_compiler();
        let b = shared_compiler();
        assert_eq!(Arc::as_ptr(&a) as *const (), Arc::as_ptr(&b) as *const ());
    }
}
