// Kernel Cache: Cache compiled kernels to avoid recompilation
//
// Cache key is a SHA-256 digest of the IR graph structure: every node in
// topological order with its operation, parameters and inputs, followed by
// the parameter and result lists.

use crate::compiler::backend::CompiledFunction;
use crate::ir::{IRGraph, Operation};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Cache key for compiled kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Hash of the IR graph structure
    ir_hash: [u8; 32],
}

impl CacheKey {
    /// Create a cache key from an IR graph
    pub fn from_graph(graph: &IRGraph) -> Self {
        Self {
            ir_hash: Self::hash_graph(graph),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.ir_hash
    }

    /// Lowercase hex form, used in log lines
    pub fn hex(&self) -> String {
        self.ir_hash.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn hash_graph(graph: &IRGraph) -> [u8; 32] {
        let mut hasher = Sha256::new();

        // Hash nodes in topological order for consistency
        if let Ok(topo_order) = graph.topological_order() {
            for node_id in topo_order {
                let Some(node) = graph.get_node(node_id) else {
                    continue;
                };
                hasher.update(node.id.to_le_bytes());

                // Operation parameters are part of the key: tanh and sigmoid
                // over the same inputs must not share a kernel
                match &node.op {
                    Operation::Input { name } => {
                        hasher.update(b"input");
                        hasher.update((name.len() as u64).to_le_bytes());
                        hasher.update(name.as_bytes());
                    }
                    Operation::Output => hasher.update(b"output"),
                    Operation::Constant(v) => {
                        hasher.update(b"const");
                        hasher.update(v.to_bits().to_le_bytes());
                    }
                    Operation::Unary(op) => {
                        hasher.update(b"unary");
                        hasher.update(op.to_string().as_bytes());
                    }
                    Operation::Binary(op) => {
                        hasher.update(b"binary");
                        hasher.update(op.to_string().as_bytes());
                    }
                }

                // Hash input dependencies
                hasher.update((node.inputs.len() as u64).to_le_bytes());
                for input in &node.inputs {
                    hasher.update(input.to_le_bytes());
                }
            }
        }

        // Parameter and result order decide the kernel's calling convention
        hasher.update(b"params");
        for id in graph.inputs() {
            hasher.update(id.to_le_bytes());
        }
        hasher.update(b"results");
        for id in graph.outputs() {
            hasher.update(id.to_le_bytes());
        }

        hasher.finalize().into()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to tell kernels apart in logs
        write!(f, "{}", &self.hex()[..12])
    }
}

/// Compiled kernel with metadata
#[derive(Clone)]
pub struct CachedKernel {
    /// The compiled function
    pub function: Arc<CompiledFunction>,
    /// Number of times this kernel has been used
    pub use_count: usize,
    /// Approximate size in bytes (for LRU eviction)
    pub size_bytes: usize,
}

/// Kernel cache with LRU eviction
pub struct KernelCache {
    /// Map from cache key to compiled kernel
    cache: Mutex<HashMap<CacheKey, CachedKernel>>,
    /// Maximum cache size in bytes
    max_size_bytes: usize,
    /// Current cache size in bytes
    current_size: Mutex<usize>,
}

impl KernelCache {
    /// Create a new kernel cache
    ///
    /// # Arguments
    /// * `max_size_mb` - Maximum cache size in megabytes
    pub fn new(max_size_mb: usize) -> Self {
        Self::with_capacity_bytes(max_size_mb * 1024 * 1024)
    }

    pub fn with_capacity_bytes(max_size_bytes: usize) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            max_size_bytes,
            current_size: Mutex::new(0),
        }
    }

    /// Try to get a compiled kernel from the cache
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CompiledFunction>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(kernel) = cache.get_mut(key) {
            // Update use count for LRU
            kernel.use_count += 1;
            Some(kernel.function.clone())
        } else {
            None
        }
    }

    /// Insert a compiled kernel into the cache
    pub fn insert(
        &self,
        key: CacheKey,
        function: CompiledFunction,
        size_bytes: usize,
    ) -> Arc<CompiledFunction> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut current_size = self
            .current_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = cache.remove(&key) {
            *current_size = current_size.saturating_sub(previous.size_bytes);
        }

        // Evict if necessary
        while *current_size + size_bytes > self.max_size_bytes && !cache.is_empty() {
            self.evict_lru(&mut cache, &mut current_size);
        }

        let function = Arc::new(function);
        let kernel = CachedKernel {
            function: function.clone(),
            use_count: 1,
            size_bytes,
        };

        cache.insert(key, kernel);
        *current_size += size_bytes;
        function
    }

    fn evict_lru(&self, cache: &mut HashMap<CacheKey, CachedKernel>, current_size: &mut usize) {
        // Find entry with lowest use count
        if let Some((key_to_remove, size_to_remove)) = cache
            .iter()
            .min_by_key(|(_, kernel)| kernel.use_count)
            .map(|(k, kernel)| (*k, kernel.size_bytes))
        {
            log::trace!("Evicting kernel {} ({} bytes)", key_to_remove, size_to_remove);
            cache.remove(&key_to_remove);
            *current_size = current_size.saturating_sub(size_to_remove);
        }
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut current_size = self
            .current_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache.clear();
        *current_size = 0;
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let current_size = *self
            .current_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        CacheStats {
            num_entries: cache.len(),
            size_bytes: current_size,
            max_size_bytes: self.max_size_bytes,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub num_entries: usize,
    pub size_bytes: usize,
    pub max_size_bytes: usize,
}

impl Default for KernelCache {
    fn default() -> Self {
        // Default to 100 MB cache
        Self::new(100)
    }
}
