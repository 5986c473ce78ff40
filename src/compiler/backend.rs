// Compiler Backend Abstraction
//
// Trait for different JIT backends, and the executable handle they return

use crate::core::error::{CodegenError, Result};
use crate::ir::IRGraph;

/// Native kernel signature
/// Arguments: (input base pointers, output base pointers, element count)
pub(crate) type ElementwiseKernel = unsafe extern "C" fn(*const *const f64, *const *mut f64, i64);

/// Thread-safe wrapper for function pointer
/// SAFETY: JIT-compiled kernels are stateless and safe to call from any thread
#[derive(Clone, Copy)]
struct KernelPtr(*const u8);

unsafe impl Send for KernelPtr {}
unsafe impl Sync for KernelPtr {}

/// Compiled function that can be executed
#[derive(Clone)]
pub struct CompiledFunction {
    /// Function pointer to compiled kernel
    kernel_ptr: KernelPtr,
    /// Number of input vectors the kernel reads
    num_inputs: usize,
    /// Number of output vectors the kernel writes
    num_outputs: usize,
    /// Approximate size of the emitted code in bytes
    code_size: usize,
}

impl CompiledFunction {
    /// Create compiled function with kernel pointer
    ///
    /// `kernel_ptr` must point to finalized code with the `ElementwiseKernel`
    /// signature that reads exactly `num_inputs` and writes `num_outputs` vectors.
    pub(crate) fn with_kernel(
        kernel_ptr: *const u8,
        num_inputs: usize,
        num_outputs: usize,
        code_size: usize,
    ) -> Self {
        Self {
            kernel_ptr: KernelPtr(kernel_ptr),
            num_inputs,
            num_outputs,
            code_size,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn code_size(&self) -> usize {
        self.code_size
    }

    /// Execute the compiled function
    ///
    /// # Arguments
    /// * `inputs` - One slice per graph input, all of the same length
    ///
    /// # Returns
    /// One vector per graph output. Graphs without inputs produce
    /// single-element outputs.
    pub fn execute(&self, inputs: &[&[f64]]) -> Result<Vec<Vec<f64>>> {
        if inputs.len() != self.num_inputs {
            return Err(CodegenError::InvalidGraph(format!(
                "kernel takes {} input(s), {} given",
                self.num_inputs,
                inputs.len()
            )));
        }

        let len = match inputs.first() {
            Some(first) => first.len(),
            None => 1,
        };
        if let Some(bad) = inputs.iter().find(|input| input.len() != len) {
            return Err(CodegenError::LengthMismatch {
                expected: len,
                found: bad.len(),
            });
        }

        let mut outputs = vec![vec![0.0f64; len]; self.num_outputs];
        let input_ptrs: Vec<*const f64> = inputs.iter().map(|input| input.as_ptr()).collect();
        let output_ptrs: Vec<*mut f64> = outputs.iter_mut().map(|out| out.as_mut_ptr()).collect();

        // SAFETY: every pointer covers `len` elements, the pointer arrays match
        // the arity the kernel was compiled for, and the outputs do not alias
        // the inputs.
        unsafe {
            let kernel_fn: ElementwiseKernel = std::mem::transmute(self.kernel_ptr.0);
            kernel_fn(input_ptrs.as_ptr(), output_ptrs.as_ptr(), len as i64);
        }

        Ok(outputs)
    }
}

/// JIT backend trait
pub trait Backend: Send + Sync {
    /// Compile an IR graph to executable code
    fn compile(&self, graph: &IRGraph) -> Result<CompiledFunction>;

    /// Get backend name
    fn name(&self) -> &str;
}
