// Cranelift Backend: JIT compilation using Cranelift
//
// Lowers an element-wise IR graph into a single native loop:
//
//   for i in 0..len {
//       <every node, in topological order, on element i>
//       outputs[k][i] = <output k>
//   }

use crate::compiler::backend::{Backend, CompiledFunction};
use crate::core::error::{CodegenError, Result};
use crate::ir::{BinaryOpKind, IRGraph, NodeId, Operation, UnaryOpKind};
use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use std::collections::HashMap;

/// Size of an f64 element and of a pointer slot on 64-bit targets
const ELEM_BYTES: i64 = 8;

// Helpers for operations Cranelift has no instruction for.
// Registered as JIT symbols and called from generated code.
extern "C" fn graphgen_exp(x: f64) -> f64 {
    x.exp()
}

extern "C" fn graphgen_log(x: f64) -> f64 {
    x.ln()
}

extern "C" fn graphgen_tanh(x: f64) -> f64 {
    x.tanh()
}

extern "C" fn graphgen_sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Symbol name and address of the helper implementing a unary op, if any
fn helper_symbol(op: UnaryOpKind) -> Option<(&'static str, *const u8)> {
    match op {
        UnaryOpKind::Exp => Some(("graphgen_exp", graphgen_exp as *const u8)),
        UnaryOpKind::Log => Some(("graphgen_log", graphgen_log as *const u8)),
        UnaryOpKind::Tanh => Some(("graphgen_tanh", graphgen_tanh as *const u8)),
        UnaryOpKind::Sigmoid => Some(("graphgen_sigmoid", graphgen_sigmoid as *const u8)),
        _ => None,
    }
}

const HELPER_OPS: [UnaryOpKind; 4] = [
    UnaryOpKind::Exp,
    UnaryOpKind::Log,
    UnaryOpKind::Tanh,
    UnaryOpKind::Sigmoid,
];

fn jit_error(context: &str, err: impl std::fmt::Display) -> CodegenError {
    CodegenError::Compile(format!("{}: {}", context, err))
}

/// Cranelift JIT backend
pub struct CraneliftBackend;

impl CraneliftBackend {
    /// Create a new Cranelift backend
    pub fn new() -> Self {
        Self
    }

    /// Fresh JIT module with the transcendental helpers registered
    fn make_module(&self) -> Result<JITModule> {
        let mut builder = JITBuilder::new(cranelift_module::default_libcall_names())
            .map_err(|e| jit_error("creating JIT builder", e))?;
        for op in HELPER_OPS {
            if let Some((name, addr)) = helper_symbol(op) {
                builder.symbol(name, addr);
            }
        }
        Ok(JITModule::new(builder))
    }

    /// Generate a native kernel for an IR graph
    /// Function signature: (inputs: *const *const f64, outputs: *const *mut f64, len: i64)
    fn generate_kernel(&self, graph: &IRGraph) -> Result<CompiledFunction> {
        graph.validate()?;
        let topo_order = graph.topological_order()?;
        log::trace!("Graph has {} nodes in topological order", topo_order.len());

        let input_slots: HashMap<NodeId, usize> = graph
            .inputs()
            .iter()
            .enumerate()
            .map(|(slot, &id)| (id, slot))
            .collect();

        // Create JIT module
        log::debug!("Creating Cranelift JIT module");
        let mut module = self.make_module()?;

        // Declare helpers once per module
        let mut unary_sig = module.make_signature();
        unary_sig.params.push(AbiParam::new(types::F64));
        unary_sig.returns.push(AbiParam::new(types::F64));
        let mut helper_ids: HashMap<UnaryOpKind, FuncId> = HashMap::new();
        for op in HELPER_OPS {
            if let Some((name, _)) = helper_symbol(op) {
                let id = module
                    .declare_function(name, Linkage::Import, &unary_sig)
                    .map_err(|e| jit_error("declaring helper", e))?;
                helper_ids.insert(op, id);
            }
        }

        // Create function context
        let mut ctx = module.make_context();
        let mut func_ctx = FunctionBuilderContext::new();

        let ptr_type = module.target_config().pointer_type();
        ctx.func.signature.params.push(AbiParam::new(ptr_type)); // inputs
        ctx.func.signature.params.push(AbiParam::new(ptr_type)); // outputs
        ctx.func.signature.params.push(AbiParam::new(types::I64)); // len
        log::trace!("Function signature: void kernel(ptr, ptr, i64)");

        let mut builder_fn = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);

        let mut helper_refs = HashMap::new();
        for (op, id) in &helper_ids {
            let func_ref = module.declare_func_in_func(*id, builder_fn.func);
            helper_refs.insert(*op, func_ref);
        }

        // Create blocks
        let entry_block = builder_fn.create_block();
        let loop_header = builder_fn.create_block();
        let loop_body = builder_fn.create_block();
        let loop_exit = builder_fn.create_block();

        builder_fn.append_block_params_for_function_params(entry_block);
        builder_fn.switch_to_block(entry_block);

        let inputs_arg = builder_fn.block_params(entry_block)[0];
        let outputs_arg = builder_fn.block_params(entry_block)[1];
        let len = builder_fn.block_params(entry_block)[2];

        // Load the base pointer of every input and output vector once
        let input_bases: Vec<Value> = (0..graph.inputs().len())
            .map(|slot| {
                builder_fn.ins().load(
                    ptr_type,
                    MemFlags::trusted(),
                    inputs_arg,
                    (slot as i64 * ELEM_BYTES) as i32,
                )
            })
            .collect();
        let output_bases: Vec<Value> = (0..graph.outputs().len())
            .map(|slot| {
                builder_fn.ins().load(
                    ptr_type,
                    MemFlags::trusted(),
                    outputs_arg,
                    (slot as i64 * ELEM_BYTES) as i32,
                )
            })
            .collect();

        let zero = builder_fn.ins().iconst(types::I64, 0);
        builder_fn.ins().jump(loop_header, &[zero]);

        // Loop header: while i < len
        builder_fn.switch_to_block(loop_header);
        builder_fn.append_block_param(loop_header, types::I64); // i
        let i = builder_fn.block_params(loop_header)[0];
        let cmp = builder_fn.ins().icmp(IntCC::SignedLessThan, i, len);
        builder_fn.ins().brif(cmp, loop_body, &[], loop_exit, &[]);

        // Loop body: evaluate every node on element i
        builder_fn.switch_to_block(loop_body);
        let offset = builder_fn.ins().imul_imm(i, ELEM_BYTES);

        let mut values: HashMap<NodeId, Value> = HashMap::new();
        for node_id in &topo_order {
            let Some(node) = graph.get_node(*node_id) else {
                continue;
            };
            let operand = |k: usize| -> Result<Value> {
                node.inputs
                    .get(k)
                    .and_then(|id| values.get(id))
                    .copied()
                    .ok_or_else(|| {
                        CodegenError::InvalidGraph(format!("operand of node {} not lowered", node.id))
                    })
            };
            let value = match &node.op {
                Operation::Input { name } => {
                    let slot = *input_slots.get(node_id).ok_or_else(|| {
                        CodegenError::InvalidGraph(format!("input '{}' is not a parameter", name))
                    })?;
                    let addr = builder_fn.ins().iadd(input_bases[slot], offset);
                    builder_fn.ins().load(types::F64, MemFlags::trusted(), addr, 0)
                }
                Operation::Constant(v) => builder_fn.ins().f64const(*v),
                Operation::Output => operand(0)?,
                Operation::Unary(op) => {
                    let x = operand(0)?;
                    match helper_refs.get(op) {
                        Some(func_ref) => {
                            let call = builder_fn.ins().call(*func_ref, &[x]);
                            builder_fn.inst_results(call)[0]
                        }
                        None => self.emit_unary_op(&mut builder_fn, *op, x)?,
                    }
                }
                Operation::Binary(op) => {
                    let lhs = operand(0)?;
                    let rhs = operand(1)?;
                    self.emit_binary_op(&mut builder_fn, *op, lhs, rhs)
                }
            };
            values.insert(*node_id, value);
        }

        // Store results: outputs[k][i] = value
        for (slot, output_id) in graph.outputs().iter().enumerate() {
            let value = *values.get(output_id).ok_or_else(|| {
                CodegenError::InvalidGraph(format!("output {} not lowered", output_id))
            })?;
            let addr = builder_fn.ins().iadd(output_bases[slot], offset);
            builder_fn.ins().store(MemFlags::trusted(), value, addr, 0);
        }

        let i_next = builder_fn.ins().iadd_imm(i, 1);
        builder_fn.ins().jump(loop_header, &[i_next]);

        builder_fn.switch_to_block(loop_exit);
        builder_fn.ins().return_(&[]);

        builder_fn.seal_all_blocks();
        builder_fn.finalize();
        log::trace!("Cranelift IR construction complete");

        // Define function in module
        log::debug!("Declaring and defining kernel in JIT module");
        let id = module
            .declare_function("graphgen_kernel", Linkage::Export, &ctx.func.signature)
            .map_err(|e| jit_error("declaring kernel", e))?;
        module
            .define_function(id, &mut ctx)
            .map_err(|e| jit_error("defining kernel", e))?;
        let code_size = ctx
            .compiled_code()
            .map(|code| code.code_buffer().len())
            .unwrap_or(0);
        module.clear_context(&mut ctx);

        module
            .finalize_definitions()
            .map_err(|e| jit_error("finalizing kernel", e))?;
        let code_ptr = module.get_finalized_function(id);
        log::debug!(
            "Native kernel generated at {:p} ({} bytes)",
            code_ptr,
            code_size
        );

        // Dropping the module does not release JIT memory, so `code_ptr`
        // stays valid for the life of the process.
        Ok(CompiledFunction::with_kernel(
            code_ptr,
            graph.inputs().len(),
            graph.outputs().len(),
            code_size,
        ))
    }

    /// Emit Cranelift IR for a unary operation that maps to an instruction
    fn emit_unary_op(
        &self,
        builder: &mut FunctionBuilder,
        op: UnaryOpKind,
        x: Value,
    ) -> Result<Value> {
        let value = match op {
            UnaryOpKind::Neg => builder.ins().fneg(x),
            UnaryOpKind::Abs => builder.ins().fabs(x),
            UnaryOpKind::Sqrt => builder.ins().sqrt(x),
            UnaryOpKind::Floor => builder.ins().floor(x),
            UnaryOpKind::Ceil => builder.ins().ceil(x),
            UnaryOpKind::Relu => {
                // select(x > 0, x, 0) so that NaN maps to 0 like f64::max
                let zero = builder.ins().f64const(0.0);
                let positive = builder.ins().fcmp(FloatCC::GreaterThan, x, zero);
                builder.ins().select(positive, x, zero)
            }
            UnaryOpKind::Exp | UnaryOpKind::Log | UnaryOpKind::Tanh | UnaryOpKind::Sigmoid => {
                return Err(CodegenError::UnsupportedOperation(format!(
                    "{} requires a helper call",
                    op
                )))
            }
        };
        Ok(value)
    }

    /// Emit Cranelift IR for a binary operation
    ///
    /// Min/Max go through compare+select to match `f64::min`/`f64::max`
    /// on NaN operands (the non-NaN operand wins).
    fn emit_binary_op(
        &self,
        builder: &mut FunctionBuilder,
        op: BinaryOpKind,
        lhs: Value,
        rhs: Value,
    ) -> Value {
        match op {
            BinaryOpKind::Add => builder.ins().fadd(lhs, rhs),
            BinaryOpKind::Sub => builder.ins().fsub(lhs, rhs),
            BinaryOpKind::Mul => builder.ins().fmul(lhs, rhs),
            BinaryOpKind::Div => builder.ins().fdiv(lhs, rhs),
            BinaryOpKind::Min => {
                // lhs < rhs || rhs is NaN ? lhs : rhs
                let lt = builder.ins().fcmp(FloatCC::LessThan, lhs, rhs);
                let rhs_nan = builder.ins().fcmp(FloatCC::Unordered, rhs, rhs);
                let pick_lhs = builder.ins().bor(lt, rhs_nan);
                builder.ins().select(pick_lhs, lhs, rhs)
            }
            BinaryOpKind::Max => {
                let gt = builder.ins().fcmp(FloatCC::GreaterThan, lhs, rhs);
                let rhs_nan = builder.ins().fcmp(FloatCC::Unordered, rhs, rhs);
                let pick_lhs = builder.ins().bor(gt, rhs_nan);
                builder.ins().select(pick_lhs, lhs, rhs)
            }
        }
    }
}

impl Backend for CraneliftBackend {
    fn compile(&self, graph: &IRGraph) -> Result<CompiledFunction> {
        log::debug!("Cranelift backend compiling IR graph");
        let result = self.generate_kernel(graph)?;
        log::debug!("Cranelift compilation complete");
        Ok(result)
    }

    fn name(&self) -> &str {
        "cranelift"
    }
}

impl Default for CraneliftBackend {
    fn default() -> Self {
        Self::new()
    }
}
