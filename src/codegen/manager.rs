// Generated Unit Manager
//
// Owns the registry of managed unit names for one host and implements the
// three operations that keep those units alive across serialization:
//
//   register  install symbolic units, compiling them under script mode
//   snapshot  replace each managed unit by an encoded-unit record
//   restore   decode the records and reinstall the units

use crate::codegen::codec::{decode_object, encode_object};
use crate::codegen::host::{BaseStateProvider, Component, HostState};
use crate::codegen::state::{ChildState, EncodedUnit, StateBlob, UnitEncoding};
use crate::codegen::unit::{GeneratedUnit, SymbolicUnit};
use crate::compiler::CompilerService;
use crate::config::{JitMode, OptimizationDefaults};
use crate::core::error::{CodegenError, Result};
use crate::optimizer::PassManager;
use indexmap::IndexMap;

/// Registry of the generated units a host manages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedUnitManager {
    /// Managed child names, in registration order, no duplicates
    registry: Vec<String>,
}

impl GeneratedUnitManager {
    pub fn new() -> Self {
        Self {
            registry: Vec::new(),
        }
    }

    pub fn registry(&self) -> &[String] {
        &self.registry
    }

    pub fn is_managed(&self, name: &str) -> bool {
        self.registry.iter().any(|n| n == name)
    }

    /// Drop a name from the registry; the child itself is left alone
    pub(crate) fn forget(&mut self, name: &str) -> bool {
        let before = self.registry.len();
        self.registry.retain(|n| n != name);
        self.registry.len() != before
    }

    /// Install `units` as children of `children`
    ///
    /// Under `JitMode::Script` each unit is compiled first; under
    /// `JitMode::None` it is installed symbolically. Every unit is prepared
    /// before any child is touched, so a failure leaves the host unchanged.
    /// Re-registering a managed name replaces the unit in place.
    pub fn register(
        &mut self,
        children: &mut IndexMap<String, Component>,
        units: IndexMap<String, SymbolicUnit>,
        defaults: &OptimizationDefaults,
        compiler: &dyn CompilerService,
    ) -> Result<()> {
        for name in units.keys() {
            if children.contains_key(name) && !self.is_managed(name) {
                return Err(CodegenError::ChildNameCollision(name.clone()));
            }
        }

        // Symbolic units are installed as-is, so check them up front
        for (name, unit) in &units {
            unit.graph().validate().map_err(|e| {
                CodegenError::InvalidGraph(format!("unit '{}': {}", name, e))
            })?;
        }

        let mut passes = defaults.optimize_graphs.then(PassManager::standard);
        let mut prepared = Vec::with_capacity(units.len());
        for (name, unit) in units {
            let unit = match passes.as_mut() {
                Some(passes) => unit.optimized(passes)?,
                None => unit,
            };
            let generated = match defaults.jit_mode {
                JitMode::Script => {
                    log::debug!("Compiling generated unit '{}'", name);
                    GeneratedUnit::Compiled(compiler.compile(&unit)?)
                }
                JitMode::None => GeneratedUnit::Symbolic(unit),
            };
            prepared.push((name, generated));
        }

        for (name, unit) in prepared {
            log::debug!("Installing {} unit '{}'", unit.kind(), name);
            if !self.is_managed(&name) {
                self.registry.push(name.clone());
            }
            children.insert(name, Component::Unit(unit));
        }
        Ok(())
    }

    /// Serializable snapshot of `state`
    ///
    /// The base snapshot comes from `base` when the host has one, otherwise
    /// it is a copy of `state`. Managed units are moved out of the copied
    /// children into `encoded_units`, in registry order.
    pub fn snapshot(
        &self,
        state: &HostState,
        base: Option<&dyn BaseStateProvider>,
        compiler: &dyn CompilerService,
    ) -> Result<StateBlob> {
        let mut out = match base {
            Some(provider) => provider.base_state(state)?,
            None => state.clone(),
        };
        let child_order: Vec<String> = out.children.keys().cloned().collect();

        let mut encoded_units = IndexMap::with_capacity(self.registry.len());
        for name in &self.registry {
            let unit = match out.children.shift_remove(name) {
                Some(Component::Unit(unit)) => unit,
                Some(Component::Buffer(_)) => {
                    return Err(CodegenError::InvariantViolation(format!(
                        "managed name '{}' refers to a buffer",
                        name
                    )))
                }
                None => {
                    return Err(CodegenError::InvariantViolation(format!(
                        "managed name '{}' has no child",
                        name
                    )))
                }
            };

            let record = match unit {
                GeneratedUnit::Symbolic(unit) => EncodedUnit::new(
                    UnitEncoding::Symbolic,
                    encode_object(&ChildState::Symbolic(unit))?,
                ),
                GeneratedUnit::Compiled(unit) => {
                    EncodedUnit::new(UnitEncoding::Compiled, compiler.encode_ir(&unit)?)
                }
            };
            log::trace!(
                "Encoded unit '{}' as {} ({} bytes)",
                name,
                record.kind,
                record.bytes.len()
            );
            encoded_units.insert(name.clone(), record);
        }

        let mut children = IndexMap::with_capacity(out.children.len());
        for (name, child) in out.children {
            let child = match child {
                Component::Buffer(data) => ChildState::Buffer(data),
                Component::Unit(GeneratedUnit::Symbolic(unit)) => ChildState::Symbolic(unit),
                Component::Unit(GeneratedUnit::Compiled(_)) => {
                    return Err(CodegenError::UnmanagedCompiledChild(name))
                }
            };
            children.insert(name, child);
        }

        log::debug!(
            "Snapshot: {} field(s), {} child(ren), {} managed unit(s)",
            out.fields.len(),
            children.len(),
            encoded_units.len()
        );
        Ok(StateBlob {
            fields: out.fields,
            children,
            encoded_units: Some(encoded_units),
            child_order,
        })
    }

    /// Rebuild `state` from a snapshot
    ///
    /// Every record is decoded before the host is touched. The base state is
    /// then applied (through `base` when present), the decoded units are
    /// installed, and the registry becomes the restored names in stored
    /// order.
    pub fn restore(
        &mut self,
        state: &mut HostState,
        mut blob: StateBlob,
        base: Option<&mut (dyn BaseStateProvider + '_)>,
        compiler: &dyn CompilerService,
    ) -> Result<()> {
        let records = blob.encoded_units.take().unwrap_or_default();
        let child_order = std::mem::take(&mut blob.child_order);

        if let Some(name) = records.keys().find(|name| blob.children.contains_key(*name)) {
            return Err(CodegenError::ChildNameCollision(name.clone()));
        }

        let mut units = IndexMap::with_capacity(records.len());
        for (name, record) in records {
            let unit = match record.encoding()? {
                UnitEncoding::Symbolic => match decode_object(&record.bytes)? {
                    ChildState::Symbolic(unit) => {
                        unit.graph().validate().map_err(|e| {
                            CodegenError::Decode(format!("symbolic unit '{}': {}", name, e))
                        })?;
                        GeneratedUnit::Symbolic(unit)
                    }
                    ChildState::Buffer(_) => {
                        return Err(CodegenError::DecodedTypeMismatch {
                            name,
                            expected: UnitEncoding::Symbolic.tag(),
                        })
                    }
                },
                UnitEncoding::Compiled => GeneratedUnit::Compiled(compiler.decode_ir(&record.bytes)?),
            };
            log::trace!("Decoded {} unit '{}'", unit.kind(), name);
            units.insert(name, unit);
        }

        let restored = HostState {
            fields: blob.fields,
            children: blob
                .children
                .into_iter()
                .map(|(name, child)| (name, Component::from(child)))
                .collect(),
        };
        match base {
            Some(provider) => provider.apply_base_state(state, restored)?,
            None => *state = restored,
        }

        let mut registry = Vec::with_capacity(units.len());
        for (name, unit) in units {
            state.children.insert(name.clone(), Component::Unit(unit));
            registry.push(name);
        }
        if !child_order.is_empty() {
            restore_child_order(&mut state.children, &child_order);
        }
        log::debug!("Restored {} managed unit(s)", registry.len());
        self.registry = registry;
        Ok(())
    }
}

/// Reorder `children` to follow `order`; names not in `order` keep their
/// relative order at the end
fn restore_child_order(children: &mut IndexMap<String, Component>, order: &[String]) {
    let mut rest = std::mem::take(children);
    let mut ordered = IndexMap::with_capacity(rest.len());
    for name in order {
        if let Some(child) = rest.shift_remove(name) {
            ordered.insert(name.clone(), child);
        }
    }
    ordered.extend(rest);
    *children = ordered;
}
