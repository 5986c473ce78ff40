// Host Module
//
// A container of named children and plain fields that owns generated units
// through a GeneratedUnitManager. Deep copy and persistence both go through
// snapshot/restore, so compiled children survive them.

use crate::codegen::manager::GeneratedUnitManager;
use crate::codegen::state::{ChildState, FieldValue, StateBlob};
use crate::codegen::unit::{GeneratedUnit, SymbolicUnit};
use crate::compiler::{shared_compiler, CompilerService};
use crate::config::{optimization_defaults, OptimizationDefaults};
use crate::core::error::{CodegenError, Result};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;

/// Child of a host
#[derive(Debug, Clone)]
pub enum Component {
    /// Plain data such as weights
    Buffer(Vec<f64>),
    Unit(GeneratedUnit),
}

impl From<ChildState> for Component {
    fn from(child: ChildState) -> Self {
        match child {
            ChildState::Buffer(data) => Component::Buffer(data),
            ChildState::Symbolic(unit) => Component::Unit(GeneratedUnit::Symbolic(unit)),
        }
    }
}

/// Live state of a host: ordered children plus opaque fields
#[derive(Debug, Clone, Default)]
pub struct HostState {
    pub fields: IndexMap<String, FieldValue>,
    pub children: IndexMap<String, Component>,
}

/// Hooks a host uses to produce and apply its base state
///
/// Without a provider the manager copies the live state on snapshot and
/// assigns the restored state directly.
pub trait BaseStateProvider: Send + Sync {
    /// Base snapshot of the live state
    fn base_state(&self, live: &HostState) -> Result<HostState>;

    /// Install a restored base state into `target`
    fn apply_base_state(&mut self, target: &mut HostState, state: HostState) -> Result<()>;

    fn boxed_clone(&self) -> Box<dyn BaseStateProvider>;
}

/// Stamps a format version into every snapshot and checks it on restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStamp {
    version: i64,
}

impl VersionStamp {
    pub const FIELD: &'static str = "format_version";

    pub fn new(version: i64) -> Self {
        Self { version }
    }

    pub fn version(&self) -> i64 {
        self.version
    }
}

impl BaseStateProvider for VersionStamp {
    fn base_state(&self, live: &HostState) -> Result<HostState> {
        let mut state = live.clone();
        state
            .fields
            .insert(Self::FIELD.to_string(), FieldValue::Int(self.version));
        Ok(state)
    }

    fn apply_base_state(&mut self, target: &mut HostState, mut state: HostState) -> Result<()> {
        match state.fields.shift_remove(Self::FIELD) {
            Some(FieldValue::Int(v)) if v == self.version => {}
            Some(other) => {
                return Err(CodegenError::BaseState(format!(
                    "expected {} {}, found {:?}",
                    Self::FIELD,
                    self.version,
                    other
                )))
            }
            None => {
                return Err(CodegenError::BaseState(format!(
                    "snapshot has no {}",
                    Self::FIELD
                )))
            }
        }
        *target = state;
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn BaseStateProvider> {
        Box::new(*self)
    }
}

/// Host object owning generated units
pub struct Module {
    state: HostState,
    manager: GeneratedUnitManager,
    base: Option<Box<dyn BaseStateProvider>>,
    compiler: Arc<dyn CompilerService>,
}

impl Module {
    /// Empty module using the process-wide compiler
    pub fn new() -> Self {
        Self {
            state: HostState::default(),
            manager: GeneratedUnitManager::new(),
            base: None,
            compiler: shared_compiler(),
        }
    }

    pub fn with_base_state(provider: Box<dyn BaseStateProvider>) -> Self {
        Self {
            base: Some(provider),
            ..Self::new()
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn CompilerService>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn compiler(&self) -> &Arc<dyn CompilerService> {
        &self.compiler
    }

    /// Register units under the process-wide optimization defaults
    pub fn register_units(&mut self, units: IndexMap<String, SymbolicUnit>) -> Result<()> {
        self.register_units_with(units, optimization_defaults())
    }

    pub fn register_units_with(
        &mut self,
        units: IndexMap<String, SymbolicUnit>,
        defaults: &OptimizationDefaults,
    ) -> Result<()> {
        self.manager.register(
            &mut self.state.children,
            units,
            defaults,
            self.compiler.as_ref(),
        )
    }

    pub fn snapshot(&self) -> Result<StateBlob> {
        self.manager
            .snapshot(&self.state, self.base.as_deref(), self.compiler.as_ref())
    }

    pub fn restore(&mut self, blob: StateBlob) -> Result<()> {
        self.manager.restore(
            &mut self.state,
            blob,
            self.base.as_deref_mut(),
            self.compiler.as_ref(),
        )
    }

    /// Fresh module rebuilt from a snapshot
    pub fn from_snapshot(
        blob: StateBlob,
        base: Option<Box<dyn BaseStateProvider>>,
        compiler: Arc<dyn CompilerService>,
    ) -> Result<Self> {
        let mut module = Self {
            state: HostState::default(),
            manager: GeneratedUnitManager::new(),
            base,
            compiler,
        };
        module.restore(blob)?;
        Ok(module)
    }

    /// Deep copy through snapshot and restore
    ///
    /// The copy shares the compiler handle and nothing else.
    pub fn try_clone(&self) -> Result<Self> {
        let blob = self.snapshot()?;
        Self::from_snapshot(
            blob,
            self.base.as_ref().map(|b| b.boxed_clone()),
            self.compiler.clone(),
        )
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.snapshot()?.save(path)
    }

    pub fn load(
        path: impl AsRef<Path>,
        base: Option<Box<dyn BaseStateProvider>>,
        compiler: Arc<dyn CompilerService>,
    ) -> Result<Self> {
        Self::from_snapshot(StateBlob::load(path)?, base, compiler)
    }

    /// Run a unit child on equal-length inputs
    pub fn forward(&self, name: &str, inputs: &[&[f64]]) -> Result<Vec<Vec<f64>>> {
        self.unit(name)?.call(inputs)
    }

    /// Managed unit names, in registration order
    pub fn registry(&self) -> &[String] {
        self.manager.registry()
    }

    pub fn unit(&self, name: &str) -> Result<&GeneratedUnit> {
        match self.state.children.get(name) {
            Some(Component::Unit(unit)) => Ok(unit),
            Some(Component::Buffer(_)) => Err(CodegenError::NotAUnit(name.to_string())),
            None => Err(CodegenError::UnknownChild(name.to_string())),
        }
    }

    /// Form of a unit child: "symbolic" or "compiled"
    pub fn unit_kind(&self, name: &str) -> Result<&'static str> {
        Ok(self.unit(name)?.kind())
    }

    pub fn child(&self, name: &str) -> Option<&Component> {
        self.state.children.get(name)
    }

    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.state.children.keys().map(String::as_str)
    }

    /// Add or replace a plain data child; managed names are refused
    pub fn insert_buffer(&mut self, name: impl Into<String>, data: Vec<f64>) -> Result<()> {
        let name = name.into();
        if self.manager.is_managed(&name) {
            return Err(CodegenError::ChildNameCollision(name));
        }
        self.state.children.insert(name, Component::Buffer(data));
        Ok(())
    }

    /// Remove a child, unregistering it if it was managed
    pub fn remove_child(&mut self, name: &str) -> Option<Component> {
        let removed = self.state.children.shift_remove(name);
        if removed.is_some() && self.manager.forget(name) {
            log::debug!("Unregistered generated unit '{}'", name);
        }
        removed
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.state.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.state.fields.insert(name.into(), value);
    }

    pub fn fields(&self) -> &IndexMap<String, FieldValue> {
        &self.state.fields
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JitMode;
    use crate::ir::{templates, UnaryOpKind};

    fn one_unit(name: &str) -> IndexMap<String, SymbolicUnit> {
        let mut units = IndexMap::new();
        units.insert(
            name.to_string(),
            SymbolicUnit::new(templates::activation(UnaryOpKind::Relu).unwrap()),
        );
        units
    }

    #[test]
    fn test_unit_lookup_errors() {
        let mut module = Module::new();
        module.insert_buffer("w", vec![1.0, 2.0]).unwrap();
        assert!(matches!(module.unit("w"), Err(CodegenError::NotAUnit(_))));
        assert!(matches!(module.unit("nope"), Err(CodegenError::UnknownChild(_))));
    }

    #[test]
    fn test_buffer_cannot_shadow_managed_unit() {
        let mut module = Module::new();
        let defaults = OptimizationDefaults::default().with_jit_mode(JitMode::None);
        module.register_units_with(one_unit("f"), &defaults).unwrap();
        assert!(module.insert_buffer("f", vec![]).is_err());

        assert!(module.remove_child("f").is_some());
        assert!(module.registry().is_empty());
        module.insert_buffer("f", vec![0.5]).unwrap();
    }

    #[test]
    fn test_version_stamp() {
        let stamp = VersionStamp::new(3);
        let stamped = stamp.base_state(&HostState::default()).unwrap();
        assert_eq!(stamped.fields[VersionStamp::FIELD], FieldValue::Int(3));

        let mut target = HostState::default();
        let mut reader = VersionStamp::new(3);
        reader.apply_base_state(&mut target, stamped.clone()).unwrap();
        assert!(target.fields.is_empty());

        let mut newer = VersionStamp::new(4);
        assert!(matches!(
            newer.apply_base_state(&mut target, stamped),
            Err(CodegenError::BaseState(_))
        ));
        assert!(newer
            .apply_base_state(&mut target, HostState::default())
            .is_err());
    }
}
