// Snapshot/Restore Integration Tests
//
// Registers generated units in both modes, then checks that deep copies and
// restored hosts behave exactly like the original.

use graphgen::codegen::{ChildState, Component, FieldValue};
use graphgen::ir::{templates, UnaryOpKind};
use graphgen::{
    CodegenError, CompiledUnit, CompilerService, JitMode, Module, OptimizationDefaults,
    StateBlob, SymbolicUnit, UnitEncoding,
};
use indexmap::IndexMap;
use std::sync::Arc;

const X: [f64; 6] = [-3.0, -1.0, -0.25, 0.0, 0.5, 2.0];
const GATE: [f64; 6] = [1.0, -2.0, 0.5, 3.0, -0.5, 0.0];

fn defaults(mode: JitMode) -> OptimizationDefaults {
    OptimizationDefaults::default().with_jit_mode(mode)
}

fn gate_units(names: &[&str]) -> IndexMap<String, SymbolicUnit> {
    names
        .iter()
        .map(|name| {
            let graph = templates::gate(UnaryOpKind::Tanh).unwrap();
            (name.to_string(), SymbolicUnit::new(graph))
        })
        .collect()
}

fn gated_module(mode: JitMode) -> Module {
    let mut module = Module::new();
    module.insert_buffer("weights", vec![0.1, 0.2, 0.3]).unwrap();
    module.set_field("irreps", FieldValue::Text("16x0o+32x0o".to_string()));
    module
        .register_units_with(gate_units(&["gate_fn"]), &defaults(mode))
        .unwrap();
    module
}

fn assert_close(a: &[Vec<f64>], b: &[Vec<f64>]) {
    assert_eq!(a.len(), b.len());
    for (va, vb) in a.iter().zip(b) {
        assert_eq!(va.len(), vb.len());
        for (x, y) in va.iter().zip(vb) {
            assert!((x - y).abs() < 1e-12, "{} vs {}", x, y);
        }
    }
}

#[test]
fn test_mode_decides_child_form() {
    let symbolic = gated_module(JitMode::None);
    let compiled = gated_module(JitMode::Script);

    assert_eq!(symbolic.unit_kind("gate_fn").unwrap(), "symbolic");
    assert_eq!(compiled.unit_kind("gate_fn").unwrap(), "compiled");

    let a = symbolic.forward("gate_fn", &[&X, &GATE]).unwrap();
    let b = compiled.forward("gate_fn", &[&X, &GATE]).unwrap();
    assert_close(&a, &b);
}

#[test]
fn test_deep_copy_roundtrip_both_modes() {
    for mode in [JitMode::None, JitMode::Script] {
        let original = gated_module(mode);
        let copy = original.try_clone().unwrap();

        assert_eq!(copy.registry(), original.registry());
        assert_eq!(
            copy.child_names().collect::<Vec<_>>(),
            original.child_names().collect::<Vec<_>>()
        );
        assert_eq!(copy.unit_kind("gate_fn").unwrap(), original.unit_kind("gate_fn").unwrap());
        assert_eq!(copy.fields(), original.fields());

        let expected = original.forward("gate_fn", &[&X, &GATE]).unwrap();
        let actual = copy.forward("gate_fn", &[&X, &GATE]).unwrap();
        assert_close(&actual, &expected);
    }
}

#[test]
fn test_snapshot_holds_only_records() {
    let module = gated_module(JitMode::Script);
    let blob = module.snapshot().unwrap();

    // Managed units never appear among the generic children
    assert!(!blob.children.contains_key("gate_fn"));
    assert_eq!(blob.children["weights"], ChildState::Buffer(vec![0.1, 0.2, 0.3]));

    let records = blob.encoded_units.as_ref().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records["gate_fn"].encoding().unwrap(), UnitEncoding::Compiled);
    assert!(!records["gate_fn"].bytes.is_empty());

    // The whole blob goes through the generic serializer
    let bytes = blob.to_bytes().unwrap();
    assert_eq!(StateBlob::from_bytes(&bytes).unwrap(), blob);

    // And the record decodes on its own
    let unit = module.compiler().decode_ir(&records["gate_fn"].bytes).unwrap();
    assert_close(
        &unit.call(&[&X, &GATE]).unwrap(),
        &module.forward("gate_fn", &[&X, &GATE]).unwrap(),
    );
}

#[test]
fn test_symbolic_records_use_generic_codec() {
    let module = gated_module(JitMode::None);
    let blob = module.snapshot().unwrap();
    let records = blob.encoded_units.unwrap();

    let record = &records["gate_fn"];
    assert_eq!(record.kind, "symbolic");
    match graphgen::codegen::decode_object(&record.bytes).unwrap() {
        ChildState::Symbolic(unit) => {
            assert_eq!(unit.graph(), &templates::gate(UnaryOpKind::Tanh).unwrap())
        }
        other => panic!("unexpected child {:?}", other),
    }
}

#[test]
fn test_reregistration_is_idempotent() {
    let mut module = gated_module(JitMode::None);
    module
        .register_units_with(gate_units(&["gate_fn"]), &defaults(JitMode::Script))
        .unwrap();

    assert_eq!(module.registry(), ["gate_fn"]);
    assert_eq!(module.unit_kind("gate_fn").unwrap(), "compiled");

    let copy = module.try_clone().unwrap();
    assert_eq!(copy.registry(), ["gate_fn"]);
}

#[test]
fn test_name_collision_rejected() {
    let mut module = gated_module(JitMode::None);
    let err = module
        .register_units_with(gate_units(&["weights"]), &defaults(JitMode::None))
        .unwrap_err();
    assert!(matches!(err, CodegenError::ChildNameCollision(name) if name == "weights"));
    assert!(matches!(module.child("weights"), Some(Component::Buffer(_))));
    assert_eq!(module.registry(), ["gate_fn"]);
}

#[test]
fn test_order_preserved() {
    let mut module = Module::new();
    module
        .register_units_with(gate_units(&["a", "b", "c"]), &defaults(JitMode::None))
        .unwrap();

    let blob = module.snapshot().unwrap();
    let stored: Vec<_> = blob.encoded_units.as_ref().unwrap().keys().cloned().collect();
    assert_eq!(stored, ["a", "b", "c"]);

    let restored = Module::from_snapshot(blob, None, module.compiler().clone()).unwrap();
    assert_eq!(restored.registry(), ["a", "b", "c"]);
}

#[test]
fn test_optimized_units_stay_symbolic() {
    let mut module = Module::new();
    let defaults = defaults(JitMode::None).with_optimize_graphs(true);
    let mut units = IndexMap::new();
    units.insert(
        "norm".to_string(),
        SymbolicUnit::new(templates::normalized_activation(UnaryOpKind::Sigmoid, 1.8).unwrap()),
    );
    module.register_units_with(units, &defaults).unwrap();

    match module.unit("norm").unwrap() {
        graphgen::GeneratedUnit::Symbolic(unit) => assert!(unit.is_optimized()),
        other => panic!("expected symbolic unit, got {}", other.kind()),
    }

    let blob = module.snapshot().unwrap();
    assert_eq!(blob.encoded_units.as_ref().unwrap()["norm"].kind, "symbolic");

    let copy = module.try_clone().unwrap();
    assert_close(
        &copy.forward("norm", &[&X]).unwrap(),
        &module.forward("norm", &[&X]).unwrap(),
    );
}

#[test]
fn test_unmanaged_symbolic_child_is_kept() {
    let mut module = gated_module(JitMode::None);
    let blob = module.snapshot().unwrap();

    // A symbolic child that arrives through the generic state is not managed
    let mut with_extra = blob.clone();
    with_extra.children.insert(
        "extra".to_string(),
        ChildState::Symbolic(SymbolicUnit::new(templates::affine(1.0, 1.0).unwrap())),
    );
    module.restore(with_extra).unwrap();

    assert_eq!(module.registry(), ["gate_fn"]);
    assert_eq!(module.unit_kind("extra").unwrap(), "symbolic");
    assert!(module.try_clone().unwrap().child("extra").is_some());
}

struct FailingCompiler;

impl CompilerService for FailingCompiler {
    fn compile(&self, _unit: &SymbolicUnit) -> graphgen::Result<CompiledUnit> {
        Err(CodegenError::Compile("backend unavailable".to_string()))
    }

    fn encode_ir(&self, _unit: &CompiledUnit) -> graphgen::Result<Vec<u8>> {
        Err(CodegenError::Encode("backend unavailable".to_string()))
    }

    fn decode_ir(&self, _bytes: &[u8]) -> graphgen::Result<CompiledUnit> {
        Err(CodegenError::Compile("backend unavailable".to_string()))
    }
}

#[test]
fn test_compile_failure_leaves_host_unchanged() {
    let mut module = Module::new().with_compiler(Arc::new(FailingCompiler));
    module.insert_buffer("weights", vec![1.0]).unwrap();

    let err = module
        .register_units_with(gate_units(&["f", "g"]), &defaults(JitMode::Script))
        .unwrap_err();
    assert!(matches!(err, CodegenError::Compile(_)));
    assert!(module.registry().is_empty());
    assert_eq!(module.child_names().collect::<Vec<_>>(), ["weights"]);

    // Symbolic mode never calls the compiler
    module
        .register_units_with(gate_units(&["f"]), &defaults(JitMode::None))
        .unwrap();
    assert!(module.try_clone().is_ok());
}

#[test]
fn test_restore_keeps_child_interleaving() {
    for mode in [JitMode::None, JitMode::Script] {
        let mut module = Module::new();
        module
            .register_units_with(gate_units(&["a"]), &defaults(mode))
            .unwrap();
        module.insert_buffer("w", vec![1.0]).unwrap();
        module
            .register_units_with(gate_units(&["b"]), &defaults(mode))
            .unwrap();
        assert_eq!(module.child_names().collect::<Vec<_>>(), ["a", "w", "b"]);

        let copy = module.try_clone().unwrap();
        assert_eq!(copy.child_names().collect::<Vec<_>>(), ["a", "w", "b"]);
        assert_eq!(copy.registry(), ["a", "b"]);

        let bytes = module.snapshot().unwrap().to_bytes().unwrap();
        let mut reloaded = Module::new();
        reloaded.restore(StateBlob::from_bytes(&bytes).unwrap()).unwrap();
        assert_eq!(reloaded.child_names().collect::<Vec<_>>(), ["a", "w", "b"]);
    }
}
