// Persistence Tests
//
// File save/load and base-state providers.

use graphgen::codegen::FieldValue;
use graphgen::ir::{templates, UnaryOpKind};
use graphgen::{
    shared_compiler, CodegenError, JitMode, Module, OptimizationDefaults, StateBlob,
    SymbolicUnit, VersionStamp,
};
use indexmap::IndexMap;

fn units() -> IndexMap<String, SymbolicUnit> {
    let mut units = IndexMap::new();
    units.insert(
        "act".to_string(),
        SymbolicUnit::new(templates::activation(UnaryOpKind::Sigmoid).unwrap()),
    );
    units.insert(
        "shift".to_string(),
        SymbolicUnit::new(templates::affine(0.5, -2.0).unwrap()),
    );
    units
}

#[test]
fn test_save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("module.ggst");

    let mut module = Module::new();
    module.set_field("epoch", FieldValue::Int(12));
    module
        .register_units_with(units(), &OptimizationDefaults::default().with_jit_mode(JitMode::Script))
        .unwrap();
    module.save(&path).unwrap();

    let loaded = Module::load(&path, None, shared_compiler()).unwrap();
    assert_eq!(loaded.registry(), ["act", "shift"]);
    assert_eq!(loaded.unit_kind("act").unwrap(), "compiled");
    assert_eq!(loaded.field("epoch"), Some(&FieldValue::Int(12)));

    let x = [-1.0, 0.0, 1.0];
    assert_eq!(
        loaded.forward("shift", &[&x]).unwrap(),
        module.forward("shift", &[&x]).unwrap()
    );
}

#[test]
fn test_load_rejects_foreign_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), b"{\"not\": \"a blob\"}").unwrap();
    assert!(matches!(
        Module::load(file.path(), None, shared_compiler()),
        Err(CodegenError::Decode(_))
    ));
    assert!(matches!(
        StateBlob::load(file.path().join("missing")),
        Err(CodegenError::Io(_))
    ));
}

#[test]
fn test_copy_is_independent() {
    let mut module = Module::new();
    module.insert_buffer("w", vec![1.0, 2.0]).unwrap();
    module
        .register_units_with(units(), &OptimizationDefaults::default().with_jit_mode(JitMode::None))
        .unwrap();

    let mut copy = module.try_clone().unwrap();
    copy.remove_child("act");
    copy.insert_buffer("w", vec![9.0]).unwrap();

    assert_eq!(module.registry(), ["act", "shift"]);
    assert_eq!(copy.registry(), ["shift"]);
    assert!(module.unit("act").is_ok());
}

#[test]
fn test_version_stamp_roundtrip() {
    let mut module = Module::with_base_state(Box::new(VersionStamp::new(2)));
    module
        .register_units_with(units(), &OptimizationDefaults::default().with_jit_mode(JitMode::None))
        .unwrap();

    let blob = module.snapshot().unwrap();
    assert_eq!(
        blob.fields.get(VersionStamp::FIELD),
        Some(&FieldValue::Int(2))
    );

    // The stamp lives in the snapshot only
    let copy = module.try_clone().unwrap();
    assert!(copy.field(VersionStamp::FIELD).is_none());
    assert_eq!(copy.registry(), ["act", "shift"]);

    let newer = Module::from_snapshot(blob, Some(Box::new(VersionStamp::new(3))), shared_compiler());
    assert!(matches!(newer, Err(CodegenError::BaseState(_))));
}
