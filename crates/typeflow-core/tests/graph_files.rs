//! Loading function graphs from JSON and running the pass over them

use typeflow_core::{GraphSpec, InferTypes, RoundOutcome, RoundPhase, TypeflowError};

const STACK_FRAME: &str = include_str!("fixtures/stack_frame.json");

fn load() -> typeflow_core::LoadedFunction {
    GraphSpec::from_json_str(STACK_FRAME).unwrap().build().unwrap()
}

#[test]
fn test_fixture_settles() {
    let mut loaded = load();
    let infer = InferTypes::default();
    let mut rounds = 0;
    while let RoundOutcome::Changed { round } = infer.apply(&mut loaded.types, &mut loaded.fd) {
        rounds = round;
    }

    assert!(rounds >= 1);
    assert_eq!(loaded.fd.type_recovery().phase(), RoundPhase::Converged);
    assert_eq!(loaded.type_name("sp"), Some("stackbase *"));
    assert_eq!(loaded.type_name("v"), Some("int4"));
    assert_eq!(loaded.type_name("p"), Some("int4 *"));
    assert_eq!(loaded.type_name("slot"), Some("int4"));
    assert_eq!(loaded.type_name("result"), Some("int4"));
    assert_eq!(loaded.type_name("flag"), Some("bool1"));
    assert_eq!(loaded.type_name("scale"), Some("float4"));
    assert_eq!(loaded.type_name("scale_copy"), Some("float4"));
}

#[test]
fn test_fixture_from_file() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/stack_frame.json");
    let spec = GraphSpec::from_file(&path).unwrap();
    assert_eq!(spec.name, "read_frame");
    let loaded = spec.build().unwrap();
    assert_eq!(loaded.names.len(), 11);
    assert_eq!(loaded.name_of(loaded.value("p").unwrap()), Some("p"));
}

#[test]
fn test_missing_stack_space_is_reported() {
    let content = STACK_FRAME.replace("\"stack_space\": \"stack\"", "\"stack_space\": \"frame\"");
    let err = GraphSpec::from_json_str(&content).unwrap().build().unwrap_err();
    assert!(matches!(err, TypeflowError::UnknownSpace(name) if name == "frame"));
}

#[test]
fn test_malformed_json_is_reported() {
    let err = GraphSpec::from_json_str("{ \"name\": ").unwrap_err();
    assert!(matches!(err, TypeflowError::Json(_)));
}

const FLAG_MERGE: &str = r#"{
    "name": "flag_merge",
    "spaces": [
        { "name": "register", "kind": "processor" },
        { "name": "stack", "kind": "stack" }
    ],
    "stack_space": "stack",
    "varnodes": [
        { "name": "x", "space": "register", "offset": 0, "size": 1, "input": true, "nz_mask": 1 },
        { "name": "a", "space": "register", "offset": 8, "size": 4, "input": true },
        { "name": "b", "space": "register", "offset": 16, "size": 4, "input": true },
        { "name": "cmp", "space": "register", "offset": 24, "size": 1 },
        { "name": "m", "space": "register", "offset": 32, "size": 1 }
    ],
    "ops": [
        { "opcode": "INT_EQUAL", "addr": 4096, "inputs": ["a", "b"], "output": "cmp" },
        { "opcode": "MULTIEQUAL", "addr": 4100, "inputs": ["x", "cmp"], "output": "m" }
    ],
    "heritage": { "stack": 1 }
}"#;

fn settle(loaded: &mut typeflow_core::LoadedFunction) {
    let infer = InferTypes::default();
    while let RoundOutcome::Changed { .. } = infer.apply(&mut loaded.types, &mut loaded.fd) {}
}

#[test]
fn test_given_input_mask_reaches_derived_values() {
    let mut loaded = GraphSpec::from_json_str(FLAG_MERGE).unwrap().build().unwrap();
    let m = loaded.value("m").unwrap();
    assert_eq!(loaded.fd.varnode(m).nz_mask(), 1);

    settle(&mut loaded);
    assert_eq!(loaded.type_name("cmp"), Some("bool1"));
    assert_eq!(loaded.type_name("m"), Some("bool1"));
    assert_eq!(loaded.type_name("x"), Some("bool1"));
}

#[test]
fn test_wide_input_mask_keeps_merge_untyped() {
    let content = FLAG_MERGE.replace(", \"nz_mask\": 1", "");
    let mut loaded = GraphSpec::from_json_str(&content).unwrap().build().unwrap();
    let m = loaded.value("m").unwrap();
    assert_eq!(loaded.fd.varnode(m).nz_mask(), 0xff);

    settle(&mut loaded);
    assert_eq!(loaded.type_name("cmp"), Some("bool1"));
    assert_eq!(loaded.type_name("m"), Some("undefined1"));
}

#[test]
fn test_given_mask_on_written_value_overrides() {
    let content = FLAG_MERGE.replace(
        "\"offset\": 32, \"size\": 1 }",
        "\"offset\": 32, \"size\": 1, \"nz_mask\": 3 }",
    );
    let loaded = GraphSpec::from_json_str(&content).unwrap().build().unwrap();
    let m = loaded.value("m").unwrap();
    assert_eq!(loaded.fd.varnode(m).nz_mask(), 3);
}

#[test]
fn test_oversized_array_is_an_error() {
    let content = FLAG_MERGE.replace(
        "\"input\": true, \"nz_mask\": 1",
        "\"input\": true, \"type\": \"int4[2000000000] *\"",
    );
    let err = GraphSpec::from_json_str(&content).unwrap().build().unwrap_err();
    assert!(matches!(err, TypeflowError::InvalidType { .. }));
}
