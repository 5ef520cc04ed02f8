use super::*;
use crate::blocks::registry::BlockRegistry;
use crate::normalize::pass::normalize;
use crate::patch::model::PatchDef;

fn with_bindings(json: serde_json::Value, check: impl FnOnce(&PatchIR<'_>, &InputBindings, &Diagnostics)) {
    let reg = BlockRegistry::standard();
    let def: PatchDef = serde_json::from_value(json).unwrap();
    let ir = normalize(&def, &reg, 0).unwrap();
    let (bindings, diags) = bind_inputs(&ir);
    check(&ir, &bindings, &diags);
}

fn block(ir: &PatchIR<'_>, id: &str) -> BlockIdx {
    let i = ir.blocks.iter().position(|b| b.id == id).unwrap();
    BlockIdx(i as u32)
}

#[test]
fn declared_defaults_fill_unbound_inputs() {
    with_bindings(
        serde_json::json!({"blocks": [{"id": "m", "kind": "multiply"}]}),
        |ir, b, diags| {
            assert!(diags.is_empty());
            let m = b.of(block(ir, "m"));
            assert!(matches!(m[0], Some(InputSource::Default(Value::Number(x))) if x == 0.0));
            assert!(matches!(m[1], Some(InputSource::Default(Value::Number(x))) if x == 1.0));
        },
    );
}

#[test]
fn wires_and_listeners_outrank_defaults() {
    with_bindings(
        serde_json::json!({
            "blocks": [
                {"id": "k", "kind": "constant", "params": {"value": {"domain": "number", "value": 3.0}}},
                {"id": "m", "kind": "add"}
            ],
            "wires": [{"from": "k.out", "to": "m.a"}],
            "listeners": [{"bus": "energy", "to": "m.b"}],
            "defaults": [
                {"to": "m.a", "value": {"domain": "number", "value": 9.0}},
                {"to": "m.b", "value": {"domain": "number", "value": 9.0}}
            ]
        }),
        |ir, b, diags| {
            assert!(!diags.has_errors(), "{diags}");
            let m = b.of(block(ir, "m"));
            assert!(matches!(m[0], Some(InputSource::Wire { .. })));
            assert!(matches!(m[1], Some(InputSource::Bus { .. })));
        },
    );
}

#[test]
fn patch_default_overrides_declared_default() {
    with_bindings(
        serde_json::json!({
            "blocks": [{"id": "m", "kind": "add"}],
            "defaults": [{"to": "m.b", "value": {"domain": "number", "value": 0.5}}]
        }),
        |ir, b, diags| {
            assert!(diags.is_empty());
            let m = b.of(block(ir, "m"));
            assert!(matches!(m[1], Some(InputSource::Default(Value::Number(x))) if x == 0.5));
        },
    );
}

#[test]
fn default_source_domain_is_checked() {
    with_bindings(
        serde_json::json!({
            "blocks": [{"id": "m", "kind": "add"}],
            "defaults": [{"to": "m.b", "value": {"domain": "phase", "value": 0.5}}]
        }),
        |_, _, diags| assert!(diags.contains(DiagnosticCode::TypeMismatch)),
    );
}

#[test]
fn wire_types_need_explicit_adapters() {
    let patch = |transforms: serde_json::Value| {
        serde_json::json!({
            "blocks": [{"id": "t", "kind": "time_root"}, {"id": "i", "kind": "integrate"}],
            "wires": [{"from": "t.phase", "to": "i.rate", "transforms": transforms}]
        })
    };
    with_bindings(patch(serde_json::json!([])), |_, _, diags| {
        assert!(diags.contains(DiagnosticCode::TypeMismatch));
    });
    with_bindings(
        patch(serde_json::json!([{"op": "phase_to_number"}])),
        |_, _, diags| assert!(diags.is_empty(), "{diags}"),
    );
    with_bindings(
        patch(serde_json::json!([{"op": "time_to_number"}])),
        |_, _, diags| assert!(diags.contains(DiagnosticCode::TypeMismatch)),
    );
}

#[test]
fn two_drivers_on_one_input() {
    with_bindings(
        serde_json::json!({
            "blocks": [
                {"id": "k", "kind": "constant", "params": {"value": {"domain": "number", "value": 3.0}}},
                {"id": "m", "kind": "add"}
            ],
            "wires": [{"from": "k.out", "to": "m.a"}],
            "listeners": [{"bus": "energy", "to": "m.a"}]
        }),
        |_, _, diags| {
            let errs: Vec<_> = diags.errors().collect();
            assert_eq!(errs.len(), 1);
            assert_eq!(errs[0].code, DiagnosticCode::MultipleDrivers);
            assert!(errs[0].message.contains("wire from k.out"));
        },
    );
}

#[test]
fn domain_inputs_have_no_default() {
    with_bindings(
        serde_json::json!({"blocks": [{"id": "r", "kind": "render_instances"}]}),
        |_, _, diags| {
            let errs: Vec<_> = diags.errors().collect();
            assert_eq!(errs.len(), 1);
            assert_eq!(errs[0].code, DiagnosticCode::UnresolvedInput);
        },
    );
}
