use super::*;
use crate::blocks::registry::BlockRegistry;
use crate::normalize::pass::normalize;
use crate::patch::model::PatchDef;

fn resolve(json: serde_json::Value) -> (Vec<ResolvedBus>, Diagnostics) {
    let reg = BlockRegistry::standard();
    let def: PatchDef = serde_json::from_value(json).unwrap();
    let ir = normalize(&def, &reg, 0).unwrap();
    resolve_buses(&ir)
}

fn constant(id: &str, value: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"id": id, "kind": "constant", "params": {"value": value}})
}

#[test]
fn reserved_table_is_well_formed() {
    for r in RESERVED_BUSES {
        assert!(r.ty.is_well_formed(), "{}", r.id);
        assert!(r.combine.supports(r.ty), "{}", r.id);
        assert_eq!(r.silent().domain(), r.ty.domain);
    }
    assert!(reserved_contract("phaseA").is_some());
    assert!(reserved_contract("phasea").is_none());
}

#[test]
fn color_publisher_on_sum_bus_is_combine_incompatible() {
    let (_, diags) = resolve(serde_json::json!({
        "blocks": [
            {"id": "t", "kind": "time_root"},
            constant("tint", serde_json::json!({"domain": "color", "value": {"r": 1, "g": 0, "b": 0, "a": 1}}))
        ],
        "publishers": [{"bus": "energy", "from": "tint.out"}]
    }));
    let errs: Vec<_> = diags.errors().collect();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, DiagnosticCode::BusCombineIncompatible);
}

#[test]
fn declared_mode_must_support_bus_type() {
    let (_, diags) = resolve(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}],
        "buses": [{"id": "level", "type": {"world": "signal", "domain": "number"}, "combine": "layer"}]
    }));
    assert!(diags.contains(DiagnosticCode::BusCombineIncompatible));

    let (_, diags) = resolve(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}],
        "buses": [{"id": "beat", "type": {"world": "event", "domain": "number"}, "combine": "or"}]
    }));
    assert!(diags.contains(DiagnosticCode::BusTypeUnsupported));
}

#[test]
fn phase_into_number_bus_needs_an_adapter() {
    let (_, diags) = resolve(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "i", "kind": "integrate"}],
        "buses": [{"id": "level", "type": {"world": "signal", "domain": "number"}, "combine": "last"}],
        "publishers": [{"bus": "level", "from": "t.phase"}],
        "listeners": [{"bus": "level", "to": "i.rate"}]
    }));
    assert!(diags.contains(DiagnosticCode::TypeMismatch));

    let (buses, diags) = resolve(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "i", "kind": "integrate"}],
        "buses": [{"id": "level", "type": {"world": "signal", "domain": "number"}, "combine": "last"}],
        "publishers": [{"bus": "level", "from": "t.phase", "transforms": [{"op": "phase_to_number"}]}],
        "listeners": [{"bus": "level", "to": "i.rate"}]
    }));
    assert!(diags.is_empty(), "{diags}");
    let level = buses.last().unwrap();
    assert_eq!(level.publishers.len(), 1);
    assert_eq!(level.listeners.len(), 1);
}

#[test]
fn listener_type_is_checked_after_transforms() {
    let (_, diags) = resolve(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "i", "kind": "integrate"}],
        "publishers": [{"bus": "phaseA", "from": "t.phase"}],
        "listeners": [{"bus": "phaseA", "to": "i.rate"}]
    }));
    assert!(diags.contains(DiagnosticCode::TypeMismatch));
}

#[test]
fn silent_and_unused_buses_warn() {
    let (_, diags) = resolve(serde_json::json!({
        "blocks": [
            {"id": "t", "kind": "time_root"},
            {"id": "i", "kind": "integrate"},
            constant("k", serde_json::json!({"domain": "number", "value": 2.0}))
        ],
        "buses": [{"id": "spare", "type": {"world": "signal", "domain": "number"}, "combine": "sum"}],
        "publishers": [
            {"bus": "spare", "from": "k.out"},
            {"bus": "energy", "from": "k.out"}
        ],
        "listeners": [{"bus": "phaseB", "to": "i.rate", "transforms": [{"op": "phase_to_number"}]}]
    }));
    assert!(!diags.has_errors(), "{diags}");
    let codes: Vec<_> = diags.warnings().map(|d| d.code).collect();
    // Reserved buses never warn about missing listeners.
    assert_eq!(codes, [DiagnosticCode::BusSilent, DiagnosticCode::BusUnused]);
}
