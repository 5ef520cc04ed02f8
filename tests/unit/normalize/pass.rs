use super::*;
use crate::compile::diagnostics::DiagnosticCode;

fn def(json: serde_json::Value) -> PatchDef {
    serde_json::from_value(json).unwrap()
}

#[test]
fn blocks_follow_stable_id_not_declaration_order() {
    let reg = BlockRegistry::standard();
    let d = def(serde_json::json!({
        "blocks": [
            {"id": "zeta", "kind": "constant", "params": {"value": {"domain": "number", "value": 1.0}}},
            {"id": "alpha", "kind": "time_root"},
            {"id": "mid", "kind": "integrate"}
        ]
    }));
    let ir = normalize(&d, &reg, 0).unwrap();
    let ids: Vec<&str> = ir.blocks.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, ["alpha", "mid", "zeta"]);
}

#[test]
fn reserved_buses_come_first() {
    let reg = BlockRegistry::standard();
    let d = def(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}],
        "buses": [
            {"id": "b_user", "type": {"world": "signal", "domain": "number"}, "combine": "sum"},
            {"id": "a_user", "type": {"world": "signal", "domain": "number"}, "combine": "max"}
        ]
    }));
    let ir = normalize(&d, &reg, 0).unwrap();
    let n = RESERVED_BUSES.len();
    assert_eq!(ir.buses.len(), n + 2);
    assert!(ir.buses[..n].iter().all(|b| b.reserved));
    assert_eq!(ir.buses[n].id, "a_user");
    assert_eq!(ir.buses[n + 1].id, "b_user");
    assert_eq!(ir.buses[n].silent, Value::Number(0.0));
}

#[test]
fn publishers_sorted_by_sort_key_then_block() {
    let reg = BlockRegistry::standard();
    let c = |id: &str| {
        serde_json::json!({"id": id, "kind": "constant", "params": {"value": {"domain": "number", "value": 1.0}}})
    };
    let d = def(serde_json::json!({
        "blocks": [c("c"), c("a"), c("b")],
        "publishers": [
            {"bus": "energy", "from": "c.out", "sort_key": 0},
            {"bus": "energy", "from": "b.out", "sort_key": 1},
            {"bus": "energy", "from": "a.out", "sort_key": 1},
            {"bus": "energy", "from": "a.out", "sort_key": 5, "enabled": false}
        ]
    }));
    let ir = normalize(&d, &reg, 0).unwrap();
    let order: Vec<String> = ir.publishers.iter().map(|p| ir.describe(p.from)).collect();
    assert_eq!(order, ["c.out", "a.out", "b.out"]);
}

#[test]
fn unknown_kind_and_port_are_reported() {
    let reg = BlockRegistry::standard();
    let d = def(serde_json::json!({
        "blocks": [{"id": "x", "kind": "teleporter"}]
    }));
    let errs = normalize(&d, &reg, 0).err().unwrap();
    assert!(errs.contains(DiagnosticCode::UnknownBlockKind));

    let d = def(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "i", "kind": "integrate"}],
        "wires": [{"from": "t.nope", "to": "i.rate"}]
    }));
    let errs = normalize(&d, &reg, 0).err().unwrap();
    assert!(errs.contains(DiagnosticCode::UnknownPort));
}

#[test]
fn bad_params_are_reported_per_block() {
    let reg = BlockRegistry::standard();
    let d = def(serde_json::json!({
        "blocks": [
            {"id": "t", "kind": "time_root", "params": {"mode": "cyclic", "period": -1.0}},
            {"id": "o", "kind": "oscillator", "params": {"shape": "square"}}
        ]
    }));
    let errs = normalize(&d, &reg, 0).err().unwrap();
    assert_eq!(errs.errors().count(), 2);
    assert!(errs.iter().all(|e| e.code == DiagnosticCode::BadParam));
}

#[test]
fn reserved_bus_redeclaration_must_match() {
    let reg = BlockRegistry::standard();
    let d = def(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}],
        "buses": [{"id": "phaseA", "type": {"world": "signal", "domain": "phase"}, "combine": "last"}]
    }));
    assert!(normalize(&d, &reg, 0).is_ok());

    let d = def(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}],
        "buses": [{"id": "phaseA", "type": {"world": "signal", "domain": "number"}, "combine": "sum"}]
    }));
    let errs = normalize(&d, &reg, 0).err().unwrap();
    assert!(errs.contains(DiagnosticCode::ReservedBusContract));
}

#[test]
fn silent_value_must_match_bus_domain() {
    let reg = BlockRegistry::standard();
    let d = def(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}],
        "buses": [{
            "id": "level",
            "type": {"world": "signal", "domain": "number"},
            "combine": "sum",
            "silent": {"domain": "phase", "value": 0.5}
        }]
    }));
    let errs = normalize(&d, &reg, 0).err().unwrap();
    assert!(errs.contains(DiagnosticCode::TypeMismatch));
}

#[test]
fn duplicate_block_ids_fail_before_lookup() {
    let reg = BlockRegistry::standard();
    let d = def(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "t", "kind": "teleporter"}]
    }));
    let errs = normalize(&d, &reg, 0).err().unwrap();
    assert!(errs.contains(DiagnosticCode::DuplicateBlock));
    assert!(!errs.contains(DiagnosticCode::UnknownBlockKind));
}
