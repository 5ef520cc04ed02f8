use super::*;
use crate::blocks::registry::BlockRegistry;
use crate::compile::typecheck::bind_inputs;
use crate::normalize::pass::normalize;
use crate::patch::model::PatchDef;

fn topo(json: serde_json::Value) -> Result<(Topology, Vec<String>), Diagnostics> {
    let reg = BlockRegistry::standard();
    let def: PatchDef = serde_json::from_value(json).unwrap();
    let ir = normalize(&def, &reg, 0).unwrap();
    let (bindings, diags) = bind_inputs(&ir);
    assert!(!diags.has_errors(), "{diags}");
    let t = analyze(&ir, &bindings)?;
    let ids = ir.blocks.iter().map(|b| b.id.clone()).collect();
    Ok((t, ids))
}

#[test]
fn missing_time_root() {
    let errs = topo(serde_json::json!({"blocks": [{"id": "a", "kind": "add"}]})).unwrap_err();
    assert!(errs.contains(DiagnosticCode::TimeRootMissing));
}

#[test]
fn two_time_roots_is_one_conflict() {
    let errs = topo(serde_json::json!({
        "blocks": [{"id": "t1", "kind": "time_root"}, {"id": "t2", "kind": "time_root", "params": {"mode": "infinite"}}]
    }))
    .unwrap_err();
    assert_eq!(errs.len(), 1);
    let d = errs.iter().next().unwrap();
    assert_eq!(d.code, DiagnosticCode::TimeTopologyConflict);
    assert_eq!(d.locations.len(), 2);
}

#[test]
fn loop_without_memory_is_illegal() {
    let errs = topo(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "a", "kind": "add"}, {"id": "b", "kind": "add"}],
        "wires": [{"from": "a.out", "to": "b.a"}, {"from": "b.out", "to": "a.a"}]
    }))
    .unwrap_err();
    assert_eq!(errs.len(), 1);
    let d = errs.iter().next().unwrap();
    assert_eq!(d.code, DiagnosticCode::IllegalFeedback);
    assert!(d.message.contains("a, b"));
}

#[test]
fn self_loop_is_illegal() {
    let errs = topo(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "a", "kind": "add"}],
        "wires": [{"from": "a.out", "to": "a.b"}]
    }))
    .unwrap_err();
    assert!(errs.contains(DiagnosticCode::IllegalFeedback));
}

#[test]
fn loop_through_delay_is_allowed() {
    let (t, ids) = topo(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "acc", "kind": "add"}, {"id": "d", "kind": "delay"}],
        "wires": [{"from": "d.out", "to": "acc.a"}, {"from": "acc.out", "to": "d.in"}]
    }))
    .unwrap();
    assert_eq!(t.cycles.len(), 1);
    assert_eq!(t.cycles[0].memory_edges, 1);
    assert_eq!(t.cycles[0].blocks.len(), 2);
    // The memory edge is cut, so the delay runs before the adder.
    let order: Vec<&str> = t.order.iter().map(|b| ids[b.0 as usize].as_str()).collect();
    assert_eq!(order, ["d", "acc", "t"]);
}

#[test]
fn bypass_of_memory_boundary_is_partial_buffering() {
    let errs = topo(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "acc", "kind": "add"}, {"id": "d", "kind": "delay"}],
        "wires": [
            {"from": "d.out", "to": "acc.a"},
            {"from": "acc.out", "to": "d.in"},
            {"from": "acc.out", "to": "acc.b"}
        ]
    }))
    .unwrap_err();
    assert!(errs.contains(DiagnosticCode::PartialBuffering));
}

#[test]
fn loops_through_buses_are_found() {
    let errs = topo(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "a", "kind": "add"}],
        "publishers": [{"bus": "energy", "from": "a.out"}],
        "listeners": [{"bus": "energy", "to": "a.a"}]
    }))
    .unwrap_err();
    assert!(errs.contains(DiagnosticCode::IllegalFeedback));
}

#[test]
fn order_follows_wires_then_stable_id() {
    let (t, ids) = topo(serde_json::json!({
        "blocks": [
            {"id": "t", "kind": "time_root"},
            {"id": "a_last", "kind": "add"},
            {"id": "z_first", "kind": "add"}
        ],
        "wires": [{"from": "z_first.out", "to": "a_last.a"}]
    }))
    .unwrap();
    assert!(t.cycles.is_empty());
    assert_eq!(t.time_model, TimeModel::Cyclic { period: 1.0 });
    let order: Vec<&str> = t.order.iter().map(|b| ids[b.0 as usize].as_str()).collect();
    assert_eq!(order, ["t", "z_first", "a_last"]);
}
