use super::*;
use crate::blocks::registry::BlockRegistry;
use crate::compile::link::link;
use crate::compile::lower::lower_all;
use crate::compile::topology::analyze;
use crate::compile::typecheck::bind_inputs;
use crate::normalize::pass::normalize;
use crate::patch::model::PatchDef;
use crate::types::descriptor::Domain;

struct Built {
    linked: LinkedIr,
    bus_tys: Vec<TypeDesc>,
    steps: Vec<ScheduleStep>,
    slots: SlotTable,
}

fn build(json: serde_json::Value) -> Built {
    let reg = BlockRegistry::standard();
    let def: PatchDef = serde_json::from_value(json).unwrap();
    let ir = normalize(&def, &reg, 0).unwrap();
    let (bindings, diags) = bind_inputs(&ir);
    assert!(!diags.has_errors(), "{diags}");
    let topo = analyze(&ir, &bindings).unwrap();
    let b = lower_all(&ir, &bindings, &topo, crate::compile::DEFAULT_MAX_ELEMENTS).unwrap();
    let linked = link(&ir, b, &[]).unwrap();
    let bus_tys: Vec<TypeDesc> = ir.buses.iter().map(|b| b.ty).collect();
    let (steps, slots) = build_schedule(&linked, &bus_tys).unwrap();
    Built {
        linked,
        bus_tys,
        steps,
        slots,
    }
}

fn pos(steps: &[ScheduleStep], pred: impl Fn(&ScheduleStep) -> bool) -> usize {
    steps.iter().position(pred).unwrap()
}

fn sig_pos(steps: &[ScheduleStep], s: SigId) -> Option<usize> {
    steps
        .iter()
        .position(|st| matches!(*st, ScheduleStep::SignalEval { node, .. } if node == s))
}

fn phase_broadcast() -> serde_json::Value {
    serde_json::json!({
        "blocks": [
            {"id": "clock", "kind": "time_root", "params": {"mode": "infinite", "period": 2.0}},
            {"id": "dots", "kind": "instances", "params": {"count": 4}},
            {"id": "unused", "kind": "constant", "params": {"value": {"domain": "number", "value": 5.0}}}
        ],
        "publishers": [{"bus": "phaseA", "from": "clock.phase"}],
        "listeners": [{"bus": "phaseA", "to": "dots.radius", "transforms": [{"op": "phase_to_number"}]}]
    })
}

#[test]
fn children_run_before_parents() {
    let b = build(phase_broadcast());
    assert_eq!(b.steps[0], ScheduleStep::TimeDerive);
    for (i, st) in b.steps.iter().enumerate() {
        if let ScheduleStep::SignalEval { node, .. } = *st {
            for c in b.linked.sigs[node.0 as usize].expr.children() {
                assert!(sig_pos(&b.steps, c).unwrap() < i);
            }
        }
    }

    let combine = pos(&b.steps, |s| matches!(s, ScheduleStep::BusCombine { .. }));
    let read = b
        .linked
        .sigs
        .iter()
        .position(|n| matches!(n.expr, SignalExpr::BusRead(_)))
        .unwrap();
    assert!(combine < sig_pos(&b.steps, SigId(read as u32)).unwrap());

    let field = pos(&b.steps, |s| matches!(s, ScheduleStep::FieldMaterialize { .. }));
    let sink = pos(&b.steps, |s| matches!(s, ScheduleStep::RenderAssemble { .. }));
    assert!(combine < field && field < sink);
    assert_eq!(sink, b.steps.len() - 1);
}

#[test]
fn unread_signals_are_not_scheduled() {
    let b = build(phase_broadcast());
    let five = b
        .linked
        .sigs
        .iter()
        .position(|n| n.expr == SignalExpr::Const(crate::types::value::Value::Number(5.0)))
        .unwrap();
    assert!(sig_pos(&b.steps, SigId(five as u32)).is_none());
    assert!(b.slots.sig_slots[five].is_none());
}

#[test]
fn stateful_nodes_always_run() {
    let b = build(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "i", "kind": "integrate"}]
    }));
    let integ = b
        .linked
        .sigs
        .iter()
        .position(|n| matches!(n.expr, SignalExpr::Integrate { .. }))
        .unwrap();
    let at = sig_pos(&b.steps, SigId(integ as u32)).unwrap();
    assert!(at > 0, "integrate reads dt, so it follows time derivation");
}

#[test]
fn state_write_follows_its_source() {
    let b = build(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "acc", "kind": "add"}, {"id": "d", "kind": "delay"}],
        "wires": [{"from": "d.out", "to": "acc.a"}, {"from": "acc.out", "to": "d.in"}],
        "defaults": [{"to": "acc.b", "value": {"domain": "number", "value": 1.0}}]
    }));
    let (at, src) = b
        .steps
        .iter()
        .enumerate()
        .find_map(|(i, s)| match *s {
            ScheduleStep::StateWrite { src, .. } => Some((i, src)),
            _ => None,
        })
        .unwrap();
    assert!(sig_pos(&b.steps, src).unwrap() < at);
}

#[test]
fn slots_follow_arity_and_execution_order() {
    let b = build(serde_json::json!({
        "blocks": [
            {"id": "t", "kind": "time_root"},
            {"id": "h", "kind": "hue_color"},
            {"id": "i", "kind": "integrate"},
            {"id": "dots", "kind": "instances", "params": {"count": 2}}
        ],
        "wires": [{"from": "t.phase", "to": "h.hue"}],
        "publishers": [{"bus": "palette", "from": "h.out"}],
        "listeners": [{"bus": "palette", "to": "dots.color"}]
    }));
    let mut next = 0u32;
    for st in &b.steps {
        let out = match *st {
            ScheduleStep::SignalEval { out, .. } | ScheduleStep::BusCombine { out, .. } => out,
            _ => continue,
        };
        assert_eq!(out.start, next, "slots are dense and ordered");
        next += out.len;
    }
    assert_eq!(next as usize, b.slots.len());

    let color = b
        .slots
        .meta
        .iter()
        .filter(|m| m.ty.domain == Domain::Color && m.owner == SlotOwner::Bus(BusIdx(5)))
        .map(|m| m.component)
        .collect::<Vec<_>>();
    assert_eq!(color, [0, 1, 2, 3]);
}

#[test]
fn slot_verification_catches_unowned_writes() {
    let b = build(serde_json::json!({
        "blocks": [{"id": "t", "kind": "time_root"}, {"id": "i", "kind": "integrate"}]
    }));
    assert!(verify_slot_writes(&b.steps, &b.slots).is_ok());

    let mut broken = b.slots.clone();
    broken.meta.pop();
    let errs = verify_slot_writes(&b.steps, &broken).unwrap_err();
    assert!(errs.contains(DiagnosticCode::InternalUnregisteredSlot));
}

#[test]
fn schedule_is_reproducible() {
    let a = build(phase_broadcast());
    let b = build(phase_broadcast());
    assert_eq!(a.steps, b.steps);
    assert_eq!(a.slots.meta, b.slots.meta);
}

#[test]
fn a_sink_emitted_twice_is_an_internal_error() {
    let mut b = build(serde_json::json!({
        "blocks": [
            {"id": "t", "kind": "time_root"},
            {"id": "dots", "kind": "instances", "params": {"count": 2}}
        ]
    }));
    let again = b.linked.sinks[0].clone();
    b.linked.sinks.push(again);
    let errs = build_schedule(&b.linked, &b.bus_tys).unwrap_err();
    let d = errs
        .iter()
        .find(|d| d.code == DiagnosticCode::InternalDuplicateSink)
        .unwrap_or_else(|| panic!("{errs}"));
    assert_eq!(d.code.as_str(), "E_INTERNAL_DUPLICATE_SINK");
    assert!(d.message.contains("'dots'"), "{}", d.message);
}
