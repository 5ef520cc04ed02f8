use super::*;
use crate::blocks::registry::{
    BlockBehavior, BlockRegistry, BlockRole, BlockSignature, Params, PortSpec,
};
use crate::compile::lower::{LowerCtx, LowerError, lower_all};
use crate::compile::topology::analyze;
use crate::compile::typecheck::bind_inputs;
use crate::normalize::pass::normalize;
use crate::patch::model::PatchDef;
use crate::types::descriptor::{Domain, TypeDesc};

fn linked(json: serde_json::Value, probes: &[ProbeDef]) -> Result<LinkedIr, Diagnostics> {
    linked_with(&BlockRegistry::standard(), json, probes)
}

fn linked_with(
    reg: &BlockRegistry,
    json: serde_json::Value,
    probes: &[ProbeDef],
) -> Result<LinkedIr, Diagnostics> {
    let def: PatchDef = serde_json::from_value(json).unwrap();
    let ir = normalize(&def, reg, 7).unwrap();
    let (bindings, diags) = bind_inputs(&ir);
    assert!(!diags.has_errors(), "{diags}");
    let topo = analyze(&ir, &bindings).unwrap();
    let b = lower_all(&ir, &bindings, &topo, crate::compile::DEFAULT_MAX_ELEMENTS)?;
    link(&ir, b, probes)
}

fn probe(block: &str, port: &str) -> ProbeDef {
    ProbeDef {
        block: block.to_owned(),
        port: port.to_owned(),
    }
}

#[test]
fn no_placeholders_survive() {
    let l = linked(
        serde_json::json!({
            "blocks": [
                {"id": "t", "kind": "time_root"},
                {"id": "osc", "kind": "oscillator"},
                {"id": "sum", "kind": "add"},
                {"id": "i", "kind": "integrate"}
            ],
            "wires": [
                {"from": "t.phase", "to": "osc.phase"},
                {"from": "osc.out", "to": "sum.a"},
                {"from": "sum.out", "to": "i.rate"}
            ]
        }),
        &[probe("i", "out")],
    )
    .unwrap();
    assert!(l.sigs.iter().all(|n| !matches!(n.expr, SignalExpr::InputRef(_))));
    assert!(l.fields.iter().all(|n| !matches!(n.expr, FieldExpr::InputRef(_))));
    for n in &l.sigs {
        for c in n.expr.children() {
            assert!((c.0 as usize) < l.sigs.len());
        }
    }

    // The probe lands on the integrator itself, not a copy.
    assert_eq!(l.probes.len(), 1);
    assert_eq!(l.probes[0].label, "i.out");
    let node = &l.sigs[l.probes[0].sig.0 as usize];
    assert!(matches!(node.expr, SignalExpr::Integrate { .. }));
    assert_eq!(l.states.len(), 1);
}

#[test]
fn unknown_probe_is_reported() {
    let errs = linked(
        serde_json::json!({"blocks": [{"id": "t", "kind": "time_root"}]}),
        &[probe("t", "nothing"), probe("ghost", "out")],
    )
    .unwrap_err();
    assert_eq!(errs.len(), 2);
    assert!(errs.iter().all(|d| d.code == DiagnosticCode::UnknownProbe));
}

#[test]
fn publishers_resolve_per_bus_in_order() {
    let l = linked(
        serde_json::json!({
            "blocks": [
                {"id": "t", "kind": "time_root"},
                {"id": "a", "kind": "constant", "params": {"value": {"domain": "number", "value": 1.0}}},
                {"id": "b", "kind": "constant", "params": {"value": {"domain": "number", "value": 2.0}}}
            ],
            "publishers": [
                {"bus": "energy", "from": "b.out", "sort_key": 0},
                {"bus": "energy", "from": "a.out", "sort_key": 1}
            ]
        }),
        &[],
    )
    .unwrap();
    let energy = crate::compile::buses::RESERVED_BUSES
        .iter()
        .position(|r| r.id == "energy")
        .unwrap();
    let consts: Vec<f64> = l.bus_sources[energy]
        .iter()
        .map(|s| match *s {
            BusSource::Signal(id) => match l.sigs[id.0 as usize].expr {
                SignalExpr::Const(v) => v.as_f64().unwrap(),
                ref other => panic!("unexpected {other:?}"),
            },
            BusSource::Field(_) => panic!("signal bus got a field source"),
        })
        .collect();
    assert_eq!(consts, [2.0, 1.0]);
}

#[test]
fn fields_take_their_source_domain() {
    let l = linked(
        serde_json::json!({
            "blocks": [
                {"id": "t", "kind": "time_root"},
                {"id": "dots", "kind": "element_domain", "params": {"count": 5}},
                {"id": "m", "kind": "field_map", "params": {"op": "scale", "k": 2.0}},
                {"id": "r", "kind": "render_instances"}
            ],
            "wires": [
                {"from": "dots.domain", "to": "r.domain"},
                {"from": "dots.index", "to": "m.in"},
                {"from": "m.out", "to": "r.radius"}
            ]
        }),
        &[],
    )
    .unwrap();
    assert_eq!(l.sinks.len(), 1);
    let sink = &l.sinks[0];
    assert_eq!(l.fields[sink.radius.0 as usize].domain, Some(sink.domain));
    // Defaults are domain-agnostic constants.
    assert_eq!(l.fields[sink.color.0 as usize].domain, None);
    assert_eq!(l.domains[sink.domain.0 as usize].count(), 5);
}

#[test]
fn zipping_two_domains_is_a_mismatch() {
    let errs = linked(
        serde_json::json!({
            "blocks": [
                {"id": "t", "kind": "time_root"},
                {"id": "d1", "kind": "element_domain", "params": {"count": 3}},
                {"id": "d2", "kind": "element_domain", "params": {"count": 3}},
                {"id": "z", "kind": "field_zip"}
            ],
            "wires": [
                {"from": "d1.index", "to": "z.a"},
                {"from": "d2.index", "to": "z.b"}
            ]
        }),
        &[],
    )
    .unwrap_err();
    assert!(errs.contains(DiagnosticCode::DomainMismatch));
}

#[test]
fn sink_fields_must_share_its_domain() {
    let errs = linked(
        serde_json::json!({
            "blocks": [
                {"id": "t", "kind": "time_root"},
                {"id": "d1", "kind": "element_domain", "params": {"count": 3}},
                {"id": "d2", "kind": "element_domain", "params": {"count": 3}},
                {"id": "r", "kind": "render_instances"}
            ],
            "wires": [
                {"from": "d1.domain", "to": "r.domain"},
                {"from": "d2.index", "to": "r.radius"}
            ]
        }),
        &[],
    )
    .unwrap_err();
    let d = errs.iter().find(|d| d.code == DiagnosticCode::DomainMismatch).unwrap();
    assert!(d.message.contains("'d1'") && d.message.contains("'d2'"), "{}", d.message);
}

#[test]
fn chain_resolution_rejects_loops() {
    let next = [Some(1), Some(2), Some(0)];
    assert!(resolve_chains(3, |i| Ok(next[i])).is_err());

    let next = [Some(1), Some(2), None, None];
    assert_eq!(resolve_chains(4, |i| Ok(next[i])).unwrap(), [2, 2, 2, 3]);
}

/// Declares an output but never lowers it.
struct Forgetful;

impl BlockBehavior for Forgetful {
    fn signature(&self, _params: &Params<'_>) -> Result<BlockSignature, String> {
        Ok(BlockSignature::new(BlockRole::Pure)
            .output(PortSpec::new("out", TypeDesc::signal(Domain::Number))))
    }

    fn lower(&self, _cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        Ok(())
    }
}

#[test]
fn reading_an_unlowered_output_is_unresolved() {
    let mut reg = BlockRegistry::standard();
    reg.register("forgetful", Box::new(Forgetful));
    let errs = linked_with(
        &reg,
        serde_json::json!({
            "blocks": [
                {"id": "t", "kind": "time_root"},
                {"id": "lazy", "kind": "forgetful"},
                {"id": "sum", "kind": "add"}
            ],
            "wires": [{"from": "lazy.out", "to": "sum.a"}]
        }),
        &[probe("sum", "out")],
    )
    .unwrap_err();
    let d = errs
        .iter()
        .find(|d| d.code == DiagnosticCode::UnresolvedReference)
        .unwrap_or_else(|| panic!("{errs}"));
    assert_eq!(d.code.as_str(), "E_UNRESOLVED_REFERENCE");
    assert!(d.message.contains("lazy.out"), "{}", d.message);
    assert_eq!(
        d.locations,
        vec![crate::compile::diagnostics::Location::Port {
            block: "lazy".to_owned(),
            port: "out".to_owned(),
        }]
    );
}
