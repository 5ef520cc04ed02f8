use super::*;
use crate::blocks::registry::BlockRegistry;
use crate::compile::{CompileOpts, ProbeDef, compile_patch};
use crate::ir::signal::SignalExpr;
use crate::patch::Patch;

fn executor(json: serde_json::Value, probes: &[(&str, &str)]) -> Executor {
    let patch = Patch::from_def(serde_json::from_value(json).unwrap());
    let opts = CompileOpts {
        probes: probes
            .iter()
            .map(|(b, p)| ProbeDef {
                block: (*b).to_owned(),
                port: (*p).to_owned(),
            })
            .collect(),
        ..Default::default()
    };
    let program = compile_patch(&patch, &BlockRegistry::standard(), &opts).unwrap();
    Executor::new(program, BufferPoolOpts::default())
}

fn integrator() -> serde_json::Value {
    serde_json::json!({
        "blocks": [
            {"id": "t", "kind": "time_root", "params": {"mode": "infinite"}},
            {"id": "k", "kind": "constant", "params": {"value": {"domain": "number", "value": 1.0}}},
            {"id": "i", "kind": "integrate"}
        ],
        "wires": [{"from": "k.out", "to": "i.rate"}]
    })
}

fn grid() -> serde_json::Value {
    serde_json::json!({
        "blocks": [
            {"id": "t", "kind": "time_root"},
            {"id": "g", "kind": "grid_domain", "params": {"rows": 2, "cols": 3, "spacing": 10.0}},
            {"id": "hue", "kind": "field_hue"},
            {"id": "r", "kind": "render_instances"}
        ],
        "wires": [
            {"from": "g.domain", "to": "r.domain"},
            {"from": "g.position", "to": "r.position"},
            {"from": "g.index", "to": "hue.hue"},
            {"from": "hue.out", "to": "r.color"}
        ]
    })
}

#[test]
fn frames_count_up_and_commit_memory() {
    let mut ex = executor(integrator(), &[("i", "out")]);
    for n in 0..4u64 {
        let f = ex.run_frame(0.5, 1, true).unwrap();
        assert_eq!(f.frame, n);
        assert_eq!(f.generation, 1);
        assert_eq!(f.time, n as f64 * 0.5);
        assert_eq!(f.probe("i.out"), Some(Value::Number(n as f64 * 0.5)));
    }
    assert_eq!(ex.memory("i", "out"), Some(Value::Number(1.5)));
    assert_eq!(ex.memory("i", "rate"), None);
}

#[test]
fn failed_frame_leaves_memory_and_clock_alone() {
    let mut ex = executor(integrator(), &[]);
    ex.run_frame(0.5, 1, true).unwrap();
    ex.run_frame(0.5, 1, true).unwrap();
    let before = (ex.memory("i", "out"), ex.state.time, ex.state.frame);

    // Corrupt the rate so the integrator cannot evaluate.
    let k = ex
        .program
        .sigs
        .iter()
        .position(|n| n.expr == SignalExpr::Const(Value::Number(1.0)))
        .unwrap();
    let good = ex.program.sigs[k].expr.clone();
    ex.program.sigs[k].expr = SignalExpr::Const(Value::Phase(0.5));
    assert!(ex.run_frame(0.5, 1, true).is_err());
    assert_eq!((ex.memory("i", "out"), ex.state.time, ex.state.frame), before);
    assert!(ex.state.staged.iter().all(Option::is_none));

    ex.program.sigs[k].expr = good;
    let f = ex.run_frame(0.5, 1, true).unwrap();
    assert_eq!(f.frame, 2);
    assert_eq!(ex.memory("i", "out"), Some(Value::Number(1.0)));
}

#[test]
fn layer_carries_stable_ids_and_grid_positions() {
    let mut ex = executor(grid(), &[]);
    let a = ex.run_frame(0.1, 1, true).unwrap();
    let b = ex.run_frame(0.1, 1, true).unwrap();
    let la = a.layer("r").unwrap();
    assert_eq!(la.len(), 6);
    assert_eq!(la.domain, "g");
    assert_eq!(la.positions[4], crate::foundation::core::Vec2::new(10.0, 10.0));
    assert_eq!(la.radii, vec![1.0; 6]);
    assert_eq!(la.element_ids, b.layer("r").unwrap().element_ids);

    let mut ids = la.element_ids.clone();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[test]
fn lazy_and_materialized_frames_agree() {
    let mut eager = executor(grid(), &[]);
    let mut lazy = executor(grid(), &[]);
    for _ in 0..3 {
        let a = eager.run_frame(0.2, 1, true).unwrap();
        let b = lazy.run_frame(0.2, 1, false).unwrap();
        assert_eq!(a, b);
    }
    assert!(eager.pool_stats().alloc_buffers > 0);
    assert_eq!(lazy.pool_stats().alloc_buffers, 0);
}

#[test]
fn pool_is_reused_from_the_second_frame() {
    let mut ex = executor(grid(), &[]);
    ex.run_frame(0.1, 1, true).unwrap();
    let first = ex.pool_stats();
    ex.run_frame(0.1, 1, true).unwrap();
    let second = ex.pool_stats();
    assert_eq!(second.alloc_buffers, first.alloc_buffers);
    assert!(second.reused_buffers > 0);
}
