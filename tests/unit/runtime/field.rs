use super::*;
use crate::blocks::registry::BlockRegistry;
use crate::compile::{CompileOpts, compile_patch};
use crate::foundation::core::Color;
use crate::ir::program::ScheduleStep;
use crate::patch::Patch;
use crate::runtime::pool::BufferPoolOpts;
use crate::runtime::signal::{combine_bus, eval_signal};

fn program(json: serde_json::Value) -> CompiledProgram {
    let patch = Patch::from_def(serde_json::from_value(json).unwrap());
    compile_patch(&patch, &BlockRegistry::standard(), &CompileOpts::default()).unwrap()
}

fn run_signals(p: &CompiledProgram, st: &mut RuntimeState, dt: f64) {
    st.epoch += 1;
    for step in &p.schedule {
        match *step {
            ScheduleStep::TimeDerive => st.time = st.time.advanced(p.time_model, dt),
            ScheduleStep::SignalEval { node, out } => {
                let v = eval_signal(p, st, node).unwrap();
                v.write_components(&mut st.slots[out.as_range()]);
                st.stamp_sig(node);
            }
            ScheduleStep::BusCombine { bus, out } => {
                let v = combine_bus(p, st, bus).unwrap();
                v.write_components(&mut st.slots[out.as_range()]);
                st.stamp_bus(bus);
            }
            _ => {}
        }
    }
}

/// Two field publishers summed pointwise on a user field bus, plus a broadcast signal.
fn field_bus_patch() -> serde_json::Value {
    serde_json::json!({
        "blocks": [
            {"id": "clock", "kind": "time_root"},
            {"id": "dots", "kind": "element_domain", "params": {"count": 5}},
            {"id": "double", "kind": "field_map", "params": {"op": "scale", "k": 2.0}},
            {"id": "glow", "kind": "field_broadcast"},
            {"id": "tint", "kind": "field_hue", "params": {"saturation": 0.5}},
            {"id": "draw", "kind": "render_instances"}
        ],
        "buses": [{"id": "sizes", "type": {"world": "field", "domain": "number"}, "combine": "sum"}],
        "wires": [
            {"from": "dots.domain", "to": "draw.domain"},
            {"from": "dots.domain", "to": "glow.domain"},
            {"from": "dots.index", "to": "double.in"},
            {"from": "dots.random", "to": "tint.hue"},
            {"from": "clock.phase", "to": "glow.value", "transforms": [{"op": "phase_to_number"}]},
            {"from": "glow.out", "to": "draw.opacity"},
            {"from": "tint.out", "to": "draw.color"}
        ],
        "publishers": [
            {"bus": "sizes", "from": "dots.index"},
            {"bus": "sizes", "from": "double.out"}
        ],
        "listeners": [{"bus": "sizes", "to": "draw.radius"}]
    })
}

#[test]
fn materialized_buffers_match_per_index_evaluation() {
    let p = program(field_bus_patch());
    let mut st = RuntimeState::new(&p);
    let mut cache = FieldCache::default();
    let mut pool = BufferPool::new(BufferPoolOpts::default());
    run_signals(&p, &mut st, 0.0);
    run_signals(&p, &mut st, 0.25);
    cache.begin_frame(st.epoch, &mut pool);

    let sink = &p.sinks[0];
    let d = sink.domain;
    for f in sink.fields() {
        materialize(&p, &st, &mut cache, &mut pool, f, d).unwrap();
        let domain = p.fields[f.0 as usize].ty.domain;
        let buf = cache.get(&p, f, d).unwrap();
        for i in 0..5 {
            assert_eq!(at(buf, domain, i).unwrap(), value_at(&p, &st, f, d, i).unwrap());
        }
    }

    // index + 2 * index, pointwise.
    let radius: Vec<f64> = (0..5)
        .map(|i| value_at(&p, &st, sink.radius, d, i).unwrap().as_f64().unwrap())
        .collect();
    assert_eq!(radius, [0.0, 0.75, 1.5, 2.25, 3.0]);
    // Broadcast of the phase at t = 0.25.
    assert_eq!(value_at(&p, &st, sink.opacity, d, 3).unwrap(), Value::Number(0.25));
}

#[test]
fn cache_reuses_within_a_frame_and_recycles_across_frames() {
    let p = program(field_bus_patch());
    let mut st = RuntimeState::new(&p);
    let mut cache = FieldCache::default();
    let mut pool = BufferPool::new(BufferPoolOpts::default());
    run_signals(&p, &mut st, 0.0);
    cache.begin_frame(st.epoch, &mut pool);

    let sink = &p.sinks[0];
    materialize(&p, &st, &mut cache, &mut pool, sink.radius, sink.domain).unwrap();
    // Bus read, index and the scaled map; the map's input is the already-cached index.
    let filled = cache.len();
    assert_eq!(filled, 3);
    assert_eq!((cache.misses, cache.hits), (3, 1));
    materialize(&p, &st, &mut cache, &mut pool, sink.radius, sink.domain).unwrap();
    assert_eq!((cache.misses, cache.hits), (3, 2));

    run_signals(&p, &mut st, 0.1);
    cache.begin_frame(st.epoch, &mut pool);
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.epoch, st.epoch);
    assert_eq!(pool.stats().retained_buffers, filled);

    materialize(&p, &st, &mut cache, &mut pool, sink.radius, sink.domain).unwrap();
    assert_eq!(pool.stats().reused_buffers, filled as u64);
}

#[test]
fn out_of_range_index_is_an_error() {
    let p = program(field_bus_patch());
    let mut st = RuntimeState::new(&p);
    run_signals(&p, &mut st, 0.0);
    let sink = &p.sinks[0];
    let err = value_at(&p, &st, sink.radius, sink.domain, 5).unwrap_err();
    assert!(err.message.contains("out of range"), "{err}");
}

#[test]
fn broadcast_before_signal_eval_fails() {
    let p = program(field_bus_patch());
    let mut st = RuntimeState::new(&p);
    run_signals(&p, &mut st, 0.0);
    st.epoch += 1;

    let mut cache = FieldCache::default();
    let mut pool = BufferPool::new(BufferPoolOpts::default());
    let sink = &p.sinks[0];
    assert!(materialize(&p, &st, &mut cache, &mut pool, sink.opacity, sink.domain).is_err());
    // The failed buffer went back to the pool instead of into the cache.
    assert_eq!(cache.len(), 0);
    assert_eq!(pool.stats().retained_buffers, 1);
}

/// `index` and `-index` published to one field number bus with the given combine.
fn opposed_publishers(combine: &str) -> serde_json::Value {
    serde_json::json!({
        "blocks": [
            {"id": "clock", "kind": "time_root"},
            {"id": "dots", "kind": "element_domain", "params": {"count": 5}},
            {"id": "neg", "kind": "field_map", "params": {"op": "neg"}},
            {"id": "draw", "kind": "render_instances"}
        ],
        "buses": [{"id": "sizes", "type": {"world": "field", "domain": "number"}, "combine": combine}],
        "wires": [
            {"from": "dots.domain", "to": "draw.domain"},
            {"from": "dots.index", "to": "neg.in"}
        ],
        "publishers": [
            {"bus": "sizes", "from": "dots.index"},
            {"bus": "sizes", "from": "neg.out"}
        ],
        "listeners": [{"bus": "sizes", "to": "draw.radius"}]
    })
}

fn radii(p: &CompiledProgram) -> Vec<f64> {
    let mut st = RuntimeState::new(p);
    run_signals(p, &mut st, 0.0);
    let sink = &p.sinks[0];
    let mut cache = FieldCache::default();
    let mut pool = BufferPool::new(BufferPoolOpts::default());
    cache.begin_frame(st.epoch, &mut pool);
    materialize(p, &st, &mut cache, &mut pool, sink.radius, sink.domain).unwrap();
    let buf = cache.get(p, sink.radius, sink.domain).unwrap().to_vec();
    let lazy: Vec<f64> = (0..5)
        .map(|i| value_at(p, &st, sink.radius, sink.domain, i).unwrap().as_f64().unwrap())
        .collect();
    assert_eq!(buf, lazy);
    lazy
}

#[test]
fn field_bus_max_and_mean_combine_pointwise() {
    let max = radii(&program(opposed_publishers("max")));
    assert_eq!(max, [0.0, 0.25, 0.5, 0.75, 1.0]);
    let mean = radii(&program(opposed_publishers("mean")));
    assert!(mean.iter().all(|x| *x == 0.0), "{mean:?}");
}

#[test]
fn field_bus_layer_composites_later_publishers_on_top() {
    let p = program(serde_json::json!({
        "blocks": [
            {"id": "clock", "kind": "time_root"},
            {"id": "dots", "kind": "element_domain", "params": {"count": 3}},
            {"id": "blue", "kind": "constant", "params": {"value": {"domain": "color", "value": {"r": 0.0, "g": 0.0, "b": 1.0, "a": 1.0}}}},
            {"id": "red", "kind": "constant", "params": {"value": {"domain": "color", "value": {"r": 1.0, "g": 0.0, "b": 0.0, "a": 0.5}}}},
            {"id": "base", "kind": "field_broadcast_color"},
            {"id": "veil", "kind": "field_broadcast_color"},
            {"id": "draw", "kind": "render_instances"}
        ],
        "buses": [{"id": "tint", "type": {"world": "field", "domain": "color"}, "combine": "layer"}],
        "wires": [
            {"from": "dots.domain", "to": "draw.domain"},
            {"from": "dots.domain", "to": "base.domain"},
            {"from": "dots.domain", "to": "veil.domain"},
            {"from": "blue.out", "to": "base.value"},
            {"from": "red.out", "to": "veil.value"}
        ],
        "publishers": [
            {"bus": "tint", "from": "veil.out", "sort_key": 1},
            {"bus": "tint", "from": "base.out", "sort_key": 0}
        ],
        "listeners": [{"bus": "tint", "to": "draw.color"}]
    }));
    let mut st = RuntimeState::new(&p);
    run_signals(&p, &mut st, 0.0);
    let sink = &p.sinks[0];
    let want = Color::rgba(1.0, 0.0, 0.0, 0.5).over(Color::rgba(0.0, 0.0, 1.0, 1.0));
    assert_ne!(want, Color::rgba(0.0, 0.0, 1.0, 1.0));
    for i in 0..3 {
        let got = value_at(&p, &st, sink.color, sink.domain, i).unwrap();
        assert_eq!(got, Value::Color(want));
    }
}
