use crate::foundation::ids::{DomainIdx, FieldId, SinkIdx, StateKey};
use crate::ir::program::{CompiledProgram, ScheduleStep};
use crate::runtime::field::{FieldCache, materialize, value_at};
use crate::runtime::frame::{InstanceLayer, ProbeSample, RenderFrame};
use crate::runtime::pool::{BufferPool, BufferPoolOpts, BufferPoolStats};
use crate::runtime::signal::{EvalError, combine_bus, eval_signal, read_sig};
use crate::runtime::state::RuntimeState;
use crate::types::descriptor::Domain;
use crate::types::value::Value;

/// One program generation plus the memory it runs against.
pub(crate) struct Executor {
    pub(crate) program: CompiledProgram,
    pub(crate) state: RuntimeState,
    pub(crate) cache: FieldCache,
    pub(crate) pool: BufferPool,
}

impl Executor {
    pub(crate) fn new(program: CompiledProgram, pool: BufferPoolOpts) -> Self {
        let state = RuntimeState::new(&program);
        Self {
            program,
            state,
            cache: FieldCache::default(),
            pool: BufferPool::new(pool),
        }
    }

    pub(crate) fn pool_stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }

    /// Run every step once. On error, staged memory and the clock roll back; committed
    /// memory is left as it was after the last good frame.
    #[tracing::instrument(skip(self), fields(frame = self.state.frame))]
    pub(crate) fn run_frame(
        &mut self,
        dt: f64,
        generation: u64,
        materialize_fields: bool,
    ) -> Result<RenderFrame, EvalError> {
        let prev_time = self.state.time;
        self.state.epoch += 1;
        self.cache.begin_frame(self.state.epoch, &mut self.pool);

        match self.run_steps(dt, generation, materialize_fields) {
            Ok(frame) => {
                self.state.commit();
                self.state.frame += 1;
                tracing::debug!(
                    layers = frame.layers.len(),
                    cached_fields = self.cache.len(),
                    "frame done"
                );
                Ok(frame)
            }
            Err(e) => {
                self.state.discard_staged();
                self.state.time = prev_time;
                Err(e)
            }
        }
    }

    fn run_steps(
        &mut self,
        dt: f64,
        generation: u64,
        materialize_fields: bool,
    ) -> Result<RenderFrame, EvalError> {
        let p = &self.program;
        let st = &mut self.state;
        let mut layers = Vec::with_capacity(p.sinks.len());
        let mut probes = Vec::with_capacity(p.probes.len());

        for step in &p.schedule {
            match *step {
                ScheduleStep::TimeDerive => {
                    st.time = st.time.advanced(p.time_model, dt);
                }
                ScheduleStep::SignalEval { node, out } => {
                    let v = eval_signal(p, st, node)?;
                    v.write_components(&mut st.slots[out.as_range()]);
                    st.stamp_sig(node);
                }
                ScheduleStep::BusCombine { bus, out } => {
                    let v = combine_bus(p, st, bus)?;
                    v.write_components(&mut st.slots[out.as_range()]);
                    st.stamp_bus(bus);
                }
                ScheduleStep::StateWrite { state, src } => {
                    let v = read_sig(p, st, src)?;
                    st.stage(state, v);
                }
                ScheduleStep::FieldMaterialize { field, domain } => {
                    if materialize_fields {
                        materialize(p, st, &mut self.cache, &mut self.pool, field, domain)?;
                    }
                }
                ScheduleStep::RenderAssemble { sink } => {
                    layers.push(assemble(p, st, &self.cache, sink)?);
                }
                ScheduleStep::DebugProbe { probe } => {
                    let decl = &p.probes[probe.0 as usize];
                    probes.push(ProbeSample {
                        label: decl.label.clone(),
                        value: read_sig(p, st, decl.sig)?,
                    });
                }
            }
        }

        Ok(RenderFrame {
            frame: st.frame,
            generation,
            time: st.time.t,
            layers,
            probes,
        })
    }

    /// Committed memory of the cell `(block, port)`, if the program declares one.
    pub(crate) fn memory(&self, block: &str, port: &str) -> Option<Value> {
        let idx = self.program.state_by_key(StateKey::new(block, port))?;
        self.state.committed.get(idx.0 as usize).copied()
    }
}

/// Per-element values of a sink field: the materialized buffer when there is one,
/// otherwise the lazy per-index path.
fn column(
    p: &CompiledProgram,
    st: &RuntimeState,
    cache: &FieldCache,
    f: FieldId,
    d: DomainIdx,
) -> Result<Vec<Value>, EvalError> {
    let n = p.domains[d.0 as usize].count();
    let domain = p.fields[f.0 as usize].ty.domain;
    match cache.get(p, f, d) {
        Some(buf) => {
            let arity = domain.arity();
            buf.chunks_exact(arity)
                .take(n)
                .map(|c| {
                    Value::from_components(domain, c)
                        .ok_or_else(|| EvalError::new(format!("field F{} buffer is malformed", f.0)))
                })
                .collect()
        }
        None => (0..n).map(|i| value_at(p, st, f, d, i)).collect(),
    }
}

fn scalars(values: Vec<Value>, what: &str) -> Result<Vec<f64>, EvalError> {
    values
        .into_iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| EvalError::new(format!("{what} expects numbers, got {v:?}")))
        })
        .collect()
}

fn assemble(
    p: &CompiledProgram,
    st: &RuntimeState,
    cache: &FieldCache,
    sink: SinkIdx,
) -> Result<InstanceLayer, EvalError> {
    let k = &p.sinks[sink.0 as usize];
    let dom = &p.domains[k.domain.0 as usize];
    for (f, want) in k.fields().into_iter().zip([
        Domain::Vec2,
        Domain::Number,
        Domain::Color,
        Domain::Number,
    ]) {
        let got = p.fields[f.0 as usize].ty.domain;
        if got != want {
            return Err(EvalError::new(format!(
                "render sink '{}' expected a {} field, got {}",
                k.block,
                want.name(),
                got.name()
            )));
        }
    }

    let positions = column(p, st, cache, k.position, k.domain)?
        .into_iter()
        .map(|v| {
            v.as_vec2()
                .ok_or_else(|| EvalError::new(format!("position expects vec2, got {v:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let radii = scalars(column(p, st, cache, k.radius, k.domain)?, "radius")?;
    let colors = column(p, st, cache, k.color, k.domain)?
        .into_iter()
        .map(|v| {
            v.as_color()
                .ok_or_else(|| EvalError::new(format!("color expects a color, got {v:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let opacity = scalars(column(p, st, cache, k.opacity, k.domain)?, "opacity")?;

    Ok(InstanceLayer {
        sink: k.block.clone(),
        domain: dom.owner().to_owned(),
        element_ids: dom.ids().to_vec(),
        positions,
        radii,
        colors,
        opacity,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/executor.rs"]
mod tests;
