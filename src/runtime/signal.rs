use crate::foundation::core::Vec2;
use crate::foundation::ids::{BusIdx, SigId};
use crate::ir::program::{BusSource, CompiledProgram};
use crate::ir::signal::{SignalExpr, TimeChannel};
use crate::runtime::state::RuntimeState;
use crate::types::value::Value;

/// Failure while executing a frame. The frame is abandoned and committed memory is untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "eval error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

impl From<EvalError> for crate::foundation::error::WavepatchError {
    fn from(e: EvalError) -> Self {
        Self::Evaluation(e.message)
    }
}

/// Current-frame value of a signal node. Reading a node the schedule has not written yet in
/// this frame is an error, never a stale read.
pub(crate) fn read_sig(p: &CompiledProgram, st: &RuntimeState, s: SigId) -> Result<Value, EvalError> {
    let node = p
        .sigs
        .get(s.0 as usize)
        .ok_or_else(|| EvalError::new(format!("signal N{} out of range", s.0)))?;
    let range = p
        .slots
        .sig_slots
        .get(s.0 as usize)
        .copied()
        .flatten()
        .ok_or_else(|| EvalError::new(format!("signal N{} has no slot", s.0)))?;
    if !st.sig_ready(s) {
        return Err(EvalError::new(format!(
            "signal N{} ({}) read before it was evaluated this frame",
            s.0,
            node.expr.kind_name()
        )));
    }
    Value::from_components(node.ty.domain, &st.slots[range.as_range()])
        .ok_or_else(|| EvalError::new(format!("signal N{} holds no {} value", s.0, node.ty)))
}

pub(crate) fn read_bus(p: &CompiledProgram, st: &RuntimeState, b: BusIdx) -> Result<Value, EvalError> {
    let bus = &p.buses[b.0 as usize];
    let range = p
        .slots
        .bus_slots
        .get(b.0 as usize)
        .copied()
        .flatten()
        .ok_or_else(|| EvalError::new(format!("bus '{}' has no slot", bus.id)))?;
    if !st.bus_ready(b) {
        return Err(EvalError::new(format!(
            "bus '{}' read before it was combined this frame",
            bus.id
        )));
    }
    Value::from_components(bus.ty.domain, &st.slots[range.as_range()])
        .ok_or_else(|| EvalError::new(format!("bus '{}' holds no {} value", bus.id, bus.ty)))
}

fn number(v: Value, what: &str) -> Result<f64, EvalError> {
    v.as_f64()
        .ok_or_else(|| EvalError::new(format!("{what} expected a scalar, got {v:?}")))
}

/// Evaluate one node from its already-evaluated children. Stateful nodes stage new memory.
pub(crate) fn eval_signal(p: &CompiledProgram, st: &mut RuntimeState, s: SigId) -> Result<Value, EvalError> {
    let node = &p.sigs[s.0 as usize];
    let v = match node.expr {
        SignalExpr::Const(v) => v,
        SignalExpr::TimeRef(TimeChannel::Time) => Value::Time(st.time.t),
        SignalExpr::TimeRef(TimeChannel::Phase) => Value::Phase(st.time.phase),
        SignalExpr::TimeRef(TimeChannel::Wrap) => Value::Trigger(st.time.wrapped),
        SignalExpr::InputRef(_) => {
            return Err(EvalError::new(format!("signal N{} is an unlinked placeholder", s.0)));
        }
        SignalExpr::Unary { op, x } => {
            let x = read_sig(p, st, x)?;
            op.apply(x)
                .ok_or_else(|| EvalError::new(format!("{op:?} is undefined for {x:?}")))?
        }
        SignalExpr::Binary { op, a, b } => {
            let (a, b) = (read_sig(p, st, a)?, read_sig(p, st, b)?);
            op.apply(a, b)
                .ok_or_else(|| EvalError::new(format!("{op:?} is undefined for {a:?}, {b:?}")))?
        }
        SignalExpr::Adapter { op, x } => {
            let x = read_sig(p, st, x)?;
            op.apply(x)
                .ok_or_else(|| EvalError::new(format!("adapter {op:?} is undefined for {x:?}")))?
        }
        SignalExpr::PackVec2 { x, y } => {
            let x = number(read_sig(p, st, x)?, "vec2.x")?;
            let y = number(read_sig(p, st, y)?, "vec2.y")?;
            Value::Vec2(Vec2::new(x, y))
        }
        SignalExpr::Integrate { state, rate } => {
            let rate = number(read_sig(p, st, rate)?, "integrate rate")?;
            let prev = number(st.committed[state.0 as usize], "integrate memory")?;
            let v = Value::Number(prev + rate * st.time.dt);
            st.stage(state, v);
            v
        }
        SignalExpr::Delay { state } => st.committed[state.0 as usize],
        SignalExpr::BusRead(b) => read_bus(p, st, b)?,
    };
    if v.domain() != node.ty.domain {
        return Err(EvalError::new(format!(
            "signal N{} produced {} for a {} node",
            s.0,
            v.domain().name(),
            node.ty
        )));
    }
    Ok(v)
}

/// Fold a signal or event bus's publishers in combine order. No publisher yields the silent value.
pub(crate) fn combine_bus(p: &CompiledProgram, st: &RuntimeState, b: BusIdx) -> Result<Value, EvalError> {
    let bus = &p.buses[b.0 as usize];
    let mut values = Vec::with_capacity(bus.sources.len());
    for src in &bus.sources {
        match *src {
            BusSource::Signal(s) => values.push(read_sig(p, st, s)?),
            BusSource::Field(_) => {
                return Err(EvalError::new(format!(
                    "bus '{}' has a field publisher but is combined per frame",
                    bus.id
                )));
            }
        }
    }
    if values.is_empty() {
        return Ok(bus.silent);
    }
    bus.combine.fold(values).ok_or_else(|| {
        EvalError::new(format!(
            "combine '{}' failed on bus '{}'",
            bus.combine.name(),
            bus.id
        ))
    })
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/signal.rs"]
mod tests;
