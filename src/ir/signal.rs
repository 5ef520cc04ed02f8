use crate::foundation::core::Color;
use crate::foundation::ids::{BlockIdx, BusIdx, SigId, StateIdx};
use crate::foundation::math::wrap_phase;
use crate::normalize::ports::PortSym;
use crate::types::adapter::AdapterOp;
use crate::types::descriptor::{Domain, TypeDesc};
use crate::types::value::Value;
use smallvec::{SmallVec, smallvec};
use std::f64::consts::TAU;

/// Pre-link reference to a block output, by stable port name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct OutKey {
    pub(crate) block: BlockIdx,
    pub(crate) port: PortSym,
}

/// Output of the time root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeChannel {
    /// Seconds since the first frame.
    Time,
    /// Position within the current cycle.
    Phase,
    /// Fires on the frame a cycle boundary is crossed.
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Abs,
    Fract,
    /// Phase to `sin(2 pi p)`.
    Sine,
    /// Phase to a triangle wave in `[-1, 1]`, `-1` at `p = 0`.
    Triangle,
    /// Phase to a ramp in `[-1, 1)`.
    Saw,
    /// Hue phase to an opaque color. Numbers must pass through `NumberToPhase` first.
    Hue { saturation: f64, value: f64 },
}

impl UnaryOp {
    pub(crate) fn output_domain(self, input: Domain) -> Option<Domain> {
        match (self, input) {
            (UnaryOp::Neg | UnaryOp::Abs, Domain::Number | Domain::Vec2) => Some(input),
            (UnaryOp::Fract, Domain::Number) => Some(Domain::Number),
            (UnaryOp::Sine | UnaryOp::Triangle | UnaryOp::Saw, Domain::Phase) => {
                Some(Domain::Number)
            }
            (UnaryOp::Hue { .. }, Domain::Phase) => Some(Domain::Color),
            _ => None,
        }
    }

    pub(crate) fn apply(self, v: Value) -> Option<Value> {
        match (self, v) {
            (UnaryOp::Neg, v) => v.map_components(|x| -x),
            (UnaryOp::Abs, v) => v.map_components(f64::abs),
            (UnaryOp::Fract, Value::Number(x)) => Some(Value::Number(x - x.floor())),
            (UnaryOp::Sine, Value::Phase(p)) => Some(Value::Number((p * TAU).sin())),
            (UnaryOp::Triangle, Value::Phase(p)) => {
                Some(Value::Number(1.0 - 4.0 * (wrap_phase(p) - 0.5).abs()))
            }
            (UnaryOp::Saw, Value::Phase(p)) => Some(Value::Number(2.0 * wrap_phase(p) - 1.0)),
            (UnaryOp::Hue { saturation, value }, Value::Phase(h)) => {
                Some(Value::Color(Color::from_hsv(h, saturation, value)))
            }
            _ => None,
        }
    }
}

/// Componentwise arithmetic over one value domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Min,
    Max,
}

impl BinaryOp {
    pub(crate) fn accepts(self, d: Domain) -> bool {
        matches!(d, Domain::Number | Domain::Time | Domain::Vec2 | Domain::Color)
    }

    pub(crate) fn apply(self, a: Value, b: Value) -> Option<Value> {
        match self {
            BinaryOp::Add => a.zip_with(b, |x, y| x + y),
            BinaryOp::Sub => a.zip_with(b, |x, y| x - y),
            BinaryOp::Mul => a.zip_with(b, |x, y| x * y),
            BinaryOp::Min => a.zip_with(b, f64::min),
            BinaryOp::Max => a.zip_with(b, f64::max),
        }
    }
}

/// Per-frame expression node. Children are addressed by dense index into the same arena.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SignalExpr {
    Const(Value),
    TimeRef(TimeChannel),
    /// Placeholder for a wired input; removed by link resolution.
    InputRef(OutKey),
    Unary { op: UnaryOp, x: SigId },
    Binary { op: BinaryOp, a: SigId, b: SigId },
    Adapter { op: AdapterOp, x: SigId },
    PackVec2 { x: SigId, y: SigId },
    /// `memory + rate * dt`, staged as the new memory.
    Integrate { state: StateIdx, rate: SigId },
    /// Previous frame's committed memory. Its input is captured by a state-write step.
    Delay { state: StateIdx },
    BusRead(BusIdx),
}

impl SignalExpr {
    pub(crate) fn children(&self) -> SmallVec<[SigId; 2]> {
        match *self {
            SignalExpr::Const(_)
            | SignalExpr::TimeRef(_)
            | SignalExpr::InputRef(_)
            | SignalExpr::Delay { .. }
            | SignalExpr::BusRead(_) => SmallVec::new(),
            SignalExpr::Unary { x, .. } | SignalExpr::Adapter { x, .. } => smallvec![x],
            SignalExpr::Binary { a, b, .. } => smallvec![a, b],
            SignalExpr::PackVec2 { x, y } => smallvec![x, y],
            SignalExpr::Integrate { rate, .. } => smallvec![rate],
        }
    }

    pub(crate) fn map_children(&self, mut f: impl FnMut(SigId) -> SigId) -> SignalExpr {
        match *self {
            SignalExpr::Unary { op, x } => SignalExpr::Unary { op, x: f(x) },
            SignalExpr::Binary { op, a, b } => SignalExpr::Binary {
                op,
                a: f(a),
                b: f(b),
            },
            SignalExpr::Adapter { op, x } => SignalExpr::Adapter { op, x: f(x) },
            SignalExpr::PackVec2 { x, y } => SignalExpr::PackVec2 { x: f(x), y: f(y) },
            SignalExpr::Integrate { state, rate } => SignalExpr::Integrate {
                state,
                rate: f(rate),
            },
            ref leaf => leaf.clone(),
        }
    }

    pub(crate) fn is_stateful(&self) -> bool {
        matches!(self, SignalExpr::Integrate { .. } | SignalExpr::Delay { .. })
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            SignalExpr::Const(_) => "const",
            SignalExpr::TimeRef(_) => "time",
            SignalExpr::InputRef(_) => "input_ref",
            SignalExpr::Unary { .. } => "unary",
            SignalExpr::Binary { .. } => "binary",
            SignalExpr::Adapter { .. } => "adapter",
            SignalExpr::PackVec2 { .. } => "pack_vec2",
            SignalExpr::Integrate { .. } => "integrate",
            SignalExpr::Delay { .. } => "delay",
            SignalExpr::BusRead(_) => "bus_read",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SignalNode {
    pub(crate) expr: SignalExpr,
    pub(crate) ty: TypeDesc,
}
