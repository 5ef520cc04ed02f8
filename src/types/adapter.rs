use crate::foundation::math::wrap_phase;
use crate::types::descriptor::{Domain, TypeDesc, World};
use crate::types::value::Value;

/// Explicit value conversion, usable on wires, publishers and listeners.
///
/// These are the only way to move between number, phase and time.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdapterOp {
    /// Phase `p` becomes number `p`.
    PhaseToNumber,
    /// Number `x` becomes phase `x - floor(x)`.
    NumberToPhase,
    /// Time becomes its value in seconds.
    TimeToNumber,
    /// Number of seconds becomes time.
    NumberToTime,
    Scale { k: f64 },
    Offset { k: f64 },
    Clamp { min: f64, max: f64 },
}

impl AdapterOp {
    /// Output type, or a message when the adapter does not accept `input`.
    pub fn apply_type(self, input: TypeDesc) -> Result<TypeDesc, String> {
        if !matches!(input.world, World::Signal | World::Scalar | World::Field) {
            return Err(format!("adapter {self:?} cannot apply to {input}"));
        }
        let out = match (self, input.domain) {
            (AdapterOp::PhaseToNumber, Domain::Phase) => Domain::Number,
            (AdapterOp::NumberToPhase, Domain::Number) => Domain::Phase,
            (AdapterOp::TimeToNumber, Domain::Time) => Domain::Number,
            (AdapterOp::NumberToTime, Domain::Number) => Domain::Time,
            (AdapterOp::Scale { .. } | AdapterOp::Offset { .. }, d)
                if matches!(d, Domain::Number | Domain::Time | Domain::Vec2) =>
            {
                d
            }
            (AdapterOp::Clamp { min, max }, Domain::Number) if min <= max => Domain::Number,
            _ => return Err(format!("adapter {self:?} cannot apply to {input}")),
        };
        Ok(TypeDesc::new(input.world, out))
    }

    /// Apply to a value whose type already passed [`AdapterOp::apply_type`].
    pub fn apply(self, v: Value) -> Option<Value> {
        match (self, v) {
            (AdapterOp::PhaseToNumber, Value::Phase(p)) => Some(Value::Number(p)),
            (AdapterOp::NumberToPhase, Value::Number(x)) => Some(Value::Phase(wrap_phase(x))),
            (AdapterOp::TimeToNumber, Value::Time(t)) => Some(Value::Number(t)),
            (AdapterOp::NumberToTime, Value::Number(x)) => Some(Value::Time(x)),
            (AdapterOp::Scale { k }, v) if !matches!(v, Value::Phase(_)) => {
                v.map_components(|x| x * k)
            }
            (AdapterOp::Offset { k }, v) if !matches!(v, Value::Phase(_)) => {
                v.map_components(|x| x + k)
            }
            (AdapterOp::Clamp { min, max }, Value::Number(x)) => Some(Value::Number(x.clamp(min, max))),
            _ => None,
        }
    }
}

/// Type after applying a chain left to right.
pub fn chain_type(chain: &[AdapterOp], input: TypeDesc) -> Result<TypeDesc, String> {
    chain.iter().try_fold(input, |ty, op| op.apply_type(ty))
}
