use crate::foundation::core::{Color, Vec2};
use crate::types::descriptor::Domain;

/// A single runtime value, tagged by domain.
///
/// Serialized as `{"domain": "phase", "value": 0.25}`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "domain", content = "value", rename_all = "snake_case")]
pub enum Value {
    Number(f64),
    Phase(f64),
    Time(f64),
    Vec2(Vec2),
    Color(Color),
    Trigger(bool),
}

impl Value {
    pub fn domain(&self) -> Domain {
        match self {
            Value::Number(_) => Domain::Number,
            Value::Phase(_) => Domain::Phase,
            Value::Time(_) => Domain::Time,
            Value::Vec2(_) => Domain::Vec2,
            Value::Color(_) => Domain::Color,
            Value::Trigger(_) => Domain::Trigger,
        }
    }

    /// Value a bus or cell of this domain holds when nothing has been written.
    pub fn zero(domain: Domain) -> Option<Self> {
        Some(match domain {
            Domain::Number => Value::Number(0.0),
            Domain::Phase => Value::Phase(0.0),
            Domain::Time => Value::Time(0.0),
            Domain::Vec2 => Value::Vec2(Vec2::ZERO),
            Domain::Color => Value::Color(Color::TRANSPARENT),
            Domain::Trigger => Value::Trigger(false),
            Domain::Elements => return None,
        })
    }

    /// Reject literals no computation could produce: non-finite components, or a phase outside
    /// `[0, 1)`.
    pub fn check_literal(&self) -> Result<(), String> {
        if let Value::Phase(p) = *self {
            if !(0.0..1.0).contains(&p) {
                return Err(format!("phase literal {p} is outside [0, 1)"));
            }
        }
        let finite = match *self {
            Value::Number(x) | Value::Phase(x) | Value::Time(x) => x.is_finite(),
            Value::Vec2(v) => v.x.is_finite() && v.y.is_finite(),
            Value::Color(c) => c.to_array().iter().all(|x| x.is_finite()),
            Value::Trigger(_) => true,
        };
        if finite {
            Ok(())
        } else {
            Err(format!("{} literal is not finite", self.domain().name()))
        }
    }

    /// Scalar payload of number, phase and time values.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Number(x) | Value::Phase(x) | Value::Time(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match *self {
            Value::Vec2(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match *self {
            Value::Color(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_fired(&self) -> bool {
        matches!(self, Value::Trigger(true))
    }

    /// Write the flat component representation into `out` (length must equal the arity).
    pub(crate) fn write_components(&self, out: &mut [f64]) {
        match *self {
            Value::Number(x) | Value::Phase(x) | Value::Time(x) => out[0] = x,
            Value::Vec2(v) => {
                out[0] = v.x;
                out[1] = v.y;
            }
            Value::Color(c) => out.copy_from_slice(&c.to_array()),
            Value::Trigger(b) => out[0] = if b { 1.0 } else { 0.0 },
        }
    }

    pub(crate) fn from_components(domain: Domain, c: &[f64]) -> Option<Self> {
        if c.len() < domain.arity() {
            return None;
        }
        Some(match domain {
            Domain::Number => Value::Number(c[0]),
            Domain::Phase => Value::Phase(c[0]),
            Domain::Time => Value::Time(c[0]),
            Domain::Vec2 => Value::Vec2(Vec2::new(c[0], c[1])),
            Domain::Color => Value::Color(Color::from_slice(c)),
            Domain::Trigger => Value::Trigger(c[0] != 0.0),
            Domain::Elements => return None,
        })
    }

    /// Componentwise binary op on two values of the same domain.
    ///
    /// Triggers are not arithmetic; returns `None` for them and for mismatched domains.
    pub(crate) fn zip_with(self, other: Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
        Some(match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Number(f(a, b)),
            (Value::Phase(a), Value::Phase(b)) => Value::Phase(f(a, b)),
            (Value::Time(a), Value::Time(b)) => Value::Time(f(a, b)),
            (Value::Vec2(a), Value::Vec2(b)) => Value::Vec2(Vec2::new(f(a.x, b.x), f(a.y, b.y))),
            (Value::Color(a), Value::Color(b)) => Value::Color(Color::rgba(
                f(a.r, b.r),
                f(a.g, b.g),
                f(a.b, b.b),
                f(a.a, b.a),
            )),
            _ => return None,
        })
    }

    pub(crate) fn map_components(self, f: impl Fn(f64) -> f64) -> Option<Value> {
        Some(match self {
            Value::Number(a) => Value::Number(f(a)),
            Value::Phase(a) => Value::Phase(f(a)),
            Value::Time(a) => Value::Time(f(a)),
            Value::Vec2(v) => Value::Vec2(Vec2::new(f(v.x), f(v.y))),
            Value::Color(c) => Value::Color(Color::rgba(f(c.r), f(c.g), f(c.b), f(c.a))),
            Value::Trigger(_) => return None,
        })
    }
}
