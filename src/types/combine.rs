use crate::types::descriptor::{Domain, TypeDesc, World};
use crate::types::value::Value;

/// Reduction applied across a bus's active publishers, in publisher order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    Sum,
    Max,
    Min,
    Mean,
    Or,
    Layer,
    Last,
}

impl CombineMode {
    pub fn name(self) -> &'static str {
        match self {
            CombineMode::Sum => "sum",
            CombineMode::Max => "max",
            CombineMode::Min => "min",
            CombineMode::Mean => "mean",
            CombineMode::Or => "or",
            CombineMode::Layer => "layer",
            CombineMode::Last => "last",
        }
    }

    /// Whether this mode has defined semantics for values of type `ty`.
    ///
    /// Field buses use the same table pointwise. `layer` is only defined for color; there is no
    /// fallback to `last`.
    pub fn supports(self, ty: TypeDesc) -> bool {
        if !matches!(ty.world, World::Signal | World::Field | World::Event) {
            return false;
        }
        match self {
            CombineMode::Sum | CombineMode::Mean => ty.domain.is_numeric(),
            CombineMode::Max | CombineMode::Min => {
                ty.domain.is_numeric() || ty.domain == Domain::Phase
            }
            CombineMode::Or => ty.world == World::Event,
            CombineMode::Layer => ty.domain == Domain::Color,
            CombineMode::Last => ty.domain != Domain::Elements,
        }
    }

    /// Fold `values` left to right. `None` when `values` is empty or a value does not fit the
    /// mode; callers substitute the bus silent value for the empty case.
    pub fn fold(self, values: impl IntoIterator<Item = Value>) -> Option<Value> {
        let mut it = values.into_iter();
        let first = it.next()?;
        let mut n = 1usize;
        let mut acc = first;
        for v in it {
            n += 1;
            acc = match self {
                CombineMode::Sum | CombineMode::Mean => acc.zip_with(v, |a, b| a + b)?,
                CombineMode::Max => acc.zip_with(v, f64::max)?,
                CombineMode::Min => acc.zip_with(v, f64::min)?,
                CombineMode::Or => Value::Trigger(acc.is_fired() || v.is_fired()),
                // Later publishers composite over earlier ones.
                CombineMode::Layer => Value::Color(v.as_color()?.over(acc.as_color()?)),
                CombineMode::Last => v,
            };
        }
        if self == CombineMode::Mean {
            let inv = 1.0 / n as f64;
            acc = acc.map_components(|x| x * inv)?;
        }
        Some(acc)
    }
}
