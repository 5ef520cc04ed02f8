//! Deterministic per-frame execution of a [`CompiledProgram`](crate::CompiledProgram).

pub(crate) mod executor;
pub(crate) mod field;
pub mod frame;
pub(crate) mod hot_swap;
pub(crate) mod player;
pub(crate) mod pool;
pub(crate) mod signal;
pub(crate) mod state;

pub use frame::{InstanceLayer, ProbeSample, RenderFrame};
pub use hot_swap::SwapReport;
pub use player::{Player, PlayerState, RuntimeOpts};
pub use pool::{BufferPoolOpts, BufferPoolStats};
pub use signal::EvalError;
