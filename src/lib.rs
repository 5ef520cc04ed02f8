//! wavepatch compiles a patch of blocks, wires and buses into a typed program and runs it one
//! frame at a time.
//!
//! - Load a [`Patch`] (JSON) and compile it with [`compile_patch`] against a [`BlockRegistry`]
//! - Hand the [`CompiledProgram`] to a [`Player`] and [`Player::tick`] it once per frame
//! - Recompile after an edit and [`Player::request_swap`]; stateful memory carries over by
//!   stable block id and port
//!
//! Compilation is a pure function of the patch, the registry and the options. A failed compile
//! returns every [`Diagnostic`] it found and no program.
#![forbid(unsafe_code)]

mod foundation;

pub mod blocks;
pub mod compile;
pub(crate) mod domain;
pub(crate) mod ir;
pub(crate) mod normalize;
pub(crate) mod patch;
pub mod runtime;
pub(crate) mod types;

pub use crate::foundation::core::{Color, Vec2};
pub use crate::foundation::error::{WavepatchError, WavepatchResult};
pub use crate::foundation::ids::{ElementId, StateKey};

pub use crate::blocks::{BlockBehavior, BlockRegistry};
pub use crate::compile::{
    BUS_CONTRACT_VERSION, CompileOpts, DEFAULT_MAX_ELEMENTS, Diagnostic, DiagnosticCode,
    Diagnostics, Location, ProbeDef, Severity, compile_patch,
};
pub use crate::ir::program::{CompiledProgram, ProgramFingerprint, TimeModel};
pub use crate::patch::Patch;
pub use crate::patch::model::{
    BlockDef, BusDef, DefaultSourceDef, ListenerDef, PatchDef, PortRef, PublisherDef, WireDef,
};
pub use crate::runtime::{
    BufferPoolOpts, BufferPoolStats, EvalError, InstanceLayer, Player, PlayerState, ProbeSample,
    RenderFrame, RuntimeOpts, SwapReport,
};
pub use crate::types::adapter::AdapterOp;
pub use crate::types::combine::CombineMode;
pub use crate::types::descriptor::{Domain, TypeDesc, World};
pub use crate::types::value::Value;
