//! Block catalog and the plug-in surface for custom block kinds.
//!
//! A custom kind implements [`BlockBehavior`] and is added with [`BlockRegistry::register`].
//! Its `lower` builds nodes through [`LowerCtx`], which type-checks every operand.

pub mod registry;
pub(crate) mod std_blocks;

pub use crate::compile::lower::{LowerCtx, LowerError};
pub use crate::domain::element::FieldSource;
pub use crate::foundation::ids::{DomainIdx, FieldId, SigId, StateIdx};
pub use crate::ir::field::MapOp;
pub use crate::ir::signal::{BinaryOp, TimeChannel, UnaryOp};
pub use registry::{BlockBehavior, BlockRegistry, BlockRole, BlockSignature, Params, PortSpec};
