use crate::foundation::math::StableHasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct BlockIdx(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct BusIdx(pub(crate) u32);

/// Handle to a signal node built during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigId(pub(crate) u32);

/// Handle to a field node built during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) u32);

/// Handle to an element domain created during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainIdx(pub(crate) u32);

/// Handle to a memory cell declared with `LowerCtx::state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateIdx(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SinkIdx(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ProbeIdx(pub(crate) u32);

/// Stable per-element identity. Depends only on the generating block and its parameters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ElementId(pub u64);

/// Identity of a stateful memory cell that survives recompilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(pub u64);

impl StateKey {
    pub fn new(block_id: &str, port: &str) -> Self {
        let mut h = StableHasher::new();
        h.write_str(block_id);
        h.write_str(port);
        Self(h.finish_u64())
    }
}

/// An arena grew past what a `u32` index can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("arena index {0} does not fit in u32")]
pub(crate) struct IndexOverflow(pub(crate) usize);

pub(crate) fn idx_u32(len: usize) -> Result<u32, IndexOverflow> {
    u32::try_from(len).map_err(|_| IndexOverflow(len))
}
