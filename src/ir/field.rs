use crate::domain::element::FieldSource;
use crate::foundation::ids::{BusIdx, DomainIdx, FieldId, SigId};
use crate::ir::signal::{BinaryOp, OutKey, UnaryOp};
use crate::types::adapter::AdapterOp;
use crate::types::descriptor::TypeDesc;
use crate::types::value::Value;
use smallvec::{SmallVec, smallvec};

/// Per-element map applied by `LowerCtx::field_map`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapOp {
    Unary(UnaryOp),
    Adapter(AdapterOp),
}

impl MapOp {
    pub(crate) fn apply(self, v: Value) -> Option<Value> {
        match self {
            MapOp::Unary(op) => op.apply(v),
            MapOp::Adapter(op) => op.apply(v),
        }
    }
}

/// Lazy per-element expression node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldExpr {
    /// Same value at every index of any domain.
    Const(Value),
    Source {
        domain: DomainIdx,
        source: FieldSource,
    },
    /// A signal's current value at every index of `domain`.
    Broadcast {
        domain: DomainIdx,
        sig: SigId,
    },
    Map {
        input: FieldId,
        op: MapOp,
    },
    Zip {
        a: FieldId,
        b: FieldId,
        op: BinaryOp,
    },
    BusRead(BusIdx),
    /// Placeholder for a wired input; removed by link resolution.
    InputRef(OutKey),
}

impl FieldExpr {
    pub(crate) fn children(&self) -> SmallVec<[FieldId; 2]> {
        match *self {
            FieldExpr::Map { input, .. } => smallvec![input],
            FieldExpr::Zip { a, b, .. } => smallvec![a, b],
            FieldExpr::Const(_)
            | FieldExpr::Source { .. }
            | FieldExpr::Broadcast { .. }
            | FieldExpr::BusRead(_)
            | FieldExpr::InputRef(_) => SmallVec::new(),
        }
    }

    pub(crate) fn map_children(&self, mut f: impl FnMut(FieldId) -> FieldId) -> FieldExpr {
        match *self {
            FieldExpr::Map { input, op } => FieldExpr::Map { input: f(input), op },
            FieldExpr::Zip { a, b, op } => FieldExpr::Zip {
                a: f(a),
                b: f(b),
                op,
            },
            ref leaf => leaf.clone(),
        }
    }

    /// Domain this node itself pins, ignoring children.
    pub(crate) fn own_domain(&self) -> Option<DomainIdx> {
        match *self {
            FieldExpr::Source { domain, .. } | FieldExpr::Broadcast { domain, .. } => Some(domain),
            _ => None,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            FieldExpr::Const(_) => "const",
            FieldExpr::Source { .. } => "source",
            FieldExpr::Broadcast { .. } => "broadcast",
            FieldExpr::Map { .. } => "map",
            FieldExpr::Zip { .. } => "zip",
            FieldExpr::BusRead(_) => "bus_read",
            FieldExpr::InputRef(_) => "input_ref",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FieldNode {
    pub(crate) expr: FieldExpr,
    pub(crate) ty: TypeDesc,
    /// Element domain the node is defined over; `None` for domain-agnostic nodes (constants,
    /// silent buses) that are valid over any domain.
    pub(crate) domain: Option<DomainIdx>,
}
