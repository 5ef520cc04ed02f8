use crate::blocks::registry::{BlockBehavior, BlockSignature, PortSpec};
use crate::foundation::ids::{BlockIdx, BusIdx};
use crate::normalize::ports::{PortNames, PortSym};
use crate::types::adapter::AdapterOp;
use crate::types::combine::CombineMode;
use crate::types::descriptor::TypeDesc;
use crate::types::value::Value;
use std::collections::BTreeMap;

/// Normalized patch: blocks sorted by stable id, ports resolved against block signatures,
/// publishers in combine order.
pub(crate) struct PatchIR<'r> {
    pub(crate) seed: u64,
    pub(crate) ports: PortNames,
    pub(crate) blocks: Vec<BlockIR<'r>>,
    pub(crate) wires: Vec<WireIR>,
    pub(crate) buses: Vec<BusIR>,
    pub(crate) publishers: Vec<PublisherIR>,
    pub(crate) listeners: Vec<ListenerIR>,
    pub(crate) defaults: Vec<DefaultIR>,
}

pub(crate) struct BlockIR<'r> {
    pub(crate) id: String,
    pub(crate) kind: String,
    pub(crate) params: BTreeMap<String, serde_json::Value>,
    pub(crate) sig: BlockSignature,
    pub(crate) behavior: &'r dyn BlockBehavior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct PortIR {
    pub(crate) block: BlockIdx,
    pub(crate) port: PortSym,
}

#[derive(Debug, Clone)]
pub(crate) struct WireIR {
    pub(crate) from: PortIR,
    pub(crate) to: PortIR,
    pub(crate) transforms: Vec<AdapterOp>,
}

#[derive(Debug, Clone)]
pub(crate) struct BusIR {
    pub(crate) id: String,
    pub(crate) ty: TypeDesc,
    pub(crate) combine: CombineMode,
    pub(crate) silent: Value,
    pub(crate) reserved: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PublisherIR {
    pub(crate) bus: BusIdx,
    pub(crate) from: PortIR,
    pub(crate) sort_key: i32,
    pub(crate) transforms: Vec<AdapterOp>,
}

#[derive(Debug, Clone)]
pub(crate) struct ListenerIR {
    pub(crate) bus: BusIdx,
    pub(crate) to: PortIR,
    pub(crate) transforms: Vec<AdapterOp>,
}

#[derive(Debug, Clone)]
pub(crate) struct DefaultIR {
    pub(crate) to: PortIR,
    pub(crate) value: Value,
}

impl<'r> PatchIR<'r> {
    pub(crate) fn block(&self, idx: BlockIdx) -> &BlockIR<'r> {
        &self.blocks[idx.0 as usize]
    }

    pub(crate) fn bus(&self, idx: BusIdx) -> &BusIR {
        &self.buses[idx.0 as usize]
    }

    pub(crate) fn port_name(&self, p: PortIR) -> &'static str {
        self.ports.name(p.port)
    }

    pub(crate) fn input_spec(&self, p: PortIR) -> Option<&PortSpec> {
        let name = self.port_name(p);
        self.block(p.block).sig.find_input(name).map(|(_, s)| s)
    }

    pub(crate) fn output_spec(&self, p: PortIR) -> Option<&PortSpec> {
        let name = self.port_name(p);
        self.block(p.block).sig.find_output(name)
    }

    /// `"block.port"` for messages.
    pub(crate) fn describe(&self, p: PortIR) -> String {
        format!("{}.{}", self.block(p.block).id, self.port_name(p))
    }
}
