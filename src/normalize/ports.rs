use crate::blocks::registry::BlockSignature;
use crate::foundation::ids::{IndexOverflow, idx_u32};
use std::collections::HashMap;

/// Interned port name, shared by every block that declares a port of that name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct PortSym(pub(crate) u32);

/// Port names declared by the block signatures of one compile.
///
/// Names come from `PortSpec::name`, so the table borrows them instead of copying.
#[derive(Debug, Default, Clone)]
pub(crate) struct PortNames {
    by_name: HashMap<&'static str, PortSym>,
    names: Vec<&'static str>,
}

impl PortNames {
    /// Record every input and output name of `sig`.
    pub(crate) fn declare(&mut self, sig: &BlockSignature) -> Result<(), IndexOverflow> {
        for p in sig.inputs.iter().chain(&sig.outputs) {
            if self.by_name.contains_key(p.name) {
                continue;
            }
            let sym = PortSym(idx_u32(self.names.len())?);
            self.names.push(p.name);
            self.by_name.insert(p.name, sym);
        }
        Ok(())
    }

    /// Symbol of a name some signature declared.
    pub(crate) fn find(&self, name: &str) -> Option<PortSym> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn name(&self, sym: PortSym) -> &'static str {
        self.names[sym.0 as usize]
    }
}
