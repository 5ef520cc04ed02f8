use crate::types::adapter::AdapterOp;
use crate::types::combine::CombineMode;
use crate::types::descriptor::TypeDesc;
use crate::types::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// JSON-facing patch graph, as handed over by the editor layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchDef {
    #[serde(default)]
    pub seed: u64,
    pub blocks: Vec<BlockDef>,
    #[serde(default)]
    pub wires: Vec<WireDef>,
    #[serde(default)]
    pub buses: Vec<BusDef>,
    #[serde(default)]
    pub publishers: Vec<PublisherDef>,
    #[serde(default)]
    pub listeners: Vec<ListenerDef>,
    /// Explicit default-source bindings for inputs that are neither wired nor listening.
    #[serde(default)]
    pub defaults: Vec<DefaultSourceDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    /// Stable identity, unique within the patch. Survives edits and drives hot-swap keys.
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// `(block id, port id)`. Accepts `"block.port"` or `{"block": .., "port": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PortRef {
    pub block: String,
    pub port: String,
}

impl PortRef {
    pub fn new(block: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            port: port.into(),
        }
    }
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.block, self.port)
    }
}

impl<'de> Deserialize<'de> for PortRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Dotted(String),
            Obj { block: String, port: String },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Dotted(s) => match s.rsplit_once('.') {
                Some((block, port)) if !block.is_empty() && !port.is_empty() => {
                    Ok(PortRef::new(block, port))
                }
                _ => Err(serde::de::Error::custom(format!(
                    "port reference '{s}' must be 'block.port'"
                ))),
            },
            Repr::Obj { block, port } => Ok(PortRef { block, port }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDef {
    pub from: PortRef,
    pub to: PortRef,
    #[serde(default)]
    pub transforms: Vec<AdapterOp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusDef {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: TypeDesc,
    pub combine: CombineMode,
    /// Defaults to the zero value of the bus domain.
    #[serde(default)]
    pub silent: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherDef {
    pub bus: String,
    pub from: PortRef,
    #[serde(default)]
    pub sort_key: i32,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub transforms: Vec<AdapterOp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerDef {
    pub bus: String,
    pub to: PortRef,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub transforms: Vec<AdapterOp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSourceDef {
    pub to: PortRef,
    pub value: Value,
}

fn enabled_default() -> bool {
    true
}

#[cfg(test)]
#[path = "../../tests/unit/patch/model.rs"]
mod tests;
