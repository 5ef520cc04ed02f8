use crate::compile::lower::{LowerCtx, LowerError};
use crate::ir::program::TimeModel;
use crate::types::descriptor::TypeDesc;
use crate::types::value::Value;
use std::collections::BTreeMap;

/// What a block contributes to the time and dependency analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRole {
    /// The patch's single time authority.
    TimeRoot,
    Pure,
    /// Keeps memory across frames.
    Stateful,
    DomainSource,
    RenderSink,
}

/// One input or output port of a block signature.
#[derive(Debug, Clone)]
pub struct PortSpec {
    pub name: &'static str,
    pub ty: TypeDesc,
    /// Declared default source, used when the port is neither wired nor listening.
    pub default: Option<Value>,
    /// Input read on the next frame. Edges into memory inputs may close feedback loops.
    pub memory: bool,
}

impl PortSpec {
    pub fn new(name: &'static str, ty: TypeDesc) -> Self {
        Self {
            name,
            ty,
            default: None,
            memory: false,
        }
    }

    pub fn with_default(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }

    pub fn memory(mut self) -> Self {
        self.memory = true;
        self
    }
}

/// Ports and role a block declares for one set of params.
#[derive(Debug, Clone)]
pub struct BlockSignature {
    pub role: BlockRole,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    /// Set only for time roots.
    pub time_model: Option<TimeModel>,
}

impl BlockSignature {
    pub fn new(role: BlockRole) -> Self {
        Self {
            role,
            inputs: Vec::new(),
            outputs: Vec::new(),
            time_model: None,
        }
    }

    pub fn input(mut self, p: PortSpec) -> Self {
        self.inputs.push(p);
        self
    }

    pub fn output(mut self, p: PortSpec) -> Self {
        self.outputs.push(p);
        self
    }

    pub fn find_input(&self, name: &str) -> Option<(usize, &PortSpec)> {
        self.inputs.iter().enumerate().find(|(_, p)| p.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// Read-only view over a block's JSON params.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    raw: &'a BTreeMap<String, serde_json::Value>,
}

impl<'a> Params<'a> {
    pub fn new(raw: &'a BTreeMap<String, serde_json::Value>) -> Self {
        Self { raw }
    }

    pub fn f64(&self, name: &str, default: f64) -> Result<f64, String> {
        match self.raw.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_f64()
                .filter(|x| x.is_finite())
                .ok_or_else(|| format!("param '{name}' must be a finite number")),
        }
    }

    pub fn u32(&self, name: &str, default: u32) -> Result<u32, String> {
        match self.raw.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_u64()
                .and_then(|x| u32::try_from(x).ok())
                .ok_or_else(|| format!("param '{name}' must be a non-negative integer")),
        }
    }

    pub fn str(&self, name: &str, default: &'a str) -> Result<&'a str, String> {
        match self.raw.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_str()
                .ok_or_else(|| format!("param '{name}' must be a string")),
        }
    }

    /// Typed value param, e.g. `{"domain": "phase", "value": 0.25}`.
    pub fn value(&self, name: &str) -> Result<Option<Value>, String> {
        let Some(raw) = self.raw.get(name) else {
            return Ok(None);
        };
        let v: Value = serde_json::from_value(raw.clone())
            .map_err(|e| format!("param '{name}' is not a typed value: {e}"))?;
        v.check_literal()
            .map_err(|e| format!("param '{name}': {e}"))?;
        Ok(Some(v))
    }
}

/// Behavior of one block kind: its port signature for given params, and how it lowers to IR.
///
/// `signature` must be a pure function of the params. `lower` must register every declared
/// output through the [`LowerCtx`] output methods.
pub trait BlockBehavior: Send + Sync {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String>;

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError>;
}

/// Block kinds available to a compile. Passed explicitly; there is no global registry.
pub struct BlockRegistry {
    behaviors: BTreeMap<String, Box<dyn BlockBehavior>>,
}

impl BlockRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            behaviors: BTreeMap::new(),
        }
    }

    /// Registry with the standard block catalog.
    pub fn standard() -> Self {
        let mut r = Self::new();
        crate::blocks::std_blocks::register_all(&mut r);
        r
    }

    /// Add or replace the behavior for `kind`.
    pub fn register(&mut self, kind: &str, behavior: Box<dyn BlockBehavior>) {
        self.behaviors.insert(kind.to_owned(), behavior);
    }

    pub(crate) fn get(&self, kind: &str) -> Option<&dyn BlockBehavior> {
        self.behaviors.get(kind).map(|b| b.as_ref())
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.behaviors.keys().map(String::as_str)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("kinds", &self.behaviors.keys().collect::<Vec<_>>())
            .finish()
    }
}
