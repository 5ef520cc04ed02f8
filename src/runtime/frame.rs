use crate::foundation::core::{Color, Vec2};
use crate::foundation::ids::ElementId;
use crate::types::value::Value;

/// Instance buffers of one render sink, all indexed by element.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InstanceLayer {
    /// Stable id of the sink block.
    pub sink: String,
    /// Stable id of the block that generated the element domain.
    pub domain: String,
    pub element_ids: Vec<ElementId>,
    pub positions: Vec<Vec2>,
    pub radii: Vec<f64>,
    pub colors: Vec<Color>,
    pub opacity: Vec<f64>,
}

impl InstanceLayer {
    pub fn len(&self) -> usize {
        self.element_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.element_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProbeSample {
    /// `"block.port"`.
    pub label: String,
    pub value: Value,
}

/// Everything the renderer needs for one tick.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderFrame {
    pub frame: u64,
    /// Program generation that produced this frame; bumped by every applied swap.
    pub generation: u64,
    /// Seconds since the first frame.
    pub time: f64,
    pub layers: Vec<InstanceLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeSample>,
}

impl RenderFrame {
    pub fn layer(&self, sink: &str) -> Option<&InstanceLayer> {
        self.layers.iter().find(|l| l.sink == sink)
    }

    pub fn probe(&self, label: &str) -> Option<Value> {
        self.probes.iter().find(|p| p.label == label).map(|p| p.value)
    }
}
