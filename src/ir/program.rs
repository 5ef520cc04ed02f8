use crate::compile::diagnostics::Diagnostics;
use crate::domain::element::ElementDomain;
use crate::foundation::ids::{
    BusIdx, DomainIdx, FieldId, ProbeIdx, SigId, SinkIdx, StateIdx, StateKey, idx_u32,
};
use crate::foundation::math::{LAST_PHASE, StableHasher, wrap_phase};
use crate::ir::field::FieldNode;
use crate::ir::signal::SignalNode;
use crate::types::combine::CombineMode;
use crate::types::descriptor::TypeDesc;
use crate::types::value::Value;
use std::fmt::Write as _;

/// Time topology of the patch's single time authority.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeModel {
    /// Plays once; phase saturates at 1 after `duration` seconds.
    Finite { duration: f64 },
    /// Loops every `period` seconds.
    Cyclic { period: f64 },
    /// Runs forever; `period` only shapes the phase output.
    Infinite { period: f64 },
}

impl TimeModel {
    pub(crate) fn phase_at(self, t: f64) -> f64 {
        match self {
            TimeModel::Finite { duration } => {
                if duration <= 0.0 {
                    LAST_PHASE
                } else {
                    (t / duration).clamp(0.0, LAST_PHASE)
                }
            }
            TimeModel::Cyclic { period } | TimeModel::Infinite { period } => {
                wrap_phase(t / period)
            }
        }
    }

    /// Index of the cycle containing `t`; finite timelines have a single cycle.
    pub(crate) fn cycle_at(self, t: f64) -> i64 {
        match self {
            TimeModel::Finite { .. } => 0,
            TimeModel::Cyclic { period } | TimeModel::Infinite { period } => {
                (t / period).floor() as i64
            }
        }
    }
}

/// Contiguous run of `f64` slots holding one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlotRange {
    pub(crate) start: u32,
    pub(crate) len: u32,
}

impl SlotRange {
    pub(crate) fn as_range(self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotOwner {
    Signal(SigId),
    Bus(BusIdx),
}

/// Metadata recorded for every allocated slot. Slot `i` of an arity-N value carries
/// `component = i - start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotMeta {
    pub(crate) ty: TypeDesc,
    pub(crate) owner: SlotOwner,
    pub(crate) component: u8,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SlotTable {
    pub(crate) meta: Vec<SlotMeta>,
    pub(crate) sig_slots: Vec<Option<SlotRange>>,
    pub(crate) bus_slots: Vec<Option<SlotRange>>,
}

impl SlotTable {
    pub(crate) fn len(&self) -> usize {
        self.meta.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BusSource {
    Signal(SigId),
    Field(FieldId),
}

#[derive(Debug, Clone)]
pub(crate) struct BusEntry {
    pub(crate) id: String,
    pub(crate) ty: TypeDesc,
    pub(crate) combine: CombineMode,
    pub(crate) silent: Value,
    pub(crate) reserved: bool,
    /// Active publishers in combine order, with their transforms already applied.
    pub(crate) sources: Vec<BusSource>,
    pub(crate) source_labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct StateDecl {
    pub(crate) key: StateKey,
    pub(crate) block: String,
    pub(crate) port: String,
    pub(crate) initial: Value,
}

#[derive(Debug, Clone)]
pub(crate) struct RenderSinkDecl {
    pub(crate) block: String,
    pub(crate) domain: DomainIdx,
    pub(crate) position: FieldId,
    pub(crate) radius: FieldId,
    pub(crate) color: FieldId,
    pub(crate) opacity: FieldId,
}

impl RenderSinkDecl {
    pub(crate) fn fields(&self) -> [FieldId; 4] {
        [self.position, self.radius, self.color, self.opacity]
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ProbeDecl {
    pub(crate) label: String,
    pub(crate) sig: SigId,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ScheduleStep {
    TimeDerive,
    SignalEval { node: SigId, out: SlotRange },
    BusCombine { bus: BusIdx, out: SlotRange },
    StateWrite { state: StateIdx, src: SigId },
    FieldMaterialize { field: FieldId, domain: DomainIdx },
    RenderAssemble { sink: SinkIdx },
    DebugProbe { probe: ProbeIdx },
}

/// 128-bit xxh3 digest of a program's deterministic dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramFingerprint {
    pub hi: u64,
    pub lo: u64,
}

impl std::fmt::Display for ProgramFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// Output of a successful compile. Immutable; executed once per frame.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub(crate) seed: u64,
    pub(crate) time_model: TimeModel,
    pub(crate) sigs: Vec<SignalNode>,
    pub(crate) fields: Vec<FieldNode>,
    pub(crate) domains: Vec<ElementDomain>,
    pub(crate) buses: Vec<BusEntry>,
    pub(crate) states: Vec<StateDecl>,
    pub(crate) sinks: Vec<RenderSinkDecl>,
    pub(crate) probes: Vec<ProbeDecl>,
    pub(crate) schedule: Vec<ScheduleStep>,
    pub(crate) slots: SlotTable,
    pub(crate) warnings: Diagnostics,
}

impl CompiledProgram {
    pub fn time_model(&self) -> TimeModel {
        self.time_model
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn step_count(&self) -> usize {
        self.schedule.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Warnings carried by an otherwise successful compile.
    pub fn warnings(&self) -> &Diagnostics {
        &self.warnings
    }

    /// `(block, port)` of every stateful memory cell, in declaration order.
    pub fn state_cells(&self) -> impl Iterator<Item = (&str, &str)> {
        self.states
            .iter()
            .map(|s| (s.block.as_str(), s.port.as_str()))
    }

    pub fn bus_ids(&self) -> impl Iterator<Item = &str> {
        self.buses.iter().map(|b| b.id.as_str())
    }

    pub(crate) fn state_by_key(&self, key: StateKey) -> Option<StateIdx> {
        self.states
            .iter()
            .position(|s| s.key == key)
            .and_then(|i| idx_u32(i).ok())
            .map(StateIdx)
    }

    pub fn dump(&self) -> String {
        // Deterministic debug dump used by determinism gates.
        // Never prints addresses or hash-map iteration order.
        let mut s = String::new();
        let _ = writeln!(s, "CompiledProgram");
        let _ = writeln!(s, "seed: {}", self.seed);
        let _ = writeln!(s, "time: {:?}", self.time_model);

        let _ = writeln!(s, "domains: {}", self.domains.len());
        for (i, d) in self.domains.iter().enumerate() {
            let _ = writeln!(
                s,
                "  D{i}: owner={} count={} shape={:?} identity={:016x}",
                d.owner(),
                d.count(),
                d.shape(),
                d.identity()
            );
        }

        let _ = writeln!(s, "buses: {}", self.buses.len());
        for (i, b) in self.buses.iter().enumerate() {
            let _ = writeln!(
                s,
                "  B{i}: {} {} combine={} silent={:?} reserved={} publishers=[{}]",
                b.id,
                b.ty,
                b.combine.name(),
                b.silent,
                b.reserved,
                b.source_labels.join(", ")
            );
        }

        let _ = writeln!(s, "signals: {}", self.sigs.len());
        for (i, n) in self.sigs.iter().enumerate() {
            let _ = writeln!(s, "  N{i}: {} {:?}", n.ty, n.expr);
        }

        let _ = writeln!(s, "fields: {}", self.fields.len());
        for (i, n) in self.fields.iter().enumerate() {
            let _ = writeln!(
                s,
                "  F{i}: {} domain={:?} {:?}",
                n.ty,
                n.domain.map(|d| d.0),
                n.expr
            );
        }

        let _ = writeln!(s, "states: {}", self.states.len());
        for (i, st) in self.states.iter().enumerate() {
            let _ = writeln!(
                s,
                "  M{i}: {}.{} key={:016x} initial={:?}",
                st.block, st.port, st.key.0, st.initial
            );
        }

        let _ = writeln!(s, "slots: {}", self.slots.len());
        for (i, m) in self.slots.meta.iter().enumerate() {
            let _ = writeln!(
                s,
                "  S{i}: {} owner={:?} component={}",
                m.ty, m.owner, m.component
            );
        }

        let _ = writeln!(s, "sinks: {}", self.sinks.len());
        for (i, k) in self.sinks.iter().enumerate() {
            let _ = writeln!(
                s,
                "  K{i}: {} domain=D{} fields={:?}",
                k.block,
                k.domain.0,
                k.fields().map(|f| f.0)
            );
        }

        let _ = writeln!(s, "probes: {}", self.probes.len());
        for (i, p) in self.probes.iter().enumerate() {
            let _ = writeln!(s, "  P{i}: {} N{}", p.label, p.sig.0);
        }

        let _ = writeln!(s, "steps: {}", self.schedule.len());
        for (i, step) in self.schedule.iter().enumerate() {
            let _ = writeln!(s, "  T{i}: {step:?}");
        }
        s
    }

    pub fn fingerprint(&self) -> ProgramFingerprint {
        let mut h = StableHasher::new();
        h.write_str(&self.dump());
        let (hi, lo) = h.finish_u128();
        ProgramFingerprint { hi, lo }
    }
}
