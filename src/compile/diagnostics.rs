use crate::foundation::ids::IndexOverflow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Stable diagnostic codes. The string form is part of the editor-facing contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticCode {
    // Patch structure.
    DuplicateBlock,
    UnknownBlockKind,
    UnknownBlock,
    UnknownPort,
    BadParam,
    /// An element domain asks for more elements than `CompileOpts::max_elements`.
    DomainTooLarge,
    DuplicateBus,
    UnknownBus,
    UnknownProbe,
    // Types and contracts.
    TypeMismatch,
    DomainMismatch,
    BusCombineIncompatible,
    BusTypeUnsupported,
    ReservedBusContract,
    // Time topology and feedback.
    TimeRootMissing,
    TimeTopologyConflict,
    TimeRootUpstream,
    IllegalFeedback,
    PartialBuffering,
    // Lowering and linking.
    UnresolvedInput,
    MultipleDrivers,
    LoweringFailed,
    UndeclaredOutput,
    UnresolvedReference,
    // Compiler invariants.
    InternalUnregisteredSlot,
    InternalDuplicateSink,
    InternalScheduleCycle,
    InternalIndexOverflow,
    // Warnings.
    BusSilent,
    BusUnused,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::DuplicateBlock => "E_DUPLICATE_BLOCK",
            DiagnosticCode::UnknownBlockKind => "E_UNKNOWN_BLOCK_KIND",
            DiagnosticCode::UnknownBlock => "E_UNKNOWN_BLOCK",
            DiagnosticCode::UnknownPort => "E_UNKNOWN_PORT",
            DiagnosticCode::BadParam => "E_BAD_PARAM",
            DiagnosticCode::DomainTooLarge => "E_DOMAIN_TOO_LARGE",
            DiagnosticCode::DuplicateBus => "E_DUPLICATE_BUS",
            DiagnosticCode::UnknownBus => "E_UNKNOWN_BUS",
            DiagnosticCode::UnknownProbe => "E_UNKNOWN_PROBE",
            DiagnosticCode::TypeMismatch => "E_TYPE_MISMATCH",
            DiagnosticCode::DomainMismatch => "E_DOMAIN_MISMATCH",
            DiagnosticCode::BusCombineIncompatible => "E_BUS_COMBINE_INCOMPATIBLE",
            DiagnosticCode::BusTypeUnsupported => "E_BUS_TYPE_UNSUPPORTED",
            DiagnosticCode::ReservedBusContract => "E_RESERVED_BUS_CONTRACT",
            DiagnosticCode::TimeRootMissing => "E_TIME_ROOT_MISSING",
            DiagnosticCode::TimeTopologyConflict => "E_TIME_TOPOLOGY_CONFLICT",
            DiagnosticCode::TimeRootUpstream => "E_TIME_ROOT_UPSTREAM",
            DiagnosticCode::IllegalFeedback => "E_ILLEGAL_FEEDBACK",
            DiagnosticCode::PartialBuffering => "E_PARTIAL_BUFFERING",
            DiagnosticCode::UnresolvedInput => "E_UNRESOLVED_INPUT",
            DiagnosticCode::MultipleDrivers => "E_MULTIPLE_DRIVERS",
            DiagnosticCode::LoweringFailed => "E_LOWERING_FAILED",
            DiagnosticCode::UndeclaredOutput => "E_UNDECLARED_OUTPUT",
            DiagnosticCode::UnresolvedReference => "E_UNRESOLVED_REFERENCE",
            DiagnosticCode::InternalUnregisteredSlot => "E_INTERNAL_UNREGISTERED_SLOT",
            DiagnosticCode::InternalDuplicateSink => "E_INTERNAL_DUPLICATE_SINK",
            DiagnosticCode::InternalScheduleCycle => "E_INTERNAL_SCHEDULE_CYCLE",
            DiagnosticCode::InternalIndexOverflow => "E_INTERNAL_INDEX_OVERFLOW",
            DiagnosticCode::BusSilent => "W_BUS_SILENT",
            DiagnosticCode::BusUnused => "W_BUS_UNUSED",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for DiagnosticCode {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Where in the patch a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Block { block: String },
    Port { block: String, port: String },
    Bus { bus: String },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Block { block } => write!(f, "block '{block}'"),
            Location::Port { block, port } => write!(f, "port '{block}.{port}'"),
            Location::Bus { bus } => write!(f, "bus '{bus}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub locations: Vec<Location>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            locations: Vec::new(),
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn at_block(mut self, block: impl Into<String>) -> Self {
        self.locations.push(Location::Block {
            block: block.into(),
        });
        self
    }

    pub fn at_port(mut self, block: impl Into<String>, port: impl Into<String>) -> Self {
        self.locations.push(Location::Port {
            block: block.into(),
            port: port.into(),
        });
        self
    }

    pub fn at_bus(mut self, bus: impl Into<String>) -> Self {
        self.locations.push(Location::Bus { bus: bus.into() });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{sev}[{}]: {}", self.code, self.message)?;
        for (i, loc) in self.locations.iter().enumerate() {
            f.write_str(if i == 0 { " (at " } else { ", " })?;
            write!(f, "{loc}")?;
        }
        if !self.locations.is_empty() {
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Every diagnostic a compile produced, in pass order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, d: Diagnostic) {
        self.items.push(d);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|d| d.code == code)
    }

    pub(crate) fn promote_warnings(&mut self) {
        for d in &mut self.items {
            d.severity = Severity::Error;
        }
    }

    pub(crate) fn take_warnings(&mut self) -> Diagnostics {
        let (warnings, rest) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|d| d.severity == Severity::Warning);
        self.items = rest;
        Diagnostics { items: warnings }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

impl From<Diagnostic> for Diagnostics {
    fn from(d: Diagnostic) -> Self {
        Self { items: vec![d] }
    }
}

impl From<IndexOverflow> for Diagnostic {
    fn from(e: IndexOverflow) -> Self {
        Diagnostic::error(DiagnosticCode::InternalIndexOverflow, e.to_string())
    }
}

impl From<IndexOverflow> for Diagnostics {
    fn from(e: IndexOverflow) -> Self {
        Diagnostic::from(e).into()
    }
}
