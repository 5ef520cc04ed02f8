use crate::blocks::registry::{Params, PortSpec};
use crate::compile::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::compile::topology::Topology;
use crate::compile::typecheck::{InputBindings, InputSource};
use crate::domain::element::{ElementDomain, FieldSource};
use crate::foundation::ids::{
    BlockIdx, DomainIdx, FieldId, IndexOverflow, SigId, StateIdx, StateKey, idx_u32,
};
use crate::ir::field::{FieldExpr, FieldNode, MapOp};
use crate::ir::program::{BusSource, RenderSinkDecl, StateDecl, TimeModel};
use crate::ir::signal::{BinaryOp, OutKey, SignalExpr, SignalNode, TimeChannel, UnaryOp};
use crate::normalize::ir::{PatchIR, PortIR};
use crate::types::adapter::AdapterOp;
use crate::types::descriptor::{Domain, TypeDesc, World};
use crate::types::value::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputRef {
    Signal(SigId),
    Field(FieldId),
    Domain(DomainIdx),
}

/// Failure reported by a block's lowering.
#[derive(Debug, Clone)]
pub struct LowerError {
    pub(crate) code: DiagnosticCode,
    pub(crate) message: String,
}

impl LowerError {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn mismatch(message: String) -> Self {
        Self::new(DiagnosticCode::TypeMismatch, message)
    }
}

impl From<String> for LowerError {
    fn from(message: String) -> Self {
        Self::new(DiagnosticCode::LoweringFailed, message)
    }
}

impl From<IndexOverflow> for LowerError {
    fn from(e: IndexOverflow) -> Self {
        Self::new(DiagnosticCode::InternalIndexOverflow, e.to_string())
    }
}

/// Arenas filled by lowering. Still contains `InputRef` placeholders until link resolution.
#[derive(Debug, Default)]
pub(crate) struct IrBuilder {
    pub(crate) sigs: Vec<SignalNode>,
    pub(crate) fields: Vec<FieldNode>,
    pub(crate) domains: Vec<ElementDomain>,
    pub(crate) states: Vec<StateDecl>,
    pub(crate) state_writes: Vec<(StateIdx, SigId)>,
    pub(crate) sinks: Vec<RenderSinkDecl>,
    pub(crate) outputs: HashMap<OutKey, OutputRef>,
    /// Lowered source of each normalized publisher, same indexing.
    pub(crate) publishers: Vec<BusSource>,
}

impl IrBuilder {
    fn push_sig(&mut self, expr: SignalExpr, ty: TypeDesc) -> Result<SigId, IndexOverflow> {
        let id = SigId(idx_u32(self.sigs.len())?);
        self.sigs.push(SignalNode { expr, ty });
        Ok(id)
    }

    fn push_field(&mut self, expr: FieldExpr, ty: TypeDesc) -> Result<FieldId, IndexOverflow> {
        let id = FieldId(idx_u32(self.fields.len())?);
        self.fields.push(FieldNode {
            expr,
            ty,
            domain: None,
        });
        Ok(id)
    }

    fn sig_chain(
        &mut self,
        mut id: SigId,
        mut ty: TypeDesc,
        chain: &[AdapterOp],
    ) -> Result<SigId, LowerError> {
        for &op in chain {
            ty = op.apply_type(ty)?;
            id = self.push_sig(SignalExpr::Adapter { op, x: id }, ty)?;
        }
        Ok(id)
    }

    fn field_chain(
        &mut self,
        mut id: FieldId,
        mut ty: TypeDesc,
        chain: &[AdapterOp],
    ) -> Result<FieldId, LowerError> {
        for &op in chain {
            ty = op.apply_type(ty)?;
            id = self.push_field(
                FieldExpr::Map {
                    input: id,
                    op: MapOp::Adapter(op),
                },
                ty,
            )?;
        }
        Ok(id)
    }
}

/// What a block sees while lowering: its params, its resolved inputs and the node builders.
///
/// Every builder checks its operand types, so a block cannot emit an ill-typed node.
pub struct LowerCtx<'a> {
    ir: &'a PatchIR<'a>,
    block: BlockIdx,
    bindings: &'a [Option<InputSource>],
    b: &'a mut IrBuilder,
    max_elements: u32,
}

impl<'a> LowerCtx<'a> {
    pub fn block_id(&self) -> &str {
        &self.ir.block(self.block).id
    }

    pub fn params(&self) -> Params<'_> {
        Params::new(&self.ir.block(self.block).params)
    }

    pub fn seed(&self) -> u64 {
        self.ir.seed
    }

    pub fn time_model(&self) -> Option<TimeModel> {
        self.ir.block(self.block).sig.time_model
    }

    fn input(&self, port: &str) -> Result<(&'a PortSpec, &'a InputSource), LowerError> {
        let blk = self.ir.block(self.block);
        let (i, spec) = blk.sig.find_input(port).ok_or_else(|| {
            LowerError::new(
                DiagnosticCode::UnknownPort,
                format!("block '{}' has no input '{port}'", blk.id),
            )
        })?;
        let src = self.bindings[i].as_ref().ok_or_else(|| {
            LowerError::new(
                DiagnosticCode::UnresolvedInput,
                format!("input {}.{port} is unbound", blk.id),
            )
        })?;
        Ok((spec, src))
    }

    fn out_key(&self, p: PortIR) -> OutKey {
        OutKey {
            block: p.block,
            port: p.port,
        }
    }

    /// Signal (or event) node for an input, with wire or listener transforms applied.
    pub fn input_sig(&mut self, port: &str) -> Result<SigId, LowerError> {
        let (spec, src) = self.input(port)?;
        if !matches!(spec.ty.world, World::Signal | World::Event | World::Scalar)
            || spec.ty.domain == Domain::Elements
        {
            return Err(format!("input '{port}' is {}, not a signal", spec.ty).into());
        }
        let id = match src {
            InputSource::Wire { from, transforms } => {
                let src_ty = self
                    .ir
                    .output_spec(*from)
                    .map(|s| s.ty)
                    .ok_or_else(|| format!("wire source {} is not an output", self.ir.describe(*from)))?;
                let key = self.out_key(*from);
                let r = self.b.push_sig(SignalExpr::InputRef(key), src_ty)?;
                self.b.sig_chain(r, src_ty, transforms)?
            }
            InputSource::Bus { bus, transforms } => {
                let ty = self.ir.bus(*bus).ty;
                let r = self.b.push_sig(SignalExpr::BusRead(*bus), ty)?;
                self.b.sig_chain(r, ty, transforms)?
            }
            InputSource::Default(v) => {
                let world = if spec.ty.world == World::Event {
                    World::Event
                } else {
                    World::Signal
                };
                self.b
                    .push_sig(SignalExpr::Const(*v), TypeDesc::new(world, v.domain()))?
            }
        };
        Ok(id)
    }

    /// Field node for an input, with wire or listener transforms applied.
    pub fn input_field(&mut self, port: &str) -> Result<FieldId, LowerError> {
        let (spec, src) = self.input(port)?;
        if spec.ty.world != World::Field {
            return Err(format!("input '{port}' is {}, not a field", spec.ty).into());
        }
        let id = match src {
            InputSource::Wire { from, transforms } => {
                let src_ty = self
                    .ir
                    .output_spec(*from)
                    .map(|s| s.ty)
                    .ok_or_else(|| format!("wire source {} is not an output", self.ir.describe(*from)))?;
                let key = self.out_key(*from);
                let r = self.b.push_field(FieldExpr::InputRef(key), src_ty)?;
                self.b.field_chain(r, src_ty, transforms)?
            }
            InputSource::Bus { bus, transforms } => {
                let ty = self.ir.bus(*bus).ty;
                let r = self.b.push_field(FieldExpr::BusRead(*bus), ty)?;
                self.b.field_chain(r, ty, transforms)?
            }
            InputSource::Default(v) => self
                .b
                .push_field(FieldExpr::Const(*v), TypeDesc::field(v.domain()))?,
        };
        Ok(id)
    }

    /// Element domain wired into `port`. Domain sources are always lowered before their
    /// consumers, so this resolves immediately.
    pub fn input_domain(&self, port: &str) -> Result<DomainIdx, LowerError> {
        let (spec, src) = self.input(port)?;
        if spec.ty.domain != Domain::Elements {
            return Err(format!("input '{port}' is {}, not an element domain", spec.ty).into());
        }
        let InputSource::Wire { from, .. } = src else {
            return Err(format!("element domain input '{port}' must be wired").into());
        };
        match self.b.outputs.get(&self.out_key(*from)) {
            Some(OutputRef::Domain(d)) => Ok(*d),
            Some(_) => Err(format!("{} is not an element domain", self.ir.describe(*from)).into()),
            None => Err(LowerError::new(
                DiagnosticCode::UnresolvedReference,
                format!(
                    "{} is declared but was never lowered",
                    self.ir.describe(*from)
                ),
            )),
        }
    }

    fn sig(&mut self, expr: SignalExpr, ty: TypeDesc) -> Result<SigId, LowerError> {
        Ok(self.b.push_sig(expr, ty)?)
    }

    fn field(&mut self, expr: FieldExpr, ty: TypeDesc) -> Result<FieldId, LowerError> {
        Ok(self.b.push_field(expr, ty)?)
    }

    pub fn sig_type(&self, id: SigId) -> TypeDesc {
        self.b.sigs[id.0 as usize].ty
    }

    pub fn field_type(&self, id: FieldId) -> TypeDesc {
        self.b.fields[id.0 as usize].ty
    }

    /// Value domain of a non-event signal operand.
    fn operand(&self, id: SigId, what: &str) -> Result<Domain, LowerError> {
        let ty = self.sig_type(id);
        if ty.world == World::Event {
            return Err(LowerError::mismatch(format!("{what} cannot take an event ({ty})")));
        }
        Ok(ty.domain)
    }

    /// Constant signal. A trigger constant is an event.
    pub fn constant(&mut self, v: Value) -> Result<SigId, LowerError> {
        let ty = if v.domain() == Domain::Trigger {
            TypeDesc::event()
        } else {
            TypeDesc::signal(v.domain())
        };
        self.sig(SignalExpr::Const(v), ty)
    }

    pub fn time(&mut self, channel: TimeChannel) -> Result<SigId, LowerError> {
        let ty = match channel {
            TimeChannel::Time => TypeDesc::signal(Domain::Time),
            TimeChannel::Phase => TypeDesc::signal(Domain::Phase),
            TimeChannel::Wrap => TypeDesc::event(),
        };
        self.sig(SignalExpr::TimeRef(channel), ty)
    }

    pub fn unary(&mut self, op: UnaryOp, x: SigId) -> Result<SigId, LowerError> {
        let d = self.operand(x, "unary op")?;
        let out = op.output_domain(d).ok_or_else(|| {
            LowerError::mismatch(format!("{op:?} is not defined for {}", d.name()))
        })?;
        self.sig(SignalExpr::Unary { op, x }, TypeDesc::signal(out))
    }

    /// Componentwise op over two signals of one value domain.
    pub fn binary(&mut self, op: BinaryOp, a: SigId, b: SigId) -> Result<SigId, LowerError> {
        let (da, db) = (self.operand(a, "binary op")?, self.operand(b, "binary op")?);
        if da != db || !op.accepts(da) {
            return Err(LowerError::mismatch(format!(
                "{op:?} is not defined for {} and {}",
                da.name(),
                db.name()
            )));
        }
        self.sig(SignalExpr::Binary { op, a, b }, TypeDesc::signal(da))
    }

    pub fn adapt(&mut self, op: AdapterOp, x: SigId) -> Result<SigId, LowerError> {
        let ty = self.sig_type(x);
        self.b.sig_chain(x, ty, &[op])
    }

    pub fn pack_vec2(&mut self, x: SigId, y: SigId) -> Result<SigId, LowerError> {
        for id in [x, y] {
            let d = self.operand(id, "vec2 component")?;
            if d != Domain::Number {
                return Err(LowerError::mismatch(format!(
                    "vec2 components are numbers, got {}",
                    d.name()
                )));
            }
        }
        self.sig(SignalExpr::PackVec2 { x, y }, TypeDesc::signal(Domain::Vec2))
    }

    fn state_domain(&self, state: StateIdx) -> Domain {
        self.b.states[state.0 as usize].initial.domain()
    }

    /// `memory + rate * dt`, staged into `state` each frame.
    pub fn integrate(&mut self, state: StateIdx, rate: SigId) -> Result<SigId, LowerError> {
        let d = self.operand(rate, "integrate")?;
        if d != Domain::Number || self.state_domain(state) != Domain::Number {
            return Err(LowerError::mismatch(format!(
                "integrate needs a number rate and memory, got {}",
                d.name()
            )));
        }
        self.sig(
            SignalExpr::Integrate { state, rate },
            TypeDesc::signal(Domain::Number),
        )
    }

    /// Previous frame's committed value of `state`. Pair with [`LowerCtx::state_write`].
    pub fn delay(&mut self, state: StateIdx) -> Result<SigId, LowerError> {
        let d = self.state_domain(state);
        self.sig(SignalExpr::Delay { state }, TypeDesc::signal(d))
    }

    pub fn field_source(&mut self, domain: DomainIdx, source: FieldSource) -> Result<FieldId, LowerError> {
        let d = match source {
            FieldSource::Index | FieldSource::Random => Domain::Number,
            FieldSource::Position => Domain::Vec2,
        };
        self.field(FieldExpr::Source { domain, source }, TypeDesc::field(d))
    }

    /// A signal's current value at every element of `domain`.
    pub fn broadcast(&mut self, domain: DomainIdx, sig: SigId) -> Result<FieldId, LowerError> {
        let d = self.operand(sig, "broadcast")?;
        self.field(FieldExpr::Broadcast { domain, sig }, TypeDesc::field(d))
    }

    pub fn field_map(&mut self, input: FieldId, op: MapOp) -> Result<FieldId, LowerError> {
        let ty = self.field_type(input);
        let out = match op {
            MapOp::Unary(u) => u
                .output_domain(ty.domain)
                .map(TypeDesc::field)
                .ok_or_else(|| LowerError::mismatch(format!("{u:?} is not defined for {ty}")))?,
            MapOp::Adapter(a) => a.apply_type(ty).map_err(LowerError::mismatch)?,
        };
        self.field(FieldExpr::Map { input, op }, out)
    }

    pub fn field_zip(&mut self, a: FieldId, b: FieldId, op: BinaryOp) -> Result<FieldId, LowerError> {
        let (ta, tb) = (self.field_type(a), self.field_type(b));
        if ta.domain != tb.domain || !op.accepts(ta.domain) {
            return Err(LowerError::mismatch(format!(
                "{op:?} is not defined for {ta} and {tb}"
            )));
        }
        self.field(FieldExpr::Zip { a, b, op }, TypeDesc::field(ta.domain))
    }

    fn register(&mut self, port: &str, ty: TypeDesc, r: OutputRef) -> Result<(), LowerError> {
        let blk = self.ir.block(self.block);
        let Some(spec) = blk.sig.find_output(port) else {
            return Err(LowerError::new(
                DiagnosticCode::UndeclaredOutput,
                format!("block '{}' lowered undeclared output '{port}'", blk.id),
            ));
        };
        if !(ty == spec.ty || ty.can_drive(spec.ty)) {
            return Err(format!(
                "output {}.{port} lowered as {ty}, declared {}",
                blk.id, spec.ty
            )
            .into());
        }
        let Some(port) = self.ir.ports.find(port) else {
            return Err(format!("output '{port}' is not a declared port name").into());
        };
        let key = OutKey {
            block: self.block,
            port,
        };
        if self.b.outputs.insert(key, r).is_some() {
            return Err(format!(
                "output {}.{} registered twice",
                blk.id,
                self.ir.ports.name(port)
            )
            .into());
        }
        Ok(())
    }

    pub fn output_sig(&mut self, port: &str, id: SigId) -> Result<(), LowerError> {
        let ty = self.sig_type(id);
        self.register(port, ty, OutputRef::Signal(id))
    }

    pub fn output_field(&mut self, port: &str, id: FieldId) -> Result<(), LowerError> {
        let ty = self.field_type(id);
        self.register(port, ty, OutputRef::Field(id))
    }

    pub fn output_domain(&mut self, port: &str, d: DomainIdx) -> Result<(), LowerError> {
        self.register(port, TypeDesc::elements(), OutputRef::Domain(d))
    }

    fn check_size(&self, count: u64) -> Result<u32, LowerError> {
        match u32::try_from(count) {
            Ok(n) if n <= self.max_elements => Ok(n),
            _ => Err(LowerError::new(
                DiagnosticCode::DomainTooLarge,
                format!(
                    "domain of {count} elements exceeds the limit of {}",
                    self.max_elements
                ),
            )),
        }
    }

    fn domain(&mut self, d: ElementDomain) -> Result<DomainIdx, LowerError> {
        let id = DomainIdx(idx_u32(self.b.domains.len())?);
        self.b.domains.push(d);
        Ok(id)
    }

    /// Line of `count` elements owned by this block.
    pub fn line_domain(&mut self, count: u32) -> Result<DomainIdx, LowerError> {
        let count = self.check_size(u64::from(count))?;
        let d = ElementDomain::line(self.block_id(), count, self.seed());
        self.domain(d)
    }

    /// `rows x cols` grid owned by this block, row-major.
    pub fn grid_domain(&mut self, rows: u32, cols: u32, spacing: f64) -> Result<DomainIdx, LowerError> {
        self.check_size(u64::from(rows) * u64::from(cols))?;
        let d = ElementDomain::grid(self.block_id(), rows, cols, spacing, self.seed());
        self.domain(d)
    }

    pub fn domain_len(&self, d: DomainIdx) -> usize {
        self.b.domains[d.0 as usize].count()
    }

    /// Declare a memory cell keyed by `(block id, port)`.
    pub fn state(&mut self, port: &str, initial: Value) -> Result<StateIdx, LowerError> {
        let block = self.block_id().to_owned();
        let id = StateIdx(idx_u32(self.b.states.len())?);
        self.b.states.push(StateDecl {
            key: StateKey::new(&block, port),
            block,
            port: port.to_owned(),
            initial,
        });
        Ok(id)
    }

    /// Capture `src` into `state` at the end of the frame.
    pub fn state_write(&mut self, state: StateIdx, src: SigId) -> Result<(), LowerError> {
        let (have, want) = (self.sig_type(src).domain, self.state_domain(state));
        if have != want {
            return Err(LowerError::mismatch(format!(
                "state holds {} but is written {}",
                want.name(),
                have.name()
            )));
        }
        self.b.state_writes.push((state, src));
        Ok(())
    }

    pub fn render_sink(
        &mut self,
        domain: DomainIdx,
        position: FieldId,
        radius: FieldId,
        color: FieldId,
        opacity: FieldId,
    ) -> Result<(), LowerError> {
        for (port, id, want) in [
            ("position", position, Domain::Vec2),
            ("radius", radius, Domain::Number),
            ("color", color, Domain::Color),
            ("opacity", opacity, Domain::Number),
        ] {
            let ty = self.field_type(id);
            if ty.domain != want {
                return Err(LowerError::mismatch(format!(
                    "render {port} must be a {} field, got {ty}",
                    want.name()
                )));
            }
        }
        let block = self.block_id().to_owned();
        self.b.sinks.push(RenderSinkDecl {
            block,
            domain,
            position,
            radius,
            color,
            opacity,
        });
        Ok(())
    }
}

/// Lower every block in dependency order, then every publisher.
#[tracing::instrument(skip_all)]
pub(crate) fn lower_all(
    ir: &PatchIR<'_>,
    bindings: &InputBindings,
    topo: &Topology,
    max_elements: u32,
) -> Result<IrBuilder, Diagnostics> {
    let mut errors = Diagnostics::default();
    let mut b = IrBuilder::default();

    for &block in &topo.order {
        let blk = ir.block(block);
        let mut cx = LowerCtx {
            ir,
            block,
            bindings: bindings.of(block),
            b: &mut b,
            max_elements,
        };
        if let Err(e) = blk.behavior.lower(&mut cx) {
            errors.push(
                Diagnostic::error(e.code, format!("lowering '{}' ({}): {}", blk.id, blk.kind, e.message))
                    .at_block(&blk.id),
            );
        }
    }

    for p in &ir.publishers {
        let key = OutKey {
            block: p.from.block,
            port: p.from.port,
        };
        let Some(spec) = ir.output_spec(p.from) else {
            continue;
        };
        let lowered = if spec.ty.world == World::Field {
            b.push_field(FieldExpr::InputRef(key), spec.ty)
                .map_err(LowerError::from)
                .and_then(|r| b.field_chain(r, spec.ty, &p.transforms))
                .map(BusSource::Field)
        } else {
            b.push_sig(SignalExpr::InputRef(key), spec.ty)
                .map_err(LowerError::from)
                .and_then(|r| b.sig_chain(r, spec.ty, &p.transforms))
                .map(BusSource::Signal)
        };
        match lowered {
            Ok(src) => b.publishers.push(src),
            Err(e) => errors.push(
                Diagnostic::error(e.code, e.message)
                    .at_port(&ir.block(p.from.block).id, ir.port_name(p.from)),
            ),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    tracing::debug!(
        signals = b.sigs.len(),
        fields = b.fields.len(),
        domains = b.domains.len(),
        states = b.states.len(),
        "lowered blocks"
    );
    Ok(b)
}
