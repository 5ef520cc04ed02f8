use crate::compile::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::compile::link::LinkedIr;
use crate::foundation::ids::{
    BusIdx, DomainIdx, FieldId, IndexOverflow, ProbeIdx, SigId, SinkIdx, idx_u32,
};
use crate::ir::field::FieldExpr;
use crate::ir::program::{BusSource, ScheduleStep, SlotMeta, SlotOwner, SlotRange, SlotTable};
use crate::ir::signal::SignalExpr;
use crate::types::descriptor::{TypeDesc, World};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Node of the step graph. The derived order is the tie-break between ready steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum StepKey {
    Time,
    Sig(SigId),
    Bus(BusIdx),
    StateWrite(u32),
    Field(FieldId, DomainIdx),
    Sink(SinkIdx),
    Probe(ProbeIdx),
}

#[derive(Default)]
struct Live {
    sigs: BTreeSet<SigId>,
    fields: BTreeSet<FieldId>,
    buses: BTreeSet<BusIdx>,
}

fn mark_live(linked: &LinkedIr, bus_tys: &[TypeDesc]) -> Result<Live, IndexOverflow> {
    let mut live = Live::default();
    let mut sig_work: Vec<SigId> = Vec::new();
    let mut field_work: Vec<FieldId> = Vec::new();

    for k in &linked.sinks {
        field_work.extend(k.fields());
    }
    sig_work.extend(linked.probes.iter().map(|p| p.sig));
    sig_work.extend(linked.state_writes.iter().map(|&(_, s)| s));
    // Stateful nodes advance every frame whether or not anything reads them.
    for (i, n) in linked.sigs.iter().enumerate() {
        if n.expr.is_stateful() {
            sig_work.push(SigId(idx_u32(i)?));
        }
    }

    loop {
        if let Some(s) = sig_work.pop() {
            if !live.sigs.insert(s) {
                continue;
            }
            let node = &linked.sigs[s.0 as usize];
            sig_work.extend(node.expr.children());
            if let SignalExpr::BusRead(b) = node.expr {
                live.buses.insert(b);
                for src in &linked.bus_sources[b.0 as usize] {
                    match *src {
                        BusSource::Signal(x) => sig_work.push(x),
                        BusSource::Field(f) => field_work.push(f),
                    }
                }
            }
            continue;
        }
        if let Some(f) = field_work.pop() {
            if !live.fields.insert(f) {
                continue;
            }
            let node = &linked.fields[f.0 as usize];
            field_work.extend(node.expr.children());
            match node.expr {
                FieldExpr::Broadcast { sig, .. } => sig_work.push(sig),
                FieldExpr::BusRead(b) => {
                    if bus_tys[b.0 as usize].world == World::Field {
                        live.buses.insert(b);
                    }
                    for src in &linked.bus_sources[b.0 as usize] {
                        match *src {
                            BusSource::Signal(x) => sig_work.push(x),
                            BusSource::Field(x) => field_work.push(x),
                        }
                    }
                }
                _ => {}
            }
            continue;
        }
        break;
    }
    Ok(live)
}

/// Signals a field tree reads directly, through broadcasts and field-bus publishers.
fn field_signal_deps(linked: &LinkedIr, root: FieldId) -> BTreeSet<SigId> {
    let mut out = BTreeSet::new();
    let mut seen = HashSet::new();
    let mut work = vec![root];
    while let Some(f) = work.pop() {
        if !seen.insert(f) {
            continue;
        }
        let node = &linked.fields[f.0 as usize];
        work.extend(node.expr.children());
        match node.expr {
            FieldExpr::Broadcast { sig, .. } => {
                out.insert(sig);
            }
            FieldExpr::BusRead(b) => {
                for src in &linked.bus_sources[b.0 as usize] {
                    match *src {
                        BusSource::Field(x) => work.push(x),
                        BusSource::Signal(x) => {
                            out.insert(x);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Order every live step topologically and allocate value slots in that order.
#[tracing::instrument(skip_all)]
pub(crate) fn build_schedule(
    linked: &LinkedIr,
    bus_tys: &[TypeDesc],
) -> Result<(Vec<ScheduleStep>, SlotTable), Diagnostics> {
    let mut errors = Diagnostics::default();

    let mut seen_sinks = BTreeSet::new();
    for k in &linked.sinks {
        if !seen_sinks.insert(k.block.as_str()) {
            errors.push(
                Diagnostic::error(
                    DiagnosticCode::InternalDuplicateSink,
                    format!("render sink '{}' was emitted more than once", k.block),
                )
                .at_block(&k.block),
            );
        }
    }

    let live = mark_live(linked, bus_tys)?;

    // deps[step] = steps that must run before it.
    let mut deps: BTreeMap<StepKey, BTreeSet<StepKey>> = BTreeMap::new();
    deps.insert(StepKey::Time, BTreeSet::new());
    for &s in &live.sigs {
        let node = &linked.sigs[s.0 as usize];
        let mut d: BTreeSet<StepKey> = node.expr.children().into_iter().map(StepKey::Sig).collect();
        match node.expr {
            SignalExpr::TimeRef(_) | SignalExpr::Integrate { .. } => {
                d.insert(StepKey::Time);
            }
            SignalExpr::BusRead(b) => {
                d.insert(StepKey::Bus(b));
            }
            _ => {}
        }
        deps.insert(StepKey::Sig(s), d);
    }
    for &b in &live.buses {
        if bus_tys[b.0 as usize].world == World::Field {
            continue;
        }
        let d = linked.bus_sources[b.0 as usize]
            .iter()
            .filter_map(|src| match *src {
                BusSource::Signal(x) => Some(StepKey::Sig(x)),
                BusSource::Field(_) => None,
            })
            .collect();
        deps.insert(StepKey::Bus(b), d);
    }
    for (i, &(_, src)) in linked.state_writes.iter().enumerate() {
        deps.insert(StepKey::StateWrite(idx_u32(i)?), BTreeSet::from([StepKey::Sig(src)]));
    }
    for (ki, k) in linked.sinks.iter().enumerate() {
        let mut sink_deps = BTreeSet::new();
        for f in k.fields() {
            let key = StepKey::Field(f, k.domain);
            sink_deps.insert(key);
            deps.entry(key).or_insert_with(|| {
                field_signal_deps(linked, f)
                    .into_iter()
                    .map(StepKey::Sig)
                    .collect()
            });
        }
        deps.insert(StepKey::Sink(SinkIdx(idx_u32(ki)?)), sink_deps);
    }
    for (pi, p) in linked.probes.iter().enumerate() {
        deps.insert(
            StepKey::Probe(ProbeIdx(idx_u32(pi)?)),
            BTreeSet::from([StepKey::Sig(p.sig)]),
        );
    }

    // Kahn, smallest ready key first.
    let mut indegree: BTreeMap<StepKey, usize> = BTreeMap::new();
    let mut users: BTreeMap<StepKey, Vec<StepKey>> = BTreeMap::new();
    for (&k, ds) in &deps {
        indegree.insert(k, ds.len());
        for &d in ds {
            users.entry(d).or_default().push(k);
        }
    }
    let mut ready: BTreeSet<StepKey> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut order = Vec::with_capacity(deps.len());
    while let Some(k) = ready.pop_first() {
        order.push(k);
        for u in users.get(&k).into_iter().flatten() {
            if let Some(n) = indegree.get_mut(u) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(*u);
                }
            }
        }
    }
    if order.len() != deps.len() {
        let stuck = deps.len() - order.len();
        errors.push(Diagnostic::error(
            DiagnosticCode::InternalScheduleCycle,
            format!("{stuck} steps are unreachable in dependency order"),
        ));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // Slots are handed out in execution order.
    let mut slots = SlotTable {
        meta: Vec::new(),
        sig_slots: vec![None; linked.sigs.len()],
        bus_slots: vec![None; bus_tys.len()],
    };
    let mut alloc = |slots: &mut SlotTable, ty: TypeDesc, owner: SlotOwner| {
        let start = idx_u32(slots.meta.len())?;
        let len = ty.element_arity() as u32;
        for c in 0..len {
            slots.meta.push(SlotMeta {
                ty,
                owner,
                component: c as u8,
            });
        }
        Ok::<_, IndexOverflow>(SlotRange { start, len })
    };

    let mut steps = Vec::with_capacity(order.len());
    for k in order {
        steps.push(match k {
            StepKey::Time => ScheduleStep::TimeDerive,
            StepKey::Sig(s) => {
                let ty = linked.sigs[s.0 as usize].ty;
                let out = alloc(&mut slots, ty, SlotOwner::Signal(s))?;
                slots.sig_slots[s.0 as usize] = Some(out);
                ScheduleStep::SignalEval { node: s, out }
            }
            StepKey::Bus(b) => {
                let out = alloc(&mut slots, bus_tys[b.0 as usize], SlotOwner::Bus(b))?;
                slots.bus_slots[b.0 as usize] = Some(out);
                ScheduleStep::BusCombine { bus: b, out }
            }
            StepKey::StateWrite(i) => {
                let (state, src) = linked.state_writes[i as usize];
                ScheduleStep::StateWrite { state, src }
            }
            StepKey::Field(field, domain) => ScheduleStep::FieldMaterialize { field, domain },
            StepKey::Sink(sink) => ScheduleStep::RenderAssemble { sink },
            StepKey::Probe(probe) => ScheduleStep::DebugProbe { probe },
        });
    }

    verify_slot_writes(&steps, &slots)?;
    tracing::debug!(steps = steps.len(), slots = slots.len(), "schedule built");
    Ok((steps, slots))
}

/// Every slot a step writes must have been allocated for that step's owner.
pub(crate) fn verify_slot_writes(steps: &[ScheduleStep], slots: &SlotTable) -> Result<(), Diagnostics> {
    let mut errors = Diagnostics::default();
    for (i, step) in steps.iter().enumerate() {
        let (owner, out) = match *step {
            ScheduleStep::SignalEval { node, out } => (SlotOwner::Signal(node), out),
            ScheduleStep::BusCombine { bus, out } => (SlotOwner::Bus(bus), out),
            _ => continue,
        };
        let ok = out.len > 0
            && out.as_range().all(|s| {
                slots
                    .meta
                    .get(s)
                    .is_some_and(|m| m.owner == owner && m.ty.element_arity() == out.len as usize)
            });
        if !ok {
            errors.push(Diagnostic::error(
                DiagnosticCode::InternalUnregisteredSlot,
                format!("step T{i} writes slots {:?} without matching slot metadata", out.as_range()),
            ));
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/schedule.rs"]
mod tests;
