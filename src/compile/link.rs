use crate::compile::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::compile::lower::{IrBuilder, OutputRef};
use crate::domain::element::ElementDomain;
use crate::foundation::ids::{BlockIdx, DomainIdx, FieldId, SigId, StateIdx, idx_u32};
use crate::ir::field::{FieldExpr, FieldNode};
use crate::ir::program::{BusSource, ProbeDecl, RenderSinkDecl, StateDecl};
use crate::ir::signal::{OutKey, SignalExpr, SignalNode};
use crate::normalize::ir::PatchIR;

/// Signal output to sample every frame, named by `(block id, port id)`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProbeDef {
    pub block: String,
    pub port: String,
}

/// Fully linked IR: no placeholders, dense arenas, every field bound to a domain (or none).
#[derive(Debug)]
pub(crate) struct LinkedIr {
    pub(crate) sigs: Vec<SignalNode>,
    pub(crate) fields: Vec<FieldNode>,
    pub(crate) domains: Vec<ElementDomain>,
    pub(crate) states: Vec<StateDecl>,
    pub(crate) state_writes: Vec<(StateIdx, SigId)>,
    pub(crate) sinks: Vec<RenderSinkDecl>,
    /// Publisher sources per bus, in combine order.
    pub(crate) bus_sources: Vec<Vec<BusSource>>,
    pub(crate) probes: Vec<ProbeDecl>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Follow `InputRef` chains to a concrete node. `target(i)` gives the next hop for placeholder
/// `i`, or `None` when `i` is concrete.
fn resolve_chains(
    n: usize,
    mut target: impl FnMut(usize) -> Result<Option<usize>, Diagnostic>,
) -> Result<Vec<usize>, Diagnostic> {
    let mut out = vec![usize::MAX; n];
    for start in 0..n {
        if out[start] != usize::MAX {
            continue;
        }
        let mut path = vec![start];
        let mut cur = start;
        let end = loop {
            if out[cur] != usize::MAX {
                break out[cur];
            }
            match target(cur)? {
                None => break cur,
                Some(next) => {
                    if path.contains(&next) {
                        return Err(Diagnostic::error(
                            DiagnosticCode::UnresolvedReference,
                            "placeholder chain refers back to itself",
                        ));
                    }
                    path.push(next);
                    cur = next;
                }
            }
        };
        for p in path {
            out[p] = end;
        }
    }
    Ok(out)
}

fn describe_key(ir: &PatchIR<'_>, key: OutKey) -> (String, String) {
    (
        ir.block(key.block).id.clone(),
        ir.ports.name(key.port).to_owned(),
    )
}

/// Rewrite every `InputRef` into a direct edge and compact the arenas.
#[tracing::instrument(skip_all)]
pub(crate) fn link(
    ir: &PatchIR<'_>,
    b: IrBuilder,
    probes: &[ProbeDef],
) -> Result<LinkedIr, Diagnostics> {
    let mut errors = Diagnostics::default();
    let unresolved = |key: OutKey, what: &str| {
        let (block, port) = describe_key(ir, key);
        Diagnostic::error(
            DiagnosticCode::UnresolvedReference,
            format!("{what} {block}.{port} cannot be resolved: declared but never lowered"),
        )
        .at_port(block, port)
    };

    let mismatched = |key: OutKey, want: &str| {
        let (block, port) = describe_key(ir, key);
        Diagnostic::error(
            DiagnosticCode::UnresolvedReference,
            format!("{block}.{port} is not a {want} output"),
        )
        .at_port(block, port)
    };

    let sig_final = resolve_chains(b.sigs.len(), |i| match b.sigs[i].expr {
        SignalExpr::InputRef(key) => match b.outputs.get(&key) {
            Some(OutputRef::Signal(t)) => Ok(Some(t.0 as usize)),
            Some(_) => Err(mismatched(key, "signal")),
            None => Err(unresolved(key, "signal reference")),
        },
        _ => Ok(None),
    });
    let field_final = resolve_chains(b.fields.len(), |i| match b.fields[i].expr {
        FieldExpr::InputRef(key) => match b.outputs.get(&key) {
            Some(OutputRef::Field(t)) => Ok(Some(t.0 as usize)),
            Some(_) => Err(mismatched(key, "field")),
            None => Err(unresolved(key, "field reference")),
        },
        _ => Ok(None),
    });
    let (sig_final, field_final) = match (sig_final, field_final) {
        (Ok(s), Ok(f)) => (s, f),
        (s, f) => {
            for d in s.err().into_iter().chain(f.err()) {
                errors.push(d);
            }
            return Err(errors);
        }
    };

    // Compact: concrete nodes keep their relative order.
    let mut sig_new = vec![SigId(u32::MAX); b.sigs.len()];
    let mut n = 0u32;
    for (i, node) in b.sigs.iter().enumerate() {
        if !matches!(node.expr, SignalExpr::InputRef(_)) {
            sig_new[i] = SigId(n);
            n += 1;
        }
    }
    let remap_sig = |s: SigId| sig_new[sig_final[s.0 as usize]];

    let mut field_new = vec![FieldId(u32::MAX); b.fields.len()];
    let mut n = 0u32;
    for (i, node) in b.fields.iter().enumerate() {
        if !matches!(node.expr, FieldExpr::InputRef(_)) {
            field_new[i] = FieldId(n);
            n += 1;
        }
    }
    let remap_field = |f: FieldId| field_new[field_final[f.0 as usize]];

    let sigs: Vec<SignalNode> = b
        .sigs
        .iter()
        .filter(|n| !matches!(n.expr, SignalExpr::InputRef(_)))
        .map(|n| SignalNode {
            expr: n.expr.map_children(remap_sig),
            ty: n.ty,
        })
        .collect();
    let mut fields: Vec<FieldNode> = b
        .fields
        .iter()
        .filter(|n| !matches!(n.expr, FieldExpr::InputRef(_)))
        .map(|n| {
            let expr = match n.expr.map_children(remap_field) {
                FieldExpr::Broadcast { domain, sig } => FieldExpr::Broadcast {
                    domain,
                    sig: remap_sig(sig),
                },
                other => other,
            };
            FieldNode {
                expr,
                ty: n.ty,
                domain: None,
            }
        })
        .collect();

    let bus_sources = {
        let mut per_bus: Vec<Vec<BusSource>> = vec![Vec::new(); ir.buses.len()];
        for (p, src) in ir.publishers.iter().zip(b.publishers.iter()) {
            per_bus[p.bus.0 as usize].push(match *src {
                BusSource::Signal(s) => BusSource::Signal(remap_sig(s)),
                BusSource::Field(f) => BusSource::Field(remap_field(f)),
            });
        }
        per_bus
    };

    let state_writes: Vec<(StateIdx, SigId)> = b
        .state_writes
        .iter()
        .map(|&(st, s)| (st, remap_sig(s)))
        .collect();

    let sinks: Vec<RenderSinkDecl> = b
        .sinks
        .iter()
        .map(|k| RenderSinkDecl {
            block: k.block.clone(),
            domain: k.domain,
            position: remap_field(k.position),
            radius: remap_field(k.radius),
            color: remap_field(k.color),
            opacity: remap_field(k.opacity),
        })
        .collect();

    let mut linked_probes = Vec::with_capacity(probes.len());
    for p in probes {
        let block = ir
            .blocks
            .iter()
            .position(|blk| blk.id == p.block)
            .map(idx_u32)
            .transpose()?;
        let key = block.zip(ir.ports.find(&p.port)).map(|(bi, port)| OutKey {
            block: BlockIdx(bi),
            port,
        });
        match key.and_then(|k| b.outputs.get(&k)) {
            Some(OutputRef::Signal(s)) => linked_probes.push(ProbeDecl {
                label: format!("{}.{}", p.block, p.port),
                sig: remap_sig(*s),
            }),
            _ => errors.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownProbe,
                    format!("probe {}.{} does not name a lowered signal output", p.block, p.port),
                )
                .at_port(&p.block, &p.port),
            ),
        }
    }

    infer_field_domains(ir, &mut fields, &bus_sources, &mut errors);
    for k in &sinks {
        for f in k.fields() {
            if let Some(d) = fields[f.0 as usize].domain
                && d != k.domain
            {
                errors.push(
                    Diagnostic::error(
                        DiagnosticCode::DomainMismatch,
                        format!(
                            "render sink '{}' draws domain '{}' but one of its fields is over '{}'",
                            k.block,
                            b.domains[k.domain.0 as usize].owner(),
                            b.domains[d.0 as usize].owner()
                        ),
                    )
                    .at_block(&k.block),
                );
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(LinkedIr {
        sigs,
        fields,
        domains: b.domains,
        states: b.states,
        state_writes,
        sinks,
        bus_sources,
        probes: linked_probes,
    })
}

/// A field's domain is the one its sources pin; mixing two different domains is an error.
fn infer_field_domains(
    ir: &PatchIR<'_>,
    fields: &mut [FieldNode],
    bus_sources: &[Vec<BusSource>],
    errors: &mut Diagnostics,
) {
    let mut marks = vec![Mark::Unvisited; fields.len()];
    for i in 0..fields.len() {
        match idx_u32(i) {
            Ok(f) => {
                visit(ir, fields, bus_sources, &mut marks, errors, FieldId(f));
            }
            Err(e) => {
                errors.push(e.into());
                return;
            }
        }
    }
}

fn visit(
    ir: &PatchIR<'_>,
    fields: &mut [FieldNode],
    bus_sources: &[Vec<BusSource>],
    marks: &mut [Mark],
    errors: &mut Diagnostics,
    f: FieldId,
) -> Option<DomainIdx> {
    let i = f.0 as usize;
    match marks[i] {
        Mark::Done => return fields[i].domain,
        Mark::Visiting => {
            errors.push(Diagnostic::error(
                DiagnosticCode::UnresolvedReference,
                "field expression refers back to itself",
            ));
            return None;
        }
        Mark::Unvisited => {}
    }
    marks[i] = Mark::Visiting;

    let expr = fields[i].expr.clone();
    let mut upstream: Vec<(Option<DomainIdx>, String)> = expr
        .children()
        .into_iter()
        .map(|c| (visit(ir, fields, bus_sources, marks, errors, c), format!("F{}", c.0)))
        .collect();
    if let FieldExpr::BusRead(bus) = expr {
        for src in &bus_sources[bus.0 as usize] {
            if let BusSource::Field(c) = *src {
                let d = visit(ir, fields, bus_sources, marks, errors, c);
                upstream.push((d, format!("bus '{}'", ir.bus(bus).id)));
            }
        }
    }

    let mut domain = expr.own_domain();
    for (d, what) in upstream {
        match (domain, d) {
            (None, Some(_)) => domain = d,
            (Some(a), Some(b)) if a != b => {
                errors.push(Diagnostic::error(
                    DiagnosticCode::DomainMismatch,
                    format!("field {} combines values from two element domains via {what}", expr.kind_name()),
                ));
            }
            _ => {}
        }
    }
    fields[i].domain = domain;
    marks[i] = Mark::Done;
    domain
}

#[cfg(test)]
#[path = "../../tests/unit/compile/link.rs"]
mod tests;
