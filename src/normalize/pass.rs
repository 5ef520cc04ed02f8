use crate::blocks::registry::{BlockRegistry, Params};
use crate::compile::buses::{RESERVED_BUSES, reserved_contract};
use crate::compile::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::foundation::ids::{BlockIdx, BusIdx, idx_u32};
use crate::normalize::ports::PortNames;
use crate::normalize::ir::{
    BlockIR, BusIR, DefaultIR, ListenerIR, PatchIR, PortIR, PublisherIR, WireIR,
};
use crate::patch::model::{PatchDef, PortRef};
use crate::patch::validate::validate_patch;
use crate::types::value::Value;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PortDir {
    Input,
    Output,
}

/// Resolve a patch snapshot against the registry into [`PatchIR`].
///
/// Blocks are ordered by stable id and publishers by `(bus, sort_key, block id, port)`, so
/// declaration order in the source patch never reaches later passes.
pub(crate) fn normalize<'r>(
    def: &PatchDef,
    registry: &'r BlockRegistry,
    seed: u64,
) -> Result<PatchIR<'r>, Diagnostics> {
    validate_patch(def)?;
    let mut errors = Diagnostics::default();
    let mut ports = PortNames::default();

    let mut order: Vec<usize> = (0..def.blocks.len()).collect();
    order.sort_by(|&a, &b| def.blocks[a].id.cmp(&def.blocks[b].id));

    let mut blocks = Vec::with_capacity(order.len());
    let mut idx_by_id: HashMap<&str, BlockIdx> = HashMap::new();
    for (i, &src) in order.iter().enumerate() {
        let b = &def.blocks[src];
        idx_by_id.insert(b.id.as_str(), BlockIdx(idx_u32(i)?));

        let Some(behavior) = registry.get(&b.kind) else {
            errors.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownBlockKind,
                    format!("block kind '{}' is not registered", b.kind),
                )
                .at_block(&b.id),
            );
            continue;
        };
        match behavior.signature(&Params::new(&b.params)) {
            Ok(sig) => {
                if let Err(e) = ports.declare(&sig) {
                    errors.push(Diagnostic::from(e).at_block(&b.id));
                }
                blocks.push(BlockIR {
                    id: b.id.clone(),
                    kind: b.kind.clone(),
                    params: b.params.clone(),
                    sig,
                    behavior,
                });
            }
            Err(msg) => {
                errors.push(Diagnostic::error(DiagnosticCode::BadParam, msg).at_block(&b.id));
            }
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut ir = PatchIR {
        seed,
        ports,
        blocks,
        wires: Vec::new(),
        buses: Vec::new(),
        publishers: Vec::new(),
        listeners: Vec::new(),
        defaults: Vec::new(),
    };

    let resolve = |ir: &PatchIR<'_>, p: &PortRef, dir: PortDir, errors: &mut Diagnostics| {
        let block = *idx_by_id.get(p.block.as_str())?;
        let sig = &ir.block(block).sig;
        let known = match dir {
            PortDir::Input => sig.find_input(&p.port).is_some(),
            PortDir::Output => sig.find_output(&p.port).is_some(),
        };
        if !known {
            let what = if dir == PortDir::Input { "input" } else { "output" };
            errors.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownPort,
                    format!(
                        "block '{}' ({}) has no {what} port '{}'",
                        p.block,
                        ir.block(block).kind,
                        p.port
                    ),
                )
                .at_port(&p.block, &p.port),
            );
            return None;
        }
        // Every signature port name was declared above.
        let port = ir.ports.find(&p.port)?;
        Some(PortIR { block, port })
    };

    // Buses: the reserved table first, in table order, then user buses by id.
    let mut bus_idx: HashMap<String, BusIdx> = HashMap::new();
    for r in RESERVED_BUSES {
        bus_idx.insert(r.id.to_owned(), BusIdx(idx_u32(ir.buses.len())?));
        ir.buses.push(BusIR {
            id: r.id.to_owned(),
            ty: r.ty,
            combine: r.combine,
            silent: r.silent(),
            reserved: true,
        });
    }
    let mut user_buses: Vec<_> = def.buses.iter().collect();
    user_buses.sort_by(|a, b| a.id.cmp(&b.id));
    for b in user_buses {
        if let Some(r) = reserved_contract(&b.id) {
            let silent_ok = b.silent.is_none_or(|s| s == r.silent());
            if b.ty != r.ty || b.combine != r.combine || !silent_ok {
                errors.push(
                    Diagnostic::error(
                        DiagnosticCode::ReservedBusContract,
                        format!(
                            "reserved bus '{}' is fixed to {} combine={} (declared {} combine={})",
                            r.id,
                            r.ty,
                            r.combine.name(),
                            b.ty,
                            b.combine.name()
                        ),
                    )
                    .at_bus(&b.id),
                );
            }
            continue;
        }
        let silent = match b.silent {
            Some(v) if v.domain() != b.ty.domain => {
                errors.push(
                    Diagnostic::error(
                        DiagnosticCode::TypeMismatch,
                        format!(
                            "silent value of bus '{}' is {} but the bus carries {}",
                            b.id,
                            v.domain().name(),
                            b.ty
                        ),
                    )
                    .at_bus(&b.id),
                );
                continue;
            }
            Some(v) => v,
            None => match Value::zero(b.ty.domain) {
                Some(v) => v,
                None => {
                    errors.push(
                        Diagnostic::error(
                            DiagnosticCode::BusTypeUnsupported,
                            format!("bus '{}' cannot carry {}", b.id, b.ty),
                        )
                        .at_bus(&b.id),
                    );
                    continue;
                }
            },
        };
        bus_idx.insert(b.id.clone(), BusIdx(idx_u32(ir.buses.len())?));
        ir.buses.push(BusIR {
            id: b.id.clone(),
            ty: b.ty,
            combine: b.combine,
            silent,
            reserved: false,
        });
    }

    for w in &def.wires {
        let from = resolve(&ir, &w.from, PortDir::Output, &mut errors);
        let to = resolve(&ir, &w.to, PortDir::Input, &mut errors);
        if let (Some(from), Some(to)) = (from, to) {
            ir.wires.push(WireIR {
                from,
                to,
                transforms: w.transforms.clone(),
            });
        }
    }
    for p in def.publishers.iter().filter(|p| p.enabled) {
        let from = resolve(&ir, &p.from, PortDir::Output, &mut errors);
        if let (Some(from), Some(&bus)) = (from, bus_idx.get(&p.bus)) {
            ir.publishers.push(PublisherIR {
                bus,
                from,
                sort_key: p.sort_key,
                transforms: p.transforms.clone(),
            });
        }
    }
    for l in def.listeners.iter().filter(|l| l.enabled) {
        let to = resolve(&ir, &l.to, PortDir::Input, &mut errors);
        if let (Some(to), Some(&bus)) = (to, bus_idx.get(&l.bus)) {
            ir.listeners.push(ListenerIR {
                bus,
                to,
                transforms: l.transforms.clone(),
            });
        }
    }
    for d in &def.defaults {
        if let Some(to) = resolve(&ir, &d.to, PortDir::Input, &mut errors) {
            ir.defaults.push(DefaultIR { to, value: d.value });
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Canonical orders. Block indices already follow stable ids, so comparing (block, port name)
    // is declaration-order independent.
    let ports = &ir.ports;
    let port_key = |p: PortIR| (p.block, ports.name(p.port));
    ir.wires
        .sort_by_key(|w| (port_key(w.to), port_key(w.from)));
    // Two publishers of one port differ only by their adapter chain; its JSON form breaks the tie.
    ir.publishers.sort_by_cached_key(|p| {
        let chain = serde_json::to_string(&p.transforms).unwrap_or_default();
        (p.bus, p.sort_key, port_key(p.from), chain)
    });
    ir.listeners.sort_by_key(|l| (port_key(l.to), l.bus));
    ir.defaults.sort_by_key(|d| port_key(d.to));

    tracing::debug!(
        blocks = ir.blocks.len(),
        wires = ir.wires.len(),
        buses = ir.buses.len(),
        publishers = ir.publishers.len(),
        "normalized patch"
    );
    Ok(ir)
}

#[cfg(test)]
#[path = "../../tests/unit/normalize/pass.rs"]
mod tests;
