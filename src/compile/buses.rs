use crate::compile::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::foundation::ids::{BusIdx, IndexOverflow, idx_u32};
use crate::normalize::ir::PatchIR;
use crate::types::adapter::chain_type;
use crate::types::combine::CombineMode;
use crate::types::descriptor::{Domain, TypeDesc, World};
use crate::types::value::Value;

/// Version of the reserved bus table below. Bump on any change to an entry.
pub const BUS_CONTRACT_VERSION: u32 = 1;

/// Fixed contract of a system bus.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReservedBus {
    pub(crate) id: &'static str,
    pub(crate) ty: TypeDesc,
    pub(crate) combine: CombineMode,
}

impl ReservedBus {
    pub(crate) fn silent(&self) -> Value {
        // Every reserved domain has a zero value.
        Value::zero(self.ty.domain).unwrap_or(Value::Number(0.0))
    }
}

pub(crate) const RESERVED_BUSES: &[ReservedBus] = &[
    ReservedBus {
        id: "time",
        ty: TypeDesc::signal(Domain::Time),
        combine: CombineMode::Last,
    },
    ReservedBus {
        id: "phaseA",
        ty: TypeDesc::signal(Domain::Phase),
        combine: CombineMode::Last,
    },
    ReservedBus {
        id: "phaseB",
        ty: TypeDesc::signal(Domain::Phase),
        combine: CombineMode::Last,
    },
    ReservedBus {
        id: "pulse",
        ty: TypeDesc::event(),
        combine: CombineMode::Or,
    },
    ReservedBus {
        id: "energy",
        ty: TypeDesc::signal(Domain::Number),
        combine: CombineMode::Sum,
    },
    ReservedBus {
        id: "palette",
        ty: TypeDesc::signal(Domain::Color),
        combine: CombineMode::Layer,
    },
];

pub(crate) fn reserved_contract(id: &str) -> Option<&'static ReservedBus> {
    RESERVED_BUSES.iter().find(|r| r.id == id)
}

/// Active publishers and listeners of one bus. Indices point into the normalized patch, whose
/// publisher list is already in combine order.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedBus {
    pub(crate) bus: BusIdx,
    pub(crate) publishers: Vec<usize>,
    pub(crate) listeners: Vec<usize>,
}

/// Bind each bus to its ordered publishers and check every type/combine pairing.
pub(crate) fn resolve_buses(ir: &PatchIR<'_>) -> (Vec<ResolvedBus>, Diagnostics) {
    let mut diags = Diagnostics::default();
    let out: Result<Vec<ResolvedBus>, IndexOverflow> = (0..ir.buses.len())
        .map(|i| {
            idx_u32(i).map(|b| ResolvedBus {
                bus: BusIdx(b),
                publishers: Vec::new(),
                listeners: Vec::new(),
            })
        })
        .collect();
    let mut out = match out {
        Ok(out) => out,
        Err(e) => {
            diags.push(Diagnostic::from(e));
            return (Vec::new(), diags);
        }
    };
    for (i, p) in ir.publishers.iter().enumerate() {
        out[p.bus.0 as usize].publishers.push(i);
    }
    for (i, l) in ir.listeners.iter().enumerate() {
        out[l.bus.0 as usize].listeners.push(i);
    }

    for rb in &out {
        let bus = ir.bus(rb.bus);
        let supported_world = matches!(bus.ty.world, World::Signal | World::Field | World::Event);
        if !bus.ty.is_well_formed() || !supported_world || bus.ty.domain == Domain::Elements {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::BusTypeUnsupported,
                    format!("bus '{}' cannot carry {}", bus.id, bus.ty),
                )
                .at_bus(&bus.id),
            );
            continue;
        }
        if !bus.combine.supports(bus.ty) {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::BusCombineIncompatible,
                    format!(
                        "combine mode '{}' is not defined for {} (bus '{}')",
                        bus.combine.name(),
                        bus.ty,
                        bus.id
                    ),
                )
                .at_bus(&bus.id),
            );
        }

        for &pi in &rb.publishers {
            let p = &ir.publishers[pi];
            let Some(spec) = ir.output_spec(p.from) else {
                continue;
            };
            let ty = match chain_type(&p.transforms, spec.ty) {
                Ok(ty) => ty,
                Err(msg) => {
                    diags.push(
                        Diagnostic::error(DiagnosticCode::TypeMismatch, msg)
                            .at_port(&ir.block(p.from.block).id, ir.port_name(p.from))
                            .at_bus(&bus.id),
                    );
                    continue;
                }
            };
            if ty.can_drive(bus.ty) {
                continue;
            }
            let code = if bus.combine.supports(ty) {
                DiagnosticCode::TypeMismatch
            } else {
                DiagnosticCode::BusCombineIncompatible
            };
            diags.push(
                Diagnostic::error(
                    code,
                    format!(
                        "publisher {} produces {ty} but bus '{}' is {} combine={}",
                        ir.describe(p.from),
                        bus.id,
                        bus.ty,
                        bus.combine.name()
                    ),
                )
                .at_port(&ir.block(p.from.block).id, ir.port_name(p.from))
                .at_bus(&bus.id),
            );
        }

        for &li in &rb.listeners {
            let l = &ir.listeners[li];
            let Some(spec) = ir.input_spec(l.to) else {
                continue;
            };
            let ok = match chain_type(&l.transforms, bus.ty) {
                Ok(ty) => ty.can_drive(spec.ty),
                Err(_) => false,
            };
            if !ok {
                diags.push(
                    Diagnostic::error(
                        DiagnosticCode::TypeMismatch,
                        format!(
                            "listener {} expects {} but bus '{}' carries {}",
                            ir.describe(l.to),
                            spec.ty,
                            bus.id,
                            bus.ty
                        ),
                    )
                    .at_port(&ir.block(l.to.block).id, ir.port_name(l.to))
                    .at_bus(&bus.id),
                );
            }
        }

        if rb.publishers.is_empty() && !rb.listeners.is_empty() {
            diags.push(
                Diagnostic::warning(
                    DiagnosticCode::BusSilent,
                    format!("bus '{}' has listeners but no publishers", bus.id),
                )
                .at_bus(&bus.id),
            );
        }
        if !bus.reserved && rb.listeners.is_empty() && !rb.publishers.is_empty() {
            diags.push(
                Diagnostic::warning(
                    DiagnosticCode::BusUnused,
                    format!("bus '{}' has publishers but no listeners", bus.id),
                )
                .at_bus(&bus.id),
            );
        }
    }

    (out, diags)
}

#[cfg(test)]
#[path = "../../tests/unit/compile/buses.rs"]
mod tests;
