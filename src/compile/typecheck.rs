use crate::compile::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::foundation::ids::{BlockIdx, BusIdx};
use crate::normalize::ir::{PatchIR, PortIR};
use crate::types::adapter::{AdapterOp, chain_type};
use crate::types::value::Value;

/// The single source feeding one block input.
#[derive(Debug, Clone)]
pub(crate) enum InputSource {
    Wire {
        from: PortIR,
        transforms: Vec<AdapterOp>,
    },
    Bus {
        bus: BusIdx,
        transforms: Vec<AdapterOp>,
    },
    /// Patch default-source binding or the port's declared default.
    Default(Value),
}

/// Resolved source of every input of every block, indexed like the block's signature.
#[derive(Debug, Clone, Default)]
pub(crate) struct InputBindings {
    per_block: Vec<Vec<Option<InputSource>>>,
}

impl InputBindings {
    pub(crate) fn of(&self, block: BlockIdx) -> &[Option<InputSource>] {
        &self.per_block[block.0 as usize]
    }
}

/// Bind each input to exactly one source and check wire and default types.
///
/// Precedence: a wire or a listener drives the port; otherwise an explicit default-source
/// binding from the patch; otherwise the default declared by the block signature.
pub(crate) fn bind_inputs(ir: &PatchIR<'_>) -> (InputBindings, Diagnostics) {
    let mut diags = Diagnostics::default();
    let mut per_block: Vec<Vec<Option<InputSource>>> = ir
        .blocks
        .iter()
        .map(|b| vec![None; b.sig.inputs.len()])
        .collect();
    let mut drivers: Vec<Vec<Vec<String>>> = ir
        .blocks
        .iter()
        .map(|b| vec![Vec::new(); b.sig.inputs.len()])
        .collect();

    let slot_of = |p: PortIR| -> Option<usize> {
        ir.block(p.block)
            .sig
            .find_input(ir.port_name(p))
            .map(|(i, _)| i)
    };

    for w in &ir.wires {
        let (Some(i), Some(dst), Some(src)) = (slot_of(w.to), ir.input_spec(w.to), ir.output_spec(w.from))
        else {
            continue;
        };
        let ok = chain_type(&w.transforms, src.ty).map(|ty| (ty, ty.can_drive(dst.ty)));
        match ok {
            Ok((_, true)) => {}
            Ok((ty, false)) => diags.push(
                Diagnostic::error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "wire {} -> {}: {ty} cannot drive {}",
                        ir.describe(w.from),
                        ir.describe(w.to),
                        dst.ty
                    ),
                )
                .at_port(&ir.block(w.to.block).id, ir.port_name(w.to)),
            ),
            Err(msg) => diags.push(
                Diagnostic::error(
                    DiagnosticCode::TypeMismatch,
                    format!("wire {} -> {}: {msg}", ir.describe(w.from), ir.describe(w.to)),
                )
                .at_port(&ir.block(w.to.block).id, ir.port_name(w.to)),
            ),
        }
        drivers[w.to.block.0 as usize][i].push(format!("wire from {}", ir.describe(w.from)));
        per_block[w.to.block.0 as usize][i] = Some(InputSource::Wire {
            from: w.from,
            transforms: w.transforms.clone(),
        });
    }

    for l in &ir.listeners {
        let Some(i) = slot_of(l.to) else {
            continue;
        };
        drivers[l.to.block.0 as usize][i].push(format!("bus '{}'", ir.bus(l.bus).id));
        per_block[l.to.block.0 as usize][i] = Some(InputSource::Bus {
            bus: l.bus,
            transforms: l.transforms.clone(),
        });
    }

    for d in &ir.defaults {
        let (Some(i), Some(spec)) = (slot_of(d.to), ir.input_spec(d.to)) else {
            continue;
        };
        if d.value.domain() != spec.ty.domain {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "default source for {} is {} but the port expects {}",
                        ir.describe(d.to),
                        d.value.domain().name(),
                        spec.ty
                    ),
                )
                .at_port(&ir.block(d.to.block).id, ir.port_name(d.to)),
            );
            continue;
        }
        let slot = &mut per_block[d.to.block.0 as usize][i];
        if slot.is_none() {
            *slot = Some(InputSource::Default(d.value));
        }
    }

    for (bi, b) in ir.blocks.iter().enumerate() {
        for (pi, spec) in b.sig.inputs.iter().enumerate() {
            let ds = &drivers[bi][pi];
            if ds.len() > 1 {
                diags.push(
                    Diagnostic::error(
                        DiagnosticCode::MultipleDrivers,
                        format!(
                            "input {}.{} has {} drivers: {}",
                            b.id,
                            spec.name,
                            ds.len(),
                            ds.join(", ")
                        ),
                    )
                    .at_port(&b.id, spec.name),
                );
            }
            let slot = &mut per_block[bi][pi];
            if slot.is_none() {
                match spec.default {
                    Some(v) => *slot = Some(InputSource::Default(v)),
                    None => diags.push(
                        Diagnostic::error(
                            DiagnosticCode::UnresolvedInput,
                            format!(
                                "input {}.{} ({}) has no wire, listener or default source",
                                b.id, spec.name, spec.ty
                            ),
                        )
                        .at_port(&b.id, spec.name),
                    ),
                }
            }
        }
    }

    (InputBindings { per_block }, diags)
}

#[cfg(test)]
#[path = "../../tests/unit/compile/typecheck.rs"]
mod tests;
