use crate::compile::buses::reserved_contract;
use crate::compile::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::patch::model::{PatchDef, PortRef};
use std::collections::BTreeSet;

/// Registry-independent checks: identities are unique and every reference points at something
/// declared in the patch.
pub(crate) fn validate_patch(def: &PatchDef) -> Result<(), Diagnostics> {
    let mut errors = Diagnostics::default();

    let mut block_ids = BTreeSet::new();
    for (i, b) in def.blocks.iter().enumerate() {
        if b.id.trim().is_empty() {
            errors.push(Diagnostic::error(
                DiagnosticCode::BadParam,
                format!("blocks[{i}]: id must be non-empty"),
            ));
            continue;
        }
        if !block_ids.insert(b.id.as_str()) {
            errors.push(
                Diagnostic::error(
                    DiagnosticCode::DuplicateBlock,
                    format!("block id '{}' is declared more than once", b.id),
                )
                .at_block(&b.id),
            );
        }
    }

    let mut bus_ids = BTreeSet::new();
    for (i, bus) in def.buses.iter().enumerate() {
        if bus.id.trim().is_empty() {
            errors.push(Diagnostic::error(
                DiagnosticCode::BadParam,
                format!("buses[{i}]: id must be non-empty"),
            ));
            continue;
        }
        if !bus_ids.insert(bus.id.as_str()) {
            errors.push(
                Diagnostic::error(
                    DiagnosticCode::DuplicateBus,
                    format!("bus id '{}' is declared more than once", bus.id),
                )
                .at_bus(&bus.id),
            );
        }
    }

    let check_port = |errors: &mut Diagnostics, what: &str, p: &PortRef| {
        if !block_ids.contains(p.block.as_str()) {
            errors.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownBlock,
                    format!("{what} references unknown block '{}'", p.block),
                )
                .at_port(&p.block, &p.port),
            );
        }
    };
    let bus_known = |id: &str| bus_ids.contains(id) || reserved_contract(id).is_some();

    for w in &def.wires {
        check_port(&mut errors, "wire source", &w.from);
        check_port(&mut errors, "wire target", &w.to);
    }
    for p in &def.publishers {
        check_port(&mut errors, "publisher", &p.from);
        if !bus_known(&p.bus) {
            errors.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownBus,
                    format!("publisher {} targets undeclared bus '{}'", p.from, p.bus),
                )
                .at_bus(&p.bus),
            );
        }
    }
    for l in &def.listeners {
        check_port(&mut errors, "listener", &l.to);
        if !bus_known(&l.bus) {
            errors.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownBus,
                    format!("listener {} reads undeclared bus '{}'", l.to, l.bus),
                )
                .at_bus(&l.bus),
            );
        }
    }
    for d in &def.defaults {
        check_port(&mut errors, "default source", &d.to);
        if let Err(msg) = d.value.check_literal() {
            errors.push(
                Diagnostic::error(DiagnosticCode::BadParam, format!("default source {}: {msg}", d.to))
                    .at_port(&d.to.block, &d.to.port),
            );
        }
    }
    for bus in &def.buses {
        if let Some(Err(msg)) = bus.silent.map(|v| v.check_literal()) {
            errors.push(
                Diagnostic::error(DiagnosticCode::BadParam, format!("bus '{}' silent value: {msg}", bus.id))
                    .at_bus(&bus.id),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
