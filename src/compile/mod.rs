//! Patch-to-program compiler.
//!
//! The pipeline is a pure function: `normalize -> bind/topology/buses -> lower -> link -> schedule`.
//! Structural and contract passes run side by side so a failed compile reports every error it
//! can find, not just the first.

pub(crate) mod buses;
pub mod diagnostics;
pub(crate) mod link;
pub(crate) mod lower;
pub(crate) mod schedule;
pub(crate) mod topology;
pub(crate) mod typecheck;

pub use buses::BUS_CONTRACT_VERSION;
pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Location, Severity};
pub use link::ProbeDef;

use crate::blocks::registry::BlockRegistry;
use crate::ir::program::{BusEntry, CompiledProgram};
use crate::normalize::pass::normalize;
use crate::patch::Patch;
use crate::types::descriptor::TypeDesc;

/// Element count a single domain may have unless [`CompileOpts::max_elements`] says otherwise.
pub const DEFAULT_MAX_ELEMENTS: u32 = 1 << 20;

/// Knobs for a single compile.
#[derive(Debug, Clone)]
pub struct CompileOpts {
    /// Replaces the patch's own seed (element randomness).
    pub seed_override: Option<u64>,
    /// Signal outputs sampled into every frame's probe list.
    pub probes: Vec<ProbeDef>,
    /// Fail the compile if it produced any warning.
    pub deny_warnings: bool,
    /// Largest element domain a block may create. Bigger ones fail with `E_DOMAIN_TOO_LARGE`.
    pub max_elements: u32,
}

impl Default for CompileOpts {
    fn default() -> Self {
        Self {
            seed_override: None,
            probes: Vec::new(),
            deny_warnings: false,
            max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }
}

/// Compile a patch snapshot into an immutable program.
///
/// Never mutates the patch. On failure, returns every diagnostic found by the passes that ran.
#[tracing::instrument(skip_all, fields(blocks = patch.def().blocks.len()))]
pub fn compile_patch(
    patch: &Patch,
    registry: &BlockRegistry,
    opts: &CompileOpts,
) -> Result<CompiledProgram, Diagnostics> {
    let seed = opts.seed_override.unwrap_or_else(|| patch.seed());
    let ir = normalize(patch.def(), registry, seed)?;

    let mut diags = Diagnostics::default();
    let (bindings, bind_diags) = typecheck::bind_inputs(&ir);
    diags.extend(bind_diags);
    let topo = match topology::analyze(&ir, &bindings) {
        Ok(t) => Some(t),
        Err(e) => {
            diags.extend(e);
            None
        }
    };
    let (resolved, bus_diags) = buses::resolve_buses(&ir);
    diags.extend(bus_diags);

    if opts.deny_warnings {
        diags.promote_warnings();
    }
    let warnings = diags.take_warnings();
    let topo = match topo {
        Some(t) if diags.is_empty() => t,
        _ => {
            diags.extend(warnings);
            return Err(diags);
        }
    };

    let lowered = lower::lower_all(&ir, &bindings, &topo, opts.max_elements)?;
    let linked = link::link(&ir, lowered, &opts.probes)?;
    let bus_tys: Vec<TypeDesc> = ir.buses.iter().map(|b| b.ty).collect();
    let (schedule, slots) = schedule::build_schedule(&linked, &bus_tys)?;

    let buses = resolved
        .iter()
        .zip(linked.bus_sources)
        .map(|(rb, sources)| {
            let bus = ir.bus(rb.bus);
            BusEntry {
                id: bus.id.clone(),
                ty: bus.ty,
                combine: bus.combine,
                silent: bus.silent,
                reserved: bus.reserved,
                sources,
                source_labels: rb
                    .publishers
                    .iter()
                    .map(|&pi| {
                        let p = &ir.publishers[pi];
                        format!("{}@{}", ir.describe(p.from), p.sort_key)
                    })
                    .collect(),
            }
        })
        .collect();

    for w in warnings.iter() {
        tracing::warn!(code = %w.code, "{}", w.message);
    }
    tracing::debug!(
        steps = schedule.len(),
        slots = slots.len(),
        time_root = %ir.block(topo.time_root).id,
        "compiled patch"
    );

    Ok(CompiledProgram {
        seed,
        time_model: topo.time_model,
        sigs: linked.sigs,
        fields: linked.fields,
        domains: linked.domains,
        buses,
        states: linked.states,
        sinks: linked.sinks,
        probes: linked.probes,
        schedule,
        slots,
        warnings,
    })
}
