use crate::ir::program::CompiledProgram;
use crate::runtime::state::RuntimeState;

/// What happened to each memory cell when a new program generation took over.
///
/// Cells are named `"block.port"`, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SwapReport {
    /// Present in both generations with the same value domain; value kept.
    pub carried: Vec<String>,
    /// Only in the old generation.
    pub discarded: Vec<String>,
    /// New in this generation, or retyped; starts from its declared initial value.
    pub initialized: Vec<String>,
}

impl SwapReport {
    pub fn is_clean(&self) -> bool {
        self.discarded.is_empty() && self.initialized.is_empty()
    }
}

/// Build the state for `next` from the state of `prev`. Memory is matched by `StateKey`, so
/// only the stable block id and port matter, never arena positions. The clock keeps running.
pub(crate) fn migrate(
    prev: &CompiledProgram,
    prev_state: &RuntimeState,
    next: &CompiledProgram,
) -> (RuntimeState, SwapReport) {
    let mut state = RuntimeState::new(next);
    state.time = prev_state.time;
    state.frame = prev_state.frame;
    state.epoch = prev_state.epoch;

    let mut report = SwapReport::default();
    for (i, decl) in next.states.iter().enumerate() {
        let label = format!("{}.{}", decl.block, decl.port);
        let old = prev
            .state_by_key(decl.key)
            .and_then(|j| prev_state.committed.get(j.0 as usize));
        match old {
            Some(v) if v.domain() == decl.initial.domain() => {
                state.committed[i] = *v;
                report.carried.push(label);
            }
            _ => report.initialized.push(label),
        }
    }
    for decl in &prev.states {
        if next.state_by_key(decl.key).is_none() {
            report.discarded.push(format!("{}.{}", decl.block, decl.port));
        }
    }
    report.carried.sort();
    report.discarded.sort();
    report.initialized.sort();
    (state, report)
}
