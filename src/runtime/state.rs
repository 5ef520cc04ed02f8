use crate::foundation::ids::{BusIdx, SigId, StateIdx};
use crate::ir::program::{CompiledProgram, TimeModel};
use crate::types::value::Value;

/// Clock derived once per frame by the `time-derive` step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TimeState {
    /// Seconds since the first frame.
    pub(crate) t: f64,
    /// Seconds since the previous frame; `0` on the first frame.
    pub(crate) dt: f64,
    pub(crate) phase: f64,
    pub(crate) wrapped: bool,
    cycle: i64,
    started: bool,
}

impl Default for TimeState {
    fn default() -> Self {
        Self {
            t: 0.0,
            dt: 0.0,
            phase: 0.0,
            wrapped: false,
            cycle: 0,
            started: false,
        }
    }
}

impl TimeState {
    /// Next frame's clock. Frame 0 sits at `t = 0` regardless of `dt`.
    pub(crate) fn advanced(self, model: TimeModel, dt: f64) -> TimeState {
        let (t, dt) = if self.started {
            (self.t + dt, dt)
        } else {
            (0.0, 0.0)
        };
        let cycle = model.cycle_at(t);
        TimeState {
            t,
            dt,
            phase: model.phase_at(t),
            wrapped: self.started && cycle > self.cycle,
            cycle,
            started: true,
        }
    }
}

/// Mutable per-player memory: the value slots, per-frame evaluation stamps and stateful cells.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeState {
    pub(crate) slots: Vec<f64>,
    /// Frame epoch at which each signal node was last written.
    pub(crate) sig_stamps: Vec<u64>,
    pub(crate) bus_stamps: Vec<u64>,
    pub(crate) epoch: u64,
    /// Memory as of the end of the last successful frame.
    pub(crate) committed: Vec<Value>,
    /// Writes of the frame in progress; committed only if the whole frame succeeds.
    pub(crate) staged: Vec<Option<Value>>,
    pub(crate) time: TimeState,
    pub(crate) frame: u64,
}

impl RuntimeState {
    pub(crate) fn new(program: &CompiledProgram) -> Self {
        Self {
            slots: vec![0.0; program.slots.len()],
            sig_stamps: vec![0; program.sigs.len()],
            bus_stamps: vec![0; program.buses.len()],
            epoch: 0,
            committed: program.states.iter().map(|s| s.initial).collect(),
            staged: vec![None; program.states.len()],
            time: TimeState::default(),
            frame: 0,
        }
    }

    pub(crate) fn stamp_sig(&mut self, s: SigId) {
        self.sig_stamps[s.0 as usize] = self.epoch;
    }

    pub(crate) fn stamp_bus(&mut self, b: BusIdx) {
        self.bus_stamps[b.0 as usize] = self.epoch;
    }

    pub(crate) fn sig_ready(&self, s: SigId) -> bool {
        self.sig_stamps.get(s.0 as usize) == Some(&self.epoch)
    }

    pub(crate) fn bus_ready(&self, b: BusIdx) -> bool {
        self.bus_stamps.get(b.0 as usize) == Some(&self.epoch)
    }

    pub(crate) fn stage(&mut self, s: StateIdx, v: Value) {
        self.staged[s.0 as usize] = Some(v);
    }

    /// Drop staged writes of an aborted frame.
    pub(crate) fn discard_staged(&mut self) {
        self.staged.iter_mut().for_each(|s| *s = None);
    }

    pub(crate) fn commit(&mut self) {
        for (cell, staged) in self.committed.iter_mut().zip(self.staged.iter_mut()) {
            if let Some(v) = staged.take() {
                *cell = v;
            }
        }
    }
}
