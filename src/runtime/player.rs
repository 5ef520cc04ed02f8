use crate::foundation::error::{WavepatchError, WavepatchResult};
use crate::ir::program::CompiledProgram;
use crate::runtime::executor::Executor;
use crate::runtime::frame::RenderFrame;
use crate::runtime::hot_swap::{SwapReport, migrate};
use crate::runtime::pool::{BufferPoolOpts, BufferPoolStats};
use crate::types::value::Value;

/// Runtime knobs. Plain data with a usable `Default`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOpts {
    /// Ignore the `dt` passed to [`Player::tick`] and always advance by this much.
    pub fixed_dt: Option<f64>,
    pub pool: BufferPoolOpts,
    /// Fill pooled buffers for render fields up front instead of evaluating them per element
    /// while assembling. Both paths produce identical frames.
    pub materialize_render_fields: bool,
}

impl Default for RuntimeOpts {
    fn default() -> Self {
        Self {
            fixed_dt: None,
            pool: BufferPoolOpts::default(),
            materialize_render_fields: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No program loaded.
    Idle,
    Running,
    /// A new generation is waiting to take over at the next tick.
    SwapRequested,
}

/// Frame-driven player. Swaps happen between ticks, never inside one.
pub struct Player {
    opts: RuntimeOpts,
    exec: Option<Executor>,
    pending: Option<CompiledProgram>,
    generation: u64,
    last_swap: Option<SwapReport>,
}

impl Player {
    pub fn new(opts: RuntimeOpts) -> Self {
        Self {
            opts,
            exec: None,
            pending: None,
            generation: 0,
            last_swap: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        match (&self.exec, &self.pending) {
            (None, _) => PlayerState::Idle,
            (Some(_), None) => PlayerState::Running,
            (Some(_), Some(_)) => PlayerState::SwapRequested,
        }
    }

    /// Start running `program` from frame 0. Replaces anything already loaded, memory included.
    pub fn load(&mut self, program: CompiledProgram) {
        self.exec = Some(Executor::new(program, self.opts.pool));
        self.pending = None;
        self.generation += 1;
        self.last_swap = None;
        tracing::debug!(generation = self.generation, "program loaded");
    }

    /// Queue `program` to take over at the next tick, keeping memory by state key.
    /// A second request before that tick replaces the first.
    pub fn request_swap(&mut self, program: CompiledProgram) -> WavepatchResult<()> {
        if self.exec.is_none() {
            return Err(WavepatchError::validation(
                "cannot swap: no program is running",
            ));
        }
        self.pending = Some(program);
        Ok(())
    }

    /// Advance one frame by `dt` seconds (or the fixed step) and return what to draw.
    pub fn tick(&mut self, dt: f64) -> WavepatchResult<RenderFrame> {
        let dt = self.opts.fixed_dt.unwrap_or(dt);
        if !dt.is_finite() || dt < 0.0 {
            return Err(WavepatchError::validation(format!(
                "frame delta must be finite and >= 0, got {dt}"
            )));
        }
        if let Some(next) = self.pending.take() {
            self.apply_swap(next)?;
        }
        let generation = self.generation;
        let materialize = self.opts.materialize_render_fields;
        let exec = self
            .exec
            .as_mut()
            .ok_or_else(|| WavepatchError::validation("no program loaded"))?;
        Ok(exec.run_frame(dt, generation, materialize)?)
    }

    #[tracing::instrument(skip_all, fields(from = self.generation))]
    fn apply_swap(&mut self, next: CompiledProgram) -> WavepatchResult<()> {
        let exec = self
            .exec
            .as_mut()
            .ok_or_else(|| WavepatchError::validation("cannot swap: no program is running"))?;
        let (state, report) = migrate(&exec.program, &exec.state, &next);
        exec.cache.clear(&mut exec.pool);
        exec.program = next;
        exec.state = state;
        self.generation += 1;
        tracing::info!(
            generation = self.generation,
            carried = report.carried.len(),
            discarded = report.discarded.len(),
            initialized = report.initialized.len(),
            "program swapped"
        );
        self.last_swap = Some(report);
        Ok(())
    }

    /// Number of programs that have run, counting the initial load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_swap_report(&self) -> Option<&SwapReport> {
        self.last_swap.as_ref()
    }

    pub fn program(&self) -> Option<&CompiledProgram> {
        self.exec.as_ref().map(|e| &e.program)
    }

    /// Committed memory of the stateful cell `(block, port)`.
    pub fn memory(&self, block: &str, port: &str) -> Option<Value> {
        self.exec.as_ref()?.memory(block, port)
    }

    pub fn pool_stats(&self) -> Option<BufferPoolStats> {
        self.exec.as_ref().map(Executor::pool_stats)
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new(RuntimeOpts::default())
    }
}
