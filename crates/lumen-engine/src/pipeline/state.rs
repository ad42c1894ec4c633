/// Whether a draw render pass is currently open on the engine's encoder.
///
/// Never set directly by callers; [`PassTracker`] derives it from the
/// operations the engine performs.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum RenderPassState {
    Active,
    #[default]
    Inactive,
}

impl RenderPassState {
    /// Moves to `Active`. Returns `true` if a transition happened.
    #[inline]
    pub fn activate(&mut self) -> bool {
        let changed = *self == RenderPassState::Inactive;
        *self = RenderPassState::Active;
        changed
    }

    /// Moves to `Inactive`. Returns `true` if a transition happened.
    #[inline]
    pub fn deactivate(&mut self) -> bool {
        let changed = *self == RenderPassState::Active;
        *self = RenderPassState::Inactive;
        changed
    }

    #[inline]
    pub fn is_active(self) -> bool {
        self == RenderPassState::Active
    }
}

/// Render pass state plus transition counters.
///
/// The engine performs GPU begin/end work only when [`activate`](Self::activate)
/// or [`deactivate`](Self::deactivate) report a transition, so the counters
/// equal the number of real begin-pass / end-pass calls.
#[derive(Debug, Default, Clone)]
pub struct PassTracker {
    state: RenderPassState,
    activations: u64,
    deactivations: u64,
}

impl PassTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> RenderPassState {
        self.state
    }

    #[inline]
    pub fn activations(&self) -> u64 {
        self.activations
    }

    #[inline]
    pub fn deactivations(&self) -> u64 {
        self.deactivations
    }

    /// Inactive → Active. Returns `true` when the caller must begin a pass.
    pub fn activate(&mut self) -> bool {
        let begin = self.state.activate();
        if begin {
            self.activations += 1;
        }
        begin
    }

    /// Active → Inactive. Returns `true` when the caller must end the pass.
    pub fn deactivate(&mut self) -> bool {
        let end = self.state.deactivate();
        if end {
            self.deactivations += 1;
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Copy, Clone)]
    enum Op {
        Draw,
        Clear,
        Probe,
        EndOfCommands,
    }

    /// Applies the transitions the engine performs before each operation.
    fn run(ops: &[Op]) -> PassTracker {
        let mut t = PassTracker::new();
        for op in ops {
            match op {
                Op::Draw => {
                    t.activate();
                }
                Op::Clear | Op::Probe | Op::EndOfCommands => {
                    t.deactivate();
                }
            }
        }
        t
    }

    #[test]
    fn starts_inactive() {
        let t = PassTracker::new();
        assert_eq!(t.state(), RenderPassState::Inactive);
        assert_eq!(t.activations(), 0);
    }

    #[test]
    fn activate_twice_begins_once() {
        let mut t = PassTracker::new();
        assert!(t.activate());
        assert!(!t.activate());
        assert_eq!(t.activations(), 1);
        assert!(t.state().is_active());
    }

    #[test]
    fn deactivate_when_inactive_is_noop() {
        let mut t = PassTracker::new();
        assert!(!t.deactivate());
        assert_eq!(t.deactivations(), 0);
    }

    #[test]
    fn draw_draw_clear_draw_is_two_cycles() {
        let t = run(&[Op::Draw, Op::Draw, Op::Clear, Op::Draw, Op::EndOfCommands]);
        assert_eq!(t.activations(), 2);
        assert_eq!(t.deactivations(), 2);
        assert_eq!(t.state(), RenderPassState::Inactive);
    }

    #[test]
    fn probe_closes_open_pass() {
        let t = run(&[Op::Draw, Op::Probe]);
        assert_eq!(t.state(), RenderPassState::Inactive);
        assert_eq!(t.deactivations(), 1);
    }

    #[test]
    fn clear_without_draw_never_activates() {
        let t = run(&[Op::Clear, Op::Clear, Op::Probe]);
        assert_eq!(t.activations(), 0);
        assert_eq!(t.deactivations(), 0);
    }
}
