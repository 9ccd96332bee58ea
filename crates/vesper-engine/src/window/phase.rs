use std::time::Instant;

/// Render progress of one window within the frame pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WindowPhase {
    /// Idle; eligible for dispatch.
    #[default]
    Null,
    /// A tick was dispatched and has not reported back.
    Rendering,
    /// The tick finished; output waits for the compositor.
    Rendered,
}

/// When a window's outstanding tick was dispatched.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderTicket {
    pub tick: u64,
    pub dispatched_at: Instant,
}

/// Phase field plus the ticket of the in-flight render.
///
/// Each transition method returns whether it applied; calls from the wrong
/// phase leave the tracker unchanged.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    phase: WindowPhase,
    ticket: Option<RenderTicket>,
}

impl PhaseTracker {
    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    pub fn ticket(&self) -> Option<RenderTicket> {
        self.ticket
    }

    /// `Null -> Rendering`. Scheduler only.
    pub fn dispatch(&mut self, tick: u64, now: Instant) -> bool {
        if self.phase != WindowPhase::Null {
            return false;
        }
        self.phase = WindowPhase::Rendering;
        self.ticket = Some(RenderTicket { tick, dispatched_at: now });
        true
    }

    /// `Rendering -> Rendered` on a successful tick.
    pub fn complete(&mut self) -> bool {
        if self.phase != WindowPhase::Rendering {
            return false;
        }
        self.phase = WindowPhase::Rendered;
        true
    }

    /// `Rendering -> Null` on a failed tick, so the next tick re-dispatches.
    pub fn fail(&mut self) -> bool {
        if self.phase != WindowPhase::Rendering {
            return false;
        }
        self.phase = WindowPhase::Null;
        self.ticket = None;
        true
    }

    /// `Rendered -> Null` once the compositor has taken the output.
    pub fn consume(&mut self) -> bool {
        if self.phase != WindowPhase::Rendered {
            return false;
        }
        self.phase = WindowPhase::Null;
        self.ticket = None;
        true
    }
}
