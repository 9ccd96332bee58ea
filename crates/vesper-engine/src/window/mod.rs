//! Windows: independently executing render tasks.
//!
//! Each window runs its [`WindowScript`] on its own thread and talks to the
//! scheduler only through messages. The [`WindowRegistry`] owns the phase
//! field of every window and its drawing contexts.

mod context;
mod phase;
mod registry;
mod script;
mod task;
mod wait;

pub use context::{ContextId, ContextInfo, ContextSpec, DrawingContext, WindowId, WindowInfo, WindowSpec};
pub use phase::{PhaseTracker, RenderTicket, WindowPhase};
pub use registry::WindowRegistry;
pub use script::{WindowEvent, WindowScript};
pub use task::{ContextFrame, SyncToken, TickCompletion, TickOutput};
pub use wait::{wait_all_or_deadline, WaitOutcome};
