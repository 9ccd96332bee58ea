//! Frame timing.
//!
//! - one [`FrameClock`] per scheduler; `tick()` once per tick gives the
//!   timestamp every window sees
//! - [`FrameStats`] accumulates per-stage time for performance logging

mod frame_clock;
mod stats;

pub use frame_clock::{FrameClock, FrameTime};
pub use stats::{FrameStats, Stage, StatsReport};
