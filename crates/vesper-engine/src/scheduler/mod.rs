//! Per-tick frame driver.

mod context;
mod frame_scheduler;

pub use context::{FrameContext, TimedResource};
pub use frame_scheduler::{FrameScheduler, PoseStatus, StopHandle, TickReport};
