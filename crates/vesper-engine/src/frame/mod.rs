//! Per-window animation-frame callbacks.

mod queue;
mod scope;

pub use queue::{AnimationFrameQueue, FrameCallback, FrameRequestId, FrameRunSummary};
pub use scope::{FrameOutput, FrameScope};
