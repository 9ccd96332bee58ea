use crate::error::CompositionError;
use crate::frame::{AnimationFrameQueue, FrameOutput};

use super::context::{ContextId, WindowInfo};

/// Notifications delivered to a window script between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    /// The native surface behind `context` changed size.
    Resized { context: ContextId, width: u32, height: u32 },
    /// Composition of `context` kept failing.
    CompositionFailed { context: ContextId, error: CompositionError },
    /// Last event before the window's task stops.
    Closing,
}

/// Application code running inside one window.
///
/// Every method runs on the window's own thread.
pub trait WindowScript: Send + 'static {
    /// Called once before the first tick. Typically requests the first frame.
    fn open(&mut self, window: &WindowInfo, frames: &mut AnimationFrameQueue);

    fn on_event(&mut self, event: &WindowEvent, frames: &mut AnimationFrameQueue) {
        let _ = (event, frames);
    }

    /// Called after the tick's callbacks ran. An error fails the whole tick.
    fn finish_frame(&mut self, output: &FrameOutput) -> anyhow::Result<()> {
        let _ = output;
        Ok(())
    }
}
