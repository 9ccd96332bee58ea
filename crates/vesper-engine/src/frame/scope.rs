use crate::compositor::Layer;
use crate::window::ContextId;
use crate::xr::SharedXrState;

use super::queue::{AnimationFrameQueue, FrameRequestId};

/// What a window's callbacks produced during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutput {
    /// Clear colours in the order they were issued. The last one per context wins.
    pub clears: Vec<(ContextId, [f32; 4])>,
    /// Contexts drawn to this tick, in first-touch order.
    pub touched: Vec<ContextId>,
    /// Replacement layer list, if any callback set one.
    pub layers: Option<Vec<Layer>>,
}

impl FrameOutput {
    pub fn is_empty(&self) -> bool {
        self.touched.is_empty() && self.layers.is_none()
    }

    fn touch(&mut self, context: ContextId) {
        if !self.touched.contains(&context) {
            self.touched.push(context);
        }
    }

    /// Final clear colour for `context`, if it was cleared.
    pub fn clear_for(&self, context: ContextId) -> Option<[f32; 4]> {
        self.clears
            .iter()
            .rev()
            .find(|(c, _)| *c == context)
            .map(|(_, color)| *color)
    }
}

/// Handed to every animation-frame callback.
///
/// All callbacks of one tick see the same timestamp.
pub struct FrameScope<'a> {
    pub(super) timestamp: f64,
    pub(super) xr: &'a SharedXrState,
    pub(super) queue: &'a mut AnimationFrameQueue,
    pub(super) output: &'a mut FrameOutput,
}

impl<'a> FrameScope<'a> {
    /// Milliseconds since the scheduler started.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn xr(&self) -> &SharedXrState {
        self.xr
    }

    /// Registers a callback for the next tick.
    pub fn request_frame<F>(&mut self, priority: i32, callback: F) -> FrameRequestId
    where
        F: FnOnce(&mut FrameScope<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.queue.request_frame(priority, callback)
    }

    pub fn cancel_frame(&mut self, id: FrameRequestId) -> bool {
        self.queue.cancel_frame(id)
    }

    pub fn clear(&mut self, context: ContextId, color: [f32; 4]) {
        self.output.clears.push((context, color));
        self.output.touch(context);
    }

    /// Marks `context` as drawn without changing its contents.
    pub fn touch(&mut self, context: ContextId) {
        self.output.touch(context);
    }

    /// Replaces the XR layer list wholesale.
    pub fn set_layers(&mut self, layers: Vec<Layer>) {
        self.output.layers = Some(layers);
    }
}
