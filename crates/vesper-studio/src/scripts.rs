use vesper_engine::frame::{AnimationFrameQueue, FrameScope};
use vesper_engine::window::{ContextId, WindowEvent, WindowInfo, WindowScript};

/// Clears its canvas to a colour whose brightness pulses once per second.
pub struct PulseScript {
    base: [f32; 4],
}

impl PulseScript {
    pub fn new(base: [f32; 4]) -> Self {
        Self { base }
    }
}

impl WindowScript for PulseScript {
    fn open(&mut self, window: &WindowInfo, frames: &mut AnimationFrameQueue) {
        let Some(context) = window.contexts.first().map(|c| c.id) else {
            log::warn!("{} has no canvas to draw into", window.id);
            return;
        };
        let base = self.base;
        frames.request_frame(0, move |scope| pulse(scope, context, base));
    }

    fn on_event(&mut self, event: &WindowEvent, _frames: &mut AnimationFrameQueue) {
        match event {
            WindowEvent::Resized { context, width, height } => {
                log::info!("{context} resized to {width}x{height}");
            }
            WindowEvent::CompositionFailed { context, error } => {
                log::warn!("{context} keeps failing to composite: {error}");
            }
            WindowEvent::Closing => log::info!("pulse window closing"),
        }
    }
}

fn pulse(scope: &mut FrameScope<'_>, context: ContextId, base: [f32; 4]) -> anyhow::Result<()> {
    let phase = (scope.timestamp() / 1000.0 * std::f64::consts::TAU).sin() as f32;
    let k = 0.75 + 0.25 * phase;
    scope.clear(context, [base[0] * k, base[1] * k, base[2] * k, base[3]]);
    scope.request_frame(0, move |s| pulse(s, context, base));
    Ok(())
}

/// Tints the eye buffer by where the head is looking.
pub struct HeadTintScript;

impl WindowScript for HeadTintScript {
    fn open(&mut self, window: &WindowInfo, frames: &mut AnimationFrameQueue) {
        let Some(context) = window.xr_context() else {
            log::warn!("{} has no XR canvas", window.id);
            return;
        };
        frames.request_frame(0, move |scope| tint(scope, context, 0));
    }
}

fn tint(scope: &mut FrameScope<'_>, context: ContextId, drawn: u64) -> anyhow::Result<()> {
    let [x, y, _, w] = scope.xr().head_orientation();
    let yaw = 2.0 * y.atan2(w);
    let color = [0.5 + 0.5 * yaw.sin(), 0.2 + x.abs(), 0.5 + 0.5 * yaw.cos(), 1.0];
    scope.clear(context, color);

    let drawn = drawn + 1;
    if drawn % 600 == 0 {
        log::debug!("XR canvas drew {drawn} frames");
    }
    scope.request_frame(0, move |s| tint(s, context, drawn));
    Ok(())
}
