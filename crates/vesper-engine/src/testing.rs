//! Test doubles shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::compositor::Layer;
use crate::error::{CompositionError, PoseAcquisitionError};
use crate::frame::{AnimationFrameQueue, FrameOutput, FrameScope};
use crate::pose::{PoseSample, PoseSource};
use crate::present::{
    BlitRegion, BlitTarget, FramebufferId, HostEvent, Presentation, RenderTargets, ResolvedLayer,
    SurfaceId, TextureId, VrSubmitter,
};
use crate::window::{ContextId, WindowEvent, WindowInfo, WindowScript};
use crate::xr::XrFrame;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create { width: u32, height: u32 },
    Destroy(FramebufferId),
    Clear(FramebufferId, [f32; 4]),
    Blit { src: FramebufferId, dst: BlitTarget, region: BlitRegion },
    Compose { dst: FramebufferId, layers: Vec<TextureId> },
    Swap(SurfaceId),
}

impl Call {
    pub fn is_present_blit(&self) -> bool {
        matches!(self, Call::Blit { dst: BlitTarget::Surface(_), .. })
    }

    pub fn is_resolve_blit(&self) -> bool {
        matches!(self, Call::Blit { dst: BlitTarget::Framebuffer(_), .. })
    }
}

/// Records every call; optionally fails some of them.
#[derive(Debug, Default)]
pub struct RecordingPresentation {
    pub calls: Vec<Call>,
    pub events: Vec<HostEvent>,
    /// Number of successful allocations before `create_render_targets` fails.
    pub fail_create_after: Option<usize>,
    pub fail_blits: bool,
    surfaces: BTreeMap<SurfaceId, (u32, u32, bool)>,
    created: usize,
    next_id: u32,
}

impl RecordingPresentation {
    pub fn add_surface(&mut self, width: u32, height: u32) -> SurfaceId {
        let id = SurfaceId(self.surfaces.len() as u32 + 1);
        self.surfaces.insert(id, (width, height, true));
        id
    }

    pub fn set_visible(&mut self, surface: SurfaceId, visible: bool) {
        if let Some(s) = self.surfaces.get_mut(&surface) {
            s.2 = visible;
        }
    }

    pub fn resize_surface(&mut self, surface: SurfaceId, width: u32, height: u32) {
        if let Some(s) = self.surfaces.get_mut(&surface) {
            s.0 = width;
            s.1 = height;
        }
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }
}

impl Presentation for RecordingPresentation {
    fn create_render_targets(&mut self, width: u32, height: u32) -> Result<RenderTargets, CompositionError> {
        if self.fail_create_after.is_some_and(|n| self.created >= n) {
            return Err(CompositionError::TargetAllocation {
                width,
                height,
                reason: "scripted failure".into(),
            });
        }
        self.created += 1;
        self.calls.push(Call::Create { width, height });
        let base = self.next_id;
        self.next_id += 2;
        Ok(RenderTargets {
            fbo: FramebufferId(base + 1),
            resolve_fbo: FramebufferId(base + 2),
            tex: TextureId(base + 1),
            depth_tex: TextureId(base + 2),
            width,
            height,
        })
    }

    fn destroy_render_targets(&mut self, targets: &RenderTargets) {
        self.calls.push(Call::Destroy(targets.fbo));
    }

    fn clear(&mut self, fbo: FramebufferId, color: [f32; 4]) -> Result<(), CompositionError> {
        self.calls.push(Call::Clear(fbo, color));
        Ok(())
    }

    fn blit(&mut self, src: FramebufferId, dst: BlitTarget, region: BlitRegion) -> Result<(), CompositionError> {
        if self.fail_blits {
            return Err(CompositionError::UnknownFramebuffer(src));
        }
        self.calls.push(Call::Blit { src, dst, region });
        Ok(())
    }

    fn compose_layers(
        &mut self,
        dst: FramebufferId,
        layers: &[ResolvedLayer],
        _xr: &XrFrame,
    ) -> Result<(), CompositionError> {
        self.calls.push(Call::Compose {
            dst,
            layers: layers.iter().map(|l| l.texture).collect(),
        });
        Ok(())
    }

    fn surface_size(&self, surface: SurfaceId) -> Option<(u32, u32)> {
        self.surfaces.get(&surface).map(|s| (s.0, s.1))
    }

    fn is_visible(&self, surface: SurfaceId) -> bool {
        self.surfaces.get(&surface).is_some_and(|s| s.2)
    }

    fn swap_buffers(&mut self, surface: SurfaceId) -> Result<(), CompositionError> {
        self.calls.push(Call::Swap(surface));
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Counts submissions.
#[derive(Debug, Clone, Default)]
pub struct CountingSubmitter(pub Arc<AtomicUsize>);

impl VrSubmitter for CountingSubmitter {
    fn submit(&mut self, _texture: TextureId, _width: u32, _height: u32) -> Result<(), CompositionError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Pose source answered by the test, one reply per request.
pub struct ScriptedPose {
    replies: Receiver<Result<PoseSample, PoseAcquisitionError>>,
    requests: Arc<AtomicUsize>,
}

pub struct PoseScript {
    replies: Sender<Result<PoseSample, PoseAcquisitionError>>,
    requests: Arc<AtomicUsize>,
}

impl ScriptedPose {
    pub fn new() -> (Self, PoseScript) {
        let (tx, rx) = unbounded();
        let requests = Arc::new(AtomicUsize::new(0));
        (
            Self {
                replies: rx,
                requests: Arc::clone(&requests),
            },
            PoseScript { replies: tx, requests },
        )
    }
}

impl PoseScript {
    pub fn reply(&self, reply: Result<PoseSample, PoseAcquisitionError>) {
        let _ = self.replies.send(reply);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PoseSource for ScriptedPose {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn acquire(&mut self) -> Result<PoseSample, PoseAcquisitionError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.replies.recv().unwrap_or(Err(PoseAcquisitionError::WorkerGone))
    }
}

struct ScriptState {
    color: [f32; 4],
    context: Mutex<Option<ContextId>>,
    gate: Option<Receiver<()>>,
    layers: Mutex<Option<Vec<Layer>>>,
}

/// Window script that clears its first context every tick.
pub struct TestScript {
    state: Arc<ScriptState>,
    failures: Arc<AtomicU32>,
    events: Arc<Mutex<Vec<WindowEvent>>>,
}

impl TestScript {
    pub fn clearing(color: [f32; 4]) -> Self {
        Self {
            state: Arc::new(ScriptState {
                color,
                context: Mutex::new(None),
                gate: None,
                layers: Mutex::new(None),
            }),
            failures: Arc::default(),
            events: Arc::default(),
        }
    }

    /// The next `n` ticks fail in `finish_frame`.
    pub fn failing(self, n: u32) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Every frame blocks until the returned sender delivers one message.
    pub fn gated(self) -> (Self, Sender<()>) {
        let (tx, rx) = unbounded();
        let state = Arc::new(ScriptState {
            color: self.state.color,
            context: Mutex::new(None),
            gate: Some(rx),
            layers: Mutex::new(None),
        });
        (Self { state, ..self }, tx)
    }

    /// Sets `layers` from the first frame.
    pub fn with_layers(self, layers: Vec<Layer>) -> Self {
        *self.state.layers.lock().unwrap() = Some(layers);
        self
    }

    pub fn events(&self) -> Arc<Mutex<Vec<WindowEvent>>> {
        Arc::clone(&self.events)
    }
}

fn draw(scope: &mut FrameScope<'_>, state: Arc<ScriptState>) -> anyhow::Result<()> {
    if let Some(gate) = &state.gate {
        let _ = gate.recv();
    }
    if let Some(ctx) = *state.context.lock().unwrap() {
        scope.clear(ctx, state.color);
    }
    if let Some(layers) = state.layers.lock().unwrap().take() {
        scope.set_layers(layers);
    }
    let next = Arc::clone(&state);
    scope.request_frame(0, move |s| draw(s, next));
    Ok(())
}

impl WindowScript for TestScript {
    fn open(&mut self, window: &WindowInfo, frames: &mut AnimationFrameQueue) {
        *self.state.context.lock().unwrap() = window.contexts.first().map(|c| c.id);
        let state = Arc::clone(&self.state);
        frames.request_frame(0, move |s| draw(s, state));
    }

    fn on_event(&mut self, event: &WindowEvent, _frames: &mut AnimationFrameQueue) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn finish_frame(&mut self, _output: &FrameOutput) -> anyhow::Result<()> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("scripted finish failure");
        }
        Ok(())
    }
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
