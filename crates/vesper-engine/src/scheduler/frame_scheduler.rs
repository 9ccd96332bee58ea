use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::compositor::{CompositionPass, Compositor, Layer, PresentReport};
use crate::config::EngineConfig;
use crate::error::{PoseAcquisitionError, SchedulerFatalError, WindowOpenError};
use crate::pose::{PoseOutcome, PoseProvider};
use crate::present::{HostEvent, Presentation, VrSubmitter};
use crate::time::{FrameClock, FrameStats, Stage};
use crate::window::{WindowEvent, WindowId, WindowScript, WindowSpec};
use crate::xr::{SharedXrState, XrFrame, XrStateWriter};

use super::context::{FrameContext, TimedResource};

/// How the pose step of a tick went.
#[derive(Debug, Clone, PartialEq)]
pub enum PoseStatus {
    Fresh,
    /// The previous pose was kept.
    Stale(PoseAcquisitionError),
    Inactive,
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp_ms: f64,
    pub pose: PoseStatus,
    pub host_events: usize,
    pub closed: Vec<WindowId>,
    pub dispatched: Vec<WindowId>,
    /// Dispatched windows that missed the deadline.
    pub not_ready: Vec<WindowId>,
    pub composition: CompositionPass,
    pub present: PresentReport,
}

/// Stops a running scheduler from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Drives one frame per tick: pose, fan-out render, bounded wait,
/// composition, presentation.
pub struct FrameScheduler<P: Presentation> {
    config: EngineConfig,
    presentation: P,
    ctx: FrameContext,
    compositor: Compositor,
    clock: FrameClock,
    stats: Option<FrameStats>,
    stop: StopHandle,
    last_tick: Option<Instant>,
}

impl<P: Presentation> FrameScheduler<P> {
    pub fn new(config: EngineConfig, presentation: P, pose: PoseProvider) -> Result<Self, SchedulerFatalError> {
        let xr = XrStateWriter::new(config.frame_size.width, config.frame_size.height)?;
        let ctx = FrameContext::new(xr, pose, config.mirror_blit);
        let stats = config
            .performance_logging
            .then(|| FrameStats::new(config.stats_interval, config.frame_budget));

        log::info!(
            "frame scheduler ready: {}x{} per eye, budget {:?}, pose {}",
            config.frame_size.width,
            config.frame_size.height,
            config.frame_budget,
            ctx.pose.source_name().unwrap_or("off"),
        );

        Ok(Self {
            compositor: Compositor::new(config.composition_failure_threshold),
            config,
            presentation,
            ctx,
            clock: FrameClock::new(),
            stats,
            stop: StopHandle::default(),
            last_tick: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &FrameContext {
        &self.ctx
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    pub fn xr_state(&self) -> Arc<SharedXrState> {
        self.ctx.xr_state()
    }

    /// The writer's copy of the XR state, as of the last tick.
    pub fn xr_frame(&self) -> &XrFrame {
        self.ctx.xr.frame()
    }

    pub fn set_depth_range(&mut self, near: f32, far: f32) {
        self.ctx.xr.set_depth_range(near, far);
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Opens a window. A context flagged `xr` becomes the eye buffer.
    pub fn open_window(&mut self, spec: WindowSpec, script: impl WindowScript) -> Result<WindowId, WindowOpenError> {
        let id = self.ctx.windows.open(spec, script, &mut self.presentation)?;
        let xr_context = self.ctx.windows.contexts_of(id).iter().find(|c| c.xr).map(|c| c.id);
        if let Some(context) = xr_context {
            if let Some(previous) = self.ctx.xr_present.context.replace(context) {
                log::warn!("{context} replaces {previous} as the XR eye buffer");
            }
            log::info!("presenting {context} to XR");
        }
        Ok(id)
    }

    pub fn close_window(&mut self, id: WindowId) -> bool {
        let contexts: Vec<_> = self.ctx.windows.contexts_of(id).iter().map(|c| c.id).collect();
        if !self.ctx.windows.close(id, &mut self.presentation) {
            return false;
        }
        for context in contexts {
            if self.ctx.xr_present.context == Some(context) {
                self.ctx.xr_present.context = None;
                log::info!("XR presentation ended with {id}");
            }
            self.ctx.layers.forget_source(context);
        }
        true
    }

    pub fn window_count(&self) -> usize {
        self.ctx.windows.len()
    }

    pub fn set_layers(&mut self, layers: Vec<Layer>) {
        self.ctx.layers.replace(layers);
    }

    pub fn set_vr_submitter(&mut self, submitter: Box<dyn VrSubmitter>) {
        self.ctx.xr_present.set_submitter(submitter);
    }

    pub fn add_timed_resource(&mut self, resource: impl TimedResource + 'static) {
        self.ctx.media.push(Box::new(resource));
    }

    /// When the next tick should start to hold the target cadence.
    pub fn next_tick_at(&self) -> Instant {
        match self.last_tick {
            Some(t) => t + self.config.frame_budget,
            None => Instant::now(),
        }
    }

    /// Runs one tick.
    pub fn tick(&mut self) -> TickReport {
        self.mark(Stage::Idle);
        let frame = self.clock.tick();
        self.last_tick = Some(frame.now);
        log::trace!("tick {} at {:.3}ms", frame.tick, frame.timestamp_ms);

        // Pose, bounded by the provider's budget.
        let pose = match self.ctx.pose.acquire_pose() {
            PoseOutcome::Sample(sample) => {
                self.ctx.xr.apply_pose(&sample);
                self.ctx.xr_present.has_pose = true;
                PoseStatus::Fresh
            }
            PoseOutcome::Unavailable(e) => {
                match e {
                    PoseAcquisitionError::Timeout(_) => log::debug!("tick {}: {e}; keeping last pose", frame.tick),
                    _ => log::warn!("tick {}: {e}; keeping last pose", frame.tick),
                }
                PoseStatus::Stale(e)
            }
            PoseOutcome::Inactive => PoseStatus::Inactive,
        };
        self.mark(Stage::Wait);

        // Derived gamepad fields, then publish before any reader runs.
        self.ctx.xr.recompute_derived();
        self.ctx.xr.publish();
        self.mark(Stage::Prepare);

        let events = self.presentation.poll_events();
        let host_events = events.len();
        let closed = self.handle_host_events(events);
        self.mark(Stage::Events);

        for resource in self.ctx.media.iter_mut() {
            resource.advance(&frame);
        }
        self.mark(Stage::Media);

        let dispatched = self
            .ctx
            .windows
            .dispatch_ready(frame.tick, frame.timestamp_ms, Instant::now());
        let deadline = Instant::now() + self.config.frame_budget;
        let outcome = self.ctx.windows.wait_for(&dispatched, deadline);
        // Anything that lands before composition starts is composited now.
        let late = self.ctx.windows.drain_completions();
        if late > 0 {
            log::trace!("tick {}: {late} completion(s) landed after the wait", frame.tick);
        }
        let not_ready = outcome
            .not_ready()
            .iter()
            .copied()
            .filter(|id| self.ctx.windows.phase(*id) == Some(crate::window::WindowPhase::Rendering))
            .collect::<Vec<_>>();
        if !not_ready.is_empty() {
            log::debug!("tick {}: {} window(s) not ready", frame.tick, not_ready.len());
        }
        self.mark(Stage::User);

        let xr_frame = *self.ctx.xr.frame();
        let composition = self.compositor.composite(
            &mut self.ctx.windows,
            &mut self.ctx.layers,
            &self.ctx.xr_present,
            &xr_frame,
            &mut self.presentation,
        );
        let present = self.compositor.present(
            &composition,
            &mut self.ctx.windows,
            &mut self.ctx.xr_present,
            &mut self.presentation,
        );
        self.mark(Stage::Submit);

        if let Some(report) = self.stats.as_mut().and_then(FrameStats::end_frame) {
            log::info!("perf: {report}");
        }

        TickReport {
            tick: frame.tick,
            timestamp_ms: frame.timestamp_ms,
            pose,
            host_events,
            closed,
            dispatched,
            not_ready,
            composition,
            present,
        }
    }

    /// Ticks at the configured cadence until stopped or until the last
    /// window has closed.
    pub fn run(&mut self) {
        log::info!("frame loop started");
        while !self.stop.is_stopped() {
            self.tick();
            if self.ctx.windows.is_empty() {
                log::info!("no windows left");
                break;
            }
            let wait = self.next_tick_at().saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
        log::info!("frame loop stopped");
    }

    fn handle_host_events(&mut self, events: Vec<HostEvent>) -> Vec<WindowId> {
        let mut closed = Vec::new();
        for event in events {
            match event {
                HostEvent::CloseRequested(surface) => {
                    if let Some(id) = self.ctx.windows.window_for_surface(surface) {
                        if self.close_window(id) {
                            closed.push(id);
                        }
                    }
                }
                HostEvent::Resized { surface, width, height } => {
                    let Some(id) = self.ctx.windows.window_for_surface(surface) else {
                        continue;
                    };
                    let contexts: Vec<_> = self
                        .ctx
                        .windows
                        .contexts_of(id)
                        .iter()
                        .filter(|c| c.surface == Some(surface))
                        .map(|c| c.id)
                        .collect();
                    for context in contexts {
                        self.ctx
                            .windows
                            .send_event(id, WindowEvent::Resized { context, width, height });
                    }
                }
            }
        }
        closed
    }

    fn mark(&mut self, stage: Stage) {
        if let Some(stats) = self.stats.as_mut() {
            stats.mark(stage);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::compositor::LayerKind;
    use crate::pose::{PoseSample, SoftwareSource};
    use crate::present::SurfaceId;
    use crate::testing::{wait_until, Call, CountingSubmitter, RecordingPresentation, ScriptedPose, TestScript};
    use crate::time::FrameTime;
    use crate::window::{ContextSpec, WindowPhase};

    fn config() -> EngineConfig {
        EngineConfig {
            frame_size: crate::config::FrameSize { width: 64, height: 64 },
            frame_budget: Duration::from_millis(40),
            pose_budget: Duration::from_millis(10),
            ..EngineConfig::default()
        }
    }

    fn scheduler(pose: PoseProvider) -> FrameScheduler<RecordingPresentation> {
        FrameScheduler::new(config(), RecordingPresentation::default(), pose).unwrap()
    }

    fn window_on(surface: Option<SurfaceId>, priority: i32, xr: bool) -> WindowSpec {
        WindowSpec {
            priority,
            contexts: vec![ContextSpec {
                width: 64,
                height: 64,
                surface,
                xr,
            }],
        }
    }

    /// Ticks until `id` has been composited, or gives up.
    fn tick_until_composited(s: &mut FrameScheduler<RecordingPresentation>, id: WindowId) -> bool {
        (0..50).any(|_| s.tick().composition.composited.contains(&id))
    }

    #[test]
    fn zero_frame_size_is_fatal() {
        let mut c = config();
        c.frame_size.width = 0;
        let r = FrameScheduler::new(c, RecordingPresentation::default(), PoseProvider::inactive());
        assert!(matches!(r, Err(SchedulerFatalError::InvalidRenderSize { .. })));
    }

    #[test]
    fn windows_composite_in_priority_order_and_return_to_null() {
        let mut s = scheduler(PoseProvider::inactive());
        let s1 = s.presentation_mut().add_surface(64, 64);
        let s2 = s.presentation_mut().add_surface(64, 64);
        let w2 = s.open_window(window_on(Some(s2), 0, false), TestScript::clearing([0.0; 4])).unwrap();
        let w1 = s.open_window(window_on(Some(s1), 10, false), TestScript::clearing([1.0; 4])).unwrap();

        let report = s.tick();
        assert_eq!(report.pose, PoseStatus::Inactive);
        assert_eq!(report.composition.composited, [w1, w2]);
        assert_eq!(report.present.swapped, 2);
        assert_eq!(s.context().windows().phase(w1), Some(WindowPhase::Null));
        assert_eq!(s.context().windows().phase(w2), Some(WindowPhase::Null));
    }

    #[test]
    fn pose_timeouts_keep_the_last_sample() {
        let (source, script) = ScriptedPose::new();
        let mut s = scheduler(PoseProvider::spawn(source, Duration::from_millis(10)).unwrap());
        let reader = s.xr_state();

        let mut sample = PoseSample::default();
        sample.head.position = [0.5, 1.7, -2.0];
        sample.head.orientation = [0.0, 0.7071068, 0.0, 0.7071068];
        script.reply(Ok(sample));
        assert_eq!(s.tick().pose, PoseStatus::Fresh);
        let good = reader.load();

        for _ in 0..3 {
            let report = s.tick();
            assert!(matches!(report.pose, PoseStatus::Stale(PoseAcquisitionError::Timeout(_))));
            let now = reader.load();
            assert_eq!(now.position, good.position);
            assert_eq!(now.orientation, good.orientation);
            assert_eq!(now.left_view, good.left_view);
        }
        assert_eq!(reader.head_position(), [0.5, 1.7, -2.0]);
    }

    #[test]
    fn failing_window_is_redispatched_next_tick() {
        let mut s = scheduler(PoseProvider::inactive());
        let surface = s.presentation_mut().add_surface(64, 64);
        let w = s
            .open_window(window_on(Some(surface), 0, false), TestScript::clearing([0.0; 4]).failing(1))
            .unwrap();

        let first = s.tick();
        assert_eq!(first.dispatched, [w]);
        assert!(first.composition.composited.is_empty());
        assert_eq!(s.context().windows().phase(w), Some(WindowPhase::Null));

        let second = s.tick();
        assert_eq!(second.dispatched, [w]);
        assert_eq!(second.composition.composited, [w]);
    }

    #[test]
    fn stuck_window_does_not_hold_the_loop() {
        let mut s = scheduler(PoseProvider::inactive());
        let (script, gate) = TestScript::clearing([0.0; 4]).gated();
        let stuck = s.open_window(window_on(None, 0, false), script).unwrap();
        let healthy = s.open_window(window_on(None, 0, false), TestScript::clearing([0.0; 4])).unwrap();

        let budget = s.config().frame_budget;
        for _ in 0..3 {
            let started = Instant::now();
            let report = s.tick();
            assert!(started.elapsed() < budget + Duration::from_millis(250));
            assert!(report.composition.composited.contains(&healthy));
            assert!(!report.composition.composited.contains(&stuck));
        }
        assert_eq!(s.context().windows().phase(stuck), Some(WindowPhase::Rendering));

        gate.send(()).unwrap();
        assert!(tick_until_composited(&mut s, stuck));
    }

    #[test]
    fn software_pose_gates_xr_submission() {
        let (source, handle) = SoftwareSource::new();
        let mut s = scheduler(PoseProvider::spawn(source, Duration::from_millis(500)).unwrap());
        let submits = Arc::new(AtomicUsize::new(0));
        s.set_vr_submitter(Box::new(CountingSubmitter(Arc::clone(&submits))));
        let w = s.open_window(window_on(None, 0, true), TestScript::clearing([0.0; 4])).unwrap();

        handle.set_head([0.0, 1.2, 0.0], [0.0, 0.0, 0.0, 1.0]);
        let report = s.tick();
        assert_eq!(report.pose, PoseStatus::Fresh);
        assert_eq!(report.composition.composited, [w]);
        assert!(report.present.submitted);
        assert_eq!(submits.load(Ordering::SeqCst), 1);
        assert_eq!(s.xr_state().head_position(), [0.0, 1.2, 0.0]);
    }

    #[test]
    fn layers_set_by_the_host_use_the_composition_path() {
        let mut s = scheduler(PoseProvider::spawn(SoftwareSource::new().0, Duration::from_millis(500)).unwrap());
        let src = s.open_window(window_on(None, 5, false), TestScript::clearing([0.0; 4])).unwrap();
        let xr = s.open_window(window_on(None, 0, true), TestScript::clearing([0.0; 4])).unwrap();
        let source_ctx = s.context().windows().contexts_of(src)[0].id;
        s.set_layers(vec![
            Layer::new(LayerKind::Iframe3d, source_ctx),
            Layer::new(LayerKind::Iframe2d, source_ctx),
        ]);

        assert!(tick_until_composited(&mut s, xr));
        assert!(s.presentation().calls.iter().any(|c| matches!(c, Call::Compose { layers, .. } if layers.len() == 2)));

        // Closing the source drops its layers.
        assert!(s.close_window(src));
        assert!(s.context().layers().is_empty());
        assert!(s.context().xr_presentation().is_presenting());

        assert!(s.close_window(xr));
        assert!(!s.context().xr_presentation().is_presenting());
    }

    #[test]
    fn close_request_closes_the_owning_window() {
        let mut s = scheduler(PoseProvider::inactive());
        let surface = s.presentation_mut().add_surface(64, 64);
        let w = s.open_window(window_on(Some(surface), 0, false), TestScript::clearing([0.0; 4])).unwrap();
        let fbo = s.context().windows().contexts_of(w)[0].targets.fbo;

        s.presentation_mut().events.push(HostEvent::CloseRequested(surface));
        let report = s.tick();
        assert_eq!(report.closed, [w]);
        assert_eq!(s.window_count(), 0);
        assert!(s.presentation().calls.contains(&Call::Destroy(fbo)));
    }

    #[test]
    fn resize_is_forwarded_to_the_window() {
        let mut s = scheduler(PoseProvider::inactive());
        let surface = s.presentation_mut().add_surface(64, 64);
        let script = TestScript::clearing([0.0; 4]);
        let events = script.events();
        let w = s.open_window(window_on(Some(surface), 0, false), script).unwrap();
        let context = s.context().windows().contexts_of(w)[0].id;

        s.presentation_mut().resize_surface(surface, 128, 96);
        s.presentation_mut().events.push(HostEvent::Resized { surface, width: 128, height: 96 });
        s.tick();

        assert!(wait_until(Duration::from_secs(5), || {
            events
                .lock()
                .unwrap()
                .contains(&WindowEvent::Resized { context, width: 128, height: 96 })
        }));
    }

    struct StopAfter {
        ticks: Arc<AtomicUsize>,
        stop: StopHandle,
        after: usize,
    }

    impl TimedResource for StopAfter {
        fn advance(&mut self, _frame: &FrameTime) {
            if self.ticks.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.stop.stop();
            }
        }
    }

    #[test]
    fn run_advances_timed_resources_until_stopped() {
        let mut s = scheduler(PoseProvider::inactive());
        s.open_window(window_on(None, 0, false), TestScript::clearing([0.0; 4])).unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        s.add_timed_resource(StopAfter {
            ticks: Arc::clone(&ticks),
            stop: s.stop_handle(),
            after: 3,
        });

        s.run();
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn run_returns_once_every_window_is_closed() {
        let mut s = scheduler(PoseProvider::inactive());
        let surface = s.presentation_mut().add_surface(64, 64);
        s.open_window(window_on(Some(surface), 0, false), TestScript::clearing([0.0; 4])).unwrap();
        s.presentation_mut().events.push(HostEvent::CloseRequested(surface));

        s.run();
        assert_eq!(s.window_count(), 0);
    }
}
