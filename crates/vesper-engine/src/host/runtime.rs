use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent as NativeEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId as NativeWindowId};

use crate::config::EngineConfig;
use crate::device::{GpuInit, WgpuPresentation};
use crate::pose::PoseProvider;
use crate::present::{HostEvent, SurfaceId};
use crate::scheduler::{FrameScheduler, StopHandle, TickReport};
use crate::window::{ContextSpec, WindowId, WindowScript, WindowSpec};

/// Native window request.
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub priority: i32,
    /// Render into the XR eye buffer and mirror it to this window.
    pub xr: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            title: "vesper".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            priority: 0,
            xr: false,
        }
    }
}

/// Application driven by the host.
pub trait HostApp: 'static {
    /// Called once the event loop is live. Open windows here.
    fn start(&mut self, host: &mut HostCtx<'_>) -> Result<()>;

    /// Called after every tick.
    fn after_tick(&mut self, _host: &mut HostCtx<'_>, _report: &TickReport) {}
}

/// Host access handed to [`HostApp`] callbacks.
pub struct HostCtx<'a> {
    event_loop: &'a ActiveEventLoop,
    engine: &'a mut Engine,
}

impl HostCtx<'_> {
    /// Creates a native window and opens an engine window presenting to it.
    pub fn open_window(&mut self, options: WindowOptions, script: impl WindowScript) -> Result<WindowId> {
        let attrs = Window::default_attributes()
            .with_title(options.title.clone())
            .with_inner_size(options.initial_size);
        let window = Arc::new(
            self.event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );
        let size = window.inner_size();

        let surface = self.engine.attach_surface(window)?;
        let scheduler = self.engine.scheduler_mut()?;

        let context = if options.xr {
            let frame = scheduler.config().frame_size;
            ContextSpec {
                width: frame.width * 2,
                height: frame.height,
                surface: Some(surface),
                xr: true,
            }
        } else {
            ContextSpec {
                width: size.width.max(1),
                height: size.height.max(1),
                surface: Some(surface),
                xr: false,
            }
        };
        let spec = WindowSpec {
            priority: options.priority,
            contexts: vec![context],
        };

        match scheduler.open_window(spec, script) {
            Ok(id) => {
                log::info!("{id} opened on {surface} (`{}`)", options.title);
                self.engine.surfaces.insert(id, surface);
                Ok(id)
            }
            Err(e) => {
                scheduler.presentation_mut().remove_surface(surface);
                Err(anyhow!(e).context(format!("failed to open `{}`", options.title)))
            }
        }
    }

    pub fn close_window(&mut self, id: WindowId) -> bool {
        let Ok(scheduler) = self.engine.scheduler_mut() else {
            return false;
        };
        let closed = scheduler.close_window(id);
        if closed {
            self.engine.release_surface(id);
        }
        closed
    }

    pub fn scheduler(&mut self) -> Option<&mut FrameScheduler<WgpuPresentation>> {
        self.engine.scheduler.as_mut()
    }

    pub fn exit(&mut self) {
        self.engine.exit_requested = true;
    }
}

/// Scheduler plus what it needs before the first window exists.
struct Engine {
    config: EngineConfig,
    gpu_init: GpuInit,
    pose: Option<PoseProvider>,
    scheduler: Option<FrameScheduler<WgpuPresentation>>,
    stop: Option<StopHandle>,
    surfaces: BTreeMap<WindowId, SurfaceId>,
    exit_requested: bool,
}

impl Engine {
    /// The first surface also brings up the GPU and the scheduler.
    fn attach_surface(&mut self, window: Arc<Window>) -> Result<SurfaceId> {
        if let Some(scheduler) = self.scheduler.as_mut() {
            return scheduler.presentation_mut().add_surface(window);
        }

        let (presentation, surface) = WgpuPresentation::new(self.gpu_init.clone(), window)?;
        let pose = self.pose.take().unwrap_or_else(PoseProvider::inactive);
        let scheduler = FrameScheduler::new(self.config.clone(), presentation, pose)
            .context("failed to start frame scheduler")?;
        self.stop = Some(scheduler.stop_handle());
        self.scheduler = Some(scheduler);
        Ok(surface)
    }

    fn scheduler_mut(&mut self) -> Result<&mut FrameScheduler<WgpuPresentation>> {
        self.scheduler
            .as_mut()
            .ok_or_else(|| anyhow!("frame scheduler not started"))
    }

    fn release_surface(&mut self, id: WindowId) {
        let Some(surface) = self.surfaces.remove(&id) else { return };
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.presentation_mut().remove_surface(surface);
        }
    }

    fn surface_for(&self, window: NativeWindowId) -> Option<SurfaceId> {
        self.scheduler
            .as_ref()
            .and_then(|s| s.presentation().surface_for_window(window))
    }
}

/// Entry point for the host.
pub struct Host;

impl Host {
    pub fn run<A: HostApp>(config: EngineConfig, gpu_init: GpuInit, pose: PoseProvider, app: A) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = HostState {
            app,
            started: false,
            engine: Engine {
                config,
                gpu_init,
                pose: Some(pose),
                scheduler: None,
                stop: None,
                surfaces: BTreeMap::new(),
                exit_requested: false,
            },
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

struct HostState<A: HostApp> {
    app: A,
    started: bool,
    engine: Engine,
}

impl<A: HostApp> HostState<A> {
    fn should_exit(&self) -> bool {
        self.engine.exit_requested || self.engine.stop.as_ref().is_some_and(StopHandle::is_stopped)
    }

    fn tick(&mut self, event_loop: &ActiveEventLoop) {
        let Some(scheduler) = self.engine.scheduler.as_mut() else {
            return;
        };
        let report = scheduler.tick();
        for id in &report.closed {
            self.engine.release_surface(*id);
        }

        let mut ctx = HostCtx {
            event_loop,
            engine: &mut self.engine,
        };
        self.app.after_tick(&mut ctx, &report);
    }
}

impl<A: HostApp> ApplicationHandler for HostState<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.started {
            return;
        }
        self.started = true;

        let mut ctx = HostCtx {
            event_loop,
            engine: &mut self.engine,
        };
        if let Err(e) = self.app.start(&mut ctx) {
            log::error!("failed to start: {e:#}");
            event_loop.exit();
            return;
        }
        if self.engine.surfaces.is_empty() {
            log::warn!("no windows opened at start; exiting");
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit() {
            event_loop.exit();
            return;
        }
        let Some(next) = self.engine.scheduler.as_ref().map(FrameScheduler::next_tick_at) else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        if Instant::now() >= next {
            self.tick(event_loop);
        }

        let window_count = self.engine.scheduler.as_ref().map_or(0, FrameScheduler::window_count);
        if window_count == 0 || self.should_exit() {
            log::info!("no windows left; exiting");
            event_loop.exit();
            return;
        }
        if let Some(next) = self.engine.scheduler.as_ref().map(FrameScheduler::next_tick_at) {
            event_loop.set_control_flow(ControlFlow::WaitUntil(next));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: NativeWindowId, event: NativeEvent) {
        if self.should_exit() {
            event_loop.exit();
            return;
        }
        let Some(surface) = self.engine.surface_for(window_id) else {
            return;
        };
        let Some(presentation) = self.engine.scheduler.as_mut().map(FrameScheduler::presentation_mut) else {
            return;
        };

        // Close and resize reach windows through the next tick.
        match event {
            NativeEvent::CloseRequested => presentation.push_event(HostEvent::CloseRequested(surface)),
            NativeEvent::Resized(size) => presentation.resize_surface(surface, size),
            NativeEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = presentation.window(surface).map(|w| w.inner_size()) {
                    presentation.resize_surface(surface, size);
                }
            }
            NativeEvent::Occluded(occluded) => presentation.set_visible(surface, !occluded),
            _ => {}
        }
    }
}
