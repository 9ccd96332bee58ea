use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::WindowOpenError;
use crate::present::{Presentation, SurfaceId};
use crate::xr::SharedXrState;

use super::context::{ContextId, DrawingContext, WindowId, WindowInfo, WindowSpec};
use super::phase::{PhaseTracker, WindowPhase};
use super::script::{WindowEvent, WindowScript};
use super::task::{spawn_window_task, TickCompletion, TickOutput, WindowCommand};
use super::wait::{wait_all_or_deadline, WaitOutcome};

struct WindowEntry {
    priority: i32,
    phase: PhaseTracker,
    contexts: Vec<DrawingContext>,
    commands: Sender<WindowCommand>,
    // Output of the last completed tick, held until the compositor takes it.
    output: Option<TickOutput>,
    task_gone: bool,
}

/// Every open window with its phase, contexts and task handle.
pub struct WindowRegistry {
    windows: BTreeMap<WindowId, WindowEntry>,
    completions_tx: Sender<TickCompletion>,
    completions_rx: Receiver<TickCompletion>,
    xr: Arc<SharedXrState>,
    next_window: u32,
    next_context: u32,
}

impl WindowRegistry {
    pub fn new(xr: Arc<SharedXrState>) -> Self {
        let (completions_tx, completions_rx) = unbounded();
        Self {
            windows: BTreeMap::new(),
            completions_tx,
            completions_rx,
            xr,
            next_window: 0,
            next_context: 0,
        }
    }

    /// Allocates the window's contexts and starts its task.
    pub fn open(
        &mut self,
        spec: WindowSpec,
        script: impl WindowScript,
        presentation: &mut dyn Presentation,
    ) -> Result<WindowId, WindowOpenError> {
        self.next_window += 1;
        let id = WindowId(self.next_window);

        let mut contexts: Vec<DrawingContext> = Vec::with_capacity(spec.contexts.len());
        for c in &spec.contexts {
            let targets = match presentation.create_render_targets(c.width, c.height) {
                Ok(t) => t,
                Err(e) => {
                    for made in &contexts {
                        presentation.destroy_render_targets(&made.targets);
                    }
                    return Err(e.into());
                }
            };
            self.next_context += 1;
            contexts.push(DrawingContext {
                id: ContextId(self.next_context),
                window: id,
                surface: c.surface,
                width: c.width,
                height: c.height,
                xr: c.xr,
                targets,
                consecutive_failures: 0,
            });
        }

        let info = WindowInfo {
            id,
            contexts: contexts.iter().map(DrawingContext::info).collect(),
        };
        let (commands, command_rx) = unbounded();
        let spawned = spawn_window_task(
            info,
            Box::new(script),
            Arc::clone(&self.xr),
            command_rx,
            self.completions_tx.clone(),
        );
        if let Err(e) = spawned {
            for c in &contexts {
                presentation.destroy_render_targets(&c.targets);
            }
            return Err(WindowOpenError::Spawn(e));
        }

        log::info!(
            "opened {id} (priority {}, {} context(s))",
            spec.priority,
            contexts.len()
        );
        self.windows.insert(
            id,
            WindowEntry {
                priority: spec.priority,
                phase: PhaseTracker::default(),
                contexts,
                commands,
                output: None,
                task_gone: false,
            },
        );
        Ok(id)
    }

    /// Stops the window's task and releases its contexts. An in-flight tick
    /// is abandoned; its completion is ignored.
    pub fn close(&mut self, id: WindowId, presentation: &mut dyn Presentation) -> bool {
        let Some(entry) = self.windows.remove(&id) else {
            return false;
        };
        let _ = entry.commands.send(WindowCommand::Shutdown);
        for c in &entry.contexts {
            presentation.destroy_render_targets(&c.targets);
        }
        log::info!("closed {id}");
        true
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.windows.keys().copied()
    }

    pub fn phase(&self, id: WindowId) -> Option<WindowPhase> {
        self.windows.get(&id).map(|e| e.phase.phase())
    }

    pub fn priority(&self, id: WindowId) -> Option<i32> {
        self.windows.get(&id).map(|e| e.priority)
    }

    pub fn set_priority(&mut self, id: WindowId, priority: i32) -> bool {
        match self.windows.get_mut(&id) {
            Some(e) => {
                e.priority = priority;
                true
            }
            None => false,
        }
    }

    /// Moves every `Null` window to `Rendering` and sends it the tick.
    pub fn dispatch_ready(&mut self, tick: u64, timestamp: f64, now: Instant) -> Vec<WindowId> {
        let mut dispatched = Vec::new();
        for (&id, entry) in self.windows.iter_mut() {
            if entry.task_gone || !entry.phase.dispatch(tick, now) {
                continue;
            }
            if entry.commands.send(WindowCommand::Tick { tick, timestamp }).is_err() {
                log::error!("{id} task is gone; it will no longer be dispatched");
                entry.phase.fail();
                entry.task_gone = true;
                continue;
            }
            dispatched.push(id);
        }
        log::trace!("tick {tick}: dispatched {} window(s)", dispatched.len());
        dispatched
    }

    /// Waits until every window in `dispatched` reported back or `deadline`
    /// passes. Completions from earlier ticks are settled too.
    pub fn wait_for(&mut self, dispatched: &[WindowId], deadline: Instant) -> WaitOutcome<WindowId> {
        let rx = self.completions_rx.clone();
        let pending: BTreeSet<WindowId> = dispatched.iter().copied().collect();
        wait_all_or_deadline(&rx, pending, deadline, |c| self.settle(c))
    }

    /// Settles whatever completions are already queued, without blocking.
    pub fn drain_completions(&mut self) -> usize {
        let rx = self.completions_rx.clone();
        let mut n = 0;
        for c in rx.try_iter() {
            self.settle(c);
            n += 1;
        }
        n
    }

    fn settle(&mut self, completion: TickCompletion) -> WindowId {
        let TickCompletion { window, tick, result } = completion;
        let Some(entry) = self.windows.get_mut(&window) else {
            log::debug!("ignoring tick {tick} result from closed {window}");
            return window;
        };

        match result {
            Ok(output) => {
                if entry.phase.complete() {
                    entry.output = Some(output);
                } else {
                    log::warn!(
                        "{window} reported tick {tick} while {:?}; ignored",
                        entry.phase.phase()
                    );
                }
            }
            Err(e) => {
                log::warn!("tick {tick}: {e}");
                entry.phase.fail();
            }
        }
        window
    }

    #[cfg(test)]
    pub(crate) fn queued_completions(&self) -> usize {
        self.completions_rx.len()
    }

    /// `Rendered` windows in composition order: descending priority, then id.
    pub fn composition_order(&self) -> Vec<WindowId> {
        let mut ids: Vec<(i32, WindowId)> = self
            .windows
            .iter()
            .filter(|(_, e)| e.phase.phase() == WindowPhase::Rendered)
            .map(|(&id, e)| (e.priority, id))
            .collect();
        ids.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Takes a `Rendered` window's output and returns it to `Null`.
    pub(crate) fn take_rendered(&mut self, id: WindowId) -> Option<TickOutput> {
        let entry = self.windows.get_mut(&id)?;
        if !entry.phase.consume() {
            return None;
        }
        Some(entry.output.take().unwrap_or_default())
    }

    pub fn context(&self, id: ContextId) -> Option<&DrawingContext> {
        self.windows
            .values()
            .flat_map(|e| e.contexts.iter())
            .find(|c| c.id == id)
    }

    pub(crate) fn context_mut(&mut self, id: ContextId) -> Option<&mut DrawingContext> {
        self.windows
            .values_mut()
            .flat_map(|e| e.contexts.iter_mut())
            .find(|c| c.id == id)
    }

    pub fn contexts_of(&self, id: WindowId) -> &[DrawingContext] {
        self.windows
            .get(&id)
            .map(|e| e.contexts.as_slice())
            .unwrap_or(&[])
    }

    pub fn window_for_surface(&self, surface: SurfaceId) -> Option<WindowId> {
        self.windows
            .iter()
            .find(|(_, e)| e.contexts.iter().any(|c| c.surface == Some(surface)))
            .map(|(&id, _)| id)
    }

    /// Queues `event` for the window's script. Returns `false` if the window
    /// is closed or its task is gone.
    pub fn send_event(&self, id: WindowId, event: WindowEvent) -> bool {
        self.windows
            .get(&id)
            .is_some_and(|e| e.commands.send(WindowCommand::Event(event)).is_ok())
    }
}

impl Drop for WindowRegistry {
    fn drop(&mut self) {
        for entry in self.windows.values() {
            let _ = entry.commands.send(WindowCommand::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::present::{FramebufferId, HostEvent};
    use crate::testing::{wait_until, Call, RecordingPresentation, TestScript};
    use crate::window::ContextSpec;
    use crate::xr::XrFrame;

    fn registry() -> WindowRegistry {
        WindowRegistry::new(Arc::new(SharedXrState::new(&XrFrame::default())))
    }

    fn spec(priority: i32, surface: Option<SurfaceId>) -> WindowSpec {
        WindowSpec {
            priority,
            contexts: vec![ContextSpec {
                width: 64,
                height: 32,
                surface,
                xr: false,
            }],
        }
    }

    fn settle_one(reg: &mut WindowRegistry, tick: u64) -> WaitOutcome<WindowId> {
        let dispatched = reg.dispatch_ready(tick, tick as f64, Instant::now());
        reg.wait_for(&dispatched, Instant::now() + Duration::from_secs(5))
    }

    #[test]
    fn open_allocates_and_close_releases_targets() {
        let mut pres = RecordingPresentation::default();
        let mut reg = registry();
        let id = reg.open(spec(0, None), TestScript::clearing([1.0; 4]), &mut pres).unwrap();

        let ctx = reg.contexts_of(id)[0].targets;
        assert_eq!(pres.calls, [Call::Create { width: 64, height: 32 }]);

        assert!(reg.close(id, &mut pres));
        assert_eq!(pres.calls.last(), Some(&Call::Destroy(ctx.fbo)));
        assert!(reg.is_empty());
        assert!(!reg.close(id, &mut pres));
    }

    #[test]
    fn failed_allocation_rolls_back() {
        let mut pres = RecordingPresentation::default();
        pres.fail_create_after = Some(1);
        let mut reg = registry();
        let mut two = spec(0, None);
        two.contexts.push(two.contexts[0]);

        let err = reg.open(two, TestScript::clearing([0.0; 4]), &mut pres);
        assert!(matches!(err, Err(WindowOpenError::Targets(_))));
        assert_eq!(pres.calls.last(), Some(&Call::Destroy(FramebufferId(1))));
        assert!(reg.is_empty());
    }

    #[test]
    fn successful_tick_reports_cleared_context() {
        let mut pres = RecordingPresentation::default();
        let mut reg = registry();
        let id = reg.open(spec(0, None), TestScript::clearing([0.5; 4]), &mut pres).unwrap();

        assert_eq!(settle_one(&mut reg, 1), WaitOutcome::AllSettled);
        assert_eq!(reg.phase(id), Some(WindowPhase::Rendered));

        let out = reg.take_rendered(id).unwrap();
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.frames[0].clear, Some([0.5; 4]));
        assert_eq!(reg.phase(id), Some(WindowPhase::Null));
        assert!(reg.take_rendered(id).is_none());
    }

    #[test]
    fn failing_tick_returns_to_null_and_is_redispatched() {
        let mut pres = RecordingPresentation::default();
        let mut reg = registry();
        let script = TestScript::clearing([0.0; 4]).failing(1);
        let id = reg.open(spec(0, None), script, &mut pres).unwrap();

        assert_eq!(settle_one(&mut reg, 1), WaitOutcome::AllSettled);
        assert_eq!(reg.phase(id), Some(WindowPhase::Null));
        assert!(reg.composition_order().is_empty());

        let dispatched = reg.dispatch_ready(2, 2.0, Instant::now());
        assert_eq!(dispatched, [id]);
        reg.wait_for(&dispatched, Instant::now() + Duration::from_secs(5));
        assert_eq!(reg.phase(id), Some(WindowPhase::Rendered));
    }

    #[test]
    fn stuck_window_is_left_rendering_and_resolves_later() {
        let mut pres = RecordingPresentation::default();
        let mut reg = registry();
        let (script, gate) = TestScript::clearing([0.0; 4]).gated();
        let id = reg.open(spec(0, None), script, &mut pres).unwrap();

        let budget = Duration::from_millis(30);
        let started = Instant::now();
        let dispatched = reg.dispatch_ready(1, 1.0, started);
        let outcome = reg.wait_for(&dispatched, started + budget);
        assert!(started.elapsed() < budget + Duration::from_millis(250));
        assert_eq!(outcome.not_ready(), &[id]);
        assert_eq!(reg.phase(id), Some(WindowPhase::Rendering));

        // Still busy: not dispatched again.
        assert!(reg.dispatch_ready(2, 2.0, Instant::now()).is_empty());

        gate.send(()).unwrap();
        let outcome = reg.wait_for(&[id], Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::AllSettled);
        assert_eq!(reg.phase(id), Some(WindowPhase::Rendered));
    }

    #[test]
    fn composition_order_is_priority_then_id() {
        let mut pres = RecordingPresentation::default();
        let mut reg = registry();
        let low = reg.open(spec(0, None), TestScript::clearing([0.0; 4]), &mut pres).unwrap();
        let high = reg.open(spec(10, None), TestScript::clearing([0.0; 4]), &mut pres).unwrap();
        let low2 = reg.open(spec(0, None), TestScript::clearing([0.0; 4]), &mut pres).unwrap();

        settle_one(&mut reg, 1);
        assert_eq!(reg.composition_order(), [high, low, low2]);
    }

    #[test]
    fn completion_queued_after_the_deadline_composites_in_the_same_pass() {
        let mut pres = RecordingPresentation::default();
        let mut reg = registry();
        let (script, gate) = TestScript::clearing([0.0; 4]).gated();
        let id = reg.open(spec(0, None), script, &mut pres).unwrap();

        let dispatched = reg.dispatch_ready(1, 1.0, Instant::now());
        let outcome = reg.wait_for(&dispatched, Instant::now() + Duration::from_millis(20));
        assert_eq!(outcome.not_ready(), &[id]);
        assert_eq!(reg.phase(id), Some(WindowPhase::Rendering));

        // Lands between the wait giving up and composition starting.
        gate.send(()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || reg.queued_completions() == 1));
        assert_eq!(reg.phase(id), Some(WindowPhase::Rendering));

        assert_eq!(reg.drain_completions(), 1);
        assert_eq!(reg.phase(id), Some(WindowPhase::Rendered));
        assert_eq!(reg.composition_order(), [id]);
        assert!(reg.take_rendered(id).is_some());
    }

    #[test]
    fn priority_changes_reorder_composition() {
        let mut pres = RecordingPresentation::default();
        let mut reg = registry();
        let a = reg.open(spec(0, None), TestScript::clearing([0.0; 4]), &mut pres).unwrap();
        let b = reg.open(spec(1, None), TestScript::clearing([0.0; 4]), &mut pres).unwrap();

        assert!(reg.set_priority(a, 5));
        assert_eq!(reg.priority(a), Some(5));
        settle_one(&mut reg, 1);
        assert_eq!(reg.composition_order(), [a, b]);

        reg.close(a, &mut pres);
        assert!(!reg.set_priority(a, 1));
    }

    #[test]
    fn completion_after_close_is_ignored() {
        let mut pres = RecordingPresentation::default();
        let mut reg = registry();
        let (script, gate) = TestScript::clearing([0.0; 4]).gated();
        let id = reg.open(spec(0, None), script, &mut pres).unwrap();

        reg.dispatch_ready(1, 1.0, Instant::now());
        reg.close(id, &mut pres);
        gate.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        reg.drain_completions();
        assert_eq!(reg.phase(id), None);
    }

    #[test]
    fn surfaces_map_back_to_windows() {
        let mut pres = RecordingPresentation::default();
        let surface = pres.add_surface(640, 480);
        let mut reg = registry();
        let id = reg.open(spec(0, Some(surface)), TestScript::clearing([0.0; 4]), &mut pres).unwrap();

        assert_eq!(reg.window_for_surface(surface), Some(id));
        pres.events.push(HostEvent::CloseRequested(surface));
        assert_eq!(pres.poll_events(), [HostEvent::CloseRequested(surface)]);
    }
}
