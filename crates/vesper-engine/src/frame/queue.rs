use std::cmp::Reverse;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use crate::error::panic_message;
use crate::xr::SharedXrState;

use super::scope::{FrameOutput, FrameScope};

/// Handle returned by [`AnimationFrameQueue::request_frame`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequestId(u64);

impl fmt::Display for FrameRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

pub type FrameCallback = Box<dyn FnOnce(&mut FrameScope<'_>) -> anyhow::Result<()> + Send>;

struct Entry {
    id: FrameRequestId,
    priority: i32,
    callback: FrameCallback,
}

/// Counts from one [`AnimationFrameQueue::run`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FrameRunSummary {
    pub fired: usize,
    pub failed: usize,
}

/// One-shot, priority-ordered callback registry owned by a window.
///
/// `run` snapshots the live registry, so anything requested while callbacks
/// execute lands in the next tick.
#[derive(Default)]
pub struct AnimationFrameQueue {
    live: Vec<Entry>,
    // Snapshot being fired. Cancelled slots become `None`.
    firing: Vec<Option<Entry>>,
    next_id: u64,
}

impl AnimationFrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for the next run. Higher priority fires earlier.
    pub fn request_frame<F>(&mut self, priority: i32, callback: F) -> FrameRequestId
    where
        F: FnOnce(&mut FrameScope<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.next_id += 1;
        let id = FrameRequestId(self.next_id);
        self.live.push(Entry {
            id,
            priority,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes a pending callback. Returns `false` if `id` already fired or
    /// was never issued.
    pub fn cancel_frame(&mut self, id: FrameRequestId) -> bool {
        if let Some(i) = self.live.iter().position(|e| e.id == id) {
            self.live.remove(i);
            return true;
        }
        for slot in self.firing.iter_mut() {
            if slot.as_ref().is_some_and(|e| e.id == id) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Callbacks waiting for the next run.
    pub fn pending(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Fires every callback registered before this call, highest priority
    /// first, all with `timestamp`. Failures are logged and skipped.
    pub fn run(
        &mut self,
        timestamp: f64,
        xr: &SharedXrState,
        output: &mut FrameOutput,
    ) -> FrameRunSummary {
        let mut snapshot = mem::take(&mut self.live);
        if snapshot.is_empty() {
            return FrameRunSummary::default();
        }
        // Stable: equal priorities keep registration order.
        snapshot.sort_by_key(|e| Reverse(e.priority));
        self.firing = snapshot.into_iter().map(Some).collect();

        let mut summary = FrameRunSummary::default();
        for i in 0..self.firing.len() {
            let Some(entry) = self.firing[i].take() else {
                continue;
            };
            let id = entry.id;
            let mut scope = FrameScope {
                timestamp,
                xr,
                queue: self,
                output: &mut *output,
            };

            summary.fired += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(&mut scope))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    summary.failed += 1;
                    log::warn!("animation frame {id} failed: {e:#}");
                }
                Err(payload) => {
                    summary.failed += 1;
                    log::warn!("animation frame {id} panicked: {}", panic_message(payload.as_ref()));
                }
            }
        }

        self.firing.clear();
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::xr::XrFrame;

    fn xr() -> SharedXrState {
        SharedXrState::new(&XrFrame::default())
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn push(log: &Log, tag: &'static str) -> impl FnOnce(&mut FrameScope<'_>) -> anyhow::Result<()> + Send + 'static {
        let log = Arc::clone(log);
        move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        }
    }

    #[test]
    fn fires_by_descending_priority_ties_in_registration_order() {
        let log: Log = Arc::default();
        let mut q = AnimationFrameQueue::new();
        q.request_frame(0, push(&log, "a0"));
        q.request_frame(5, push(&log, "b5"));
        q.request_frame(0, push(&log, "c0"));
        q.request_frame(5, push(&log, "d5"));
        q.request_frame(-1, push(&log, "e-1"));

        let s = q.run(16.0, &xr(), &mut FrameOutput::default());
        assert_eq!(s, FrameRunSummary { fired: 5, failed: 0 });
        assert_eq!(*log.lock().unwrap(), ["b5", "d5", "a0", "c0", "e-1"]);
        assert!(q.is_empty());
    }

    #[test]
    fn requests_made_during_a_run_wait_for_the_next_one() {
        let log: Log = Arc::default();
        let mut q = AnimationFrameQueue::new();
        let inner = push(&log, "second");
        let outer_log = Arc::clone(&log);
        q.request_frame(0, move |scope| {
            outer_log.lock().unwrap().push("first");
            scope.request_frame(100, inner);
            Ok(())
        });

        let xr = xr();
        q.run(1.0, &xr, &mut FrameOutput::default());
        assert_eq!(*log.lock().unwrap(), ["first"]);
        assert_eq!(q.pending(), 1);

        q.run(2.0, &xr, &mut FrameOutput::default());
        assert_eq!(*log.lock().unwrap(), ["first", "second"]);
    }

    #[test]
    fn cancel_before_fire_prevents_it() {
        let log: Log = Arc::default();
        let mut q = AnimationFrameQueue::new();
        let id = q.request_frame(0, push(&log, "x"));
        assert!(q.cancel_frame(id));
        q.run(1.0, &xr(), &mut FrameOutput::default());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_from_an_earlier_callback_in_the_same_run() {
        let log: Log = Arc::default();
        let mut q = AnimationFrameQueue::new();
        let victim = Arc::new(Mutex::new(None));
        let v = Arc::clone(&victim);
        q.request_frame(10, move |scope| {
            let id = v.lock().unwrap().take().unwrap();
            assert!(scope.cancel_frame(id));
            Ok(())
        });
        let id = q.request_frame(0, push(&log, "victim"));
        *victim.lock().unwrap() = Some(id);

        let s = q.run(1.0, &xr(), &mut FrameOutput::default());
        assert_eq!(s.fired, 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_after_fire_or_unknown_is_a_no_op() {
        let log: Log = Arc::default();
        let mut q = AnimationFrameQueue::new();
        let id = q.request_frame(0, push(&log, "once"));
        q.run(1.0, &xr(), &mut FrameOutput::default());

        assert!(!q.cancel_frame(id));
        assert!(!q.cancel_frame(FrameRequestId(999)));
        q.run(2.0, &xr(), &mut FrameOutput::default());
        assert_eq!(*log.lock().unwrap(), ["once"]);
    }

    #[test]
    fn failures_do_not_stop_the_rest() {
        let log: Log = Arc::default();
        let mut q = AnimationFrameQueue::new();
        q.request_frame(3, |_| anyhow::bail!("script error"));
        q.request_frame(2, |_| panic!("script panic"));
        q.request_frame(1, push(&log, "survivor"));

        let s = q.run(1.0, &xr(), &mut FrameOutput::default());
        assert_eq!(s, FrameRunSummary { fired: 3, failed: 2 });
        assert_eq!(*log.lock().unwrap(), ["survivor"]);
    }

    #[test]
    fn every_callback_sees_the_same_timestamp() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut q = AnimationFrameQueue::new();
        for p in 0..3 {
            let seen = Arc::clone(&seen);
            q.request_frame(p, move |scope| {
                seen.lock().unwrap().push(scope.timestamp());
                Ok(())
            });
        }
        q.run(42.5, &xr(), &mut FrameOutput::default());
        assert_eq!(*seen.lock().unwrap(), [42.5, 42.5, 42.5]);
    }
}
