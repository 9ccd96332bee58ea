use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{PoseAcquisitionError, SchedulerFatalError};

use super::sample::PoseSample;
use super::source::PoseSource;

type Reply = Result<PoseSample, PoseAcquisitionError>;

/// Result of one bounded acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum PoseOutcome {
    /// A complete sample, ready to be applied.
    Sample(PoseSample),
    /// Nothing usable this tick; the previous pose stays in place.
    Unavailable(PoseAcquisitionError),
    /// No backend is configured.
    Inactive,
}

/// Runs the active [`PoseSource`] on its own thread and waits for it at most
/// `budget` per tick.
///
/// At most one request is outstanding. If the device misses the budget the
/// request stays in flight and its answer, whenever it lands, is picked up by
/// a later tick.
pub struct PoseProvider {
    worker: Option<Worker>,
    budget: Duration,
}

struct Worker {
    name: &'static str,
    requests: Sender<()>,
    replies: Receiver<Reply>,
    in_flight: bool,
}

impl PoseProvider {
    /// A provider with no backend. Acquisition is a no-op.
    pub fn inactive() -> Self {
        Self {
            worker: None,
            budget: Duration::ZERO,
        }
    }

    pub fn spawn<S: PoseSource>(mut source: S, budget: Duration) -> Result<Self, SchedulerFatalError> {
        let name = source.name();
        let (requests, request_rx) = bounded::<()>(1);
        let (reply_tx, replies) = bounded::<Reply>(1);

        thread::Builder::new()
            .name("vesper-pose".into())
            .spawn(move || {
                for () in request_rx.iter() {
                    let reply = panic::catch_unwind(AssertUnwindSafe(|| source.acquire()))
                        .unwrap_or_else(|payload| {
                            log::error!(
                                "pose source `{name}` panicked: {}",
                                crate::error::panic_message(payload.as_ref())
                            );
                            Err(PoseAcquisitionError::Panicked(name))
                        });
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
                log::debug!("pose worker `{name}` stopped");
            })
            .map_err(|source| SchedulerFatalError::Spawn { what: "pose", source })?;

        log::info!("pose provider `{name}` started (budget {budget:?})");

        Ok(Self {
            worker: Some(Worker {
                name,
                requests,
                replies,
                in_flight: false,
            }),
            budget,
        })
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Name of the active backend, if any.
    pub fn source_name(&self) -> Option<&'static str> {
        self.worker.as_ref().map(|w| w.name)
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Asks the backend for a pose and waits at most the budget for it.
    pub fn acquire_pose(&mut self) -> PoseOutcome {
        let budget = self.budget;
        let Some(worker) = self.worker.as_mut() else {
            return PoseOutcome::Inactive;
        };

        if !worker.in_flight {
            if worker.requests.send(()).is_err() {
                return PoseOutcome::Unavailable(PoseAcquisitionError::WorkerGone);
            }
            worker.in_flight = true;
        }

        match worker.replies.recv_timeout(budget) {
            Ok(reply) => {
                worker.in_flight = false;
                match reply {
                    Ok(sample) => PoseOutcome::Sample(sample),
                    Err(e) => PoseOutcome::Unavailable(e),
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                PoseOutcome::Unavailable(PoseAcquisitionError::Timeout(budget))
            }
            Err(RecvTimeoutError::Disconnected) => {
                worker.in_flight = false;
                PoseOutcome::Unavailable(PoseAcquisitionError::WorkerGone)
            }
        }
    }
}
