use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::compositor::Layer;
use crate::error::{panic_message, WindowRenderError};
use crate::frame::{AnimationFrameQueue, FrameOutput, FrameRunSummary};
use crate::xr::SharedXrState;

use super::context::{ContextId, WindowId, WindowInfo};
use super::script::{WindowEvent, WindowScript};

/// Opaque fence for one context's output of one tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncToken(pub u64);

/// One drawn context in a tick result.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextFrame {
    pub context: ContextId,
    pub sync: SyncToken,
    pub clear: Option<[f32; 4]>,
}

/// Settled result of a successful window tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutput {
    pub frames: Vec<ContextFrame>,
    pub callbacks: FrameRunSummary,
    pub layers: Option<Vec<Layer>>,
}

/// Message from a window task back to the scheduler.
#[derive(Debug)]
pub struct TickCompletion {
    pub window: WindowId,
    pub tick: u64,
    pub result: Result<TickOutput, WindowRenderError>,
}

pub(crate) enum WindowCommand {
    Tick { tick: u64, timestamp: f64 },
    Event(WindowEvent),
    Shutdown,
}

/// Starts the window's thread. The script is opened on that thread.
pub(crate) fn spawn_window_task(
    info: WindowInfo,
    mut script: Box<dyn WindowScript>,
    xr: Arc<SharedXrState>,
    commands: Receiver<WindowCommand>,
    completions: Sender<TickCompletion>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("vesper-{}", info.id))
        .spawn(move || {
            let mut task = WindowTask {
                info,
                frames: AnimationFrameQueue::new(),
                next_sync: 0,
            };
            task.guarded("open", |t| script.open(&t.info, &mut t.frames));

            for command in commands.iter() {
                match command {
                    WindowCommand::Tick { tick, timestamp } => {
                        let result = task.tick(script.as_mut(), &xr, timestamp);
                        let completion = TickCompletion {
                            window: task.info.id,
                            tick,
                            result,
                        };
                        if completions.send(completion).is_err() {
                            break;
                        }
                    }
                    WindowCommand::Event(event) => {
                        task.guarded("event", |t| script.on_event(&event, &mut t.frames));
                    }
                    WindowCommand::Shutdown => break,
                }
            }

            task.guarded("close", |t| script.on_event(&WindowEvent::Closing, &mut t.frames));
            log::debug!("{} task stopped", task.info.id);
        })
}

struct WindowTask {
    info: WindowInfo,
    frames: AnimationFrameQueue,
    next_sync: u64,
}

impl WindowTask {
    fn tick(
        &mut self,
        script: &mut dyn WindowScript,
        xr: &SharedXrState,
        timestamp: f64,
    ) -> Result<TickOutput, WindowRenderError> {
        let window = self.info.id;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut output = FrameOutput::default();
            let callbacks = self.frames.run(timestamp, xr, &mut output);
            script
                .finish_frame(&output)
                .map_err(|e| WindowRenderError::Script {
                    window,
                    message: format!("{e:#}"),
                })?;
            Ok(self.settle(output, callbacks))
        }));

        outcome.unwrap_or_else(|payload| {
            Err(WindowRenderError::Panicked {
                window,
                message: panic_message(payload.as_ref()),
            })
        })
    }

    fn settle(&mut self, output: FrameOutput, callbacks: FrameRunSummary) -> TickOutput {
        let mut frames = Vec::with_capacity(output.touched.len());
        for &context in &output.touched {
            if !self.info.owns(context) {
                log::warn!("{} drew to {context}, which it does not own", self.info.id);
                continue;
            }
            self.next_sync += 1;
            frames.push(ContextFrame {
                context,
                sync: SyncToken(self.next_sync),
                clear: output.clear_for(context),
            });
        }
        TickOutput {
            frames,
            callbacks,
            layers: output.layers,
        }
    }

    fn guarded(&mut self, what: &str, f: impl FnOnce(&mut Self)) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            log::warn!(
                "{} panicked during {what}: {}",
                self.info.id,
                panic_message(payload.as_ref())
            );
        }
    }
}
