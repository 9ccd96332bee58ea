//! Error classes of the frame pipeline.
//!
//! Everything except `SchedulerFatalError` is contained at its boundary
//! (pose provider, window task, surface) and only logged by the scheduler.

use std::time::Duration;

use thiserror::Error;

use crate::present::{FramebufferId, SurfaceId};
use crate::window::{ContextId, WindowId};

/// Device query failed or missed its budget. The previous pose is reused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoseAcquisitionError {
    #[error("pose acquisition exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("device reported no pose this frame")]
    NoPose,

    #[error("pose source `{0}` panicked")]
    Panicked(&'static str),

    #[error("pose worker is no longer running")]
    WorkerGone,
}

/// A window tick failed. The window stays eligible for the next tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowRenderError {
    #[error("{window} failed to finish its frame: {message}")]
    Script { window: WindowId, message: String },

    #[error("{window} panicked during its tick: {message}")]
    Panicked { window: WindowId, message: String },

    #[error("{window} task is no longer running")]
    TaskGone { window: WindowId },
}

/// A blit, layer composition, swap or device submission failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("failed to allocate {width}x{height} render targets: {reason}")]
    TargetAllocation { width: u32, height: u32, reason: String },

    #[error("unknown framebuffer {0:?}")]
    UnknownFramebuffer(FramebufferId),

    #[error("unknown surface {0:?}")]
    UnknownSurface(SurfaceId),

    #[error("surface {surface:?} unavailable: {reason}")]
    Surface { surface: SurfaceId, reason: String },

    #[error("layer source {0} has no render targets")]
    MissingLayerSource(ContextId),

    #[error("device submission failed: {0}")]
    Submit(String),
}

/// A window could not be opened. The scheduler keeps running.
#[derive(Debug, Error)]
pub enum WindowOpenError {
    #[error(transparent)]
    Targets(#[from] CompositionError),

    #[error("failed to spawn window thread")]
    Spawn(#[source] std::io::Error),
}

/// The scheduler cannot start or continue.
#[derive(Debug, Error)]
pub enum SchedulerFatalError {
    #[error("invalid XR render size {width}x{height}")]
    InvalidRenderSize { width: u32, height: u32 },

    #[error("failed to spawn {what} thread")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
