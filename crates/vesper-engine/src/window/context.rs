use std::fmt;

use crate::present::{RenderTargets, SurfaceId};

/// Stable integer id of a window. Never reused within a process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub(crate) u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub(crate) u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

/// Requested drawing context for a new window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ContextSpec {
    pub width: u32,
    pub height: u32,
    /// Native surface this context presents to, if any.
    pub surface: Option<SurfaceId>,
    /// Whether this context is the XR presentation target.
    pub xr: bool,
}

/// Requested window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSpec {
    /// Composition priority. Higher composites earlier.
    pub priority: i32,
    pub contexts: Vec<ContextSpec>,
}

/// A drawing context as the window script sees it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub id: ContextId,
    pub width: u32,
    pub height: u32,
    pub xr: bool,
}

/// Identity handed to a window script when it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub contexts: Vec<ContextInfo>,
}

impl WindowInfo {
    pub fn owns(&self, context: ContextId) -> bool {
        self.contexts.iter().any(|c| c.id == context)
    }

    pub fn xr_context(&self) -> Option<ContextId> {
        self.contexts.iter().find(|c| c.xr).map(|c| c.id)
    }
}

/// One canvas: its GPU targets and where it presents.
///
/// Owned by the window registry entry and destroyed with it.
#[derive(Debug)]
pub struct DrawingContext {
    pub id: ContextId,
    pub window: WindowId,
    pub surface: Option<SurfaceId>,
    pub width: u32,
    pub height: u32,
    pub xr: bool,
    pub targets: RenderTargets,
    pub(crate) consecutive_failures: u32,
}

impl DrawingContext {
    pub fn info(&self) -> ContextInfo {
        ContextInfo {
            id: self.id,
            width: self.width,
            height: self.height,
            xr: self.xr,
        }
    }
}
