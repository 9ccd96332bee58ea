use std::sync::Arc;

use crate::compositor::{LayerList, XrPresentation};
use crate::pose::PoseProvider;
use crate::time::FrameTime;
use crate::window::WindowRegistry;
use crate::xr::{SharedXrState, XrStateWriter};

/// Something that advances once per tick regardless of window rendering,
/// such as playing media or a scripted pose driver.
pub trait TimedResource: Send {
    fn advance(&mut self, frame: &FrameTime);
}

/// All per-process frame state, owned by the scheduler.
///
/// Only the scheduler (through this value) and the pose provider's samples
/// mutate the XR state; windows see it through [`SharedXrState`].
pub struct FrameContext {
    pub(crate) xr: XrStateWriter,
    pub(crate) pose: PoseProvider,
    pub(crate) windows: WindowRegistry,
    pub(crate) layers: LayerList,
    pub(crate) xr_present: XrPresentation,
    pub(crate) media: Vec<Box<dyn TimedResource>>,
}

impl FrameContext {
    pub fn new(xr: XrStateWriter, pose: PoseProvider, mirror: bool) -> Self {
        let windows = WindowRegistry::new(xr.shared());
        Self {
            xr,
            pose,
            windows,
            layers: LayerList::default(),
            xr_present: XrPresentation::new(mirror),
            media: Vec::new(),
        }
    }

    pub fn xr_state(&self) -> Arc<SharedXrState> {
        self.xr.shared()
    }

    pub fn windows(&self) -> &WindowRegistry {
        &self.windows
    }

    pub fn layers(&self) -> &LayerList {
        &self.layers
    }

    pub fn xr_presentation(&self) -> &XrPresentation {
        &self.xr_present
    }
}
