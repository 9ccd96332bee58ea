//! Presentation seam.
//!
//! The compositor drives everything GPU-facing through [`Presentation`]:
//! render-target allocation, blits, layer composition and buffer swaps. The
//! wgpu backend lives in `device`; tests use a recording double.

use std::fmt;

use crate::compositor::LayerKind;
use crate::error::CompositionError;
use crate::xr::XrFrame;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub(crate) u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub(crate) u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// GPU targets owned by one drawing context.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderTargets {
    /// Multisampled working target.
    pub fbo: FramebufferId,
    /// Single-sampled resolve target.
    pub resolve_fbo: FramebufferId,
    /// Colour texture behind `resolve_fbo`.
    pub tex: TextureId,
    pub depth_tex: TextureId,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlitTarget {
    Framebuffer(FramebufferId),
    Surface(SurfaceId),
}

/// Source and destination extents. The source rectangle starts at the origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlitRegion {
    pub src_width: u32,
    pub src_height: u32,
    pub dst_width: u32,
    pub dst_height: u32,
}

impl BlitRegion {
    /// Same-size copy.
    pub fn copy(width: u32, height: u32) -> Self {
        Self {
            src_width: width,
            src_height: height,
            dst_width: width,
            dst_height: height,
        }
    }
}

/// A layer with its source already resolved to a texture.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResolvedLayer {
    pub kind: LayerKind,
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub model_view: [[f32; 16]; 2],
    pub projection: [[f32; 16]; 2],
}

/// Native window events surfaced by [`Presentation::poll_events`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HostEvent {
    CloseRequested(SurfaceId),
    Resized { surface: SurfaceId, width: u32, height: u32 },
}

/// Native surfaces and GPU targets as the compositor uses them.
pub trait Presentation {
    fn create_render_targets(&mut self, width: u32, height: u32)
        -> Result<RenderTargets, CompositionError>;

    fn destroy_render_targets(&mut self, targets: &RenderTargets);

    /// Clears the working target of a context.
    fn clear(&mut self, fbo: FramebufferId, color: [f32; 4]) -> Result<(), CompositionError>;

    /// Copies (and scales) `src` into `dst`. Multisampled sources are resolved.
    fn blit(&mut self, src: FramebufferId, dst: BlitTarget, region: BlitRegion)
        -> Result<(), CompositionError>;

    /// Draws `layers` into `dst` in order; later layers land on top.
    fn compose_layers(
        &mut self,
        dst: FramebufferId,
        layers: &[ResolvedLayer],
        xr: &XrFrame,
    ) -> Result<(), CompositionError>;

    fn surface_size(&self, surface: SurfaceId) -> Option<(u32, u32)>;

    fn is_visible(&self, surface: SurfaceId) -> bool;

    /// Presents whatever was blitted to `surface` since the last swap.
    fn swap_buffers(&mut self, surface: SurfaceId) -> Result<(), CompositionError>;

    /// Drains pending native events without blocking.
    fn poll_events(&mut self) -> Vec<HostEvent>;
}

/// Hands a composed eye texture to the XR runtime.
pub trait VrSubmitter {
    fn submit(&mut self, texture: TextureId, width: u32, height: u32)
        -> Result<(), CompositionError>;
}
