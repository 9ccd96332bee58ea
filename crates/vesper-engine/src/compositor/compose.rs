use crate::error::CompositionError;
use crate::present::{BlitRegion, BlitTarget, Presentation, RenderTargets, ResolvedLayer, SurfaceId, TextureId};
use crate::window::{ContextFrame, ContextId, WindowEvent, WindowId, WindowRegistry};
use crate::xr::XrFrame;

use super::layer::LayerList;
use super::xr_present::XrPresentation;

/// Composed eye buffer waiting for submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct XrFrameReady {
    pub context: ContextId,
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
}

/// What one composition pass touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionPass {
    /// Windows consumed, in visit order.
    pub composited: Vec<WindowId>,
    /// Surfaces blitted to, with the context that fed them.
    pub surfaces: Vec<(SurfaceId, ContextId)>,
    pub xr: Option<XrFrameReady>,
    pub failures: usize,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PresentReport {
    pub swapped: usize,
    pub submitted: bool,
    pub failures: usize,
}

// Per-context fields needed while the registry is borrowed elsewhere.
#[derive(Clone, Copy)]
struct Target {
    id: ContextId,
    surface: Option<SurfaceId>,
    xr: bool,
    targets: RenderTargets,
}

pub struct Compositor {
    failure_threshold: u32,
}

impl Compositor {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Composites every `Rendered` window and returns it to `Null`.
    ///
    /// Windows still rendering contribute nothing; whatever their surfaces
    /// last showed stays up.
    pub fn composite(
        &self,
        windows: &mut WindowRegistry,
        layers: &mut LayerList,
        xr_present: &XrPresentation,
        xr: &XrFrame,
        presentation: &mut dyn Presentation,
    ) -> CompositionPass {
        let mut pass = CompositionPass::default();

        for id in windows.composition_order() {
            let Some(output) = windows.take_rendered(id) else {
                continue;
            };
            if let Some(new_layers) = output.layers {
                layers.replace(new_layers);
            }

            for frame in &output.frames {
                let Some(target) = windows.context(frame.context).map(|c| Target {
                    id: c.id,
                    surface: c.surface,
                    xr: c.xr,
                    targets: c.targets,
                }) else {
                    continue;
                };

                let result =
                    self.composite_context(&target, frame, windows, layers, xr_present, xr, presentation, &mut pass);
                if !self.record(windows, target.id, result) {
                    pass.failures += 1;
                }
            }
            pass.composited.push(id);
        }

        pass
    }

    #[allow(clippy::too_many_arguments)]
    fn composite_context(
        &self,
        target: &Target,
        frame: &ContextFrame,
        windows: &WindowRegistry,
        layers: &LayerList,
        xr_present: &XrPresentation,
        xr: &XrFrame,
        presentation: &mut dyn Presentation,
        pass: &mut CompositionPass,
    ) -> Result<(), CompositionError> {
        let t = &target.targets;
        log::trace!("compositing {} (sync {:?})", target.id, frame.sync);

        if let Some(color) = frame.clear {
            presentation.clear(t.fbo, color)?;
        }

        if target.xr && xr_present.context == Some(target.id) {
            if !xr_present.has_pose {
                log::trace!("{}: no fresh pose, eye buffer skipped", target.id);
                return Ok(());
            }

            if layers.is_empty() {
                presentation.blit(t.fbo, BlitTarget::Framebuffer(t.resolve_fbo), BlitRegion::copy(t.width, t.height))?;
            } else {
                let resolved = resolve_layers(layers, windows)?;
                presentation.compose_layers(t.resolve_fbo, &resolved, xr)?;
            }
            pass.xr = Some(XrFrameReady {
                context: target.id,
                texture: t.tex,
                width: t.width,
                height: t.height,
            });

            if let Some(surface) = target.surface.filter(|s| presentation.is_visible(*s)) {
                let src_width = if xr_present.mirror { t.width / 2 } else { t.width };
                let (dst_width, dst_height) = presentation
                    .surface_size(surface)
                    .ok_or(CompositionError::UnknownSurface(surface))?;
                let region = BlitRegion {
                    src_width,
                    src_height: t.height,
                    dst_width,
                    dst_height,
                };
                presentation.blit(t.resolve_fbo, BlitTarget::Surface(surface), region)?;
                pass.surfaces.push((surface, target.id));
            }
            return Ok(());
        }

        match target.surface {
            // Offscreen canvas: resolve so layers can sample it.
            None => {
                presentation.blit(t.fbo, BlitTarget::Framebuffer(t.resolve_fbo), BlitRegion::copy(t.width, t.height))?;
            }
            Some(surface) if presentation.is_visible(surface) => {
                let (dst_width, dst_height) = presentation
                    .surface_size(surface)
                    .ok_or(CompositionError::UnknownSurface(surface))?;
                presentation.blit(t.fbo, BlitTarget::Framebuffer(t.resolve_fbo), BlitRegion::copy(t.width, t.height))?;
                let region = BlitRegion {
                    src_width: t.width,
                    src_height: t.height,
                    dst_width,
                    dst_height,
                };
                presentation.blit(t.resolve_fbo, BlitTarget::Surface(surface), region)?;
                pass.surfaces.push((surface, target.id));
            }
            Some(surface) => log::trace!("{surface} hidden; {} not presented", target.id),
        }
        Ok(())
    }

    /// Swaps every surface composited this pass and submits the eye buffer.
    pub fn present(
        &self,
        pass: &CompositionPass,
        windows: &mut WindowRegistry,
        xr_present: &mut XrPresentation,
        presentation: &mut dyn Presentation,
    ) -> PresentReport {
        let mut report = PresentReport::default();

        if let Some(ready) = pass.xr.filter(|_| xr_present.has_pose) {
            if let Some(submitter) = xr_present.submitter.as_mut() {
                let result = submitter.submit(ready.texture, ready.width, ready.height);
                report.submitted = result.is_ok();
                if !self.record(windows, ready.context, result) {
                    report.failures += 1;
                }
            }
            xr_present.has_pose = false;
        }

        let mut swapped: Vec<SurfaceId> = Vec::with_capacity(pass.surfaces.len());
        for &(surface, context) in &pass.surfaces {
            if swapped.contains(&surface) {
                continue;
            }
            swapped.push(surface);
            let result = presentation.swap_buffers(surface);
            if result.is_ok() {
                report.swapped += 1;
            }
            if !self.record(windows, context, result) {
                report.failures += 1;
            }
        }

        report
    }

    /// Updates the failure streak of `context`. Returns `result.is_ok()`.
    fn record(&self, windows: &mut WindowRegistry, context: ContextId, result: Result<(), CompositionError>) -> bool {
        let Some(ctx) = windows.context_mut(context) else {
            return result.is_ok();
        };
        let error = match result {
            Ok(()) => {
                ctx.consecutive_failures = 0;
                return true;
            }
            Err(e) => e,
        };

        ctx.consecutive_failures += 1;
        let streak = ctx.consecutive_failures;
        let window = ctx.window;
        log::warn!("{context}: composition failed ({streak} in a row): {error}");

        if streak == self.failure_threshold {
            log::error!("{context}: reporting repeated composition failure to {window}");
            windows.send_event(window, WindowEvent::CompositionFailed { context, error });
        }
        false
    }
}

fn resolve_layers(layers: &LayerList, windows: &WindowRegistry) -> Result<Vec<ResolvedLayer>, CompositionError> {
    layers
        .as_slice()
        .iter()
        .map(|layer| {
            let source = windows
                .context(layer.source)
                .ok_or(CompositionError::MissingLayerSource(layer.source))?;
            Ok(ResolvedLayer {
                kind: layer.kind,
                texture: source.targets.tex,
                width: source.width,
                height: source.height,
                model_view: layer.model_view,
                projection: layer.projection,
            })
        })
        .collect()
}
