use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::CompositionError;
use crate::present::{
    BlitRegion, BlitTarget, FramebufferId, HostEvent, Presentation, RenderTargets, ResolvedLayer,
    SurfaceId, TextureId,
};
use crate::xr::XrFrame;

use super::gpu::Gpu;
use super::pipelines::{BlitUniform, LayerUniform, TexturedPipeline};
use super::placement::layer_draws;
use super::surface::{choose_alpha_mode, choose_surface_format, SurfaceSlot};
use super::GpuInit;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

struct Framebuffer {
    // Keeps the texture alive alongside its view.
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    depth: Option<(wgpu::Texture, wgpu::TextureView)>,
    format: wgpu::TextureFormat,
    samples: u32,
    width: u32,
    height: u32,
}

/// wgpu-backed [`Presentation`]: one swapchain per native window plus the
/// offscreen targets of every drawing context.
pub struct WgpuPresentation {
    gpu: Gpu,
    init: GpuInit,
    surfaces: BTreeMap<SurfaceId, SurfaceSlot>,
    framebuffers: BTreeMap<FramebufferId, Framebuffer>,
    /// Colour textures resolve to the framebuffer that owns them.
    textures: BTreeMap<TextureId, FramebufferId>,
    blit: TexturedPipeline,
    layer: TexturedPipeline,
    events: Vec<HostEvent>,
    next_id: u32,
}

impl WgpuPresentation {
    /// Opens the device against `window`'s surface. Blocks on adapter selection.
    pub fn new(init: GpuInit, window: Arc<Window>) -> Result<(Self, SurfaceId)> {
        pollster::block_on(Self::new_async(init, window))
    }

    pub async fn new_async(init: GpuInit, window: Arc<Window>) -> Result<(Self, SurfaceId)> {
        let instance = Gpu::create_instance();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;
        let gpu = Gpu::new(instance, &surface, &init).await?;

        let blit = TexturedPipeline::blit(&gpu.device);
        let layer = TexturedPipeline::layer(&gpu.device);

        let mut this = Self {
            gpu,
            init,
            surfaces: BTreeMap::new(),
            framebuffers: BTreeMap::new(),
            textures: BTreeMap::new(),
            blit,
            layer,
            events: Vec::new(),
            next_id: 1,
        };
        let id = this.insert_surface(window, surface)?;
        Ok((this, id))
    }

    /// Registers another native window.
    pub fn add_surface(&mut self, window: Arc<Window>) -> Result<SurfaceId> {
        let surface = self
            .gpu
            .instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;
        self.insert_surface(window, surface)
    }

    fn insert_surface(&mut self, window: Arc<Window>, surface: wgpu::Surface<'static>) -> Result<SurfaceId> {
        let size = window.inner_size();
        let caps = surface.get_capabilities(&self.gpu.adapter);
        let format = choose_surface_format(&caps, self.init.prefer_srgb)
            .context("surface reports no supported formats")?;
        let alpha_mode = choose_alpha_mode(&caps, self.init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: self.init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: self.init.desired_maximum_frame_latency,
        };
        if size.width > 0 && size.height > 0 {
            surface.configure(&self.gpu.device, &config);
        }

        let id = SurfaceId(self.alloc());
        log::info!(
            "{id}: {}x{} {format:?} {:?}",
            size.width,
            size.height,
            self.init.present_mode
        );
        self.surfaces.insert(
            id,
            SurfaceSlot {
                window,
                surface,
                config,
                size,
                visible: true,
                frame: None,
            },
        );
        Ok(id)
    }

    pub fn remove_surface(&mut self, id: SurfaceId) -> bool {
        self.surfaces.remove(&id).is_some()
    }

    pub fn surface_for_window(&self, window: winit::window::WindowId) -> Option<SurfaceId> {
        self.surfaces
            .iter()
            .find(|(_, slot)| slot.window.id() == window)
            .map(|(id, _)| *id)
    }

    pub fn window(&self, id: SurfaceId) -> Option<&Arc<Window>> {
        self.surfaces.get(&id).map(|s| &s.window)
    }

    /// Reconfigures the swapchain and queues a [`HostEvent::Resized`].
    pub fn resize_surface(&mut self, id: SurfaceId, size: PhysicalSize<u32>) {
        let Some(slot) = self.surfaces.get_mut(&id) else { return };
        slot.resize(&self.gpu.device, size);
        self.events.push(HostEvent::Resized {
            surface: id,
            width: size.width,
            height: size.height,
        });
    }

    pub fn set_visible(&mut self, id: SurfaceId, visible: bool) {
        if let Some(slot) = self.surfaces.get_mut(&id) {
            slot.visible = visible;
        }
    }

    pub fn push_event(&mut self, event: HostEvent) {
        self.events.push(event);
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn create_framebuffer(&mut self, width: u32, height: u32, samples: u32, with_depth: bool) -> FramebufferId {
        let device = &self.gpu.device;
        let format = self.init.target_format;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let usage = if samples > 1 {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else {
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("vesper context target"),
            size,
            mip_level_count: 1,
            sample_count: samples,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = with_depth.then(|| {
            let depth = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("vesper context depth"),
                size,
                mip_level_count: 1,
                sample_count: samples,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = depth.create_view(&wgpu::TextureViewDescriptor::default());
            (depth, view)
        });

        let id = FramebufferId(self.alloc());
        self.framebuffers.insert(
            id,
            Framebuffer {
                _texture: texture,
                view,
                depth,
                format,
                samples,
                width,
                height,
            },
        );
        id
    }

    fn framebuffer(&self, id: FramebufferId) -> Result<&Framebuffer, CompositionError> {
        self.framebuffers
            .get(&id)
            .ok_or(CompositionError::UnknownFramebuffer(id))
    }

    fn encoder(&self, label: &'static str) -> wgpu::CommandEncoder {
        self.gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Multisampled sources resolve in hardware; no scaling is possible.
    fn resolve(&mut self, src: FramebufferId, dst: BlitTarget, region: BlitRegion) -> Result<(), CompositionError> {
        let BlitTarget::Framebuffer(dst_id) = dst else {
            return Err(CompositionError::Submit(
                "multisampled source must resolve into a framebuffer".into(),
            ));
        };
        let s = self.framebuffer(src)?;
        let d = self.framebuffer(dst_id)?;
        if d.samples != 1 || (d.width, d.height) != (region.dst_width, region.dst_height) || (s.width, s.height) != (d.width, d.height) {
            return Err(CompositionError::Submit(format!(
                "cannot resolve {}x{} into {}x{}",
                s.width, s.height, region.dst_width, region.dst_height
            )));
        }

        let mut encoder = self.encoder("vesper resolve");
        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vesper resolve pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &s.view,
                    resolve_target: Some(&d.view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.gpu.submit(encoder);
        Ok(())
    }
}

impl Presentation for WgpuPresentation {
    fn create_render_targets(&mut self, width: u32, height: u32) -> Result<RenderTargets, CompositionError> {
        let max = self.gpu.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(CompositionError::TargetAllocation {
                width,
                height,
                reason: format!("dimensions must be within 1..={max}"),
            });
        }

        let fbo = self.create_framebuffer(width, height, self.init.msaa_samples.max(1), true);
        let resolve_fbo = self.create_framebuffer(width, height, 1, false);
        let tex = TextureId(self.alloc());
        let depth_tex = TextureId(self.alloc());
        self.textures.insert(tex, resolve_fbo);

        log::debug!("allocated {width}x{height} targets {fbo:?}/{resolve_fbo:?}");
        Ok(RenderTargets {
            fbo,
            resolve_fbo,
            tex,
            depth_tex,
            width,
            height,
        })
    }

    fn destroy_render_targets(&mut self, targets: &RenderTargets) {
        self.framebuffers.remove(&targets.fbo);
        self.framebuffers.remove(&targets.resolve_fbo);
        self.textures.remove(&targets.tex);
    }

    fn clear(&mut self, fbo: FramebufferId, color: [f32; 4]) -> Result<(), CompositionError> {
        let fb = self.framebuffer(fbo)?;
        let [r, g, b, a] = color.map(f64::from);

        let mut encoder = self.encoder("vesper clear");
        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vesper clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &fb.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: fb.depth.as_ref().map(|(_, view)| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.gpu.submit(encoder);
        Ok(())
    }

    fn blit(&mut self, src: FramebufferId, dst: BlitTarget, region: BlitRegion) -> Result<(), CompositionError> {
        let (samples, src_width, src_height) = {
            let s = self.framebuffer(src)?;
            (s.samples, s.width, s.height)
        };
        if samples > 1 {
            return self.resolve(src, dst, region);
        }

        let format = match dst {
            BlitTarget::Framebuffer(id) => self.framebuffer(id)?.format,
            BlitTarget::Surface(id) => {
                self.surfaces
                    .get(&id)
                    .ok_or(CompositionError::UnknownSurface(id))?
                    .config
                    .format
            }
        };
        self.blit.ensure(&self.gpu.device, format);

        let uniform = BlitUniform {
            uv_scale: [
                region.src_width as f32 / src_width.max(1) as f32,
                region.src_height as f32 / src_height.max(1) as f32,
            ],
            _pad: [0.0; 2],
        };
        let src_view = &self
            .framebuffers
            .get(&src)
            .ok_or(CompositionError::UnknownFramebuffer(src))?
            .view;
        let bind_group = self
            .blit
            .bind(&self.gpu.device, src_view, bytemuck::bytes_of(&uniform));

        // Surface targets are acquired lazily and held until the swap.
        let (dst_view, load) = match dst {
            BlitTarget::Framebuffer(id) => (
                &self
                    .framebuffers
                    .get(&id)
                    .ok_or(CompositionError::UnknownFramebuffer(id))?
                    .view,
                wgpu::LoadOp::Load,
            ),
            BlitTarget::Surface(id) => {
                let slot = self
                    .surfaces
                    .get_mut(&id)
                    .ok_or(CompositionError::UnknownSurface(id))?;
                let view = slot
                    .acquire(&self.gpu.device)
                    .map_err(|reason| CompositionError::Surface { surface: id, reason })?;
                (view, wgpu::LoadOp::Clear(wgpu::Color::BLACK))
            }
        };
        let Some(pipeline) = self.blit.get(format) else {
            return Err(CompositionError::Submit(format!("no blit pipeline for {format:?}")));
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vesper blit"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vesper blit pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: dst_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.set_viewport(
                0.0,
                0.0,
                region.dst_width.max(1) as f32,
                region.dst_height.max(1) as f32,
                0.0,
                1.0,
            );
            rpass.draw(0..self.blit.vertex_count(), 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn compose_layers(&mut self, dst: FramebufferId, layers: &[ResolvedLayer], xr: &XrFrame) -> Result<(), CompositionError> {
        let (format, width, height) = {
            let d = self.framebuffer(dst)?;
            (d.format, d.width, d.height)
        };
        self.layer.ensure(&self.gpu.device, format);

        let mut draws = Vec::new();
        for layer in layers {
            let fbo = self
                .textures
                .get(&layer.texture)
                .copied()
                .ok_or_else(|| CompositionError::Submit(format!("unknown layer texture {:?}", layer.texture)))?;
            let src_view = &self.framebuffer(fbo)?.view;
            for draw in layer_draws(layer, xr, width, height) {
                let uniform = LayerUniform {
                    mvp: draw.mvp,
                    uv_rect: draw.uv_rect,
                };
                let bind_group = self
                    .layer
                    .bind(&self.gpu.device, src_view, bytemuck::bytes_of(&uniform));
                draws.push((draw.viewport, bind_group));
            }
        }

        let Some(pipeline) = self.layer.get(format) else {
            return Err(CompositionError::Submit(format!("no layer pipeline for {format:?}")));
        };
        let dst_view = &self.framebuffer(dst)?.view;

        let mut encoder = self.encoder("vesper layers");
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vesper layer pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: dst_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(pipeline);
            for ([x, y, w, h], bind_group) in &draws {
                rpass.set_viewport(*x, *y, *w, *h, 0.0, 1.0);
                rpass.set_bind_group(0, bind_group, &[]);
                rpass.draw(0..self.layer.vertex_count(), 0..1);
            }
        }
        self.gpu.submit(encoder);
        Ok(())
    }

    fn surface_size(&self, surface: SurfaceId) -> Option<(u32, u32)> {
        self.surfaces
            .get(&surface)
            .map(|s| (s.size.width, s.size.height))
    }

    fn is_visible(&self, surface: SurfaceId) -> bool {
        self.surfaces
            .get(&surface)
            .is_some_and(|s| s.visible && s.size.width > 0 && s.size.height > 0)
    }

    fn swap_buffers(&mut self, surface: SurfaceId) -> Result<(), CompositionError> {
        let slot = self
            .surfaces
            .get_mut(&surface)
            .ok_or(CompositionError::UnknownSurface(surface))?;
        if let Some(frame) = slot.frame.take() {
            slot.window.pre_present_notify();
            frame.surface_texture.present();
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }
}
