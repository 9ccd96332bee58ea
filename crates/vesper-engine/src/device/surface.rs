use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::frame::SurfaceFrame;
use super::SurfaceErrorAction;

/// One native window's swapchain.
pub(crate) struct SurfaceSlot {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub visible: bool,
    pub frame: Option<SurfaceFrame>,
}

impl SurfaceSlot {
    pub fn resize(&mut self, device: &wgpu::Device, new_size: PhysicalSize<u32>) {
        // Dropping an unpresented frame discards it.
        self.frame = None;
        apply_resize(&self.surface, device, &mut self.config, &mut self.size, new_size);
    }

    /// Acquires this tick's surface texture if not already held.
    pub fn acquire(&mut self, device: &wgpu::Device) -> Result<&wgpu::TextureView, String> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err("surface has zero size".into());
        }
        if self.frame.is_none() {
            let surface_texture = match self.surface.get_current_texture() {
                Ok(t) => t,
                Err(e) => {
                    let action = map_surface_error(&self.surface, device, &self.config, self.size, e.clone());
                    return Err(format!("{e} ({action:?})"));
                }
            };
            let view = surface_texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            self.frame = Some(SurfaceFrame { surface_texture, view });
        }
        self.frame
            .as_ref()
            .map(|f| &f.view)
            .ok_or_else(|| "surface frame missing".to_string())
    }
}

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// wgpu cannot configure a 0x0 surface; in that case only `size` changes.
pub(crate) fn apply_resize(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &mut wgpu::SurfaceConfiguration,
    size: &mut PhysicalSize<u32>,
    new_size: PhysicalSize<u32>,
) {
    *size = new_size;
    if new_size.width == 0 || new_size.height == 0 {
        return;
    }

    config.width = new_size.width;
    config.height = new_size.height;
    surface.configure(device, config);
}

pub(crate) fn map_surface_error(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    err: wgpu::SurfaceError,
) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
            if size.width > 0 && size.height > 0 {
                surface.configure(device, config);
            }
            SurfaceErrorAction::Reconfigured
        }
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}
