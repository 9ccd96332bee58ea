/// A surface texture acquired for the current tick.
///
/// Held until `swap_buffers`; holding it blocks acquisition of the next one.
pub(crate) struct SurfaceFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}
