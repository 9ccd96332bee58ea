//! Where each layer lands in the side-by-side eye buffer.

use glam::Mat4;

use crate::compositor::LayerKind;
use crate::present::ResolvedLayer;
use crate::xr::XrFrame;

const FULL_UV: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

/// One quad draw: viewport `[x, y, w, h]` in pixels, clip transform, source rect.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayerDraw {
    pub viewport: [f32; 4],
    pub mvp: [f32; 16],
    pub uv_rect: [f32; 4],
}

/// Splits a layer into its draws for a `width` x `height` stereo target.
///
/// * `RawCanvas` covers the whole target untransformed.
/// * `Iframe3d` sources are side-by-side stereo; each eye samples its own
///   half, placed with the layer's own per-eye matrices.
/// * `Iframe2d` sources are flat; both eyes see the whole texture placed in
///   the scene through the current head pose.
pub(crate) fn layer_draws(layer: &ResolvedLayer, xr: &XrFrame, width: u32, height: u32) -> Vec<LayerDraw> {
    let (w, h) = (width as f32, height as f32);
    if layer.kind == LayerKind::RawCanvas {
        return vec![LayerDraw {
            viewport: [0.0, 0.0, w, h],
            mvp: Mat4::IDENTITY.to_cols_array(),
            uv_rect: FULL_UV,
        }];
    }

    let half = w / 2.0;
    let eyes = [
        (xr.left_view, xr.left_projection),
        (xr.right_view, xr.right_projection),
    ];

    eyes.iter()
        .enumerate()
        .map(|(eye, (view, projection))| {
            let model_view = Mat4::from_cols_array(&layer.model_view[eye]);
            let (mvp, uv_rect) = match layer.kind {
                LayerKind::Iframe3d => (
                    Mat4::from_cols_array(&layer.projection[eye]) * model_view,
                    [0.5 * eye as f32, 0.0, 0.5, 1.0],
                ),
                _ => (
                    Mat4::from_cols_array(projection) * Mat4::from_cols_array(view) * model_view,
                    FULL_UV,
                ),
            };
            LayerDraw {
                viewport: [half * eye as f32, 0.0, half, h],
                mvp: mvp.to_cols_array(),
                uv_rect,
            }
        })
        .collect()
}
