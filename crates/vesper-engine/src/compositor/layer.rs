use crate::window::ContextId;
use crate::xr::IDENTITY;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayerKind {
    /// Stereo content placed in the scene with per-eye matrices.
    Iframe3d,
    /// Flat content placed in the scene.
    Iframe2d,
    /// A canvas drawn straight over the eye buffer.
    RawCanvas,
}

/// One compositable source attached to the XR target.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Layer {
    pub kind: LayerKind,
    pub source: ContextId,
    /// Left then right eye.
    pub model_view: [[f32; 16]; 2],
    pub projection: [[f32; 16]; 2],
}

impl Layer {
    pub fn new(kind: LayerKind, source: ContextId) -> Self {
        Self {
            kind,
            source,
            model_view: [IDENTITY; 2],
            projection: [IDENTITY; 2],
        }
    }

    pub fn with_eyes(mut self, model_view: [[f32; 16]; 2], projection: [[f32; 16]; 2]) -> Self {
        self.model_view = model_view;
        self.projection = projection;
        self
    }
}

/// Ordered layer list. Later entries draw on top. Only ever replaced whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerList {
    layers: Vec<Layer>,
}

impl LayerList {
    pub fn replace(&mut self, layers: Vec<Layer>) {
        log::debug!("layer list replaced ({} -> {} entries)", self.layers.len(), layers.len());
        self.layers = layers;
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn as_slice(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Drops every layer sourced from `context`.
    pub(crate) fn forget_source(&mut self, context: ContextId) {
        self.layers.retain(|l| l.source != context);
    }
}
