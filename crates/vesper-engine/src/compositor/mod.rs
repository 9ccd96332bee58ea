//! Layer compositor.
//!
//! Takes the output of every `Rendered` window, resolves it and blits it to
//! native surfaces, composes XR layers, then swaps and submits.

mod compose;
mod layer;
mod xr_present;

pub use compose::{CompositionPass, Compositor, PresentReport, XrFrameReady};
pub use layer::{Layer, LayerKind, LayerList};
pub use xr_present::XrPresentation;
