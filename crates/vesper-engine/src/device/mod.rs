//! wgpu presentation backend.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue
//! - one configured Surface (swapchain) per native window
//! - the multisampled + resolve targets behind every drawing context
//! - blit and layer pipelines used by the compositor

mod error;
mod frame;
mod gpu;
mod init;
mod pipelines;
mod placement;
mod presentation;
mod surface;

pub use error::SurfaceErrorAction;
pub use init::GpuInit;
pub use presentation::WgpuPresentation;
