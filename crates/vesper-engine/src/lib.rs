//! Vesper engine crate.
//!
//! A fixed-cadence frame scheduler for stereo (XR) and flat windows: pose
//! acquisition, per-window render tasks, bounded waits, layer composition and
//! presentation. The wgpu/winit backend lives in `device` and `host`.

pub mod compositor;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod host;
pub mod logging;
pub mod pose;
pub mod present;
pub mod scheduler;
pub mod time;
pub mod window;
pub mod xr;

#[cfg(test)]
mod testing;
