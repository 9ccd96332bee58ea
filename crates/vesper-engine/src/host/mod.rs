//! Native host: winit event loop, one native window per engine window, and
//! the frame scheduler driven from `about_to_wait`.

mod runtime;

pub use runtime::{Host, HostApp, HostCtx, WindowOptions};
