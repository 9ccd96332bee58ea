/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; acquisition may succeed next tick.
    Reconfigured,
    /// Transient error; skip this surface for the tick.
    SkipFrame,
    /// Fatal error (commonly OOM).
    Fatal,
}
