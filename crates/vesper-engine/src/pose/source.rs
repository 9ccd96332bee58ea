use crate::error::PoseAcquisitionError;

use super::sample::PoseSample;

/// One device family's pose query, normalized to [`PoseSample`].
///
/// Implementations run on the pose worker thread. `acquire` should return
/// promptly; the provider stops waiting at its budget regardless.
pub trait PoseSource: Send + 'static {
    /// Short family name used in diagnostics.
    fn name(&self) -> &'static str;

    fn acquire(&mut self) -> Result<PoseSample, PoseAcquisitionError>;
}
