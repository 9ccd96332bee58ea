//! Pose acquisition.
//!
//! Each device family implements [`PoseSource`] and produces a complete
//! [`PoseSample`] in the canonical layout. [`PoseProvider`] runs the active
//! source off the scheduler thread and bounds how long a tick waits for it.

mod oculus;
mod provider;
mod sample;
mod software;
mod source;
mod standalone;
mod tethered;

pub use oculus::{InputBuffer, OculusDevice, OculusPoseBuffers, OculusSource, INPUT_WORDS};
pub use provider::{PoseOutcome, PoseProvider};
pub use sample::{ButtonSample, ControllerSample, EyeView, HeadPose, PoseSample};
pub use software::{SoftwareHandle, SoftwarePose, SoftwareSource};
pub use source::PoseSource;
pub use standalone::{HandBuffer, StandaloneDevice, StandalonePoseBuffers, StandaloneSource, HAND_WORDS};
pub use tethered::{
    ControllerBuffer, TetheredDevice, TetheredPoseBuffers, TetheredSource, CONTROLLER_WORDS,
};
