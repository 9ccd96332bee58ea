//! Shared XR state.
//!
//! One fixed-layout record (`XrFrame`) holding head pose, per-eye view and
//! projection, and the gamepad slots. The scheduler owns the only
//! `XrStateWriter`; window tasks read through `Arc<SharedXrState>`.

mod derive;
mod layout;
mod shared;

pub use derive::{derive_pose, normalize_quat, DerivedPose};
pub use layout::{
    ButtonSlot, GamepadSlot, XrFrame, FIRST_TRACKER, FRAME_WORDS, GAMEPAD_AXES, GAMEPAD_BUTTONS,
    GAMEPAD_SLOTS, IDENTITY, IDENTITY_QUAT, LEFT_HAND, MAX_TRACKERS, RIGHT_HAND,
};
pub use shared::{SharedXrState, XrStateWriter};
