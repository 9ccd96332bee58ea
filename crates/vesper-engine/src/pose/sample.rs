use crate::xr::{GAMEPAD_AXES, GAMEPAD_BUTTONS, GAMEPAD_SLOTS, IDENTITY, IDENTITY_QUAT};

/// Head position + orientation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct HeadPose {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

impl Default for HeadPose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            orientation: IDENTITY_QUAT,
        }
    }
}

/// Per-eye view data.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EyeView {
    pub view: [f32; 16],
    pub projection: [f32; 16],
    /// Degrees, `[left, right, top, bottom]`.
    pub fov: [f32; 4],
    /// Eye position relative to the head.
    pub offset: [f32; 3],
}

impl Default for EyeView {
    fn default() -> Self {
        Self {
            view: IDENTITY,
            projection: IDENTITY,
            fov: [-45.0, 45.0, 45.0, -45.0],
            offset: [0.0; 3],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ButtonSample {
    pub pressed: bool,
    pub touched: bool,
    pub value: f32,
}

impl ButtonSample {
    /// Analog input where crossing half travel counts as pressed and touched.
    pub(crate) fn analog(value: f32) -> Self {
        let pushed = value > 0.5;
        Self {
            pressed: pushed,
            touched: pushed,
            value,
        }
    }
}

/// One tracked controller or tracker. Unmapped buttons/axes stay false/0.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ControllerSample {
    pub connected: bool,
    pub position: [f32; 3],
    pub orientation: [f32; 4],
    pub buttons: [ButtonSample; GAMEPAD_BUTTONS],
    pub axes: [f32; GAMEPAD_AXES],
}

impl Default for ControllerSample {
    fn default() -> Self {
        Self {
            connected: false,
            position: [0.0; 3],
            orientation: IDENTITY_QUAT,
            buttons: [ButtonSample::default(); GAMEPAD_BUTTONS],
            axes: [0.0; GAMEPAD_AXES],
        }
    }
}

/// A complete pose in the canonical layout.
///
/// Samples are applied to the shared state as a whole; there is no way to
/// write part of one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseSample {
    pub head: HeadPose,
    pub left: EyeView,
    pub right: EyeView,
    pub gamepads: [ControllerSample; GAMEPAD_SLOTS],
}
