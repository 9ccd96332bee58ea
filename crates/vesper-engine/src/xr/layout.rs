use bytemuck::{Pod, Zeroable};

/// Number of tracker slots following the two hand slots.
pub const MAX_TRACKERS: usize = 8;

/// Total gamepad slots: left hand, right hand, then trackers.
pub const GAMEPAD_SLOTS: usize = 2 + MAX_TRACKERS;

pub const GAMEPAD_BUTTONS: usize = 6;
pub const GAMEPAD_AXES: usize = 10;

pub const LEFT_HAND: usize = 0;
pub const RIGHT_HAND: usize = 1;
pub const FIRST_TRACKER: usize = 2;

/// Column-major 4x4 identity.
pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

pub const IDENTITY_QUAT: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// One gamepad button. Flags are stored as `0`/`1` words.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct ButtonSlot {
    pub pressed: u32,
    pub touched: u32,
    /// Analog value in `[0, 1]`.
    pub value: f32,
}

impl ButtonSlot {
    #[inline]
    pub fn is_pressed(&self) -> bool {
        self.pressed != 0
    }

    #[inline]
    pub fn is_touched(&self) -> bool {
        self.touched != 0
    }
}

/// Canonical gamepad record.
///
/// `direction` and `transform` are derived from `position` + `orientation` by
/// [`XrStateWriter::recompute_derived`](super::XrStateWriter::recompute_derived);
/// nothing else writes them.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GamepadSlot {
    pub connected: u32,
    pub position: [f32; 3],
    /// Unit quaternion `[x, y, z, w]`.
    pub orientation: [f32; 4],
    pub direction: [f32; 3],
    /// Column-major 4x4.
    pub transform: [f32; 16],
    pub buttons: [ButtonSlot; GAMEPAD_BUTTONS],
    pub axes: [f32; GAMEPAD_AXES],
}

impl GamepadSlot {
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected != 0
    }
}

impl Default for GamepadSlot {
    fn default() -> Self {
        Self {
            connected: 0,
            position: [0.0; 3],
            orientation: IDENTITY_QUAT,
            direction: [0.0, 0.0, -1.0],
            transform: IDENTITY,
            buttons: [ButtonSlot::default(); GAMEPAD_BUTTONS],
            axes: [0.0; GAMEPAD_AXES],
        }
    }
}

/// Fixed layout of the shared XR state.
///
/// Every field is a 4-byte word, so the whole record maps 1:1 onto the word
/// slots held by [`SharedXrState`](super::SharedXrState). Matrices are
/// column-major and right-handed; FOV angles are degrees in
/// `[left, right, top, bottom]` order.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct XrFrame {
    pub render_width: f32,
    pub render_height: f32,
    pub depth_near: f32,
    pub depth_far: f32,

    pub position: [f32; 3],
    pub orientation: [f32; 4],

    pub left_view: [f32; 16],
    pub right_view: [f32; 16],
    pub left_projection: [f32; 16],
    pub right_projection: [f32; 16],

    pub left_fov: [f32; 4],
    pub right_fov: [f32; 4],

    pub left_offset: [f32; 3],
    pub right_offset: [f32; 3],

    pub gamepads: [GamepadSlot; GAMEPAD_SLOTS],
}

impl XrFrame {
    /// Identity pose for the given per-eye render size.
    pub fn new(render_width: u32, render_height: u32) -> Self {
        Self {
            render_width: render_width as f32,
            render_height: render_height as f32,
            depth_near: 0.1,
            depth_far: 10_000.0,
            position: [0.0; 3],
            orientation: IDENTITY_QUAT,
            left_view: IDENTITY,
            right_view: IDENTITY,
            left_projection: IDENTITY,
            right_projection: IDENTITY,
            left_fov: [-45.0, 45.0, 45.0, -45.0],
            right_fov: [-45.0, 45.0, 45.0, -45.0],
            left_offset: [0.0; 3],
            right_offset: [0.0; 3],
            gamepads: [GamepadSlot::default(); GAMEPAD_SLOTS],
        }
    }
}

impl Default for XrFrame {
    fn default() -> Self {
        Self::new(1280, 1024)
    }
}

/// Number of 4-byte words in [`XrFrame`].
pub const FRAME_WORDS: usize = std::mem::size_of::<XrFrame>() / 4;

const _: () = assert!(std::mem::size_of::<XrFrame>() % 4 == 0);
const _: () = assert!(std::mem::align_of::<XrFrame>() == 4);

#[cfg(test)]
mod tests {
    use glam::{Mat4, Quat};

    use super::*;

    #[test]
    fn identity_constants_match_glam() {
        assert_eq!(IDENTITY, Mat4::IDENTITY.to_cols_array());
        assert_eq!(IDENTITY_QUAT, Quat::IDENTITY.to_array());
        assert_eq!(XrFrame::default().left_view, IDENTITY);
    }
}
