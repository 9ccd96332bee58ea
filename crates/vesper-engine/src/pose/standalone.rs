//! Standalone headset reporting per-eye transforms and hand controllers.

use glam::{Mat4, Quat, Vec3};

use crate::error::PoseAcquisitionError;
use crate::xr::{LEFT_HAND, RIGHT_HAND};

use super::sample::{ButtonSample, ControllerSample, EyeView, HeadPose, PoseSample};
use super::source::PoseSource;

/// Words in one hand buffer:
/// `[connected, pos.xyz, quat.xyzw, trigger, bumper, home, pad.x, pad.y, pad.value]`.
pub const HAND_WORDS: usize = 14;

/// Raw per-eye poses as reported by the headset.
#[derive(Debug, Clone)]
pub struct StandalonePoseBuffers {
    /// Left eye `pos.xyz quat.xyzw`, then right eye.
    pub transforms: [f32; 14],
    /// Left projection, then right. Column-major.
    pub projections: [f32; 32],
}

impl Default for StandalonePoseBuffers {
    fn default() -> Self {
        let mut transforms = [0.0; 14];
        transforms[6] = 1.0;
        transforms[13] = 1.0;
        let identity = Mat4::IDENTITY.to_cols_array();
        let mut projections = [0.0; 32];
        projections[..16].copy_from_slice(&identity);
        projections[16..].copy_from_slice(&identity);
        Self { transforms, projections }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandBuffer(pub [f32; HAND_WORDS]);

/// Runtime queries for a standalone headset.
pub trait StandaloneDevice: Send + 'static {
    fn try_get_pose(&mut self, out: &mut StandalonePoseBuffers) -> bool;

    /// Fills `out` for hand `index` (0 = left, 1 = right).
    fn get_controller_state(&mut self, index: usize, out: &mut HandBuffer) -> bool;
}

/// Adapts a [`StandaloneDevice`] to the canonical pose layout.
pub struct StandaloneSource<D> {
    device: D,
    buffers: StandalonePoseBuffers,
    hand: HandBuffer,
}

impl<D: StandaloneDevice> StandaloneSource<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            buffers: StandalonePoseBuffers::default(),
            hand: HandBuffer::default(),
        }
    }
}

impl<D: StandaloneDevice> PoseSource for StandaloneSource<D> {
    fn name(&self) -> &'static str {
        "standalone"
    }

    fn acquire(&mut self) -> Result<PoseSample, PoseAcquisitionError> {
        if !self.device.try_get_pose(&mut self.buffers) {
            return Err(PoseAcquisitionError::NoPose);
        }

        let t = &self.buffers.transforms;
        let (left_pos, left_rot) = read_pose(&t[0..7]);
        let (right_pos, right_rot) = read_pose(&t[7..14]);

        let mut left_proj = [0.0; 16];
        let mut right_proj = [0.0; 16];
        left_proj.copy_from_slice(&self.buffers.projections[..16]);
        right_proj.copy_from_slice(&self.buffers.projections[16..]);

        // The left eye doubles as the head pose.
        let mut sample = PoseSample {
            head: HeadPose {
                position: left_pos.to_array(),
                orientation: left_rot.to_array(),
            },
            left: EyeView {
                view: eye_view(left_pos, left_rot),
                projection: left_proj,
                fov: fov_from_projection(&left_proj),
                offset: [0.0; 3],
            },
            right: EyeView {
                view: eye_view(right_pos, right_rot),
                projection: right_proj,
                fov: fov_from_projection(&right_proj),
                offset: (right_pos - left_pos).to_array(),
            },
            ..PoseSample::default()
        };

        for (slot, hand) in [(LEFT_HAND, 0usize), (RIGHT_HAND, 1usize)] {
            self.hand = HandBuffer::default();
            if self.device.get_controller_state(hand, &mut self.hand) {
                sample.gamepads[slot] = map_hand(&self.hand);
            }
        }

        Ok(sample)
    }
}

fn read_pose(words: &[f32]) -> (Vec3, Quat) {
    (
        Vec3::new(words[0], words[1], words[2]),
        Quat::from_xyzw(words[3], words[4], words[5], words[6]),
    )
}

fn eye_view(position: Vec3, rotation: Quat) -> [f32; 16] {
    Mat4::from_rotation_translation(rotation, position)
        .inverse()
        .to_cols_array()
}

/// Recovers `[left, right, top, bottom]` degrees from a perspective matrix.
pub(crate) fn fov_from_projection(m: &[f32; 16]) -> [f32; 4] {
    let (sx, sy) = (m[0], m[5]);
    if sx == 0.0 || sy == 0.0 {
        return [0.0; 4];
    }
    let (ox, oy) = (m[8], m[9]);
    [
        ((ox - 1.0) / sx).atan().to_degrees(),
        ((ox + 1.0) / sx).atan().to_degrees(),
        ((oy + 1.0) / sy).atan().to_degrees(),
        ((oy - 1.0) / sy).atan().to_degrees(),
    ]
}

fn map_hand(raw: &HandBuffer) -> ControllerSample {
    let w = &raw.0;
    let (pos, rot) = read_pose(&w[1..8]);
    let (trigger, bumper, home) = (w[8], w[9], w[10]);
    let (pad_x, pad_y, pad) = (w[11], w[12], w[13]);

    let mut c = ControllerSample {
        connected: w[0] != 0.0,
        position: pos.to_array(),
        orientation: rot.to_array(),
        ..ControllerSample::default()
    };

    c.buttons[0] = ButtonSample {
        pressed: pad > 0.5,
        touched: pad > 0.0,
        value: pad,
    };
    c.buttons[1] = ButtonSample::analog(trigger);
    c.buttons[2] = ButtonSample::analog(bumper);
    c.buttons[3] = ButtonSample::analog(home);

    c.axes[0] = pad_x;
    c.axes[1] = pad_y;
    c.axes[2] = trigger;
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHeadset {
        buffers: StandalonePoseBuffers,
        left: HandBuffer,
    }

    impl StandaloneDevice for FakeHeadset {
        fn try_get_pose(&mut self, out: &mut StandalonePoseBuffers) -> bool {
            *out = self.buffers.clone();
            true
        }

        fn get_controller_state(&mut self, index: usize, out: &mut HandBuffer) -> bool {
            if index == 0 {
                *out = self.left.clone();
                return true;
            }
            false
        }
    }

    #[test]
    fn fov_round_trips_through_projection() {
        let proj = Mat4::perspective_rh_gl(90f32.to_radians(), 1.0, 0.1, 100.0).to_cols_array();
        let fov = fov_from_projection(&proj);
        assert!((fov[0] + 45.0).abs() < 1e-3);
        assert!((fov[1] - 45.0).abs() < 1e-3);
        assert!((fov[2] - 45.0).abs() < 1e-3);
        assert!((fov[3] + 45.0).abs() < 1e-3);
    }

    #[test]
    fn hand_thresholds() {
        let mut left = HandBuffer::default();
        left.0[0] = 1.0;
        left.0[7] = 1.0; // quat w
        left.0[8] = 0.7; // trigger
        left.0[9] = 0.3; // bumper
        left.0[13] = 0.2; // pad value

        let mut src = StandaloneSource::new(FakeHeadset {
            buffers: StandalonePoseBuffers::default(),
            left,
        });
        let s = src.acquire().unwrap();
        let pad = &s.gamepads[LEFT_HAND];

        assert!(pad.connected);
        assert!(pad.buttons[1].pressed);
        assert_eq!(pad.axes[2], 0.7);
        assert!(!pad.buttons[2].pressed && !pad.buttons[2].touched);
        assert!(pad.buttons[0].touched && !pad.buttons[0].pressed);
        assert!(!s.gamepads[RIGHT_HAND].connected);
    }

    #[test]
    fn right_eye_offset_is_relative_to_left() {
        let mut buffers = StandalonePoseBuffers::default();
        buffers.transforms[7] = 0.064;
        let mut src = StandaloneSource::new(FakeHeadset {
            buffers,
            left: HandBuffer::default(),
        });
        let s = src.acquire().unwrap();
        assert!((s.right.offset[0] - 0.064).abs() < 1e-6);
        assert_eq!(s.left.offset, [0.0; 3]);
    }
}
