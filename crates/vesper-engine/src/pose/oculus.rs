//! Desktop headset reporting head pose, per-eye matrices and controller poses
//! in one call, with controller input queried separately.

use glam::{Mat4, Vec3};

use crate::error::PoseAcquisitionError;
use crate::xr::{LEFT_HAND, RIGHT_HAND};

use super::sample::{ButtonSample, ControllerSample, EyeView, HeadPose, PoseSample};
use super::source::PoseSource;
use super::standalone::fov_from_projection;

/// Words in one controller input buffer.
///
/// Layout: `[connected, x, y, thumbstick, menu, trigger, grip, x touched,
/// y touched, thumbstick touched, trigger touched, stick.x, stick.y]`.
pub const INPUT_WORDS: usize = 13;

/// Analog trigger and grip press thresholds, left hand then right.
const PRESS_THRESHOLD: [f32; 2] = [0.01, 0.1];

/// Raw pose buffers filled by the runtime. Matrices are column-major.
#[derive(Debug, Clone)]
pub struct OculusPoseBuffers {
    pub head_position: [f32; 3],
    pub head_orientation: [f32; 4],
    /// Left then right.
    pub view: [[f32; 16]; 2],
    pub projection: [[f32; 16]; 2],
    /// Left then right controller `pos.xyz`.
    pub controller_position: [[f32; 3]; 2],
    /// Left then right controller `quat.xyzw`.
    pub controller_orientation: [[f32; 4]; 2],
}

impl Default for OculusPoseBuffers {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array();
        Self {
            head_position: [0.0; 3],
            head_orientation: [0.0, 0.0, 0.0, 1.0],
            view: [identity; 2],
            projection: [identity; 2],
            controller_position: [[0.0; 3]; 2],
            controller_orientation: [[0.0, 0.0, 0.0, 1.0]; 2],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputBuffer(pub [f32; INPUT_WORDS]);

/// Runtime queries for a desktop headset.
pub trait OculusDevice: Send + 'static {
    /// Blocks until the runtime hands out the next frame's poses.
    fn get_pose(&mut self, out: &mut OculusPoseBuffers) -> bool;

    /// Fills `out` for controller `index` (0 = left, 1 = right).
    fn get_controllers_input_state(&mut self, index: usize, out: &mut InputBuffer);
}

/// Adapts an [`OculusDevice`] to the canonical pose layout.
pub struct OculusSource<D> {
    device: D,
    buffers: Box<OculusPoseBuffers>,
    input: InputBuffer,
}

impl<D: OculusDevice> OculusSource<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            buffers: Box::default(),
            input: InputBuffer::default(),
        }
    }
}

impl<D: OculusDevice> PoseSource for OculusSource<D> {
    fn name(&self) -> &'static str {
        "oculus"
    }

    fn acquire(&mut self) -> Result<PoseSample, PoseAcquisitionError> {
        if !self.device.get_pose(&mut self.buffers) {
            return Err(PoseAcquisitionError::NoPose);
        }

        let b = &*self.buffers;
        let head = Vec3::from_array(b.head_position);
        let mut sample = PoseSample {
            head: HeadPose {
                position: b.head_position,
                orientation: b.head_orientation,
            },
            left: eye_view(head, &b.view[0], &b.projection[0]),
            right: eye_view(head, &b.view[1], &b.projection[1]),
            ..PoseSample::default()
        };

        for (slot, hand) in [(LEFT_HAND, 0usize), (RIGHT_HAND, 1usize)] {
            self.input = InputBuffer::default();
            self.device.get_controllers_input_state(hand, &mut self.input);
            let b = &*self.buffers;
            sample.gamepads[slot] = map_input(
                b.controller_position[hand],
                b.controller_orientation[hand],
                &self.input,
                PRESS_THRESHOLD[hand],
            );
        }

        Ok(sample)
    }
}

fn eye_view(head: Vec3, view: &[f32; 16], projection: &[f32; 16]) -> EyeView {
    let eye = Mat4::from_cols_array(view).inverse().w_axis.truncate();
    EyeView {
        view: *view,
        projection: *projection,
        fov: fov_from_projection(projection),
        offset: (eye - head).to_array(),
    }
}

fn map_input(position: [f32; 3], orientation: [f32; 4], raw: &InputBuffer, threshold: f32) -> ControllerSample {
    let w = &raw.0;
    let (trigger, grip) = (w[5], w[6]);

    let mut c = ControllerSample {
        connected: w[0] != 0.0,
        position,
        orientation,
        ..ControllerSample::default()
    };

    // Canonical buttons: 0 thumbstick, 1 trigger, 2 grip, 3 X/A, 4 Y/B, 5 menu.
    c.buttons[0] = ButtonSample {
        pressed: w[3] != 0.0,
        touched: w[9] != 0.0,
        value: 0.0,
    };
    c.buttons[1] = ButtonSample {
        pressed: trigger >= threshold,
        touched: w[10] != 0.0,
        value: trigger,
    };
    c.buttons[2] = ButtonSample {
        pressed: grip >= threshold,
        touched: false,
        value: grip,
    };
    c.buttons[3] = ButtonSample {
        pressed: w[1] == 1.0,
        touched: w[7] != 0.0,
        value: 0.0,
    };
    c.buttons[4] = ButtonSample {
        pressed: w[2] == 1.0,
        touched: w[8] != 0.0,
        value: 0.0,
    };
    c.buttons[5].pressed = w[4] == 1.0;

    c.axes[0] = w[11];
    c.axes[1] = w[12];
    c
}
