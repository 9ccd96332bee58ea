//! Tethered HMD + controllers + trackers (room-scale runtime).

use glam::{Mat4, Vec3};

use crate::error::PoseAcquisitionError;
use crate::xr::{FIRST_TRACKER, GAMEPAD_AXES, LEFT_HAND, MAX_TRACKERS, RIGHT_HAND};

use super::sample::{ButtonSample, ControllerSample, EyeView, HeadPose, PoseSample};
use super::source::PoseSource;

/// Words in one raw controller state buffer.
pub const CONTROLLER_WORDS: usize = 21;

/// Raw pose buffers filled by the runtime. All matrices column-major.
#[derive(Debug, Clone)]
pub struct TetheredPoseBuffers {
    /// Head-to-world transform.
    pub hmd: [f32; 16],
    /// Eye-to-head transforms, left then right.
    pub eye_to_head: [[f32; 16]; 2],
    pub projection: [[f32; 16]; 2],
    /// Raw projection tangents `[left, right, top, bottom]` per eye.
    pub projection_raw: [[f32; 4]; 2],
    /// Controller-to-world transforms, left then right.
    pub controllers: [[f32; 16]; 2],
    /// Tracker-to-world transforms. A NaN first element marks a missing tracker.
    pub trackers: [[f32; 16]; MAX_TRACKERS],
}

impl Default for TetheredPoseBuffers {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array();
        Self {
            hmd: identity,
            eye_to_head: [identity; 2],
            projection: [identity; 2],
            projection_raw: [[-1.0, 1.0, 1.0, -1.0]; 2],
            controllers: [identity; 2],
            trackers: [[f32::NAN; 16]; MAX_TRACKERS],
        }
    }
}

/// Raw controller state.
///
/// Layout: `[1..=5]` pressed flags for system, menu, grip, pad, trigger;
/// `[6..=10]` touched flags in the same order; `[11..=20]` axes.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerBuffer(pub [f32; CONTROLLER_WORDS]);

impl Default for ControllerBuffer {
    fn default() -> Self {
        Self([0.0; CONTROLLER_WORDS])
    }
}

/// Runtime queries for a tethered headset.
pub trait TetheredDevice: Send + 'static {
    /// Fills `out` with the latest poses. Returns `false` when none is available.
    fn try_get_pose(&mut self, out: &mut TetheredPoseBuffers) -> bool;

    /// Fills `out` for controller `index` (0 = left, 1 = right). Returns
    /// `false` when the controller is not connected.
    fn get_controller_state(&mut self, index: usize, out: &mut ControllerBuffer) -> bool;
}

/// Adapts a [`TetheredDevice`] to the canonical pose layout.
pub struct TetheredSource<D> {
    device: D,
    buffers: Box<TetheredPoseBuffers>,
    controller: ControllerBuffer,
}

impl<D: TetheredDevice> TetheredSource<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            buffers: Box::default(),
            controller: ControllerBuffer::default(),
        }
    }
}

impl<D: TetheredDevice> PoseSource for TetheredSource<D> {
    fn name(&self) -> &'static str {
        "tethered"
    }

    fn acquire(&mut self) -> Result<PoseSample, PoseAcquisitionError> {
        if !self.device.try_get_pose(&mut self.buffers) {
            return Err(PoseAcquisitionError::NoPose);
        }

        let b = &*self.buffers;
        let hmd = Mat4::from_cols_array(&b.hmd);
        let (_, orientation, position) = hmd.to_scale_rotation_translation();

        let mut sample = PoseSample {
            head: HeadPose {
                position: position.to_array(),
                orientation: orientation.to_array(),
            },
            left: eye_view(&hmd, &b.eye_to_head[0], &b.projection[0], &b.projection_raw[0]),
            right: eye_view(&hmd, &b.eye_to_head[1], &b.projection[1], &b.projection_raw[1]),
            ..PoseSample::default()
        };

        for (slot, hand) in [(LEFT_HAND, 0usize), (RIGHT_HAND, 1usize)] {
            self.controller = ControllerBuffer::default();
            if self.device.get_controller_state(hand, &mut self.controller) {
                sample.gamepads[slot] =
                    map_controller(&self.buffers.controllers[hand], &self.controller);
            }
        }

        for (i, raw) in self.buffers.trackers.iter().enumerate() {
            if raw[0].is_nan() {
                continue;
            }
            let (_, rot, pos) = Mat4::from_cols_array(raw).to_scale_rotation_translation();
            sample.gamepads[FIRST_TRACKER + i] = ControllerSample {
                connected: true,
                position: pos.to_array(),
                orientation: rot.to_array(),
                ..ControllerSample::default()
            };
        }

        Ok(sample)
    }
}

fn eye_view(hmd: &Mat4, eye_to_head: &[f32; 16], projection: &[f32; 16], raw: &[f32; 4]) -> EyeView {
    let eye = Mat4::from_cols_array(eye_to_head);
    let offset: Vec3 = eye.w_axis.truncate();
    EyeView {
        view: (*hmd * eye).inverse().to_cols_array(),
        projection: *projection,
        fov: raw.map(|t| t.atan().to_degrees()),
        offset: offset.to_array(),
    }
}

// Canonical buttons: 0 pad, 1 trigger, 2 grip, 3 menu, 4 system.
const PRESSED_WORDS: [usize; 5] = [4, 5, 3, 2, 1];
const TOUCHED_WORDS: [usize; 5] = [9, 10, 8, 7, 6];
const AXES_START: usize = 11;
const TRIGGER_AXIS: usize = 2;

fn map_controller(pose: &[f32; 16], raw: &ControllerBuffer) -> ControllerSample {
    let (_, rot, pos) = Mat4::from_cols_array(pose).to_scale_rotation_translation();
    let mut c = ControllerSample {
        connected: true,
        position: pos.to_array(),
        orientation: rot.to_array(),
        ..ControllerSample::default()
    };

    for (i, (&p, &t)) in PRESSED_WORDS.iter().zip(TOUCHED_WORDS.iter()).enumerate() {
        let pressed = raw.0[p] != 0.0;
        c.buttons[i] = ButtonSample {
            pressed,
            touched: raw.0[t] != 0.0,
            value: if pressed { 1.0 } else { 0.0 },
        };
    }

    c.axes.copy_from_slice(&raw.0[AXES_START..AXES_START + GAMEPAD_AXES]);
    c.buttons[1].value = c.axes[TRIGGER_AXIS].clamp(0.0, 1.0);
    c
}
