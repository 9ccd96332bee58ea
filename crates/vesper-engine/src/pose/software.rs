//! Pose source for development without hardware.
//!
//! The host (or a test) writes the desired head and hand poses through a
//! [`SoftwareHandle`]; the source turns them into full per-eye views.

use std::sync::{Arc, Mutex, MutexGuard};

use glam::{Mat4, Quat, Vec3};

use crate::error::PoseAcquisitionError;
use crate::xr::{LEFT_HAND, RIGHT_HAND};

use super::sample::{ControllerSample, EyeView, HeadPose, PoseSample};
use super::source::PoseSource;

/// Desired pose and lens parameters for the software source.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwarePose {
    pub head: HeadPose,
    pub left_hand: ControllerSample,
    pub right_hand: ControllerSample,
    /// Interpupillary distance in meters.
    pub ipd: f32,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Per-eye width / height.
    pub aspect: f32,
}

impl Default for SoftwarePose {
    fn default() -> Self {
        Self {
            head: HeadPose {
                position: [0.0, 1.6, 0.0],
                ..HeadPose::default()
            },
            left_hand: ControllerSample::default(),
            right_hand: ControllerSample::default(),
            ipd: 0.064,
            fov_degrees: 90.0,
            near: 0.1,
            far: 10000.0,
            aspect: 1280.0 / 1024.0,
        }
    }
}

/// Cloneable write handle into a [`SoftwareSource`].
#[derive(Debug, Clone, Default)]
pub struct SoftwareHandle(Arc<Mutex<SoftwarePose>>);

impl SoftwareHandle {
    pub fn set_head(&self, position: [f32; 3], orientation: [f32; 4]) {
        let mut p = self.lock();
        p.head = HeadPose { position, orientation };
    }

    pub fn set_hand(&self, slot: usize, sample: ControllerSample) {
        let mut p = self.lock();
        match slot {
            LEFT_HAND => p.left_hand = sample,
            RIGHT_HAND => p.right_hand = sample,
            _ => log::warn!("software pose has no hand slot {slot}"),
        }
    }

    /// Runs `f` against the full pose description.
    pub fn update(&self, f: impl FnOnce(&mut SoftwarePose)) {
        f(&mut self.lock());
    }

    pub fn snapshot(&self) -> SoftwarePose {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, SoftwarePose> {
        // A panicking writer leaves a complete value behind; keep using it.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Software pose source. Never fails.
#[derive(Debug, Default)]
pub struct SoftwareSource {
    handle: SoftwareHandle,
}

impl SoftwareSource {
    pub fn new() -> (Self, SoftwareHandle) {
        let handle = SoftwareHandle::default();
        (Self { handle: handle.clone() }, handle)
    }

}

impl PoseSource for SoftwareSource {
    fn name(&self) -> &'static str {
        "software"
    }

    fn acquire(&mut self) -> Result<PoseSample, PoseAcquisitionError> {
        let p = self.handle.snapshot();

        let head_rot = Quat::from_array(p.head.orientation).normalize();
        let head = Mat4::from_rotation_translation(head_rot, Vec3::from_array(p.head.position));
        let projection =
            Mat4::perspective_rh_gl(p.fov_degrees.to_radians(), p.aspect, p.near, p.far);
        let half_h = (p.fov_degrees * 0.5).to_radians().tan();
        let half_w = half_h * p.aspect;
        let fov = [
            -half_w.atan().to_degrees(),
            half_w.atan().to_degrees(),
            half_h.atan().to_degrees(),
            -half_h.atan().to_degrees(),
        ];

        let eye = |dx: f32| {
            let offset = Vec3::new(dx, 0.0, 0.0);
            EyeView {
                view: (head * Mat4::from_translation(offset)).inverse().to_cols_array(),
                projection: projection.to_cols_array(),
                fov,
                offset: offset.to_array(),
            }
        };

        let mut sample = PoseSample {
            head: p.head,
            left: eye(-p.ipd * 0.5),
            right: eye(p.ipd * 0.5),
            ..PoseSample::default()
        };
        sample.gamepads[LEFT_HAND] = p.left_hand;
        sample.gamepads[RIGHT_HAND] = p.right_hand;
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eyes_straddle_the_head() {
        let (mut src, handle) = SoftwareSource::new();
        handle.set_head([1.0, 1.5, 0.0], [0.0, 0.0, 0.0, 1.0]);

        let s = src.acquire().unwrap();
        assert_eq!(s.head.position, [1.0, 1.5, 0.0]);
        assert!((s.left.offset[0] + 0.032).abs() < 1e-6);
        assert!((s.right.offset[0] - 0.032).abs() < 1e-6);
        // Left eye sits at x = 0.968, so its view translates by -0.968.
        assert!((s.left.view[12] + 0.968).abs() < 1e-5);
        assert!((s.left.fov[2] - 45.0).abs() < 1e-3);
    }

    #[test]
    fn hands_follow_the_handle() {
        let (mut src, handle) = SoftwareSource::new();
        let hand = ControllerSample {
            connected: true,
            position: [0.2, 1.0, -0.3],
            ..ControllerSample::default()
        };
        handle.set_hand(RIGHT_HAND, hand);

        let s = src.acquire().unwrap();
        assert_eq!(s.gamepads[RIGHT_HAND], hand);
        assert!(!s.gamepads[LEFT_HAND].connected);
    }
}
