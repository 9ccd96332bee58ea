use std::mem::{offset_of, size_of};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::Pod;

use crate::error::SchedulerFatalError;
use crate::pose::PoseSample;

use super::derive::{derive_pose, normalize_quat};
use super::layout::{GamepadSlot, XrFrame, FRAME_WORDS, GAMEPAD_SLOTS};

/// Word-slot region holding one [`XrFrame`].
///
/// Readers on any thread access fields in place. The region has no lock; the
/// scheduler's step order guarantees the single writer has finished
/// publishing before any reader is dispatched for the tick.
pub struct SharedXrState {
    words: Box<[AtomicU32]>,
}

impl SharedXrState {
    pub fn new(initial: &XrFrame) -> Self {
        let words = bytemuck::cast_slice::<XrFrame, u32>(std::slice::from_ref(initial))
            .iter()
            .map(|w| AtomicU32::new(*w))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        debug_assert_eq!(words.len(), FRAME_WORDS);
        Self { words }
    }

    /// Copies the whole frame out of the region.
    pub fn load(&self) -> XrFrame {
        self.read_at(0)
    }

    pub fn head_position(&self) -> [f32; 3] {
        self.read_at(offset_of!(XrFrame, position))
    }

    pub fn head_orientation(&self) -> [f32; 4] {
        self.read_at(offset_of!(XrFrame, orientation))
    }

    pub fn render_size(&self) -> (f32, f32) {
        let [w, h]: [f32; 2] = self.read_at(offset_of!(XrFrame, render_width));
        (w, h)
    }

    /// Reads one gamepad slot. Returns `None` for an out-of-range slot.
    pub fn gamepad(&self, slot: usize) -> Option<GamepadSlot> {
        if slot >= GAMEPAD_SLOTS {
            return None;
        }
        let offset = offset_of!(XrFrame, gamepads) + slot * size_of::<GamepadSlot>();
        Some(self.read_at(offset))
    }

    fn read_at<T: Pod>(&self, byte_offset: usize) -> T {
        let mut out = T::zeroed();
        let dst: &mut [u32] = bytemuck::cast_slice_mut(std::slice::from_mut(&mut out));
        let start = byte_offset / 4;
        let len = dst.len();
        for (d, w) in dst.iter_mut().zip(&self.words[start..start + len]) {
            *d = w.load(Ordering::Acquire);
        }
        out
    }

    fn store(&self, frame: &XrFrame) {
        let src = bytemuck::cast_slice::<XrFrame, u32>(std::slice::from_ref(frame));
        for (w, v) in self.words.iter().zip(src) {
            w.store(*v, Ordering::Release);
        }
    }
}

/// Sole writer of the shared XR state.
///
/// Not `Clone`: whoever owns this value (the scheduler's frame context) holds
/// the only mutation rights. Edits land in a private master copy and become
/// visible to readers on [`publish`](Self::publish).
pub struct XrStateWriter {
    frame: XrFrame,
    shared: Arc<SharedXrState>,
}

impl XrStateWriter {
    pub fn new(render_width: u32, render_height: u32) -> Result<Self, SchedulerFatalError> {
        if render_width == 0 || render_height == 0 {
            return Err(SchedulerFatalError::InvalidRenderSize {
                width: render_width,
                height: render_height,
            });
        }

        let frame = XrFrame::new(render_width, render_height);
        let shared = Arc::new(SharedXrState::new(&frame));
        Ok(Self { frame, shared })
    }

    /// The writer's master copy, including unpublished edits.
    pub fn frame(&self) -> &XrFrame {
        &self.frame
    }

    /// Read handle for other execution units.
    pub fn shared(&self) -> Arc<SharedXrState> {
        Arc::clone(&self.shared)
    }

    pub fn set_depth_range(&mut self, near: f32, far: f32) {
        self.frame.depth_near = near;
        self.frame.depth_far = far;
    }

    /// Writes a complete pose sample. Every field the sample carries is
    /// replaced; quaternions are normalized on the way in.
    pub fn apply_pose(&mut self, sample: &PoseSample) {
        let f = &mut self.frame;

        f.position = sample.head.position;
        f.orientation = normalize_quat(sample.head.orientation);

        f.left_view = sample.left.view;
        f.left_projection = sample.left.projection;
        f.left_fov = sample.left.fov;
        f.left_offset = sample.left.offset;

        f.right_view = sample.right.view;
        f.right_projection = sample.right.projection;
        f.right_fov = sample.right.fov;
        f.right_offset = sample.right.offset;

        for (slot, c) in f.gamepads.iter_mut().zip(sample.gamepads.iter()) {
            slot.connected = c.connected as u32;
            slot.position = c.position;
            slot.orientation = normalize_quat(c.orientation);
            for (b, cb) in slot.buttons.iter_mut().zip(c.buttons.iter()) {
                b.pressed = cb.pressed as u32;
                b.touched = cb.touched as u32;
                b.value = cb.value.clamp(0.0, 1.0);
            }
            slot.axes = c.axes;
        }
    }

    /// Recomputes every gamepad's direction and transform from its pose.
    pub fn recompute_derived(&mut self) {
        for slot in self.frame.gamepads.iter_mut() {
            let d = derive_pose(slot.position, slot.orientation);
            slot.direction = d.direction;
            slot.transform = d.transform;
        }
    }

    /// Makes the master copy visible to readers.
    pub fn publish(&self) {
        self.shared.store(&self.frame);
    }
}
