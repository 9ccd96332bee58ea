use vesper_engine::pose::SoftwareHandle;
use vesper_engine::scheduler::TimedResource;
use vesper_engine::time::FrameTime;

/// Turns the software head around the vertical axis at a fixed rate.
pub struct OrbitDriver {
    handle: SoftwareHandle,
    degrees_per_second: f32,
    yaw: f32,
}

impl OrbitDriver {
    pub fn new(handle: SoftwareHandle, degrees_per_second: f32) -> Self {
        Self {
            handle,
            degrees_per_second,
            yaw: 0.0,
        }
    }
}

impl TimedResource for OrbitDriver {
    fn advance(&mut self, frame: &FrameTime) {
        self.yaw = (self.yaw + self.degrees_per_second * frame.dt).rem_euclid(360.0);
        let half = self.yaw.to_radians() / 2.0;
        self.handle.update(|pose| {
            pose.head.orientation = [0.0, half.sin(), 0.0, half.cos()];
        });
    }
}
