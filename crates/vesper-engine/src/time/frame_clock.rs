use std::time::{Duration, Instant};

/// Timing snapshot for one scheduler tick.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous tick, in seconds. Clamped.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Milliseconds since the clock was created. Shared by every
    /// animation-frame callback of the tick.
    pub timestamp_ms: f64,

    /// Monotonic tick counter, starting at 1.
    pub tick: u64,
}

/// Produces one [`FrameTime`] per scheduler tick.
///
/// Delta time is clamped so a stall (debugger, minimized window) does not
/// feed pathological values downstream. The timestamp is not clamped.
#[derive(Debug, Clone)]
pub struct FrameClock {
    origin: Instant,
    last: Instant,
    tick: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        let now = Instant::now();
        Self {
            origin: now,
            last: now,
            tick: 0,
            dt_min,
            dt_max,
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;
        self.tick = self.tick.wrapping_add(1);

        FrameTime {
            dt: dt.as_secs_f32(),
            now,
            timestamp_ms: now.saturating_duration_since(self.origin).as_secs_f64() * 1000.0,
            tick: self.tick,
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_monotonic() {
        let mut clock = FrameClock::new();
        let a = clock.tick();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.tick();

        assert_eq!((a.tick, b.tick), (1, 2));
        assert!(b.timestamp_ms > a.timestamp_ms);
        assert!(b.dt >= 0.0001);
    }

    #[test]
    fn dt_is_clamped() {
        let mut clock = FrameClock::with_clamps(Duration::from_millis(1), Duration::from_millis(5));
        clock.tick();
        std::thread::sleep(Duration::from_millis(20));
        let t = clock.tick();
        assert!((t.dt - 0.005).abs() < 1e-6);
        assert!(t.timestamp_ms >= 20.0);
    }
}
