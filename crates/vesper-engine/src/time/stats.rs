use std::fmt;
use std::time::{Duration, Instant};

/// Phases of a tick, in the order the scheduler passes through them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Between the end of one tick and the start of the next.
    Idle,
    /// Pose acquisition.
    Wait,
    /// Applying the pose and recomputing derived fields.
    Prepare,
    /// Host event polling.
    Events,
    /// Timed resources.
    Media,
    /// Window dispatch and the bounded wait.
    User,
    /// Composition and presentation.
    Submit,
}

const STAGES: [Stage; 7] = [
    Stage::Idle,
    Stage::Wait,
    Stage::Prepare,
    Stage::Events,
    Stage::Media,
    Stage::User,
    Stage::Submit,
];

impl Stage {
    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Wait => "wait",
            Stage::Prepare => "prepare",
            Stage::Events => "events",
            Stage::Media => "media",
            Stage::User => "user",
            Stage::Submit => "submit",
        }
    }
}

/// Averages over one reporting interval.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    pub frames: u32,
    pub fps: f64,
    /// Mean milliseconds per frame for each stage, in [`Stage`] order.
    pub stage_ms: [f64; 7],
    /// Frames whose busy time exceeded the budget.
    pub missed: u32,
}

impl StatsReport {
    pub fn stage(&self, stage: Stage) -> f64 {
        self.stage_ms[stage.index()]
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} fps", self.fps)?;
        for stage in STAGES {
            write!(f, " {}={:.2}ms", stage.label(), self.stage(stage))?;
        }
        write!(f, " missed={}/{}", self.missed, self.frames)
    }
}

/// Accumulates per-stage time across ticks.
///
/// `mark(stage)` charges everything since the previous mark to `stage`.
#[derive(Debug, Clone)]
pub struct FrameStats {
    interval: u32,
    budget: Duration,
    totals: [Duration; 7],
    frame_busy: Duration,
    frames: u32,
    missed: u32,
    interval_start: Instant,
    last: Instant,
}

impl FrameStats {
    pub fn new(interval: u32, budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval: interval.max(1),
            budget,
            totals: [Duration::ZERO; 7],
            frame_busy: Duration::ZERO,
            frames: 0,
            missed: 0,
            interval_start: now,
            last: now,
        }
    }

    pub fn mark(&mut self, stage: Stage) {
        self.mark_at(stage, Instant::now());
    }

    pub(crate) fn mark_at(&mut self, stage: Stage, now: Instant) {
        let spent = now.saturating_duration_since(self.last);
        self.totals[stage.index()] += spent;
        if stage != Stage::Idle {
            self.frame_busy += spent;
        }
        self.last = now;
    }

    /// Closes a frame. Returns a report every `interval` frames.
    pub fn end_frame(&mut self) -> Option<StatsReport> {
        self.end_frame_at(Instant::now())
    }

    pub(crate) fn end_frame_at(&mut self, now: Instant) -> Option<StatsReport> {
        self.frames += 1;
        if self.frame_busy > self.budget {
            self.missed += 1;
        }
        self.frame_busy = Duration::ZERO;

        if self.frames < self.interval {
            return None;
        }

        let n = f64::from(self.frames);
        let elapsed = now.saturating_duration_since(self.interval_start).as_secs_f64();
        let mut stage_ms = [0.0; 7];
        for (ms, total) in stage_ms.iter_mut().zip(self.totals.iter()) {
            *ms = total.as_secs_f64() * 1000.0 / n;
        }
        let report = StatsReport {
            frames: self.frames,
            fps: if elapsed > 0.0 { n / elapsed } else { 0.0 },
            stage_ms,
            missed: self.missed,
        };

        self.totals = [Duration::ZERO; 7];
        self.frames = 0;
        self.missed = 0;
        self.interval_start = now;
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_every_interval_with_stage_means() {
        let mut stats = FrameStats::new(2, Duration::from_millis(16));
        let t0 = stats.last;

        stats.mark_at(Stage::Wait, t0 + Duration::from_millis(2));
        stats.mark_at(Stage::User, t0 + Duration::from_millis(6));
        assert!(stats.end_frame_at(t0 + Duration::from_millis(6)).is_none());

        stats.mark_at(Stage::Idle, t0 + Duration::from_millis(10));
        stats.mark_at(Stage::Wait, t0 + Duration::from_millis(14));
        stats.mark_at(Stage::User, t0 + Duration::from_millis(34));
        let report = stats.end_frame_at(t0 + Duration::from_millis(40)).unwrap();

        assert_eq!(report.frames, 2);
        assert!((report.stage(Stage::Wait) - 3.0).abs() < 1e-9);
        assert!((report.stage(Stage::User) - 12.0).abs() < 1e-9);
        assert!((report.stage(Stage::Idle) - 2.0).abs() < 1e-9);
        assert_eq!(report.missed, 1);
        assert!((report.fps - 50.0).abs() < 1e-6);
    }

    #[test]
    fn counters_reset_after_a_report() {
        let mut stats = FrameStats::new(1, Duration::from_millis(16));
        let t0 = stats.last;
        stats.mark_at(Stage::Submit, t0 + Duration::from_millis(1));
        assert!(stats.end_frame_at(t0 + Duration::from_millis(1)).is_some());

        let report = stats.end_frame_at(t0 + Duration::from_millis(2)).unwrap();
        assert_eq!(report.stage(Stage::Submit), 0.0);
        assert!(report.to_string().starts_with("1000.0 fps"));
    }
}
