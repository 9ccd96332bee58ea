//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

/// Where poses come from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum XrMode {
    /// No pose backend; XR state keeps its initial values.
    #[default]
    Off,
    /// A hardware runtime supplied by the host.
    Device,
    /// [`SoftwareSource`](crate::pose::SoftwareSource).
    SoftwareFallback,
}

impl FromStr for XrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(XrMode::Off),
            "device" => Ok(XrMode::Device),
            "software" | "software-fallback" | "fake" => Ok(XrMode::SoftwareFallback),
            other => Err(format!("unknown XR mode `{other}`")),
        }
    }
}

/// Per-eye render size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub frame_size: FrameSize,
    pub xr_mode: XrMode,
    /// Log per-stage timings every `stats_interval` frames.
    pub performance_logging: bool,
    /// Mirror half of the side-by-side eye buffer to the desktop window.
    pub mirror_blit: bool,
    /// Target tick cadence and the bounded window wait.
    pub frame_budget: Duration,
    /// Longest a tick waits for the pose backend.
    pub pose_budget: Duration,
    /// Consecutive composition failures before a window is told.
    pub composition_failure_threshold: u32,
    pub stats_interval: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_size: FrameSize {
                width: 1280,
                height: 1024,
            },
            xr_mode: XrMode::Off,
            performance_logging: false,
            mirror_blit: false,
            frame_budget: Duration::from_micros(1_000_000 / 60),
            pose_budget: Duration::from_millis(4),
            composition_failure_threshold: 3,
            stats_interval: 100,
        }
    }
}

impl EngineConfig {
    /// Reads `VESPER_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, starting at the defaults. Values that
    /// do not parse keep their default and log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(w) = parse::<u32>(&lookup, "VESPER_WIDTH").filter(|w| nonzero("VESPER_WIDTH", *w)) {
            config.frame_size.width = w;
        }
        if let Some(h) = parse::<u32>(&lookup, "VESPER_HEIGHT").filter(|h| nonzero("VESPER_HEIGHT", *h)) {
            config.frame_size.height = h;
        }
        if let Some(mode) = parse::<XrMode>(&lookup, "VESPER_XR") {
            config.xr_mode = mode;
        }
        if let Some(on) = parse_flag(&lookup, "VESPER_PERF") {
            config.performance_logging = on;
        }
        if let Some(on) = parse_flag(&lookup, "VESPER_BLIT") {
            config.mirror_blit = on;
        }
        if let Some(ms) = parse::<f64>(&lookup, "VESPER_FRAME_BUDGET_MS") {
            if ms.is_finite() && ms > 0.0 {
                config.frame_budget = Duration::from_micros((ms * 1000.0).round() as u64);
            } else {
                log::warn!("VESPER_FRAME_BUDGET_MS must be positive, got {ms}; keeping default");
            }
        }

        config
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => {
            log::warn!("ignoring {key}={raw:?}: expected a boolean");
            None
        }
    }
}

fn nonzero(key: &str, v: u32) -> bool {
    if v == 0 {
        log::warn!("{key} must be non-zero; keeping default");
    }
    v != 0
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> EngineConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(from(&[]), EngineConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let c = from(&[
            ("VESPER_WIDTH", "1440"),
            ("VESPER_HEIGHT", "1600"),
            ("VESPER_XR", "software"),
            ("VESPER_PERF", "1"),
            ("VESPER_BLIT", "true"),
            ("VESPER_FRAME_BUDGET_MS", "11.1"),
        ]);
        assert_eq!(c.frame_size, FrameSize { width: 1440, height: 1600 });
        assert_eq!(c.xr_mode, XrMode::SoftwareFallback);
        assert!(c.performance_logging);
        assert!(c.mirror_blit);
        assert_eq!(c.frame_budget, Duration::from_micros(11_100));
    }

    #[test]
    fn bad_values_keep_defaults() {
        let c = from(&[
            ("VESPER_WIDTH", "wide"),
            ("VESPER_HEIGHT", "0"),
            ("VESPER_XR", "hologram"),
            ("VESPER_PERF", "maybe"),
            ("VESPER_FRAME_BUDGET_MS", "-5"),
        ]);
        assert_eq!(c, EngineConfig::default());
    }

    #[test]
    fn xr_mode_names() {
        assert_eq!("OFF".parse::<XrMode>(), Ok(XrMode::Off));
        assert_eq!("device".parse::<XrMode>(), Ok(XrMode::Device));
        assert_eq!("software-fallback".parse::<XrMode>(), Ok(XrMode::SoftwareFallback));
    }
}
