//! Eviction policy configuration.
//!
//! Loads garbage-collector tuning from JSON strings (file IO left to app).
//! Every field has a default, so `{}` is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for the resource garbage collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcConfig {
    /// How often memory pressure is evaluated, in seconds.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: f64,
    /// Minimum time between two normal-regime collections, in seconds.
    #[serde(default = "default_normal_interval_secs")]
    pub normal_interval_secs: f64,
    /// Resources unused for longer than this are unloaded by a normal pass.
    #[serde(default = "default_normal_old_age_secs")]
    pub normal_old_age_secs: f64,
    /// Resources unused for longer than this are candidates in an alert pass.
    #[serde(default = "default_alert_old_age_secs")]
    pub alert_old_age_secs: f64,
    /// Upper bound on unloads per alert pass.
    #[serde(default = "default_alert_max_unloads")]
    pub alert_max_unloads: usize,
    /// Physical memory load (percent) above which the alert regime applies.
    #[serde(default = "default_alert_memory_load_percent")]
    pub alert_memory_load_percent: u32,
    /// Free graphics memory (MB) below which the alert regime applies.
    #[serde(default = "default_alert_graphics_free_mb")]
    pub alert_graphics_free_mb: u32,
}

fn default_check_interval_secs() -> f64 {
    3.0
}

fn default_normal_interval_secs() -> f64 {
    60.0
}

fn default_normal_old_age_secs() -> f64 {
    120.0
}

fn default_alert_old_age_secs() -> f64 {
    3.0
}

fn default_alert_max_unloads() -> usize {
    10
}

fn default_alert_memory_load_percent() -> u32 {
    90
}

fn default_alert_graphics_free_mb() -> u32 {
    2
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            normal_interval_secs: default_normal_interval_secs(),
            normal_old_age_secs: default_normal_old_age_secs(),
            alert_old_age_secs: default_alert_old_age_secs(),
            alert_max_unloads: default_alert_max_unloads(),
            alert_memory_load_percent: default_alert_memory_load_percent(),
            alert_graphics_free_mb: default_alert_graphics_free_mb(),
        }
    }
}

impl GcConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn check_interval(&self) -> Duration {
        secs(self.check_interval_secs)
    }

    pub fn normal_interval(&self) -> Duration {
        secs(self.normal_interval_secs)
    }

    pub fn normal_old_age(&self) -> Duration {
        secs(self.normal_old_age_secs)
    }

    pub fn alert_old_age(&self) -> Duration {
        secs(self.alert_old_age_secs)
    }
}

/// Negative or NaN values clamp to zero; values past `Duration::MAX` clamp
/// to it.
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg = GcConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, GcConfig::default());
        assert_eq!(cfg.check_interval(), Duration::from_secs(3));
        assert_eq!(cfg.normal_old_age(), Duration::from_secs(120));
        assert_eq!(cfg.alert_max_unloads, 10);
    }

    #[test]
    fn partial_json_overrides() {
        let cfg =
            GcConfig::from_json_str(r#"{ "alert_max_unloads": 4, "alert_old_age_secs": 0.5 }"#)
                .unwrap();
        assert_eq!(cfg.alert_max_unloads, 4);
        assert_eq!(cfg.alert_old_age(), Duration::from_millis(500));
        assert_eq!(cfg.normal_interval(), Duration::from_secs(60));
    }

    #[test]
    fn negative_durations_clamp() {
        let cfg = GcConfig {
            check_interval_secs: -1.0,
            ..GcConfig::default()
        };
        assert_eq!(cfg.check_interval(), Duration::ZERO);
    }

    #[test]
    fn huge_durations_saturate() {
        let cfg = GcConfig::from_json_str(
            r#"{ "check_interval_secs": 1e20, "normal_old_age_secs": 1e300 }"#,
        )
        .unwrap();
        assert_eq!(cfg.check_interval(), Duration::MAX);
        assert_eq!(cfg.normal_old_age(), Duration::MAX);

        let cfg = GcConfig {
            alert_old_age_secs: f64::INFINITY,
            normal_interval_secs: f64::NAN,
            ..GcConfig::default()
        };
        assert_eq!(cfg.alert_old_age(), Duration::MAX);
        assert_eq!(cfg.normal_interval(), Duration::ZERO);
    }
}
