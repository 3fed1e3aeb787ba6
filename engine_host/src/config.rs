//! Host configuration.
//!
//! JSON file with collector tuning plus frame-loop settings. Every field has
//! a default; command-line flags override individual values.

use std::path::Path;

use anyhow::Context;
use engine_resources::config::GcConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub gc: GcConfig,
    /// Frames per second of the simulated frame loop.
    #[serde(default = "default_frame_hz")]
    pub frame_hz: u32,
    /// Frames to run before reporting and exiting.
    #[serde(default = "default_frames")]
    pub frames: u64,
    /// Manifest to create resources from; the built-in demo manifest when unset.
    #[serde(default)]
    pub manifest: Option<String>,
    /// Group tag for manifest resources.
    #[serde(default = "default_group")]
    pub group: String,
    /// Resources touched (loaded) per frame, picked at random.
    #[serde(default = "default_touches_per_frame")]
    pub touches_per_frame: usize,
    /// Frame at which a graphics context loss is simulated.
    #[serde(default)]
    pub context_loss_frame: Option<u64>,
    /// Frames between the simulated loss and the reset.
    #[serde(default = "default_context_loss_frames")]
    pub context_loss_frames: u64,
    /// Seed for the usage simulation.
    #[serde(default)]
    pub seed: u64,
}

fn default_frame_hz() -> u32 {
    60
}

fn default_frames() -> u64 {
    600
}

fn default_group() -> String {
    "demo".to_string()
}

fn default_touches_per_frame() -> usize {
    2
}

fn default_context_loss_frames() -> u64 {
    30
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            gc: GcConfig::default(),
            frame_hz: default_frame_hz(),
            frames: default_frames(),
            manifest: None,
            group: default_group(),
            touches_per_frame: default_touches_per_frame(),
            context_loss_frame: None,
            context_loss_frames: default_context_loss_frames(),
            seed: 0,
        }
    }
}

impl HostConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg = HostConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, HostConfig::default());
        assert_eq!(cfg.frame_hz, 60);
        assert_eq!(cfg.group, "demo");
    }

    #[test]
    fn nested_gc_section() {
        let cfg = HostConfig::from_json_str(
            r#"{ "frames": 10, "gc": { "normal_old_age_secs": 5 }, "context_loss_frame": 3 }"#,
        )
        .unwrap();
        assert_eq!(cfg.frames, 10);
        assert_eq!(cfg.gc.normal_old_age_secs, 5.0);
        assert_eq!(cfg.gc.alert_max_unloads, 10);
        assert_eq!(cfg.context_loss_frame, Some(3));
    }

    #[test]
    fn missing_file_has_context() {
        let err = HostConfig::from_file("/nonexistent/host.json").unwrap_err();
        assert!(format!("{:#}", err).contains("read config"));
    }
}
