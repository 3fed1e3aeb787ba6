//! Frame-loop host.
//!
//! Owns a registry, fills it from a manifest and steps it once per frame:
//! - touches a few random resources, as a renderer using them would,
//! - optionally simulates a graphics context loss and reset,
//! - lets the registry run its garbage collector.
//!
//! Determinism notes:
//! - Usage is drawn from a seeded RNG.
//! - Time comes from the registry's clock, so tests can inject a manual one.

use anyhow::Context;
use engine_resources::gc::GcRegime;
use engine_resources::registry::{RegistryStats, ResourceRegistry};
use engine_resources::resource::{ContextEvent, ResourceHandle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::kinds::register_demo_types;

/// Manifest used when the config names none.
pub const DEMO_MANIFEST: &str = include_str!("../data/demo.res");

/// What happened during one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub touched: usize,
    pub event: Option<String>,
    pub gc_regime: Option<GcRegime>,
    pub gc_unloaded: usize,
}

/// Totals over the run, printed at exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostReport {
    pub frames: u64,
    pub gc_passes: u64,
    pub gc_unloaded: u64,
    pub load_failures: u64,
    pub stats: RegistryStats,
}

pub struct ResourceHost {
    cfg: HostConfig,
    registry: ResourceRegistry,
    handles: Vec<ResourceHandle>,
    rng: StdRng,
    frame: u64,
    gc_passes: u64,
    gc_unloaded: u64,
    load_failures: u64,
}

impl ResourceHost {
    /// Creates a host with a registry on the system clock and memory probe.
    pub fn new(cfg: HostConfig) -> anyhow::Result<Self> {
        let registry = ResourceRegistry::new(cfg.gc.clone());
        Self::with_registry(cfg, registry)
    }

    /// Creates a host around a prepared registry and registers the demo kinds.
    pub fn with_registry(cfg: HostConfig, mut registry: ResourceRegistry) -> anyhow::Result<Self> {
        register_demo_types(&mut registry).context("register demo resource types")?;
        let rng = StdRng::seed_from_u64(cfg.seed);
        Ok(Self {
            cfg,
            registry,
            handles: Vec::new(),
            rng,
            frame: 0,
            gc_passes: 0,
            gc_unloaded: 0,
            load_failures: 0,
        })
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Creates the configured manifest's resources. Returns how many.
    pub fn load_manifest(&mut self) -> anyhow::Result<usize> {
        let group = self.cfg.group.clone();
        let created = match &self.cfg.manifest {
            Some(path) => self
                .registry
                .create_from_file(path, &group)
                .with_context(|| format!("load manifest {}", path))?,
            None => self
                .registry
                .create_from_str(DEMO_MANIFEST, &group)
                .context("load built-in demo manifest")?,
        };
        self.handles.extend(created.iter().copied());
        info!(group = %group, count = created.len(), "manifest loaded");
        Ok(created.len())
    }

    /// Runs one frame.
    pub fn step(&mut self) -> FrameReport {
        self.frame += 1;
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };

        let picked: Vec<ResourceHandle> = self
            .handles
            .choose_multiple(&mut self.rng, self.cfg.touches_per_frame)
            .copied()
            .collect();
        for handle in picked {
            match self.registry.load(handle) {
                Ok(()) => report.touched += 1,
                Err(err) => {
                    self.load_failures += 1;
                    warn!(error = %format!("{:#}", anyhow::Error::from(err)), frame = self.frame, "resource touch failed");
                }
            }
        }

        if let Some(event) = self.scheduled_event() {
            self.registry.broadcast_context_event(event);
            report.event = Some(format!("{:?}", event));
        }

        if let Some(pass) = self.registry.on_frame() {
            self.gc_passes += 1;
            self.gc_unloaded += pass.unloaded.len() as u64;
            report.gc_regime = Some(pass.regime);
            report.gc_unloaded = pass.unloaded.len();
        }
        report
    }

    fn scheduled_event(&self) -> Option<ContextEvent> {
        let lost_at = self.cfg.context_loss_frame?;
        if self.frame == lost_at {
            Some(ContextEvent::Lost)
        } else if self.frame == lost_at + self.cfg.context_loss_frames.max(1) {
            Some(ContextEvent::Reset)
        } else {
            None
        }
    }

    /// Runs `frames` frames back to back, without pacing.
    pub fn run_for_frames(&mut self, frames: u64) -> Vec<FrameReport> {
        (0..frames).map(|_| self.step()).collect()
    }

    pub fn report(&self) -> HostReport {
        HostReport {
            frames: self.frame,
            gc_passes: self.gc_passes,
            gc_unloaded: self.gc_unloaded,
            load_failures: self.load_failures,
            stats: self.registry.stats(),
        }
    }
}
