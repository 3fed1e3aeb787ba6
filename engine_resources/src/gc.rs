//! Eviction policy.
//!
//! Once per check interval the collector samples host memory pressure and
//! picks a regime:
//! - Normal: no pressure. At most once per normal interval, unload every
//!   loaded resource unused for longer than the normal age. Unbounded.
//! - Alert: high memory load or little free graphics memory. Unload the
//!   oldest loaded resources unused for longer than the (short) alert age,
//!   at most `alert_max_unloads` per pass.
//!
//! Locked resources are never candidates; the registry only offers its
//! loaded set.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::GcConfig;
use crate::memory::MemorySignals;
use crate::resource::ResourceHandle;

/// Eviction regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcRegime {
    Normal,
    Alert,
}

/// Result of one collection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcPass {
    pub regime: GcRegime,
    /// Unloaded resources, oldest first.
    pub unloaded: Vec<ResourceHandle>,
}

/// Classifies memory pressure. Unavailable signals never raise an alert.
pub fn regime_for(signals: MemorySignals, cfg: &GcConfig) -> GcRegime {
    let memory_high = signals
        .physical_load_percent
        .is_some_and(|load| load > cfg.alert_memory_load_percent);
    let graphics_low = signals
        .graphics_free_mb
        .is_some_and(|free| free < cfg.alert_graphics_free_mb);

    if memory_high || graphics_low {
        GcRegime::Alert
    } else {
        GcRegime::Normal
    }
}

/// Check/collect timestamps.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GcSchedule {
    last_check: Duration,
    last_collect: Duration,
}

impl GcSchedule {
    pub(crate) fn new(now: Duration) -> Self {
        Self {
            last_check: now,
            last_collect: now,
        }
    }

    /// Decides whether a pass runs now and in which regime. `sample` is only
    /// called when the check interval has elapsed.
    pub(crate) fn poll(
        &mut self,
        now: Duration,
        cfg: &GcConfig,
        sample: impl FnOnce() -> MemorySignals,
    ) -> Option<GcRegime> {
        if self.last_check.saturating_add(cfg.check_interval()) >= now {
            return None;
        }
        self.last_check = now;

        match regime_for(sample(), cfg) {
            GcRegime::Alert => {
                self.last_collect = now;
                Some(GcRegime::Alert)
            }
            GcRegime::Normal if self.last_collect.saturating_add(cfg.normal_interval()) < now => {
                self.last_collect = now;
                Some(GcRegime::Normal)
            }
            GcRegime::Normal => None,
        }
    }

    pub(crate) fn mark_collected(&mut self, now: Duration) {
        self.last_collect = now;
    }
}

/// A loaded resource offered for eviction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub handle: ResourceHandle,
    pub last_use: Duration,
    pub seq: u64,
}

/// Ties on last use break by creation order, so selection is deterministic.
fn older_first(a: &Candidate, b: &Candidate) -> Ordering {
    a.last_use.cmp(&b.last_use).then(a.seq.cmp(&b.seq))
}

/// Picks the resources to unload from a snapshot of the loaded set.
pub(crate) fn select_victims(
    mut candidates: Vec<Candidate>,
    regime: GcRegime,
    now: Duration,
    cfg: &GcConfig,
) -> Vec<ResourceHandle> {
    let (age, cap) = match regime {
        GcRegime::Normal => (cfg.normal_old_age(), usize::MAX),
        GcRegime::Alert => (cfg.alert_old_age(), cfg.alert_max_unloads),
    };
    let Some(cutoff) = now.checked_sub(age) else {
        return Vec::new();
    };

    candidates.retain(|c| c.last_use < cutoff);
    if cap == 0 {
        return Vec::new();
    }
    if candidates.len() > cap {
        candidates.select_nth_unstable_by(cap, older_first);
        candidates.truncate(cap);
    }
    candidates.sort_unstable_by(older_first);
    candidates.into_iter().map(|c| c.handle).collect()
}
