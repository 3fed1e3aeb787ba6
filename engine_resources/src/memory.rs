//! Host memory pressure signals.
//!
//! The eviction policy looks at two numbers supplied by the host platform:
//! how loaded physical memory is (percent) and how much graphics memory is
//! still free (MB). Either may be unavailable, in which case it never
//! triggers the alert regime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// One reading of the host memory signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemorySignals {
    /// Physical memory load, 0..=100.
    pub physical_load_percent: Option<u32>,
    /// Free graphics (texture) memory in megabytes.
    pub graphics_free_mb: Option<u32>,
}

/// Source of memory pressure readings.
pub trait MemoryProbe {
    fn sample(&self) -> MemorySignals;
}

/// Probe that reports nothing; the alert regime never triggers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMemoryProbe;

impl MemoryProbe for NullMemoryProbe {
    fn sample(&self) -> MemorySignals {
        MemorySignals::default()
    }
}

const UNAVAILABLE: u64 = u64::MAX;

/// Probe with values set by the owner. Clones share the same values.
#[derive(Debug, Clone)]
pub struct FixedMemoryProbe {
    physical_load_percent: Arc<AtomicU64>,
    graphics_free_mb: Arc<AtomicU64>,
}

impl Default for FixedMemoryProbe {
    fn default() -> Self {
        Self {
            physical_load_percent: Arc::new(AtomicU64::new(UNAVAILABLE)),
            graphics_free_mb: Arc::new(AtomicU64::new(UNAVAILABLE)),
        }
    }
}

impl FixedMemoryProbe {
    pub fn new(signals: MemorySignals) -> Self {
        let probe = Self::default();
        probe.set(signals);
        probe
    }

    pub fn set(&self, signals: MemorySignals) {
        self.set_physical_load(signals.physical_load_percent);
        self.set_graphics_free(signals.graphics_free_mb);
    }

    pub fn set_physical_load(&self, percent: Option<u32>) {
        store(&self.physical_load_percent, percent);
    }

    pub fn set_graphics_free(&self, mb: Option<u32>) {
        store(&self.graphics_free_mb, mb);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn sample(&self) -> MemorySignals {
        MemorySignals {
            physical_load_percent: load(&self.physical_load_percent),
            graphics_free_mb: load(&self.graphics_free_mb),
        }
    }
}

fn store(cell: &AtomicU64, value: Option<u32>) {
    cell.store(value.map_or(UNAVAILABLE, u64::from), Ordering::Relaxed);
}

fn load(cell: &AtomicU64) -> Option<u32> {
    match cell.load(Ordering::Relaxed) {
        UNAVAILABLE => None,
        v => u32::try_from(v).ok(),
    }
}

/// Reads physical memory load from the operating system through `sysinfo`.
///
/// The `System` handle is created once and only its memory counters are
/// refreshed per sample. Graphics memory is not exposed without a device, so
/// it is always unavailable here.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn sample(&self) -> MemorySignals {
        let physical_load_percent = self.system.lock().ok().and_then(|mut sys| {
            sys.refresh_memory();
            load_percent(sys.used_memory(), sys.total_memory())
        });
        MemorySignals {
            physical_load_percent,
            graphics_free_mb: None,
        }
    }
}

/// Used share of `total` in percent; `None` when the total is unknown.
fn load_percent(used: u64, total: u64) -> Option<u32> {
    if total == 0 {
        return None;
    }
    let percent = u128::from(used.min(total)) * 100 / u128::from(total);
    u32::try_from(percent).ok()
}
