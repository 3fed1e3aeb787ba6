//! Shared fixtures for the scenario tests.
//!
//! Every fixture registry runs on a [`ManualClock`] and a
//! [`FixedMemoryProbe`], so collection passes are fully deterministic.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use engine_resources::prelude::*;

/// Ordered record of hook calls, shared by the resources of one test.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.borrow_mut().push(entry);
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == entry).count()
    }
}

/// Plain resource that records its hooks.
pub struct Recorder {
    pub id: String,
    pub log: CallLog,
}

impl Resource for Recorder {
    fn on_load(&mut self, _device: DeviceStatus) -> anyhow::Result<()> {
        self.log.push(format!("load {}", self.id));
        Ok(())
    }

    fn on_unload(&mut self) -> anyhow::Result<()> {
        self.log.push(format!("unload {}", self.id));
        Ok(())
    }
}

/// Device-bound resource that records its device hooks.
pub struct Surface {
    pub id: String,
    pub log: CallLog,
}

impl DeviceResource for Surface {
    fn on_device_create(&mut self) -> anyhow::Result<()> {
        self.log.push(format!("create {}", self.id));
        Ok(())
    }

    fn on_device_destroy(&mut self) -> anyhow::Result<()> {
        self.log.push(format!("destroy {}", self.id));
        Ok(())
    }

    fn on_device_restore(&mut self) -> anyhow::Result<()> {
        self.log.push(format!("restore {}", self.id));
        Ok(())
    }

    fn on_device_invalidate(&mut self) -> anyhow::Result<()> {
        self.log.push(format!("invalidate {}", self.id));
        Ok(())
    }
}

/// Registry plus the handles that control its time and memory pressure.
pub struct Fixture {
    pub registry: ResourceRegistry,
    pub clock: ManualClock,
    pub memory: FixedMemoryProbe,
    pub log: CallLog,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    pub fn with_config(config: GcConfig) -> Self {
        init_tracing();
        let clock = ManualClock::new();
        let memory = FixedMemoryProbe::default();
        let registry = ResourceRegistry::new(config)
            .with_clock(clock.clone())
            .with_memory_probe(memory.clone());
        Self {
            registry,
            clock,
            memory,
            log: CallLog::default(),
        }
    }

    /// Registers `recorder` and `surface` factories. Parameters are ignored
    /// up to the record terminator.
    pub fn register_recording_types(&mut self) -> Result<(), ResourceError> {
        let log = self.log.clone();
        self.registry.register_type("recorder", move |name, _group, params| {
            params.finish()?;
            Ok(Box::new(Recorder {
                id: name.to_string(),
                log: log.clone(),
            }) as Box<dyn Resource>)
        })?;
        let log = self.log.clone();
        self.registry.register_type("surface", move |name, _group, params| {
            params.finish()?;
            Ok(Box::new(DeviceBound::new(Surface {
                id: name.to_string(),
                log: log.clone(),
            })) as Box<dyn Resource>)
        })?;
        Ok(())
    }

    pub fn recorder(&mut self, name: &str, group: &str) -> Result<ResourceHandle, ResourceError> {
        let recorder = Recorder {
            id: name.to_string(),
            log: self.log.clone(),
        };
        self.registry.insert(name, group, recorder)
    }

    pub fn surface(&mut self, name: &str, group: &str) -> Result<ResourceHandle, ResourceError> {
        let surface = DeviceBound::new(Surface {
            id: name.to_string(),
            log: self.log.clone(),
        });
        self.registry.insert(name, group, surface)
    }

    pub fn advance_secs(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    pub fn state_of(&self, name: &str) -> Option<ResourceState> {
        self.registry.get(name).and_then(|h| self.registry.state(h))
    }

    /// Memory pressure high enough to force the alert regime.
    pub fn raise_pressure(&self) {
        self.memory.set_physical_load(Some(95));
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
