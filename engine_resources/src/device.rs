//! Resources bound to a graphics context.
//!
//! Such resources own two kinds of sub-objects:
//! - managed objects that survive context loss (created/destroyed),
//! - context-dependent objects that must be rebuilt after a reset
//!   (restored/invalidated).
//!
//! [`DeviceBound`] adapts a [`DeviceResource`] to the [`Resource`] contract
//! and keeps the second lifecycle consistent with load state and with
//! context lost/reset events.

use tracing::warn;

use crate::resource::{ContextEvent, DeviceStatus, EventOutcome, Resource, ResourceState};

bitflags::bitflags! {
    /// Which sub-object sets currently exist.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceFlags: u8 {
        const CREATED = 1 << 0;   // Managed sub-objects exist
        const RESTORED = 1 << 1;  // Context-dependent sub-objects exist
    }
}

/// Hooks for a context-bound resource kind.
pub trait DeviceResource: 'static {
    /// Creates objects that survive context loss.
    fn on_device_create(&mut self) -> anyhow::Result<()>;
    /// Destroys what `on_device_create` made.
    fn on_device_destroy(&mut self) -> anyhow::Result<()>;
    /// Creates context-dependent objects.
    fn on_device_restore(&mut self) -> anyhow::Result<()>;
    /// Destroys what `on_device_restore` made.
    fn on_device_invalidate(&mut self) -> anyhow::Result<()>;
}

/// A [`DeviceResource`] with create/restore tracking.
#[derive(Debug, Default)]
pub struct DeviceBound<T> {
    inner: T,
    flags: DeviceFlags,
}

impl<T: DeviceResource> DeviceBound<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            flags: DeviceFlags::empty(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn is_created(&self) -> bool {
        self.flags.contains(DeviceFlags::CREATED)
    }

    /// True when the resource is usable for rendering right now.
    pub fn is_restored(&self) -> bool {
        self.flags.contains(DeviceFlags::RESTORED)
    }

    fn create(&mut self) -> anyhow::Result<()> {
        if !self.is_created() {
            self.inner.on_device_create()?;
            self.flags.insert(DeviceFlags::CREATED);
        }
        Ok(())
    }

    fn restore(&mut self) -> anyhow::Result<()> {
        if !self.is_restored() {
            self.inner.on_device_restore()?;
            self.flags.insert(DeviceFlags::RESTORED);
        }
        Ok(())
    }

    fn invalidate(&mut self) -> anyhow::Result<()> {
        if self.is_restored() {
            self.flags.remove(DeviceFlags::RESTORED);
            self.inner.on_device_invalidate()?;
        }
        Ok(())
    }

    fn destroy(&mut self) -> anyhow::Result<()> {
        if self.is_created() {
            self.flags.remove(DeviceFlags::CREATED);
            self.inner.on_device_destroy()?;
        }
        Ok(())
    }

    /// Create then restore. A failed restore rolls back a create made by
    /// this call.
    fn materialize(&mut self) -> anyhow::Result<()> {
        let was_created = self.is_created();
        self.create()?;
        if let Err(err) = self.restore() {
            if !was_created {
                if let Err(cleanup) = self.destroy() {
                    warn!(error = %cleanup, "device destroy failed during rollback");
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

impl<T: DeviceResource> Resource for DeviceBound<T> {
    fn on_load(&mut self, device: DeviceStatus) -> anyhow::Result<()> {
        match device {
            DeviceStatus::Available => self.materialize(),
            // Deferred until the next reset.
            DeviceStatus::Lost => Ok(()),
        }
    }

    fn on_unload(&mut self) -> anyhow::Result<()> {
        // Tear down both halves even if the first fails.
        let invalidated = self.invalidate();
        let destroyed = self.destroy();
        invalidated.and(destroyed)
    }

    fn on_event(
        &mut self,
        event: ContextEvent,
        state: ResourceState,
    ) -> anyhow::Result<EventOutcome> {
        if !state.is_resident() {
            return Ok(EventOutcome::Handled);
        }
        match event {
            ContextEvent::Lost => self.invalidate()?,
            ContextEvent::Reset => {
                self.create()?;
                self.restore()?;
            }
            ContextEvent::Custom(_) => {}
        }
        Ok(EventOutcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Surface {
        calls: Vec<&'static str>,
        fail_restore: bool,
    }

    impl DeviceResource for Surface {
        fn on_device_create(&mut self) -> anyhow::Result<()> {
            self.calls.push("create");
            Ok(())
        }

        fn on_device_destroy(&mut self) -> anyhow::Result<()> {
            self.calls.push("destroy");
            Ok(())
        }

        fn on_device_restore(&mut self) -> anyhow::Result<()> {
            self.calls.push("restore");
            if self.fail_restore {
                anyhow::bail!("out of video memory");
            }
            Ok(())
        }

        fn on_device_invalidate(&mut self) -> anyhow::Result<()> {
            self.calls.push("invalidate");
            Ok(())
        }
    }

    #[test]
    fn load_unload_order() {
        let mut r = DeviceBound::new(Surface::default());
        r.on_load(DeviceStatus::Available).unwrap();
        assert!(r.is_created() && r.is_restored());
        r.on_unload().unwrap();
        assert_eq!(r.flags(), DeviceFlags::empty());
        assert_eq!(r.inner().calls, ["create", "restore", "invalidate", "destroy"]);
    }

    #[test]
    fn lost_then_reset_restores_once() {
        let mut r = DeviceBound::new(Surface::default());
        r.on_load(DeviceStatus::Available).unwrap();
        r.inner_mut().calls.clear();

        r.on_event(ContextEvent::Lost, ResourceState::Loaded).unwrap();
        assert!(r.is_created() && !r.is_restored());
        r.on_event(ContextEvent::Lost, ResourceState::Loaded).unwrap();
        r.on_event(ContextEvent::Reset, ResourceState::Loaded).unwrap();
        r.on_event(ContextEvent::Reset, ResourceState::Loaded).unwrap();

        assert!(r.is_restored());
        assert_eq!(r.inner().calls, ["invalidate", "restore"]);
    }

    #[test]
    fn load_while_lost_is_deferred() {
        let mut r = DeviceBound::new(Surface::default());
        r.on_load(DeviceStatus::Lost).unwrap();
        assert_eq!(r.flags(), DeviceFlags::empty());

        r.on_event(ContextEvent::Reset, ResourceState::Locked).unwrap();
        assert!(r.is_created() && r.is_restored());
        assert_eq!(r.inner().calls, ["create", "restore"]);
    }

    #[test]
    fn events_ignored_when_unloaded() {
        let mut r = DeviceBound::new(Surface::default());
        r.on_event(ContextEvent::Reset, ResourceState::Unloaded).unwrap();
        assert!(r.inner().calls.is_empty());
        assert!(!r.is_created());
    }

    #[test]
    fn failed_restore_rolls_back_create() {
        let mut r = DeviceBound::new(Surface {
            fail_restore: true,
            ..Surface::default()
        });
        assert!(r.on_load(DeviceStatus::Available).is_err());
        assert_eq!(r.flags(), DeviceFlags::empty());
        assert_eq!(r.inner().calls, ["create", "restore", "destroy"]);
    }
}
