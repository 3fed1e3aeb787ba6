//! Resource contract and per-resource bookkeeping.
//!
//! Every cacheable entity implements [`Resource`]. The registry owns the
//! boxed resource together with its [`ResourceMeta`] and drives the
//! `Unloaded -> Loaded -> Locked(n)` state machine; implementations only
//! supply the hooks that do the actual work.

use std::any::Any;
use std::time::Duration;

use serde::{Deserialize, Serialize};

slotmap::new_key_type! {
    /// Generational handle to a resource owned by a registry.
    ///
    /// Handles are `Copy`. After the resource is destroyed the handle
    /// resolves to nothing, even if its slot is reused.
    pub struct ResourceHandle;
}

/// Load state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    Unloaded,
    /// Resident; may be evicted by the garbage collector.
    Loaded,
    /// Resident and pinned; never evicted until fully unlocked.
    Locked,
}

impl ResourceState {
    pub fn is_resident(self) -> bool {
        self != ResourceState::Unloaded
    }
}

/// Events broadcast by the host to every resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextEvent {
    /// The graphics context was lost; context-dependent objects are invalid.
    Lost,
    /// The graphics context is usable again.
    Reset,
    /// Host-defined event, ignored by the built-in resource kinds.
    Custom(u32),
}

/// Whether the graphics context can currently create objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Available,
    Lost,
}

/// What a resource did in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventOutcome {
    #[default]
    Handled,
    /// The resource released its data itself. Honored only while `Loaded`.
    Unloaded,
}

/// Object-safe access to the concrete type behind a `dyn Resource`.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Hooks implemented by every resource kind.
///
/// Hooks get `&mut self` only; they cannot create, destroy or load other
/// resources while running.
pub trait Resource: AsAny {
    /// Brings the resource into memory. On error the resource stays
    /// `Unloaded`.
    fn on_load(&mut self, device: DeviceStatus) -> anyhow::Result<()>;

    /// Releases the resource's data. Errors are logged and otherwise
    /// ignored; the resource becomes `Unloaded` regardless.
    fn on_unload(&mut self) -> anyhow::Result<()>;

    /// Reacts to a broadcast event. `state` is the resource's current state.
    fn on_event(
        &mut self,
        _event: ContextEvent,
        _state: ResourceState,
    ) -> anyhow::Result<EventOutcome> {
        Ok(EventOutcome::Handled)
    }

    /// Concrete type name, used in type-mismatch errors.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Registry-side bookkeeping for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMeta {
    pub(crate) name: String,
    pub(crate) group: String,
    pub(crate) kind: String,
    pub(crate) state: ResourceState,
    pub(crate) lock_count: u32,
    pub(crate) last_use: Duration,
    pub(crate) seq: u64,
}

impl ResourceMeta {
    pub(crate) fn new(name: &str, group: &str, kind: &str, now: Duration, seq: u64) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            kind: kind.to_string(),
            state: ResourceState::Unloaded,
            lock_count: 0,
            last_use: now,
            seq,
        }
    }

    /// Empty for anonymous resources.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Registered type name the resource was created through; empty when
    /// inserted directly.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn is_resident(&self) -> bool {
        self.state.is_resident()
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn last_use(&self) -> Duration {
        self.last_use
    }

    /// Creation order within the owning registry.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Name for log output; anonymous resources show as `<anonymous>`.
    pub(crate) fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<anonymous>"
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blob;

    impl Resource for Blob {
        fn on_load(&mut self, _device: DeviceStatus) -> anyhow::Result<()> {
            Ok(())
        }

        fn on_unload(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn downcast_through_trait_object() {
        let boxed: Box<dyn Resource> = Box::new(Blob);
        assert!((*boxed).as_any().is::<Blob>());
        assert!(boxed.type_name().ends_with("Blob"));
    }

    #[test]
    fn default_event_hook_is_noop() {
        let mut blob = Blob;
        let outcome = blob.on_event(ContextEvent::Lost, ResourceState::Loaded).unwrap();
        assert_eq!(outcome, EventOutcome::Handled);
    }

    #[test]
    fn meta_starts_unloaded() {
        let meta = ResourceMeta::new("", "ui", "texture", Duration::from_secs(4), 0);
        assert_eq!(meta.state(), ResourceState::Unloaded);
        assert_eq!(meta.lock_count(), 0);
        assert_eq!(meta.last_use(), Duration::from_secs(4));
        assert!(meta.is_anonymous());
        assert_eq!(meta.display_name(), "<anonymous>");
    }
}
