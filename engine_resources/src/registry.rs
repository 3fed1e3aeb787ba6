//! Resource registry.
//!
//! Owns every resource, indexes them by name and by state, creates them
//! through per-type factories, applies group operations, broadcasts context
//! events and runs the garbage collector once per frame.
//!
//! # Usage
//! ```ignore
//! let mut registry = ResourceRegistry::new(GcConfig::default());
//! registry.register_type("texture", |name, group, params| { /* parse params */ })?;
//! let tex = registry.create("texture", "Tex1", ResourceState::Unloaded, "\"tex1.dds\"", "level1")?;
//! registry.load(tex)?;
//! // every frame:
//! registry.on_frame();
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use slotmap::SlotMap;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::GcConfig;
use crate::decl::{read_record_header, Params};
use crate::error::{ParseError, ResourceError};
use crate::gc::{select_victims, Candidate, GcPass, GcRegime, GcSchedule};
use crate::memory::{MemoryProbe, MemorySignals, SystemMemoryProbe};
use crate::resource::{
    ContextEvent, DeviceStatus, EventOutcome, Resource, ResourceHandle, ResourceMeta,
    ResourceState,
};

/// Builds a resource from its name, group and manifest parameters.
///
/// The factory must consume its parameters and the terminating `;`.
pub type Factory =
    Box<dyn Fn(&str, &str, &mut Params) -> anyhow::Result<Box<dyn Resource>>>;

struct Entry {
    meta: ResourceMeta,
    body: Box<dyn Resource>,
}

/// Loaded/locked membership, updated on every state transition.
#[derive(Default)]
struct StateIndex {
    loaded: HashSet<ResourceHandle>,
    locked: HashSet<ResourceHandle>,
}

impl StateIndex {
    fn update(&mut self, handle: ResourceHandle, state: ResourceState) {
        match state {
            ResourceState::Unloaded => {
                self.loaded.remove(&handle);
                self.locked.remove(&handle);
            }
            ResourceState::Loaded => {
                self.locked.remove(&handle);
                self.loaded.insert(handle);
            }
            ResourceState::Locked => {
                self.loaded.remove(&handle);
                self.locked.insert(handle);
            }
        }
    }
}

/// Snapshot of registry and host memory counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub memory: MemorySignals,
    pub resource_count: usize,
    /// Resources in `Loaded` (not `Locked`).
    pub loaded_count: usize,
    pub locked_count: usize,
}

/// Owner of all resources.
///
/// Dropping the registry destroys every remaining resource in reverse
/// creation order.
pub struct ResourceRegistry {
    config: GcConfig,
    clock: Box<dyn Clock>,
    probe: Box<dyn MemoryProbe>,
    factories: HashMap<String, Factory>,
    entries: SlotMap<ResourceHandle, Entry>,
    named: HashMap<String, ResourceHandle>,
    index: StateIndex,
    next_seq: u64,
    schedule: GcSchedule,
    device: DeviceStatus,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new(GcConfig::default())
    }
}

impl ResourceRegistry {
    /// Creates a registry using the system clock and OS memory probe.
    pub fn new(config: GcConfig) -> Self {
        let clock = SystemClock::new();
        let schedule = GcSchedule::new(clock.now());
        Self {
            config,
            clock: Box::new(clock),
            probe: Box::new(SystemMemoryProbe::new()),
            factories: HashMap::new(),
            entries: SlotMap::with_key(),
            named: HashMap::new(),
            index: StateIndex::default(),
            next_seq: 0,
            schedule,
            device: DeviceStatus::Available,
        }
    }

    /// Replaces the time source. Collection timers restart from its `now`.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.schedule = GcSchedule::new(clock.now());
        self.clock = Box::new(clock);
        self
    }

    /// Replaces the memory pressure source.
    pub fn with_memory_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Whether the graphics context is currently usable.
    pub fn device_status(&self) -> DeviceStatus {
        self.device
    }

    // =========================================================================
    // Types and creation
    // =========================================================================

    /// Registers a factory. Fails if `type_name` already has one; the
    /// existing factory is kept.
    pub fn register_type<F>(&mut self, type_name: &str, factory: F) -> Result<(), ResourceError>
    where
        F: Fn(&str, &str, &mut Params) -> anyhow::Result<Box<dyn Resource>> + 'static,
    {
        if self.factories.contains_key(type_name) {
            return Err(ResourceError::DuplicateType(type_name.to_string()));
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
        debug!(type_name, "registered resource type");
        Ok(())
    }

    pub fn is_type_registered(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Adds a resource built by the caller. An empty `name` makes it
    /// anonymous.
    pub fn insert<R: Resource>(
        &mut self,
        name: &str,
        group: &str,
        resource: R,
    ) -> Result<ResourceHandle, ResourceError> {
        self.insert_boxed(name, group, Box::new(resource))
    }

    pub fn insert_boxed(
        &mut self,
        name: &str,
        group: &str,
        resource: Box<dyn Resource>,
    ) -> Result<ResourceHandle, ResourceError> {
        self.insert_entry(name, group, "", resource)
    }

    fn insert_entry(
        &mut self,
        name: &str,
        group: &str,
        kind: &str,
        body: Box<dyn Resource>,
    ) -> Result<ResourceHandle, ResourceError> {
        if !name.is_empty() && self.named.contains_key(name) {
            return Err(ResourceError::DuplicateName(name.to_string()));
        }

        let meta = ResourceMeta::new(name, group, kind, self.clock.now(), self.next_seq);
        self.next_seq += 1;
        let handle = self.entries.insert(Entry { meta, body });
        if !name.is_empty() {
            self.named.insert(name.to_string(), handle);
        }
        debug!(resource = name, group, kind, "resource added");
        Ok(handle)
    }

    /// Creates a resource through the factory registered for `type_name`,
    /// then loads or locks it according to `initial_state`.
    ///
    /// `params` is manifest text for the factory; the trailing `;` is
    /// optional. If the initial load fails the resource stays registered
    /// and `Unloaded`, and the load error is returned.
    pub fn create(
        &mut self,
        type_name: &str,
        name: &str,
        initial_state: ResourceState,
        params: &str,
        group: &str,
    ) -> Result<ResourceHandle, ResourceError> {
        let source_name = format!("{} \"{}\"", type_name, name);
        let mut params = Params::parse(&source_name, params)?;
        self.create_with_params(type_name, name, initial_state, &mut params, group)
    }

    fn create_with_params(
        &mut self,
        type_name: &str,
        name: &str,
        initial_state: ResourceState,
        params: &mut Params,
        group: &str,
    ) -> Result<ResourceHandle, ResourceError> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| ResourceError::UnknownType(type_name.to_string()))?;
        if !name.is_empty() && self.named.contains_key(name) {
            return Err(ResourceError::DuplicateName(name.to_string()));
        }

        let body = factory(name, group, params).map_err(|source| {
            match source.downcast_ref::<ParseError>() {
                Some(parse) => ResourceError::Parse(parse.clone()),
                None => ResourceError::CreateFailed {
                    kind: type_name.to_string(),
                    name: name.to_string(),
                    source,
                },
            }
        })?;

        let handle = self.insert_entry(name, group, type_name, body)?;
        match initial_state {
            ResourceState::Unloaded => {}
            ResourceState::Loaded => self.load(handle)?,
            ResourceState::Locked => self.lock(handle)?,
        }
        Ok(handle)
    }

    /// Creates every record in a manifest string.
    pub fn create_from_str(
        &mut self,
        data: &str,
        group: &str,
    ) -> Result<Vec<ResourceHandle>, ResourceError> {
        self.create_from_source("<string>", data, group)
    }

    /// Creates every record in a manifest file.
    pub fn create_from_file(
        &mut self,
        path: impl AsRef<Path>,
        group: &str,
    ) -> Result<Vec<ResourceHandle>, ResourceError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ResourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let handles = self.create_from_source(&path.display().to_string(), &data, group)?;
        info!(path = %path.display(), count = handles.len(), "resources created from manifest");
        Ok(handles)
    }

    fn create_from_source(
        &mut self,
        source_name: &str,
        data: &str,
        group: &str,
    ) -> Result<Vec<ResourceHandle>, ResourceError> {
        let mut params = Params::parse(source_name, data)?;
        let mut handles = Vec::new();
        while !params.at_eof() {
            let header = read_record_header(&mut params)?;
            let handle = self.create_with_params(
                &header.kind,
                &header.name,
                header.initial_state,
                &mut params,
                group,
            )?;
            handles.push(handle);
        }
        Ok(handles)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<ResourceHandle> {
        self.named.get(name).copied()
    }

    pub fn must_get(&self, name: &str) -> Result<ResourceHandle, ResourceError> {
        self.get(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// True if `handle` still refers to a live resource.
    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn meta(&self, handle: ResourceHandle) -> Option<&ResourceMeta> {
        self.entries.get(handle).map(|e| &e.meta)
    }

    pub fn state(&self, handle: ResourceHandle) -> Option<ResourceState> {
        self.meta(handle).map(|m| m.state)
    }

    pub fn resource(&self, handle: ResourceHandle) -> Option<&dyn Resource> {
        self.entries.get(handle).map(|e| &*e.body)
    }

    pub fn resource_mut(&mut self, handle: ResourceHandle) -> Option<&mut dyn Resource> {
        match self.entries.get_mut(handle) {
            Some(e) => Some(&mut *e.body),
            None => None,
        }
    }

    pub fn resource_as<T: Resource>(&self, handle: ResourceHandle) -> Option<&T> {
        self.entries
            .get(handle)
            .and_then(|e| (*e.body).as_any().downcast_ref::<T>())
    }

    pub fn resource_as_mut<T: Resource>(&mut self, handle: ResourceHandle) -> Option<&mut T> {
        self.entries
            .get_mut(handle)
            .and_then(|e| (*e.body).as_any_mut().downcast_mut::<T>())
    }

    /// Named lookup with a type check; `None` if absent or of another type.
    pub fn get_as<T: Resource>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(|h| self.resource_as(h))
    }

    pub fn get_as_mut<T: Resource>(&mut self, name: &str) -> Option<&mut T> {
        let handle = self.get(name)?;
        self.resource_as_mut(handle)
    }

    /// Named lookup that fails if the resource is absent or not a `T`.
    pub fn must_get_as<T: Resource>(&self, name: &str) -> Result<&T, ResourceError> {
        let handle = self.must_get(name)?;
        let entry = self.entries.get(handle).ok_or(ResourceError::StaleHandle)?;
        (*entry.body)
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| ResourceError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
                actual: entry.body.type_name(),
            })
    }

    pub fn is_of_type<T: Resource>(&self, name: &str) -> bool {
        self.get_as::<T>(name).is_some()
    }

    /// All live handles with their bookkeeping, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceHandle, &ResourceMeta)> {
        let mut all: Vec<_> = self.entries.iter().map(|(h, e)| (h, &e.meta)).collect();
        all.sort_unstable_by_key(|(_, meta)| meta.seq);
        all.into_iter()
    }

    pub fn loaded(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.index.loaded.iter().copied()
    }

    pub fn locked(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.index.locked.iter().copied()
    }

    fn group_handles(&self, group: &str) -> Vec<ResourceHandle> {
        self.iter()
            .filter(|(_, meta)| meta.group == group)
            .map(|(h, _)| h)
            .collect()
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Makes the resource resident. Only refreshes last use if it already is.
    pub fn load(&mut self, handle: ResourceHandle) -> Result<(), ResourceError> {
        let now = self.clock.now();
        let device = self.device;
        let entry = self
            .entries
            .get_mut(handle)
            .ok_or(ResourceError::StaleHandle)?;

        if entry.meta.state == ResourceState::Unloaded {
            entry
                .body
                .on_load(device)
                .map_err(|source| ResourceError::LoadFailed {
                    name: entry.meta.name.clone(),
                    source,
                })?;
            entry.meta.state = ResourceState::Loaded;
            self.index.update(handle, ResourceState::Loaded);
            debug!(resource = entry.meta.display_name(), "loaded");
        }
        entry.meta.last_use = now;
        Ok(())
    }

    /// Pins the resource, loading it first if needed. Locks nest.
    pub fn lock(&mut self, handle: ResourceHandle) -> Result<(), ResourceError> {
        let now = self.clock.now();
        let device = self.device;
        let entry = self
            .entries
            .get_mut(handle)
            .ok_or(ResourceError::StaleHandle)?;

        match entry.meta.state {
            ResourceState::Unloaded => {
                entry
                    .body
                    .on_load(device)
                    .map_err(|source| ResourceError::LoadFailed {
                        name: entry.meta.name.clone(),
                        source,
                    })?;
                entry.meta.state = ResourceState::Locked;
                self.index.update(handle, ResourceState::Locked);
                debug!(resource = entry.meta.display_name(), "loaded and locked");
            }
            ResourceState::Loaded => {
                entry.meta.state = ResourceState::Locked;
                self.index.update(handle, ResourceState::Locked);
            }
            ResourceState::Locked => {}
        }
        entry.meta.lock_count += 1;
        entry.meta.last_use = now;
        Ok(())
    }

    /// Releases one lock. The last unlock leaves the resource `Loaded`.
    /// Last use is refreshed even if the resource was not locked.
    pub fn unlock(&mut self, handle: ResourceHandle) -> Result<(), ResourceError> {
        let now = self.clock.now();
        let entry = self
            .entries
            .get_mut(handle)
            .ok_or(ResourceError::StaleHandle)?;

        if entry.meta.state == ResourceState::Locked {
            entry.meta.lock_count -= 1;
            if entry.meta.lock_count == 0 {
                entry.meta.state = ResourceState::Loaded;
                self.index.update(handle, ResourceState::Loaded);
            }
        }
        entry.meta.last_use = now;
        Ok(())
    }

    /// Unloads a `Loaded` resource; locked and unloaded ones are untouched.
    pub fn unload(&mut self, handle: ResourceHandle) -> Result<(), ResourceError> {
        if !self.entries.contains_key(handle) {
            return Err(ResourceError::StaleHandle);
        }
        self.unload_entry(handle);
        Ok(())
    }

    /// Returns true if the resource was unloaded by this call.
    fn unload_entry(&mut self, handle: ResourceHandle) -> bool {
        let Some(entry) = self.entries.get_mut(handle) else {
            return false;
        };
        if entry.meta.state != ResourceState::Loaded {
            return false;
        }
        if let Err(err) = entry.body.on_unload() {
            warn!(resource = entry.meta.display_name(), error = %format!("{:#}", err), "unload hook failed");
        }
        entry.meta.state = ResourceState::Unloaded;
        self.index.update(handle, ResourceState::Unloaded);
        debug!(resource = entry.meta.display_name(), "unloaded");
        true
    }

    /// Loads by name. `Ok(false)` if no such resource.
    pub fn load_named(&mut self, name: &str) -> Result<bool, ResourceError> {
        match self.get(name) {
            Some(h) => self.load(h).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn lock_named(&mut self, name: &str) -> Result<bool, ResourceError> {
        match self.get(name) {
            Some(h) => self.lock(h).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn unlock_named(&mut self, name: &str) -> bool {
        self.get(name)
            .map(|h| self.unlock(h).is_ok())
            .unwrap_or(false)
    }

    pub fn unload_named(&mut self, name: &str) -> bool {
        self.get(name)
            .map(|h| self.unload(h).is_ok())
            .unwrap_or(false)
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Loads every resource in `group`; stops at the first failure.
    /// Returns the group size.
    pub fn load_group(&mut self, group: &str) -> Result<usize, ResourceError> {
        let handles = self.group_handles(group);
        for &h in &handles {
            self.load(h)?;
        }
        Ok(handles.len())
    }

    pub fn unload_group(&mut self, group: &str) -> usize {
        let handles = self.group_handles(group);
        for &h in &handles {
            self.unload_entry(h);
        }
        handles.len()
    }

    /// Locks every resource in `group`; stops at the first failure.
    pub fn lock_group(&mut self, group: &str) -> Result<usize, ResourceError> {
        let handles = self.group_handles(group);
        for &h in &handles {
            self.lock(h)?;
        }
        Ok(handles.len())
    }

    pub fn unlock_group(&mut self, group: &str) -> usize {
        let handles = self.group_handles(group);
        for &h in &handles {
            // Handles come from the live set.
            let _ = self.unlock(h);
        }
        handles.len()
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Destroys the named resource, even if locked. Handles to it go stale.
    pub fn destroy(&mut self, name: &str) -> bool {
        match self.get(name) {
            Some(h) => self.destroy_handle(h),
            None => false,
        }
    }

    pub fn destroy_handle(&mut self, handle: ResourceHandle) -> bool {
        let Some(entry) = self.entries.remove(handle) else {
            return false;
        };
        self.index.update(handle, ResourceState::Unloaded);
        if !entry.meta.name.is_empty() {
            self.named.remove(&entry.meta.name);
        }
        release(entry);
        true
    }

    /// Destroys every resource in `group`, newest first. Returns the count.
    pub fn destroy_group(&mut self, group: &str) -> usize {
        let handles = self.group_handles(group);
        for &h in handles.iter().rev() {
            self.destroy_handle(h);
        }
        handles.len()
    }

    // =========================================================================
    // Frame and events
    // =========================================================================

    /// Per-frame tick: runs a collection pass when the policy asks for one.
    pub fn on_frame(&mut self) -> Option<GcPass> {
        let now = self.clock.now();
        let probe = &self.probe;
        let regime = self.schedule.poll(now, &self.config, || probe.sample())?;
        Some(self.run_pass(regime, now))
    }

    /// Runs one collection pass immediately, bypassing the interval gates.
    pub fn collect_now(&mut self, regime: GcRegime) -> GcPass {
        let now = self.clock.now();
        self.schedule.mark_collected(now);
        self.run_pass(regime, now)
    }

    fn run_pass(&mut self, regime: GcRegime, now: Duration) -> GcPass {
        let snapshot: Vec<Candidate> = self
            .index
            .loaded
            .iter()
            .filter_map(|&handle| {
                self.entries.get(handle).map(|e| Candidate {
                    handle,
                    last_use: e.meta.last_use,
                    seq: e.meta.seq,
                })
            })
            .collect();
        let candidates = snapshot.len();

        let victims = select_victims(snapshot, regime, now, &self.config);
        let unloaded: Vec<ResourceHandle> = victims
            .into_iter()
            .filter(|&h| self.unload_entry(h))
            .collect();

        info!(
            regime = ?regime,
            candidates,
            unloaded = unloaded.len(),
            locked = self.index.locked.len(),
            "resource collection pass"
        );
        GcPass { regime, unloaded }
    }

    /// Delivers `event` to every resource.
    ///
    /// Context events also update the device status that later loads see.
    /// Hook failures are logged and do not stop the broadcast.
    pub fn broadcast_context_event(&mut self, event: ContextEvent) {
        match event {
            ContextEvent::Lost => self.device = DeviceStatus::Lost,
            ContextEvent::Reset => self.device = DeviceStatus::Available,
            ContextEvent::Custom(_) => {}
        }
        info!(event = ?event, resources = self.entries.len(), "broadcasting context event");

        let handles: Vec<ResourceHandle> = self.entries.keys().collect();
        for handle in handles {
            let Some(entry) = self.entries.get_mut(handle) else {
                continue;
            };
            let state = entry.meta.state;
            match entry.body.on_event(event, state) {
                Ok(EventOutcome::Handled) => {}
                Ok(EventOutcome::Unloaded) if state == ResourceState::Loaded => {
                    entry.meta.state = ResourceState::Unloaded;
                    self.index.update(handle, ResourceState::Unloaded);
                    debug!(resource = entry.meta.display_name(), "unloaded itself");
                }
                Ok(EventOutcome::Unloaded) => {
                    if state == ResourceState::Locked {
                        warn!(
                            resource = entry.meta.display_name(),
                            "locked resource tried to unload itself; ignored"
                        );
                    }
                }
                Err(err) => {
                    error!(
                        resource = entry.meta.display_name(),
                        event = ?event,
                        error = %format!("{:#}", err),
                        "context event handler failed"
                    );
                }
            }
        }
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            memory: self.probe.sample(),
            resource_count: self.entries.len(),
            loaded_count: self.index.loaded.len(),
            locked_count: self.index.locked.len(),
        }
    }
}

/// Runs the unload hook of a resident resource, then drops it.
fn release(mut entry: Entry) {
    if entry.meta.state.is_resident() {
        if let Err(err) = entry.body.on_unload() {
            warn!(resource = entry.meta.display_name(), error = %format!("{:#}", err), "unload hook failed during destroy");
        }
    }
    debug!(
        resource = entry.meta.display_name(),
        state = ?entry.meta.state,
        lock_count = entry.meta.lock_count,
        "destroyed"
    );
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        info!(resources = self.entries.len(), "tearing down resource registry");

        // Newest first, so resources can still reach older ones they use.
        let mut order: Vec<(u64, ResourceHandle)> =
            self.entries.iter().map(|(h, e)| (e.meta.seq, h)).collect();
        order.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        // Teardown mode: the indices are discarded wholesale afterwards.
        for (_, handle) in order {
            if let Some(entry) = self.entries.remove(handle) {
                release(entry);
            }
        }
        self.named.clear();
        self.index = StateIndex::default();
    }
}
