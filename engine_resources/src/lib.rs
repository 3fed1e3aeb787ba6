//! `engine_resources`
//!
//! Resource cache for a real-time engine: a registry of named, typed
//! resources with explicit load/lock state, group operations, graphics
//! context loss handling, declarative manifests and a memory-pressure-aware
//! garbage collector driven once per frame.
//!
//! Design goals:
//! - Resources are owned by the registry and addressed by generational
//!   handles; destroyed resources cannot be reached through old handles.
//! - Deterministic under test: time and memory pressure are injected.
//! - Single-threaded; hooks cannot re-enter the registry.
//! - No `unsafe`.

pub mod clock;
pub mod config;
pub mod decl;
pub mod device;
pub mod error;
pub mod gc;
pub mod memory;
pub mod registry;
pub mod resource;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::decl::{Params, RecordHeader};
    pub use crate::device::*;
    pub use crate::error::*;
    pub use crate::gc::{GcPass, GcRegime};
    pub use crate::memory::*;
    pub use crate::registry::*;
    pub use crate::resource::*;
}
