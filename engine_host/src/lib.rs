//! `engine_host`
//!
//! Host-side driver for the resource registry:
//! - JSON host configuration wrapping the collector tuning
//! - Demo resource kinds (device-bound texture, font)
//! - Frame loop that touches resources, simulates context loss and runs the
//!   garbage collector

pub mod config;
pub mod host;
pub mod kinds;

pub use host::ResourceHost;
