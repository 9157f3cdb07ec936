//! Provcfg Devices - Device profile registry
//!
//! This crate resolves device identifiers into concrete profiles:
//! - Revision inheritance (shallow overlay, `latest` selection)
//! - Alias redirection (full substitution, cycle detection)
//! - Memory-map resolution (mirror expansion, overlap rejection,
//!   advisory warning ranges)
//!
//! Catalogs are loaded once and are immutable for the process lifetime; a
//! broken profile is dropped with a recorded failure instead of aborting the
//! whole load.

pub mod memmap;
pub mod profile;
pub mod registry;

pub use memmap::{MemoryMap, MemoryMapError, MemoryRegion, WarningRange};
pub use profile::DeviceProfile;
pub use registry::{DeviceError, DeviceRegistry, LoadFailure};
