//! Memory-map resolution: mirror expansion, overlap checks, warning ranges
//!
//! A raw memory map is a set of named regions whose `start`/`size` may be
//! written as native integers or hex/decimal strings. Resolution normalizes
//! the numbers, expands `mirror_of` aliases, rejects overlapping non-mirror
//! regions, and carries warning ranges through untouched. Warning ranges are
//! advisory metadata for the external image builder; this crate only answers
//! intersection queries, it never evaluates them against anything on its own.

use provcfg_core::value_to_u64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MemoryMapError {
    #[error("region '{region}' mirrors unknown region '{target}'")]
    DanglingMirror { region: String, target: String },
    #[error("cyclic mirror chain through region '{0}'")]
    MirrorCycle(String),
    #[error("mirror region '{region}' declares size {declared:#x} larger than source size {source_size:#x}")]
    MirrorSizeMismatch {
        region: String,
        declared: u64,
        source_size: u64,
    },
    #[error("regions '{first}' and '{second}' overlap in address space")]
    RegionOverlap { first: String, second: String },
    #[error("invalid region '{region}': {reason}")]
    BadRegion { region: String, reason: String },
}

/// Raw region entry as authored in a device catalog document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRegion {
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub mirror_of: Option<String>,
    #[serde(default)]
    pub warning_ranges: Vec<RawWarningRange>,
}

/// Raw warning range entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWarningRange {
    pub start: Value,
    pub size: Value,
    #[serde(rename = "warning_msg")]
    pub message: String,
}

/// Advisory address range with the message to report when an image address
/// intersects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRange {
    pub start: u64,
    pub size: u64,
    pub message: String,
}

impl WarningRange {
    /// Whether this range intersects `[start, start + size)`.
    pub fn intersects(&self, start: u64, size: u64) -> bool {
        let self_end = self.start.saturating_add(self.size);
        let other_end = start.saturating_add(size);
        size > 0 && self.size > 0 && start < self_end && self.start < other_end
    }
}

/// A resolved memory region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub name: String,
    pub start: u64,
    pub size: u64,
    pub external: bool,
    /// Name of the region whose content this region aliases, if any.
    pub mirror_of: Option<String>,
    pub warning_ranges: Vec<WarningRange>,
}

impl MemoryRegion {
    /// Exclusive end address.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    /// Whether `address` falls inside this region.
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end()
    }
}

/// A resolved memory map, regions ordered by start address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

impl MemoryMap {
    /// Look up a region by name.
    pub fn region(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// All regions, ordered by start address.
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// Collect every warning range intersecting `[start, start + size)`,
    /// across all regions. The caller (the image builder) reports the stored
    /// messages for addresses it is about to use.
    pub fn warnings_for_range(&self, start: u64, size: u64) -> Vec<&WarningRange> {
        self.regions
            .iter()
            .flat_map(|r| r.warning_ranges.iter())
            .filter(|w| w.intersects(start, size))
            .collect()
    }
}

/// Resolve a raw memory map into a [`MemoryMap`].
pub fn resolve_memory_map(raw: &BTreeMap<String, RawRegion>) -> Result<MemoryMap, MemoryMapError> {
    let mut regions = Vec::with_capacity(raw.len());

    for (name, entry) in raw {
        let (start, size) = resolve_region_geometry(raw, name, entry)?;
        let mut warning_ranges = Vec::with_capacity(entry.warning_ranges.len());
        for range in &entry.warning_ranges {
            warning_ranges.push(WarningRange {
                start: parse_field(name, "warning range start", &range.start)?,
                size: parse_field(name, "warning range size", &range.size)?,
                message: range.message.clone(),
            });
        }
        regions.push(MemoryRegion {
            name: name.clone(),
            start,
            size,
            external: entry.external,
            mirror_of: entry.mirror_of.clone(),
            warning_ranges,
        });
    }

    regions.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));

    // Mirrors alias existing storage, only backing regions can collide.
    let backing: Vec<&MemoryRegion> = regions.iter().filter(|r| r.mirror_of.is_none()).collect();
    for pair in backing.windows(2) {
        if pair[1].start < pair[0].end() {
            return Err(MemoryMapError::RegionOverlap {
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
            });
        }
    }

    Ok(MemoryMap { regions })
}

/// Compute the effective start and size of one region, following mirror
/// chains as needed.
fn resolve_region_geometry(
    raw: &BTreeMap<String, RawRegion>,
    name: &str,
    entry: &RawRegion,
) -> Result<(u64, u64), MemoryMapError> {
    let declared_size = match &entry.size {
        Some(v) => Some(parse_field(name, "size", v)?),
        None => None,
    };
    let declared_start = match &entry.start {
        Some(v) => Some(parse_field(name, "start", v)?),
        None => None,
    };

    let (start, size) = match &entry.mirror_of {
        None => {
            let start = declared_start.ok_or_else(|| MemoryMapError::BadRegion {
                region: name.to_string(),
                reason: "missing start address".to_string(),
            })?;
            let size = declared_size.ok_or_else(|| MemoryMapError::BadRegion {
                region: name.to_string(),
                reason: "missing size".to_string(),
            })?;
            (start, size)
        }
        Some(target) => {
            let (source_start, source_size) = source_geometry(raw, name, target)?;
            if let Some(declared) = declared_size {
                if declared > source_size {
                    return Err(MemoryMapError::MirrorSizeMismatch {
                        region: name.to_string(),
                        declared,
                        source_size,
                    });
                }
            }
            (
                declared_start.unwrap_or(source_start),
                declared_size.unwrap_or(source_size),
            )
        }
    };

    start.checked_add(size).ok_or(MemoryMapError::BadRegion {
        region: name.to_string(),
        reason: "address range overflows".to_string(),
    })?;

    Ok((start, size))
}

/// Walk a mirror chain to its backing region and return that region's
/// effective start and size.
fn source_geometry<'a>(
    raw: &'a BTreeMap<String, RawRegion>,
    origin: &'a str,
    target: &'a str,
) -> Result<(u64, u64), MemoryMapError> {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(origin);
    chain_geometry(raw, origin, target, &mut visited)
}

/// The chain walk proper. One `visited` set covers the whole walk, including
/// the inherited-start descent, so every cycle shape is caught.
fn chain_geometry<'a>(
    raw: &'a BTreeMap<String, RawRegion>,
    origin: &str,
    target: &'a str,
    visited: &mut HashSet<&'a str>,
) -> Result<(u64, u64), MemoryMapError> {
    let mut current = target;

    loop {
        if !visited.insert(current) {
            return Err(MemoryMapError::MirrorCycle(origin.to_string()));
        }
        let entry = raw.get(current).ok_or_else(|| MemoryMapError::DanglingMirror {
            region: origin.to_string(),
            target: current.to_string(),
        })?;
        match &entry.mirror_of {
            Some(next) => {
                // A mirror with its own size narrows what its mirrors see.
                if let Some(size) = &entry.size {
                    let size = parse_field(current, "size", size)?;
                    let start = match &entry.start {
                        Some(v) => parse_field(current, "start", v)?,
                        None => chain_geometry(raw, current, next, visited)?.0,
                    };
                    return Ok((start, size));
                }
                current = next;
            }
            None => {
                let start = parse_field(current, "start", entry.start.as_ref().ok_or_else(|| {
                    MemoryMapError::BadRegion {
                        region: current.to_string(),
                        reason: "missing start address".to_string(),
                    }
                })?)?;
                let size = parse_field(current, "size", entry.size.as_ref().ok_or_else(|| {
                    MemoryMapError::BadRegion {
                        region: current.to_string(),
                        reason: "missing size".to_string(),
                    }
                })?)?;
                return Ok((start, size));
            }
        }
    }
}

fn parse_field(region: &str, field: &str, value: &Value) -> Result<u64, MemoryMapError> {
    value_to_u64(value).map_err(|e| MemoryMapError::BadRegion {
        region: region.to_string(),
        reason: format!("{field}: {e}"),
    })
}
