//! In-memory FAT32 allocation table and cluster-chain iteration.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use log::info;
use serde::{Deserialize, Serialize};

use super::boot_sector::Geometry;
use crate::error::FatError;

/// Only the low 28 bits of a FAT32 entry are significant.
pub const ENTRY_MASK: u32 = 0x0FFF_FFFF;
/// First value of the reserved range.
pub const RESERVED_MIN: u32 = 0x0FFF_FFF0;
pub const BAD_CLUSTER: u32 = 0x0FFF_FFF7;
/// Any masked value at or above this terminates a chain.
pub const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;
/// Canonical end-of-chain marker.
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;

/// Meaning of a FAT32 entry after masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    Next(u32),
    Reserved(u32),
    Bad,
    EndOfChain,
}

impl FatEntry {
    pub fn classify(raw: u32) -> Self {
        match raw & ENTRY_MASK {
            0 => FatEntry::Free,
            BAD_CLUSTER => FatEntry::Bad,
            v if v >= END_OF_CHAIN_MIN => FatEntry::EndOfChain,
            v if v >= RESERVED_MIN => FatEntry::Reserved(v),
            v => FatEntry::Next(v),
        }
    }
}

/// A chain that had to be cut short. Never fatal; the chain simply ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainAnomaly {
    /// The chain starts outside the table.
    InvalidHead { cluster: u32 },
    /// A link points to a reserved or bad-cluster value.
    ReservedLink { cluster: u32, value: u32 },
    /// A link points to a free entry.
    FreeLink { cluster: u32 },
    /// A link points outside the table.
    OutOfRange { cluster: u32, target: u32 },
    /// A link points back to a cluster already in the chain.
    Loop { cluster: u32, target: u32 },
    /// A subdirectory starts at the cluster of one of its ancestors.
    DirectoryCycle { cluster: u32, depth: usize },
}

impl fmt::Display for ChainAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainAnomaly::InvalidHead { cluster } => {
                write!(f, "chain starts at invalid cluster {cluster}")
            }
            ChainAnomaly::ReservedLink { cluster, value } => {
                write!(f, "cluster {cluster} links to reserved value 0x{value:08X}")
            }
            ChainAnomaly::FreeLink { cluster } => {
                write!(f, "cluster {cluster} is marked free inside a chain")
            }
            ChainAnomaly::OutOfRange { cluster, target } => {
                write!(f, "cluster {cluster} links outside the table to {target}")
            }
            ChainAnomaly::Loop { cluster, target } => {
                write!(f, "cluster {cluster} links back to {target}")
            }
            ChainAnomaly::DirectoryCycle { cluster, depth } => {
                write!(f, "directory at cluster {cluster} (depth {depth}) repeats an ancestor")
            }
        }
    }
}

/// The first allocation table of a volume, loaded whole.
#[derive(Debug, Clone)]
pub struct AllocationTable {
    entries: Vec<u32>,
}

impl AllocationTable {
    pub fn from_entries(entries: Vec<u32>) -> Self {
        Self { entries }
    }

    /// Load the first FAT of the volume at `partition_offset`.
    ///
    /// The buffer only grows as bytes arrive, so a table that claims to be
    /// larger than the image fails with `UnexpectedEof` before anything of
    /// the claimed size is allocated.
    pub fn load<R: Read + Seek>(
        reader: &mut R,
        partition_offset: u64,
        geometry: &Geometry,
    ) -> Result<Self, FatError> {
        let count = geometry.fat_entry_count();
        let fat_bytes = count as u64 * 4;
        reader.seek(SeekFrom::Start(partition_offset + geometry.fat_offset()))?;
        let mut raw = Vec::new();
        (&mut *reader).take(fat_bytes).read_to_end(&mut raw)?;
        if (raw.len() as u64) < fat_bytes {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("FAT truncated: {} of {fat_bytes} bytes", raw.len()),
            )
            .into());
        }
        let mut entries = vec![0u32; count];
        LittleEndian::read_u32_into(&raw, &mut entries);

        let table = Self { entries };
        info!(
            "Loaded FAT: {} entries, {} allocated",
            table.len(),
            table.allocated_count()
        );
        Ok(table)
    }

    /// Number of entries, including the two reserved ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Masked entry for `cluster`. Clusters past the end read as free.
    pub fn entry_at(&self, cluster: u32) -> u32 {
        self.entries
            .get(cluster as usize)
            .map_or(0, |&raw| raw & ENTRY_MASK)
    }

    pub fn classify(&self, cluster: u32) -> FatEntry {
        FatEntry::classify(self.entry_at(cluster))
    }

    fn contains(&self, cluster: u32) -> bool {
        cluster >= 2 && (cluster as usize) < self.entries.len()
    }

    /// Iterate the chain starting at `head`.
    pub fn chain(&self, head: u32) -> Chain<'_> {
        Chain {
            table: self,
            cursor: ChainCursor::new(head),
        }
    }

    /// Number of clusters in the chain starting at `head`.
    pub fn chain_length(&self, head: u32) -> usize {
        self.chain(head).count()
    }

    /// Count of data clusters whose entry is not free.
    pub fn allocated_count(&self) -> usize {
        self.entries
            .iter()
            .skip(2)
            .filter(|&&raw| raw & ENTRY_MASK != 0)
            .count()
    }

    /// Highest cluster that the table itself shows in use, whether or not it
    /// is reachable from the directory tree. Considers every cluster that
    /// carries a link or an end-of-chain marker, plus every in-range link
    /// target. Free, reserved and bad entries are ignored. Never below 2.
    pub fn max_referenced_cluster(&self) -> u32 {
        let mut max = 2;
        for cluster in 2..self.entries.len() as u32 {
            match self.classify(cluster) {
                FatEntry::EndOfChain => max = max.max(cluster),
                FatEntry::Next(target) => {
                    max = max.max(cluster);
                    if self.contains(target) {
                        max = max.max(target);
                    }
                }
                FatEntry::Free | FatEntry::Reserved(_) | FatEntry::Bad => {}
            }
        }
        max
    }
}

/// Position within a cluster chain that does not borrow the table, so a
/// caller can interleave chain steps with reads on the same volume.
#[derive(Debug, Clone)]
pub struct ChainCursor {
    next: Option<u32>,
    visited: HashSet<u32>,
    anomaly: Option<ChainAnomaly>,
}

impl ChainCursor {
    /// A head of 0 is the empty chain of a zero-length file.
    pub fn new(head: u32) -> Self {
        Self {
            next: (head != 0).then_some(head),
            visited: HashSet::new(),
            anomaly: None,
        }
    }

    /// Produce the next cluster of the chain, if any.
    pub fn advance(&mut self, table: &AllocationTable) -> Option<u32> {
        let current = self.next.take()?;
        if self.visited.is_empty() && !table.contains(current) {
            self.anomaly = Some(ChainAnomaly::InvalidHead { cluster: current });
            return None;
        }
        self.visited.insert(current);

        self.next = match table.classify(current) {
            FatEntry::EndOfChain => None,
            FatEntry::Next(target) if !table.contains(target) => {
                self.anomaly = Some(ChainAnomaly::OutOfRange {
                    cluster: current,
                    target,
                });
                None
            }
            FatEntry::Next(target) if self.visited.contains(&target) => {
                self.anomaly = Some(ChainAnomaly::Loop {
                    cluster: current,
                    target,
                });
                None
            }
            FatEntry::Next(target) => Some(target),
            FatEntry::Free => {
                self.anomaly = Some(ChainAnomaly::FreeLink { cluster: current });
                None
            }
            FatEntry::Reserved(value) => {
                self.anomaly = Some(ChainAnomaly::ReservedLink {
                    cluster: current,
                    value,
                });
                None
            }
            FatEntry::Bad => {
                self.anomaly = Some(ChainAnomaly::ReservedLink {
                    cluster: current,
                    value: BAD_CLUSTER,
                });
                None
            }
        };
        Some(current)
    }

    /// Why the chain stopped early, if it did.
    pub fn anomaly(&self) -> Option<&ChainAnomaly> {
        self.anomaly.as_ref()
    }
}

/// Borrowing iterator over a cluster chain.
pub struct Chain<'a> {
    table: &'a AllocationTable,
    cursor: ChainCursor,
}

impl Chain<'_> {
    pub fn anomaly(&self) -> Option<&ChainAnomaly> {
        self.cursor.anomaly()
    }

    pub fn into_anomaly(self) -> Option<ChainAnomaly> {
        self.cursor.anomaly
    }
}

impl Iterator for Chain<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        self.cursor.advance(self.table)
    }
}
