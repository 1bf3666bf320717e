use serde::{Deserialize, Serialize};

use super::boot_sector::Geometry;

/// Smallest image length that still holds every cluster known to be in use.
///
/// The figure is advisory: truncating an image to it is only safe if no
/// cluster past `highest_cluster` is in use without the table or the tree
/// showing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEstimate {
    /// Highest cluster found by scanning the allocation table.
    pub table_max_cluster: u32,
    /// Highest cluster reached while walking the directory tree.
    pub walk_max_cluster: u32,
    /// The larger of the two.
    pub highest_cluster: u32,
    /// Last sector of `highest_cluster`.
    pub end_sector: u64,
    /// `(end_sector + 1) * bytes_per_sector`, counted from the volume start.
    pub minimal_size: u64,
}

impl UsageEstimate {
    pub fn new(geometry: &Geometry, table_max_cluster: u32, walk_max_cluster: u32) -> Self {
        let highest_cluster = table_max_cluster.max(walk_max_cluster).max(2);
        let end_sector =
            geometry.cluster_sector(highest_cluster) + geometry.sectors_per_cluster as u64 - 1;
        Self {
            table_max_cluster,
            walk_max_cluster,
            highest_cluster,
            end_sector,
            minimal_size: (end_sector + 1) * geometry.bytes_per_sector as u64,
        }
    }

    /// Bytes that truncation could drop from an image of `image_len` bytes
    /// whose volume starts at `partition_offset`.
    pub fn reclaimable(&self, image_len: u64, partition_offset: u64) -> u64 {
        image_len.saturating_sub(partition_offset.saturating_add(self.minimal_size))
    }
}
