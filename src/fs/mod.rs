pub mod boot_sector;
pub mod dir_entry;
pub mod dir_stream;
pub mod reader;
pub mod table;
#[cfg(test)]
pub(crate) mod test_image;
pub mod usage;
pub mod volume;
pub mod walk;

use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};

pub use boot_sector::{FsInfo, Geometry};
pub use dir_entry::{EntryKind, FatFile, ShortDirEntry};
pub use table::{AllocationTable, ChainAnomaly, FatEntry};
pub use usage::UsageEstimate;
pub use volume::Fat32Volume;
pub use walk::{TreeWalker, Visit, WalkStats};

use crate::config::ScanConfig;
use crate::error::FatError;

/// One record reported by a scan, in walk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub depth: usize,
    /// Name and extension fields exactly as stored ("README  .TXT").
    pub raw_name: String,
    pub name: String,
    pub is_directory: bool,
    /// True for "." and "..", which are not counted.
    pub meta: bool,
    pub start_cluster: u32,
    pub size: u64,
    pub modified: Option<String>,
}

/// Everything a scan of one volume produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub geometry: Geometry,
    pub fs_info: FsInfo,
    pub entries: Vec<ReportEntry>,
    pub stats: WalkStats,
    pub usage: UsageEstimate,
}

impl UsageReport {
    /// Real entries (files and subdirectories).
    pub fn real_entries(&self) -> u64 {
        self.stats.entries
    }
}

/// Open the volume described by `config`, walk its tree and estimate the
/// minimal image size.
pub fn scan<R: Read + Seek>(reader: R, config: &ScanConfig) -> Result<UsageReport, FatError> {
    let mut volume = Fat32Volume::open(reader, config.partition_offset)?;
    scan_volume(&mut volume, config)
}

/// Scan an already opened volume.
pub fn scan_volume<R: Read + Seek>(
    volume: &mut Fat32Volume<R>,
    config: &ScanConfig,
) -> Result<UsageReport, FatError> {
    let mut entries = Vec::new();
    let stats = TreeWalker::new()
        .max_depth(config.max_depth)
        .walk(volume, &mut |visit: &Visit<'_>| {
            if visit.is_meta() && !config.show_meta_entries {
                return;
            }
            entries.push(ReportEntry {
                depth: visit.depth,
                raw_name: visit.entry.raw_name(),
                name: visit.entry.short_name(),
                is_directory: visit.entry.is_directory(),
                meta: visit.is_meta(),
                start_cluster: visit.entry.start_cluster(),
                size: visit.entry.length as u64,
                modified: visit.entry.modified(),
            });
        })?;

    let usage = UsageEstimate::new(
        volume.geometry(),
        volume.table().max_referenced_cluster(),
        stats.max_cluster,
    );

    Ok(UsageReport {
        geometry: volume.geometry().clone(),
        fs_info: *volume.fs_info(),
        entries,
        stats,
        usage,
    })
}

/// Minimal number of bytes, counted from the start of the volume at
/// `partition_offset`, needed to keep every in-use cluster of it. The image
/// itself needs `partition_offset` more.
pub fn effective_volume_size<R: Read + Seek>(
    reader: R,
    partition_offset: u64,
) -> Result<u64, FatError> {
    let config = ScanConfig {
        partition_offset,
        ..ScanConfig::default()
    };
    Ok(scan(reader, &config)?.usage.minimal_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dir_entry::ATTR_DIRECTORY;
    use crate::fs::test_image::{dir_entry, TestImage};
    use std::io::Cursor;

    /// Root (cluster 2) holds SUB (cluster 3), which holds HELLO.TXT
    /// (cluster 4).
    fn three_cluster_image() -> TestImage {
        TestImage::new()
            .chain(&[3])
            .chain(&[4])
            .directory(2, &[dir_entry(b"SUB        ", ATTR_DIRECTORY, 3, 0)])
            .directory(
                3,
                &[
                    dir_entry(b".          ", ATTR_DIRECTORY, 3, 0),
                    dir_entry(b"..         ", ATTR_DIRECTORY, 0, 0),
                    dir_entry(b"HELLO   TXT", 0x20, 4, 5),
                ],
            )
            .cluster_data(4, b"hello")
    }

    #[test]
    fn test_scan_three_cluster_image() {
        let image = three_cluster_image().build();
        let report = scan(Cursor::new(image), &ScanConfig::default()).unwrap();
        assert_eq!(report.real_entries(), 2);
        assert_eq!(report.stats.max_cluster, 4);
        assert_eq!(report.usage.table_max_cluster, 4);
        // Cluster 4 is sector 32 + 1 + 2 = 35.
        assert_eq!(report.usage.minimal_size, 36 * 512);
        let names: Vec<&str> = report.entries.iter().map(|e| e.raw_name.as_str()).collect();
        assert_eq!(names, vec!["SUB     .   ", ".       .   ", "..      .   ", "HELLO   .TXT"]);
    }

    #[test]
    fn test_scan_hides_meta_entries() {
        let image = three_cluster_image().build();
        let config = ScanConfig {
            show_meta_entries: false,
            ..ScanConfig::default()
        };
        let report = scan(Cursor::new(image), &config).unwrap();
        let names: Vec<&str> = report.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["SUB", "HELLO.TXT"]);
        assert_eq!(report.real_entries(), 2);
    }

    #[test]
    fn test_orphaned_chain_raises_estimate() {
        let image = three_cluster_image().chain(&[12, 13]).build();
        let report = scan(Cursor::new(image), &ScanConfig::default()).unwrap();
        assert_eq!(report.stats.max_cluster, 4);
        assert_eq!(report.usage.table_max_cluster, 13);
        assert_eq!(report.usage.highest_cluster, 13);
        assert_eq!(report.usage.minimal_size, (33 + 11 + 1) * 512);
    }

    #[test]
    fn test_effective_volume_size_with_offset() {
        let mut disk = vec![0u8; 63 * 512];
        disk.extend_from_slice(&three_cluster_image().build());
        let image_len = disk.len() as u64;
        let size = effective_volume_size(Cursor::new(disk.clone()), 63 * 512).unwrap();
        assert_eq!(size, 36 * 512);

        let config = ScanConfig {
            partition_offset: 63 * 512,
            ..ScanConfig::default()
        };
        let report = scan(Cursor::new(disk), &config).unwrap();
        assert_eq!(
            report.usage.reclaimable(image_len, config.partition_offset),
            image_len - (63 + 36) * 512
        );
    }

    #[test]
    fn test_report_json_round_trip() {
        let image = three_cluster_image().build();
        let report = scan(Cursor::new(image), &ScanConfig::default()).unwrap();
        let json = serde_json::to_string_pretty(&report).unwrap();
        let parsed: UsageReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
