use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::FatError;

/// Size of the region decoded from the start of the volume.
pub const BOOT_SECTOR_SIZE: usize = 512;
/// Size of the FS Information Sector structure.
pub const FS_INFO_SIZE: usize = 512;

const FS_INFO_LEAD_SIGNATURE: u32 = 0x4161_5252; // "RRaA"
const FS_INFO_STRUCT_SIGNATURE: u32 = 0x6141_7272; // "rrAa"
const FS_INFO_TRAIL_SIGNATURE: u32 = 0xAA55_0000;

/// Volume geometry decoded from the FAT32 BIOS Parameter Block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// OEM name at offset 3, space padded.
    pub oem_name: String,
    /// Bytes per sector (typically 512).
    pub bytes_per_sector: u32,
    /// Sectors per cluster.
    pub sectors_per_cluster: u32,
    /// Number of reserved sectors before the first FAT.
    pub reserved_sectors: u32,
    /// Number of FATs (typically 2).
    pub num_fats: u32,
    /// Media descriptor byte.
    pub media: u8,
    /// Sectors preceding the volume on its disk.
    pub hidden_sectors: u32,
    /// Total sectors, from the 16-bit field or its 32-bit fallback.
    pub total_sectors: u32,
    /// Sectors per FAT, from the 16-bit field or its 32-bit fallback.
    pub sectors_per_fat: u32,
    /// FAT32 version as (major, minor).
    pub version: (u8, u8),
    /// First cluster of the root directory.
    pub root_cluster: u32,
    /// Sector number of the FS Information Sector.
    pub fs_info_sector: u16,
    /// Sector number of the backup boot sector.
    pub backup_boot_sector: u16,
    pub volume_id: u32,
    pub volume_label: String,
    /// Filesystem type string at offset 82 (informational, usually "FAT32   ").
    pub fs_type: String,
}

impl Geometry {
    /// Decode the BPB from the first sector of a volume.
    pub fn parse(bpb: &[u8]) -> Result<Self, FatError> {
        if bpb.len() < 90 {
            return Err(FatError::Format(format!(
                "boot sector too short: {} bytes",
                bpb.len()
            )));
        }

        let bytes_per_sector = LittleEndian::read_u16(&bpb[11..13]) as u32;
        if bytes_per_sector == 0 || bytes_per_sector % 32 != 0 {
            return Err(FatError::Format(format!(
                "invalid bytes per sector: {bytes_per_sector}"
            )));
        }

        let sectors_per_cluster = bpb[13] as u32;
        if sectors_per_cluster == 0 {
            return Err(FatError::Format("invalid sectors per cluster: 0".into()));
        }

        let reserved_sectors = LittleEndian::read_u16(&bpb[14..16]) as u32;
        let num_fats = bpb[16] as u32;
        if num_fats == 0 {
            return Err(FatError::Format("invalid FAT count: 0".into()));
        }

        let total_sectors_16 = LittleEndian::read_u16(&bpb[19..21]) as u32;
        let total_sectors_32 = LittleEndian::read_u32(&bpb[32..36]);
        let total_sectors = if total_sectors_16 != 0 {
            total_sectors_16
        } else {
            total_sectors_32
        };
        if total_sectors == 0 {
            return Err(FatError::Format(
                "both total sector fields are zero".into(),
            ));
        }

        let sectors_per_fat_16 = LittleEndian::read_u16(&bpb[22..24]) as u32;
        let sectors_per_fat_32 = LittleEndian::read_u32(&bpb[36..40]);
        let sectors_per_fat = if sectors_per_fat_16 != 0 {
            sectors_per_fat_16
        } else {
            sectors_per_fat_32
        };
        if sectors_per_fat == 0 {
            return Err(FatError::Format(
                "both sectors-per-FAT fields are zero".into(),
            ));
        }

        let fat_region = reserved_sectors as u64 + sectors_per_fat as u64 * num_fats as u64;
        if fat_region > total_sectors as u64 {
            return Err(FatError::Format(format!(
                "reserved and FAT sectors ({fat_region}) exceed total sectors ({total_sectors})"
            )));
        }

        let root_cluster = LittleEndian::read_u32(&bpb[44..48]);
        if root_cluster < 2 {
            return Err(FatError::Format(format!(
                "invalid root cluster: {root_cluster}"
            )));
        }

        Ok(Self {
            oem_name: latin1_field(&bpb[3..11]),
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            media: bpb[21],
            hidden_sectors: LittleEndian::read_u32(&bpb[28..32]),
            total_sectors,
            sectors_per_fat,
            version: (bpb[43], bpb[42]),
            root_cluster,
            fs_info_sector: LittleEndian::read_u16(&bpb[48..50]),
            backup_boot_sector: LittleEndian::read_u16(&bpb[50..52]),
            volume_id: LittleEndian::read_u32(&bpb[67..71]),
            volume_label: latin1_field(&bpb[71..82]),
            fs_type: latin1_field(&bpb[82..90]),
        })
    }

    /// Bytes per cluster.
    pub fn cluster_bytes(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// Number of 32-bit entries in one allocation table.
    pub fn fat_entry_count(&self) -> usize {
        self.sectors_per_fat as usize * self.bytes_per_sector as usize / 4
    }

    /// Byte offset of the first FAT, relative to the volume start.
    pub fn fat_offset(&self) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Byte offset of the FS Information Sector, relative to the volume start.
    pub fn fs_info_offset(&self) -> u64 {
        self.fs_info_sector as u64 * self.bytes_per_sector as u64
    }

    /// First sector of the data region (the sector of cluster 2).
    pub fn first_data_sector(&self) -> u64 {
        self.reserved_sectors as u64
            + self.hidden_sectors as u64
            + self.sectors_per_fat as u64 * self.num_fats as u64
    }

    /// First sector of a data cluster. Only meaningful for `cluster >= 2`.
    pub fn cluster_sector(&self, cluster: u32) -> u64 {
        debug_assert!(cluster >= 2, "cluster {cluster} has no data sector");
        self.first_data_sector()
            + (cluster as u64).saturating_sub(2) * self.sectors_per_cluster as u64
    }

    /// Volume size in bytes as recorded in the BPB.
    pub fn total_bytes(&self) -> u64 {
        self.total_sectors as u64 * self.bytes_per_sector as u64
    }
}

/// Advisory free-space hints from the FS Information Sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsInfo {
    pub lead_signature: u32,
    pub struct_signature: u32,
    /// Last known free cluster count, `0xFFFFFFFF` when unknown.
    pub free_clusters: u32,
    /// Hint for where to start looking for a free cluster.
    pub next_free: u32,
    pub trail_signature: u32,
}

impl FsInfo {
    pub fn parse(sector: &[u8]) -> Result<Self, FatError> {
        if sector.len() < FS_INFO_SIZE {
            return Err(FatError::Format(format!(
                "FS information sector too short: {} bytes",
                sector.len()
            )));
        }
        Ok(Self {
            lead_signature: LittleEndian::read_u32(&sector[0..4]),
            struct_signature: LittleEndian::read_u32(&sector[484..488]),
            free_clusters: LittleEndian::read_u32(&sector[488..492]),
            next_free: LittleEndian::read_u32(&sector[492..496]),
            trail_signature: LittleEndian::read_u32(&sector[508..512]),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.lead_signature == FS_INFO_LEAD_SIGNATURE
            && self.struct_signature == FS_INFO_STRUCT_SIGNATURE
            && self.trail_signature == FS_INFO_TRAIL_SIGNATURE
    }

    /// Free cluster count, if the volume recorded one.
    pub fn free_clusters(&self) -> Option<u32> {
        (self.free_clusters != 0xFFFF_FFFF).then_some(self.free_clusters)
    }

    /// Next-free hint, if the volume recorded one.
    pub fn next_free(&self) -> Option<u32> {
        (self.next_free != 0xFFFF_FFFF).then_some(self.next_free)
    }
}

/// Read and decode the boot sector and FS Information Sector of a volume
/// starting at `partition_offset`.
pub fn read_boot_sector<R: Read + Seek>(
    reader: &mut R,
    partition_offset: u64,
) -> Result<(Geometry, FsInfo), FatError> {
    reader.seek(SeekFrom::Start(partition_offset))?;
    let mut bpb = [0u8; BOOT_SECTOR_SIZE];
    reader
        .read_exact(&mut bpb)
        .map_err(|e| FatError::from_header_read("boot sector", e))?;
    let geometry = Geometry::parse(&bpb)?;
    debug!(
        "FAT32 geometry: {} B/sector, {} sectors/cluster, {} reserved, {} FAT(s) x {} sectors, root cluster {}",
        geometry.bytes_per_sector,
        geometry.sectors_per_cluster,
        geometry.reserved_sectors,
        geometry.num_fats,
        geometry.sectors_per_fat,
        geometry.root_cluster,
    );

    reader.seek(SeekFrom::Start(partition_offset + geometry.fs_info_offset()))?;
    let mut info = [0u8; FS_INFO_SIZE];
    reader
        .read_exact(&mut info)
        .map_err(|e| FatError::from_header_read("FS information sector", e))?;
    let fs_info = FsInfo::parse(&info)?;
    if !fs_info.is_valid() {
        warn!(
            "FS information sector {} has bad signatures ({:08X}/{:08X}/{:08X})",
            geometry.fs_info_sector,
            fs_info.lead_signature,
            fs_info.struct_signature,
            fs_info.trail_signature,
        );
    }

    Ok((geometry, fs_info))
}

/// Decode a fixed-width text field byte-for-byte, keeping the padding.
fn latin1_field(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
