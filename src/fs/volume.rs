use std::io::{Read, Seek, SeekFrom};

use super::boot_sector::{read_boot_sector, FsInfo, Geometry};
use super::dir_entry::FatFile;
use super::table::AllocationTable;
use crate::error::FatError;

/// A read-only FAT32 volume: geometry, the loaded allocation table and the
/// underlying image.
pub struct Fat32Volume<R> {
    reader: R,
    /// Byte offset of the volume within the reader.
    partition_offset: u64,
    geometry: Geometry,
    fs_info: FsInfo,
    table: AllocationTable,
}

impl<R: Read + Seek> Fat32Volume<R> {
    /// Open a FAT32 volume at the given offset within a reader.
    pub fn open(mut reader: R, partition_offset: u64) -> Result<Self, FatError> {
        let (geometry, fs_info) = read_boot_sector(&mut reader, partition_offset)?;
        let table = AllocationTable::load(&mut reader, partition_offset, &geometry)?;
        Ok(Self {
            reader,
            partition_offset,
            geometry,
            fs_info,
            table,
        })
    }

    /// Read up to `len` bytes from the start of `cluster`.
    pub fn read_cluster(&mut self, cluster: u32, len: usize) -> Result<Vec<u8>, FatError> {
        self.read_in_cluster(cluster, 0, len)
    }

    /// Read up to `len` bytes starting `offset` bytes into `cluster`. The
    /// request is clamped to the end of the cluster. A short read on the
    /// image is an error.
    pub fn read_in_cluster(
        &mut self,
        cluster: u32,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, FatError> {
        if cluster < 2 {
            return Err(FatError::Format(format!(
                "cluster {cluster} has no data region"
            )));
        }
        let cluster_bytes = self.geometry.cluster_bytes();
        let len = (len as u64).min(cluster_bytes.saturating_sub(offset)) as usize;
        let position = self.cluster_offset(cluster) + offset;

        self.reader.seek(SeekFrom::Start(position))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R> Fat32Volume<R> {
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn fs_info(&self) -> &FsInfo {
        &self.fs_info
    }

    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    pub fn partition_offset(&self) -> u64 {
        self.partition_offset
    }

    /// First sector of `cluster`.
    pub fn cluster_sector(&self, cluster: u32) -> u64 {
        self.geometry.cluster_sector(cluster)
    }

    /// Absolute byte offset of `cluster` within the reader.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.partition_offset
            + self.cluster_sector(cluster) * self.geometry.bytes_per_sector as u64
    }

    /// Directory handle for the root directory. Its size is the root
    /// chain's length in clusters, which is only approximate if the chain
    /// is damaged.
    pub fn root(&self) -> FatFile {
        let clusters = self.table.chain_length(self.geometry.root_cluster) as u64;
        let size = clusters * self.geometry.cluster_bytes();
        FatFile::root(self.geometry.root_cluster, size.min(u32::MAX as u64) as u32)
    }
}
