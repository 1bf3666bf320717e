//! In-memory FAT32 image builder for unit tests.

use std::collections::BTreeMap;
use std::io::Cursor;

use super::table::END_OF_CHAIN;
use super::volume::Fat32Volume;

pub struct TestImage {
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    reserved_sectors: u32,
    num_fats: u32,
    sectors_per_fat: u32,
    hidden_sectors: u32,
    root_cluster: u32,
    data_clusters: u32,
    fat: Vec<u32>,
    clusters: BTreeMap<u32, Vec<u8>>,
}

impl TestImage {
    /// 512-byte sectors, one sector per cluster, 32 reserved sectors, one
    /// single-sector FAT, root directory in cluster 2.
    pub fn new() -> Self {
        let mut fat = vec![0u32; 128];
        fat[0] = 0x0FFF_FFF8;
        fat[1] = 0xFFFF_FFFF;
        fat[2] = END_OF_CHAIN;
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            num_fats: 1,
            sectors_per_fat: 1,
            hidden_sectors: 0,
            root_cluster: 2,
            data_clusters: 16,
            fat,
            clusters: BTreeMap::new(),
        }
    }

    pub fn sectors_per_cluster(mut self, n: u32) -> Self {
        self.sectors_per_cluster = n;
        self
    }

    pub fn hidden_sectors(mut self, n: u32) -> Self {
        self.hidden_sectors = n;
        self
    }

    /// Set a raw FAT entry.
    pub fn fat(mut self, cluster: u32, value: u32) -> Self {
        self.fat[cluster as usize] = value;
        self
    }

    /// Link `clusters` in order and terminate the last one.
    pub fn chain(mut self, clusters: &[u32]) -> Self {
        for pair in clusters.windows(2) {
            self.fat[pair[0] as usize] = pair[1];
        }
        if let Some(&last) = clusters.last() {
            self.fat[last as usize] = END_OF_CHAIN;
        }
        self
    }

    /// Place bytes at the start of a cluster.
    pub fn cluster_data(mut self, cluster: u32, data: &[u8]) -> Self {
        let cluster_bytes = (self.bytes_per_sector * self.sectors_per_cluster) as usize;
        assert!(data.len() <= cluster_bytes, "data larger than a cluster");
        self.clusters.insert(cluster, data.to_vec());
        self
    }

    /// Place a list of 32-byte directory records at the start of a cluster.
    pub fn directory(self, cluster: u32, entries: &[[u8; 32]]) -> Self {
        let data: Vec<u8> = entries.iter().flatten().copied().collect();
        self.cluster_data(cluster, &data)
    }

    fn first_data_sector(&self) -> u64 {
        (self.reserved_sectors + self.hidden_sectors + self.sectors_per_fat * self.num_fats) as u64
    }

    fn cluster_offset(&self, cluster: u32) -> usize {
        let sector =
            self.first_data_sector() + (cluster as u64 - 2) * self.sectors_per_cluster as u64;
        (sector * self.bytes_per_sector as u64) as usize
    }

    pub fn build(&self) -> Vec<u8> {
        let bps = self.bytes_per_sector as usize;
        let total_sectors = self.reserved_sectors
            + self.sectors_per_fat * self.num_fats
            + self.data_clusters * self.sectors_per_cluster;
        let image_len =
            self.cluster_offset(self.data_clusters + 2).max(total_sectors as usize * bps);
        let mut image = vec![0u8; image_len];

        // Boot sector
        image[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        image[3..11].copy_from_slice(b"MSWIN4.1");
        image[11..13].copy_from_slice(&(self.bytes_per_sector as u16).to_le_bytes());
        image[13] = self.sectors_per_cluster as u8;
        image[14..16].copy_from_slice(&(self.reserved_sectors as u16).to_le_bytes());
        image[16] = self.num_fats as u8;
        image[21] = 0xF8;
        image[28..32].copy_from_slice(&self.hidden_sectors.to_le_bytes());
        image[32..36].copy_from_slice(&total_sectors.to_le_bytes());
        image[36..40].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        image[44..48].copy_from_slice(&self.root_cluster.to_le_bytes());
        image[48..50].copy_from_slice(&1u16.to_le_bytes());
        image[50..52].copy_from_slice(&6u16.to_le_bytes());
        image[66] = 0x29;
        image[67..71].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        image[71..82].copy_from_slice(b"TESTVOLUME ");
        image[82..90].copy_from_slice(b"FAT32   ");
        image[510] = 0x55;
        image[511] = 0xAA;

        // FS Information Sector
        let info = bps;
        image[info..info + 4].copy_from_slice(&0x4161_5252u32.to_le_bytes());
        image[info + 484..info + 488].copy_from_slice(&0x6141_7272u32.to_le_bytes());
        image[info + 488..info + 492].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        image[info + 492..info + 496].copy_from_slice(&3u32.to_le_bytes());
        image[info + 508..info + 512].copy_from_slice(&0xAA55_0000u32.to_le_bytes());

        // FATs
        let fat_len = self.sectors_per_fat as usize * bps;
        for copy in 0..self.num_fats as usize {
            let base = self.reserved_sectors as usize * bps + copy * fat_len;
            for (i, value) in self.fat.iter().enumerate().take(fat_len / 4) {
                image[base + i * 4..base + i * 4 + 4].copy_from_slice(&value.to_le_bytes());
            }
        }

        for (&cluster, data) in &self.clusters {
            let off = self.cluster_offset(cluster);
            image[off..off + data.len()].copy_from_slice(data);
        }

        image
    }

    pub fn open(&self) -> Fat32Volume<Cursor<Vec<u8>>> {
        Fat32Volume::open(Cursor::new(self.build()), 0).unwrap()
    }
}

/// Encode a short directory record. `name` is the 11-byte 8.3 field.
pub fn dir_entry(name: &[u8; 11], attr: u8, cluster: u32, length: u32) -> [u8; 32] {
    let mut entry = [0u8; 32];
    entry[0..11].copy_from_slice(name);
    entry[11] = attr;
    entry[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    entry[26..28].copy_from_slice(&((cluster & 0xFFFF) as u16).to_le_bytes());
    entry[28..32].copy_from_slice(&length.to_le_bytes());
    entry
}
