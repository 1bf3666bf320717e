//! Lazy enumeration of the raw records of a directory.
//!
//! Records are read one sector at a time and the stream crosses cluster
//! boundaries by following the directory's chain. The stream stops at the
//! first record whose name starts with 0x00, or when the chain runs out.
//! Deleted and long-name records are yielded like any other; filtering is up
//! to the caller.

use std::io::{Read, Seek};

use super::dir_entry::{FatFile, ShortDirEntry, DIR_ENTRY_SIZE};
use super::table::{ChainAnomaly, ChainCursor};
use super::volume::Fat32Volume;
use crate::error::FatError;

/// Position within a directory that does not borrow the volume, so a walker
/// can descend into a subdirectory between two records.
#[derive(Debug, Clone)]
pub struct DirCursor {
    chain: ChainCursor,
    cluster: Option<u32>,
    /// Next sector to load within `cluster`.
    sector_in_cluster: u32,
    sector: Vec<u8>,
    /// Next record within `sector`.
    index: usize,
    finished: bool,
}

impl DirCursor {
    pub fn new(dir: &FatFile) -> Self {
        Self {
            chain: ChainCursor::new(dir.start_cluster()),
            cluster: None,
            sector_in_cluster: 0,
            sector: Vec::new(),
            index: 0,
            finished: false,
        }
    }

    /// Next raw record, or `None` at the end of the directory.
    pub fn next_entry<R: Read + Seek>(
        &mut self,
        volume: &mut Fat32Volume<R>,
    ) -> Result<Option<ShortDirEntry>, FatError> {
        if self.finished {
            return Ok(None);
        }
        if (self.index + 1) * DIR_ENTRY_SIZE > self.sector.len() && !self.load_sector(volume)? {
            self.finished = true;
            return Ok(None);
        }

        let off = self.index * DIR_ENTRY_SIZE;
        let entry = ShortDirEntry::parse(&self.sector[off..off + DIR_ENTRY_SIZE])?;
        self.index += 1;
        if entry.is_end_of_directory() {
            self.finished = true;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Load the next sector of the directory. Returns `false` once the
    /// chain is exhausted.
    fn load_sector<R: Read + Seek>(
        &mut self,
        volume: &mut Fat32Volume<R>,
    ) -> Result<bool, FatError> {
        let sectors_per_cluster = volume.geometry().sectors_per_cluster;
        let bytes_per_sector = volume.geometry().bytes_per_sector;

        if self.cluster.is_none() || self.sector_in_cluster >= sectors_per_cluster {
            self.cluster = self.chain.advance(volume.table());
            self.sector_in_cluster = 0;
        }
        let Some(cluster) = self.cluster else {
            return Ok(false);
        };

        let offset = self.sector_in_cluster as u64 * bytes_per_sector as u64;
        self.sector = volume.read_in_cluster(cluster, offset, bytes_per_sector as usize)?;
        self.sector_in_cluster += 1;
        self.index = 0;
        Ok(true)
    }

    /// Why the directory's chain stopped early, if it did.
    pub fn anomaly(&self) -> Option<&ChainAnomaly> {
        self.chain.anomaly()
    }
}

/// Iterator form of [`DirCursor`] that holds the volume for its lifetime.
pub struct DirEntries<'a, R> {
    volume: &'a mut Fat32Volume<R>,
    cursor: DirCursor,
}

impl<R: Read + Seek> Iterator for DirEntries<'_, R> {
    type Item = Result<ShortDirEntry, FatError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.next_entry(&mut *self.volume) {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.cursor.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read + Seek> Fat32Volume<R> {
    /// Enumerate the raw records of `dir` from the beginning.
    pub fn entries(&mut self, dir: &FatFile) -> DirEntries<'_, R> {
        DirEntries {
            volume: self,
            cursor: DirCursor::new(dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dir_entry::ATTR_DIRECTORY;
    use crate::fs::test_image::{dir_entry, TestImage};

    fn names(volume: &mut Fat32Volume<std::io::Cursor<Vec<u8>>>, dir: &FatFile) -> Vec<String> {
        volume
            .entries(dir)
            .map(|e| e.unwrap().short_name())
            .collect()
    }

    fn numbered(i: usize) -> [u8; 32] {
        let name = format!("F{i:07}TXT");
        let mut raw = [0u8; 11];
        raw.copy_from_slice(name.as_bytes());
        dir_entry(&raw, 0x20, 0, i as u32)
    }

    #[test]
    fn test_stream_stops_at_end_marker() {
        let records: Vec<[u8; 32]> = (0..5).map(numbered).collect();
        let mut volume = TestImage::new().directory(2, &records).open();
        let root = volume.root();
        let entries: Vec<ShortDirEntry> =
            volume.entries(&root).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 5);
        for (i, e) in entries.iter().enumerate() {
            assert_eq!(e.length, i as u32);
        }
    }

    #[test]
    fn test_stream_crosses_sectors_and_clusters() {
        // 16 records per sector, 2 sectors per cluster: 40 records span
        // three sectors over two clusters. The rest of cluster 7 is zeroed,
        // which supplies the terminating record.
        let records: Vec<[u8; 32]> = (0..40).map(numbered).collect();
        let per_cluster = 1024 / 32;
        let mut volume = TestImage::new()
            .sectors_per_cluster(2)
            .chain(&[2, 7])
            .directory(2, &records[..per_cluster])
            .directory(7, &records[per_cluster..])
            .open();
        let root = volume.root();
        let found = names(&mut volume, &root);
        let expected: Vec<String> = (0..40).map(|i| format!("F{i:07}.TXT")).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_stream_ends_with_chain_when_full() {
        // Every record of the only cluster is used; no end marker exists.
        let records: Vec<[u8; 32]> = (0..16).map(numbered).collect();
        let mut volume = TestImage::new().directory(2, &records).open();
        let root = volume.root();
        assert_eq!(volume.entries(&root).count(), 16);
    }

    #[test]
    fn test_stream_yields_deleted_and_long_name_records() {
        let records = [
            dir_entry(b"\xE5ONE    TXT", 0x20, 0, 0),
            dir_entry(b"A\0\0\0\0\0\0\0\0\0\0", 0x0F, 0, 0),
            dir_entry(b"KEEP    TXT", 0x20, 0, 0),
        ];
        let mut volume = TestImage::new().directory(2, &records).open();
        let root = volume.root();
        let entries: Vec<ShortDirEntry> =
            volume.entries(&root).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_deleted());
        assert!(entries[1].is_long_name());
    }

    #[test]
    fn test_stream_is_restartable() {
        let records: Vec<[u8; 32]> = (0..3).map(numbered).collect();
        let mut volume = TestImage::new().directory(2, &records).open();
        let root = volume.root();
        let first = names(&mut volume, &root);
        let second = names(&mut volume, &root);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_cursor_allows_nested_reads() {
        let sub = dir_entry(b"SUB        ", ATTR_DIRECTORY, 3, 0);
        let file = dir_entry(b"INNER   TXT", 0x20, 0, 0);
        let mut volume = TestImage::new()
            .chain(&[3])
            .directory(2, &[sub, numbered(1)])
            .directory(3, &[file])
            .open();
        let root = volume.root();
        let mut outer = DirCursor::new(&root);

        let first = outer.next_entry(&mut volume).unwrap().unwrap();
        let sub_dir = FatFile::new(first);
        assert_eq!(names(&mut volume, &sub_dir), vec!["INNER.TXT"]);

        let second = outer.next_entry(&mut volume).unwrap().unwrap();
        assert_eq!(second.short_name(), "F0000001.TXT");
        assert!(outer.next_entry(&mut volume).unwrap().is_none());
    }

    #[test]
    fn test_looping_directory_chain_terminates() {
        let records: Vec<[u8; 32]> = (0..16).map(numbered).collect();
        let mut volume = TestImage::new()
            .fat(2, 5)
            .fat(5, 2)
            .directory(2, &records)
            .directory(5, &records)
            .open();
        let root = FatFile::new(ShortDirEntry::parse(&dir_entry(b"/          ", ATTR_DIRECTORY, 2, 0)).unwrap());
        let mut cursor = DirCursor::new(&root);
        let mut count = 0;
        while cursor.next_entry(&mut volume).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 32);
        assert!(matches!(cursor.anomaly(), Some(ChainAnomaly::Loop { .. })));
    }
}
