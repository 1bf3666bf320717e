use std::io::{Read, Seek};

use log::warn;

use super::dir_entry::FatFile;
use super::table::ChainCursor;
use super::volume::Fat32Volume;
use crate::error::FatError;

impl<R: Read + Seek> Fat32Volume<R> {
    /// Read up to `length` bytes of `file` starting at byte `offset`.
    ///
    /// Regular files are bounded by their recorded size, so a request that
    /// starts at or past the end returns nothing. Directories have no
    /// reliable size and are bounded only by their chain. Fails with
    /// [`FatError::Bounds`] when the chain ends before the range is filled.
    pub fn read(
        &mut self,
        file: &FatFile,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, FatError> {
        let limit = file.effective_len();
        if offset >= limit {
            return Ok(Vec::new());
        }
        let length = (length as u64).min(limit - offset) as usize;
        if length == 0 {
            return Ok(Vec::new());
        }

        let cluster_bytes = self.geometry().cluster_bytes();
        let mut chain = ChainCursor::new(file.start_cluster());
        let mut current = chain.advance(self.table());
        for _ in 0..offset / cluster_bytes {
            if current.is_none() {
                break;
            }
            current = chain.advance(self.table());
        }

        let mut within = offset % cluster_bytes;
        let mut out = Vec::new();
        while out.len() < length {
            let Some(cluster) = current else {
                if let Some(anomaly) = chain.anomaly() {
                    warn!("Read of cluster chain at {} cut short: {anomaly}", file.start_cluster());
                }
                return Err(FatError::Bounds {
                    offset,
                    requested: length,
                    available: out.len(),
                });
            };
            let want = (length - out.len()).min((cluster_bytes - within) as usize);
            let chunk = self.read_in_cluster(cluster, within, want)?;
            out.extend_from_slice(&chunk);
            within = 0;
            if out.len() < length {
                current = chain.advance(self.table());
            }
        }
        Ok(out)
    }

    /// Read the whole content of a regular file.
    pub fn read_to_end(&mut self, file: &FatFile) -> Result<Vec<u8>, FatError> {
        if file.is_directory() {
            return Err(FatError::Format(format!(
                "cluster {} is a directory, not a file",
                file.start_cluster()
            )));
        }
        let size = usize::try_from(file.size())
            .map_err(|_| FatError::Format("file too large for memory".into()))?;
        self.read(file, 0, size)
    }
}
