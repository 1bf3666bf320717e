//! Depth-first walk of the directory tree.
//!
//! The walk counts real entries, follows every entry's chain to find the
//! highest cluster the tree reaches, and reports each record it accepts to a
//! visitor. "." and ".." are reported but never counted or descended into.
//! A subdirectory whose start cluster repeats one of its ancestors is
//! recorded as a [`ChainAnomaly::DirectoryCycle`] and not entered.

use std::io::{Read, Seek};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::dir_entry::{EntryKind, FatFile, ShortDirEntry};
use super::dir_stream::DirCursor;
use super::table::{AllocationTable, ChainAnomaly};
use super::volume::Fat32Volume;
use crate::error::FatError;

/// Counters accumulated over one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    /// Real entries: files, subdirectories and volume labels, without "."
    /// and "..".
    pub entries: u64,
    pub files: u64,
    pub directories: u64,
    /// Deleted, vacant and long-name records passed over.
    pub skipped: u64,
    /// Highest cluster reached by any visited chain, 0 if none.
    pub max_cluster: u32,
    /// Deepest level at which an entry was visited (root children are 0).
    pub max_depth: usize,
    pub anomalies: Vec<ChainAnomaly>,
}

impl WalkStats {
    /// Follow `head` through the table, raising `max_cluster` and keeping
    /// any anomaly that cut the chain short.
    fn follow_chain(&mut self, table: &AllocationTable, head: u32) {
        let mut chain = table.chain(head);
        if let Some(max) = chain.by_ref().max() {
            self.max_cluster = self.max_cluster.max(max);
        }
        if let Some(anomaly) = chain.into_anomaly() {
            self.record(anomaly);
        }
    }

    fn record(&mut self, anomaly: ChainAnomaly) {
        warn!("Chain anomaly: {anomaly}");
        self.anomalies.push(anomaly);
    }
}

/// A record accepted by the walk, as handed to the visitor.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    /// Nesting level; entries of the root directory are at depth 0.
    pub depth: usize,
    pub entry: &'a ShortDirEntry,
    pub kind: EntryKind,
}

impl Visit<'_> {
    /// True for "." and "..".
    pub fn is_meta(&self) -> bool {
        matches!(self.kind, EntryKind::SelfLink | EntryKind::ParentLink)
    }

    /// True for the volume label record. It is counted like a file.
    pub fn is_volume_label(&self) -> bool {
        self.entry.is_volume_label()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeWalker {
    max_depth: Option<usize>,
}

impl TreeWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not descend into directories deeper than `depth` (root children
    /// are depth 0, so `Some(0)` lists only the root).
    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Walk the whole tree from the root directory.
    pub fn walk<R, F>(
        &self,
        volume: &mut Fat32Volume<R>,
        visit: &mut F,
    ) -> Result<WalkStats, FatError>
    where
        R: Read + Seek,
        F: FnMut(&Visit<'_>),
    {
        let root = volume.root();
        let mut stats = WalkStats::default();
        stats.follow_chain(volume.table(), root.start_cluster());

        let mut ancestors = vec![root.start_cluster()];
        let stats = self.walk_directory(volume, &root, 0, &mut ancestors, stats, visit)?;
        debug!(
            "Walk finished: {} entries ({} files, {} directories), max cluster {}",
            stats.entries, stats.files, stats.directories, stats.max_cluster
        );
        Ok(stats)
    }

    fn walk_directory<R, F>(
        &self,
        volume: &mut Fat32Volume<R>,
        dir: &FatFile,
        depth: usize,
        ancestors: &mut Vec<u32>,
        mut stats: WalkStats,
        visit: &mut F,
    ) -> Result<WalkStats, FatError>
    where
        R: Read + Seek,
        F: FnMut(&Visit<'_>),
    {
        let mut cursor = DirCursor::new(dir);
        while let Some(entry) = cursor.next_entry(volume)? {
            let kind = entry.kind();
            match kind {
                EntryKind::Vacant | EntryKind::LongName => {
                    stats.skipped += 1;
                    continue;
                }
                EntryKind::SelfLink | EntryKind::ParentLink => {
                    visit(&Visit {
                        depth,
                        entry: &entry,
                        kind,
                    });
                    continue;
                }
                EntryKind::Real => {}
            }

            stats.follow_chain(volume.table(), entry.start_cluster());
            visit(&Visit {
                depth,
                entry: &entry,
                kind,
            });
            stats.entries += 1;
            stats.max_depth = stats.max_depth.max(depth);

            if !entry.is_directory() {
                stats.files += 1;
                continue;
            }
            stats.directories += 1;

            let start = entry.start_cluster();
            if ancestors.contains(&start) {
                stats.record(ChainAnomaly::DirectoryCycle {
                    cluster: start,
                    depth: depth + 1,
                });
                continue;
            }
            if self.max_depth.is_some_and(|max| depth + 1 > max) {
                continue;
            }

            ancestors.push(start);
            stats = self.walk_directory(
                volume,
                &FatFile::new(entry),
                depth + 1,
                ancestors,
                stats,
                visit,
            )?;
            ancestors.pop();
        }
        Ok(stats)
    }
}
