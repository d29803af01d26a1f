//! # Channel Substrate
//!
//! The shared medium between nodes: one append-only file per directed link,
//! named `from<X>to<Y>.txt` in a common channel directory. The filename is
//! the sole encoding of link identity.
//!
//! Exactly one node writes each channel (X) and exactly one reads it (Y).
//! Writes are whole-frame appends; reads are offset-bookmarked sweeps to
//! EOF. Writer and reader touch disjoint byte ranges, so no locking is
//! needed; a reader that catches a frame mid-write simply sees a short
//! read and picks the tail up next tick.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::wire::NodeId;

// ─── Channel Identity ───────────────────────────────────────────────────────

/// A directed link `from → to`, as encoded by a channel filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelId {
    pub from: NodeId,
    pub to: NodeId,
}

impl ChannelId {
    /// The filename this link lives under.
    pub fn file_name(&self) -> String {
        format!("from{}to{}.txt", self.from, self.to)
    }

    /// Parse a filename of the exact form `from<X>to<Y>.txt`.
    pub fn parse(name: &str) -> Option<ChannelId> {
        let rest = name.strip_prefix("from")?;
        let bytes = rest.as_bytes();
        let from = NodeId::from_digit(*bytes.first()?)?;
        let rest = rest[1..].strip_prefix("to")?;
        let bytes = rest.as_bytes();
        let to = NodeId::from_digit(*bytes.first()?)?;
        (&rest[1..] == ".txt").then_some(ChannelId { from, to })
    }
}

// ─── Channel Directory ──────────────────────────────────────────────────────

/// One node's view of the channel directory: appends to outbound links,
/// bookmark-tracked reads from inbound ones.
#[derive(Debug)]
pub struct ChannelDir {
    root: PathBuf,
    me: NodeId,
    /// Next byte offset to read, per discovered inbound channel.
    bookmarks: BTreeMap<ChannelId, u64>,
}

impl ChannelDir {
    pub fn new(root: impl Into<PathBuf>, me: NodeId) -> Self {
        ChannelDir {
            root: root.into(),
            me,
            bookmarks: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append a complete frame to the outbound channel toward `to`.
    /// Creates the channel file on first use.
    pub fn append(&self, to: NodeId, frame: &[u8]) -> io::Result<()> {
        let path = self.root.join(ChannelId { from: self.me, to }.file_name());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(frame)
    }

    /// Scan the channel directory for inbound channels (`to == me`) not yet
    /// tracked, starting each at bookmark 0.
    pub fn discover(&mut self) -> io::Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(channel) = ChannelId::parse(name) else {
                continue;
            };
            if channel.to == self.me && !self.bookmarks.contains_key(&channel) {
                debug!(node = %self.me, channel = name, "tracking inbound channel");
                self.bookmarks.insert(channel, 0);
            }
        }
        Ok(())
    }

    /// Read every tracked inbound channel from its bookmark to EOF,
    /// advancing bookmarks over the bytes returned. Channels with nothing
    /// new are omitted.
    pub fn poll(&mut self) -> io::Result<Vec<(NodeId, Bytes)>> {
        let mut arrived = Vec::new();
        for (channel, bookmark) in self.bookmarks.iter_mut() {
            let path = self.root.join(channel.file_name());
            let mut file = match File::open(&path) {
                Ok(f) => f,
                // A reset between ticks may have removed the file.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            file.seek(SeekFrom::Start(*bookmark))?;
            let mut chunk = Vec::new();
            file.read_to_end(&mut chunk)?;
            if !chunk.is_empty() {
                *bookmark += chunk.len() as u64;
                arrived.push((channel.from, Bytes::from(chunk)));
            }
        }
        Ok(arrived)
    }

    /// Current bookmark for a tracked inbound channel.
    pub fn bookmark(&self, channel: ChannelId) -> Option<u64> {
        self.bookmarks.get(&channel).copied()
    }

    /// Inbound channels discovered so far.
    pub fn inbound(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.bookmarks.keys().copied()
    }
}
