//! In-process node cluster over a shared channel directory.
//!
//! Nodes tick in spawn order within each simulated second, which mirrors
//! the steady-state interleaving of the real per-process deployment: a
//! frame written this second is readable by nodes ticking later in the
//! same second, and by everyone else next second.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use filament_stack::channel::ChannelId;
use filament_stack::node::{Node, NodeConfig};
use filament_stack::wire::NodeId;

struct Slot {
    node: Node,
    halted: bool,
}

/// A set of in-process nodes driven tick by tick.
pub struct Cluster {
    channel_dir: PathBuf,
    output_dir: PathBuf,
    slots: Vec<Slot>,
    sec: u32,
}

impl Cluster {
    pub fn new(channel_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Cluster {
            channel_dir: channel_dir.into(),
            output_dir: output_dir.into(),
            slots: Vec::new(),
            sec: 0,
        }
    }

    /// Add a node to the cluster, pointing it at the cluster's shared
    /// directories. Nodes tick in spawn order.
    pub fn spawn(&mut self, cfg: NodeConfig) -> io::Result<NodeId> {
        let cfg = cfg.with_dirs(&self.channel_dir, &self.output_dir);
        let node = Node::new(cfg)?;
        let id = node.id();
        self.slots.push(Slot {
            node,
            halted: false,
        });
        Ok(id)
    }

    /// Stop ticking a node, simulating a crash. Its channels stay on disk;
    /// its buffered output is never flushed.
    pub fn halt(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.node.id() == id) {
            slot.halted = true;
        }
    }

    /// Tick one node at the current second without advancing the clock —
    /// for tests that need to interleave fault injection mid-second.
    pub fn tick_node(&mut self, id: NodeId) -> io::Result<()> {
        let sec = self.sec;
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.node.id() == id && !s.halted)
        {
            slot.node.tick(sec)?;
        }
        Ok(())
    }

    /// Advance the simulated clock by one second.
    pub fn advance(&mut self) {
        self.sec += 1;
    }

    /// One full simulated second: every live node ticks, then the clock
    /// advances.
    pub fn step(&mut self) -> io::Result<()> {
        let sec = self.sec;
        for slot in self.slots.iter_mut().filter(|s| !s.halted) {
            slot.node.tick(sec)?;
        }
        self.advance();
        Ok(())
    }

    pub fn run(&mut self, secs: u32) -> io::Result<()> {
        for _ in 0..secs {
            self.step()?;
        }
        Ok(())
    }

    /// Flush every live node's received data to the output directory.
    pub fn finish(&mut self) -> io::Result<()> {
        for slot in self.slots.iter_mut().filter(|s| !s.halted) {
            slot.node.finish()?;
        }
        Ok(())
    }

    pub fn sec(&self) -> u32 {
        self.sec
    }

    /// Inspect a node's layers.
    pub fn node(&self, id: NodeId) -> &Node {
        &self
            .slots
            .iter()
            .find(|s| s.node.id() == id)
            .expect("unknown node id")
            .node
    }

    // ─── Fault Injection & Inspection ───────────────────────────────────

    fn channel_path(&self, from: NodeId, to: NodeId) -> PathBuf {
        self.channel_dir.join(ChannelId { from, to }.file_name())
    }

    /// Flip one bit of one byte in a channel file — a frame already read
    /// by the receiver is unaffected, one still in flight is corrupted.
    pub fn corrupt_byte(&self, from: NodeId, to: NodeId, offset: u64) -> io::Result<()> {
        let path = self.channel_path(from, to);
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut byte = [0u8; 1];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut byte)?;
        byte[0] ^= 0x01;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&byte)
    }

    /// Raw contents of a channel file ("" if it does not exist yet).
    pub fn channel_bytes(&self, from: NodeId, to: NodeId) -> io::Result<Vec<u8>> {
        read_or_empty(&self.channel_path(from, to))
    }

    /// A node's reassembled output file ("" if it never received).
    pub fn output(&self, id: NodeId) -> io::Result<String> {
        let path = self.output_dir.join(format!("thenode{id}recieved.txt"));
        Ok(String::from_utf8_lossy(&read_or_empty(&path)?).into_owned())
    }

    /// Every channel file currently on disk.
    pub fn channels_on_disk(&self) -> io::Result<Vec<ChannelId>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.channel_dir)? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(ChannelId::parse) {
                out.push(id);
            }
        }
        out.sort();
        Ok(out)
    }
}

fn read_or_empty(path: &Path) -> io::Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
