//! # Node
//!
//! Ties one instance of every layer together with the neighbor table and
//! the channel substrate, and runs the per-tick schedule:
//!
//! 1. own LSP emission (every [`LSP_INTERVAL`] ticks)
//! 2. datalink inbound sweep — validated payloads cascade synchronously
//!    through the network layer and, for local deliveries, the transport
//! 3. transport timers (gap NACKs, silence retransmission)
//! 4. the one-shot transport send, at its configured tick
//! 5. neighbor pulse decrement and pruning
//!
//! The 1 Hz pacing lives in the binary, not here — a tick never sleeps,
//! so tests can drive whole topologies without wall-clock delay.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::channel::ChannelDir;
use crate::datalink::{Datalink, DatalinkEvent};
use crate::neighbors::NeighborTable;
use crate::network::{Network, NetworkEvent, LSP_INTERVAL};
use crate::transport::Transport;
use crate::wire::{self, NodeId, Payload, Segment};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Startup validation failures. All are fatal preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("node id {0} is not a single decimal digit")]
    InvalidId(u64),
    #[error("duration {0}s outside the supported 5..=180s")]
    InvalidDuration(u32),
    #[error("destination id {0} is not a single decimal digit")]
    InvalidDest(u64),
    #[error("message byte {0:#04x} is not printable ASCII")]
    UnprintableMessage(u8),
    #[error("starting time {start} outside 0..={duration}")]
    InvalidStart { start: i64, duration: u32 },
    #[error("a message and a starting time require each other")]
    MessageStartMismatch,
    #[error("neighbor id {0} is not a single decimal digit")]
    InvalidNeighbor(u64),
    #[error("a node cannot be its own neighbor")]
    SelfNeighbor,
}

/// The transport session a source node runs: one message, sent once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendJob {
    pub message: String,
    pub start_at: u32,
}

/// Validated node parameters; the only way to construct a [`Node`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub id: NodeId,
    pub duration: u32,
    pub dest: NodeId,
    pub send: Option<SendJob>,
    pub neighbors: Vec<NodeId>,
    pub channel_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl NodeConfig {
    /// Validate raw parameters. Non-source nodes pass an empty message
    /// and a starting time of −1.
    pub fn new(
        id: u8,
        duration: u32,
        dest: u8,
        message: &str,
        starting_time: i64,
        neighbors: &[u8],
    ) -> Result<Self, ConfigError> {
        let id = NodeId::new(id).ok_or(ConfigError::InvalidId(id as u64))?;
        if !(5..=180).contains(&duration) {
            return Err(ConfigError::InvalidDuration(duration));
        }
        let dest = NodeId::new(dest).ok_or(ConfigError::InvalidDest(dest as u64))?;

        if let Some(&b) = message.as_bytes().iter().find(|b| !(32..127).contains(*b)) {
            return Err(ConfigError::UnprintableMessage(b));
        }

        let send = match (message.is_empty(), starting_time) {
            (true, -1) => None,
            (true, _) | (false, -1) => return Err(ConfigError::MessageStartMismatch),
            (false, start) => {
                if !(0..=duration as i64).contains(&start) {
                    return Err(ConfigError::InvalidStart { start, duration });
                }
                Some(SendJob {
                    message: message.to_string(),
                    start_at: start as u32,
                })
            }
        };

        let mut ids = Vec::new();
        for &n in neighbors {
            let n = NodeId::new(n).ok_or(ConfigError::InvalidNeighbor(n as u64))?;
            if n == id {
                return Err(ConfigError::SelfNeighbor);
            }
            if !ids.contains(&n) {
                ids.push(n);
            }
        }

        Ok(NodeConfig {
            id,
            duration,
            dest,
            send,
            neighbors: ids,
            channel_dir: PathBuf::from("channels"),
            output_dir: PathBuf::from("output"),
        })
    }

    /// Override the channel and output directories (the defaults are the
    /// conventional `channels/` and `output/` in the working directory).
    pub fn with_dirs(mut self, channel_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        self.channel_dir = channel_dir.into();
        self.output_dir = output_dir.into();
        self
    }
}

// ─── Node ───────────────────────────────────────────────────────────────────

/// One simulated network node: the three layers, the neighbor table, and
/// the channel substrate, driven tick by tick.
#[derive(Debug)]
pub struct Node {
    cfg: NodeConfig,
    neighbors: NeighborTable,
    channels: ChannelDir,
    datalink: Datalink,
    network: Network,
    transport: Transport,
}

impl Node {
    /// Build a node, creating the channel and output directories if absent.
    pub fn new(cfg: NodeConfig) -> io::Result<Self> {
        fs::create_dir_all(&cfg.channel_dir)?;
        fs::create_dir_all(&cfg.output_dir)?;
        Ok(Node {
            neighbors: NeighborTable::new(cfg.neighbors.iter().copied()),
            channels: ChannelDir::new(&cfg.channel_dir, cfg.id),
            datalink: Datalink::new(),
            network: Network::new(cfg.id),
            transport: Transport::new(cfg.id),
            cfg,
        })
    }

    pub fn id(&self) -> NodeId {
        self.cfg.id
    }

    pub fn duration(&self) -> u32 {
        self.cfg.duration
    }

    /// Run one second of the node's life. `sec` counts from 0.
    pub fn tick(&mut self, sec: u32) -> io::Result<()> {
        if sec % LSP_INTERVAL == 0 {
            let payload = self.network.build_lsp(&self.neighbors);
            let hops: Vec<NodeId> = self.neighbors.ids().collect();
            for hop in hops {
                self.transmit(payload, hop)?;
            }
        }

        self.channels.discover()?;
        for (from, chunk) in self.channels.poll()? {
            let mut events = Vec::new();
            self.datalink.ingest(from, &chunk, &mut events);
            for event in events {
                match event {
                    DatalinkEvent::Payload { from, payload } => {
                        self.network_ingress(payload, from)?;
                    }
                    DatalinkEvent::Corrupt { hint: Some((source, seq)) } => {
                        let nack = self.transport.nack(source, seq);
                        self.send_segment(nack)?;
                    }
                    // Nothing to NACK; the datalink already logged it.
                    DatalinkEvent::Corrupt { hint: None } => {}
                }
            }
        }

        for segment in self.transport.tick() {
            self.send_segment(segment)?;
        }

        if let Some(job) = self.cfg.send.clone() {
            if job.start_at == sec {
                info!(node = %self.id(), dest = %self.cfg.dest, "starting transport session");
                for segment in self.transport.send_message(&job.message, self.cfg.dest) {
                    self.send_segment(segment)?;
                }
            }
        }

        for dead in self.neighbors.tick() {
            warn!(node = %self.id(), neighbor = %dead, "neighbor pulse expired, pruned");
        }

        Ok(())
    }

    /// Flush everything the transport received to the output file, one
    /// line per source. Called once, after the final tick.
    pub fn finish(&mut self) -> io::Result<()> {
        let lines = self.transport.reassemble();
        if lines.is_empty() {
            return Ok(());
        }
        let path = self
            .cfg
            .output_dir
            .join(format!("thenode{}recieved.txt", self.id()));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for (source, text) in lines {
            writeln!(file, "from {source} receieved: {text}")?;
        }
        Ok(())
    }

    fn network_ingress(&mut self, payload: Payload, from: NodeId) -> io::Result<()> {
        let mut events = Vec::new();
        self.network
            .ingress(&payload, from, &mut self.neighbors, &mut events);
        for event in events {
            match event {
                NetworkEvent::Transmit { payload, next_hop } => {
                    self.transmit(payload, next_hop)?;
                }
                NetworkEvent::Deliver { segment } => match Segment::decode(&segment) {
                    Some(segment) => {
                        for reply in self.transport.receive(segment) {
                            self.send_segment(reply)?;
                        }
                    }
                    None => {
                        warn!(node = %self.id(), "undecodable segment delivered, dropping");
                    }
                },
            }
        }
        Ok(())
    }

    fn send_segment(&mut self, segment: Segment) -> io::Result<()> {
        let dest = segment.network_dest();
        if let Some((payload, next_hop)) = self.network.egress(&segment.encode(), dest) {
            self.transmit(payload, next_hop)?;
        }
        Ok(())
    }

    fn transmit(&mut self, payload: Payload, next_hop: NodeId) -> io::Result<()> {
        if !self.neighbors.contains(next_hop) {
            warn!(node = %self.id(), next_hop = %next_hop, "next hop is not a live neighbor, dropping frame");
            return Ok(());
        }
        self.channels.append(next_hop, &wire::encode_frame(&payload))
    }

    // ─── Introspection (used by the sim harness and tests) ──────────────

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn neighbor_ids(&self) -> Vec<NodeId> {
        self.neighbors.ids().collect()
    }
}
