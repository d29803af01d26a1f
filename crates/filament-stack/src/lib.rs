//! # filament-stack
//!
//! The Filament protocol stack: a three-layer datagram network for nodes
//! that talk to their neighbors through append-only file channels.
//!
//! Each node is an independent process owning one instance of every layer.
//! The layers are pure state machines — they never touch the filesystem —
//! and communicate through event values drained by the owning [`node::Node`],
//! which is also the only place that drives the channel substrate.
//!
//! ## Crate structure
//!
//! - [`wire`] — frame / packet / segment codecs, checksums, `NodeId`
//! - [`channel`] — file-channel substrate: discovery, bookmarks, appends
//! - [`datalink`] — frame reassembly, corruption recovery, resync
//! - [`network`] — LSP flooding, Dijkstra routing, forwarding
//! - [`transport`] — fragmentation, NACK generation, retransmission, reassembly
//! - [`neighbors`] — neighbor liveness pulses
//! - [`node`] — configuration, validation, and the per-tick schedule

pub mod channel;
pub mod datalink;
pub mod neighbors;
pub mod network;
pub mod node;
pub mod transport;
pub mod wire;
