//! # Transport Layer
//!
//! Pure logic — no I/O. Fragments the node's application message into
//! sequence-numbered segments, detects receive-side gaps by timeout,
//! answers NACKs with retransmissions, and reassembles everything received
//! for the shutdown flush.
//!
//! ## Reliability model
//!
//! The receiver is the active party: after five silent ticks it scans its
//! sequence space and NACKs every hole, or sends one *terminal* NACK
//! (past the sender's highest sequence) meaning "I have it all" — the
//! sender's cue to clear its retransmission buffer. A sender that hears
//! nothing at all for twenty ticks re-sends the whole buffer.
//!
//! Send-side and receive-side sequence tracking are independent:
//! `next_tx_seq` for fragments going out, one high-water mark per source
//! for fragments coming in.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::wire::{NodeId, Segment, FRAGMENT_LEN, SEQ_MOD};

/// Silent ticks before a receiver runs gap detection for a source.
pub const GAP_TIMEOUT_TICKS: i8 = 5;

/// Ticks a sender waits for any NACK before re-sending its whole buffer.
pub const RETRANSMIT_TICKS: i8 = 20;

// ─── Received Fragments ─────────────────────────────────────────────────────

/// One received data fragment, held until the shutdown flush.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RxFragment {
    source: NodeId,
    seq: u8,
    body: Vec<u8>,
}

// ─── Transport ──────────────────────────────────────────────────────────────

/// Transport-layer state machine. Methods return the segments the node
/// should hand to the network layer, routed by [`Segment::network_dest`].
#[derive(Debug)]
pub struct Transport {
    id: NodeId,
    /// Sequence number for the next outbound fragment.
    next_tx_seq: u8,
    /// Highest sequence number received, per source.
    highest_rx: BTreeMap<NodeId, u8>,
    /// Everything received, deduplicated on `(source, seq)`.
    buffer: Vec<RxFragment>,
    /// Outbound fragments retained for retransmission, in send order.
    ack_buffer: Vec<(u8, Segment)>,
    /// Per-source countdown to gap detection; −1 is dormant.
    gap_timers: BTreeMap<NodeId, i8>,
    /// Countdown to a blanket retransmission; −1 is dormant.
    nack_timer: i8,
}

impl Transport {
    pub fn new(id: NodeId) -> Self {
        Transport {
            id,
            next_tx_seq: 0,
            highest_rx: BTreeMap::new(),
            buffer: Vec::new(),
            ack_buffer: Vec::new(),
            gap_timers: BTreeMap::new(),
            nack_timer: -1,
        }
    }

    /// Fragment `message` toward `dest`, retaining every fragment for
    /// retransmission. Empty messages produce nothing.
    pub fn send_message(&mut self, message: &str, dest: NodeId) -> Vec<Segment> {
        let mut out = Vec::new();
        for chunk in message.as_bytes().chunks(FRAGMENT_LEN) {
            let segment = Segment::Data {
                source: self.id,
                dest,
                seq: self.next_tx_seq,
                body: chunk.to_vec(),
            };
            self.ack_buffer.push((self.next_tx_seq, segment.clone()));
            self.next_tx_seq = (self.next_tx_seq + 1) % SEQ_MOD;
            self.nack_timer = RETRANSMIT_TICKS;
            out.push(segment);
        }
        debug!(node = %self.id, dest = %dest, fragments = out.len(), "message fragmented");
        out
    }

    /// Build a NACK asking `source` to re-send `seq` — used both by gap
    /// detection and by the datalink's corruption recovery.
    pub fn nack(&self, source: NodeId, seq: u8) -> Segment {
        Segment::Nack {
            source: self.id,
            dest: source,
            seq,
        }
    }

    /// Advance both timer families by one tick, returning any NACKs or
    /// retransmissions that came due.
    pub fn tick(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();

        let mut due = Vec::new();
        for (&source, timer) in self.gap_timers.iter_mut() {
            if *timer > 0 {
                *timer -= 1;
                if *timer == 0 {
                    *timer = -1;
                    due.push(source);
                }
            }
        }
        for source in due {
            out.extend(self.detect_gaps(source));
        }

        if self.nack_timer >= 0 {
            self.nack_timer -= 1;
            if self.nack_timer == 0 && !self.ack_buffer.is_empty() {
                info!(
                    node = %self.id,
                    fragments = self.ack_buffer.len(),
                    "no acknowledgment heard, re-sending buffer"
                );
                out.extend(self.ack_buffer.iter().map(|(_, seg)| seg.clone()));
            }
        }

        out
    }

    /// Scan `[0 ..= highest]` for `source` and NACK every missing
    /// sequence; with no gaps, emit the terminal NACK instead.
    fn detect_gaps(&self, source: NodeId) -> Vec<Segment> {
        let Some(&highest) = self.highest_rx.get(&source) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for seq in 0..=highest {
            if !self.is_buffered(source, seq) {
                info!(node = %self.id, source = %source, seq, "gap detected, sending NACK");
                out.push(self.nack(source, seq));
            }
        }
        if out.is_empty() {
            let terminal = (highest + 2) % SEQ_MOD;
            debug!(node = %self.id, source = %source, seq = terminal, "all received, sending terminal NACK");
            out.push(self.nack(source, terminal));
        }
        out
    }

    /// Process a segment the network layer delivered to this node.
    pub fn receive(&mut self, segment: Segment) -> Vec<Segment> {
        match segment {
            Segment::Data {
                source, seq, body, ..
            } => {
                self.highest_rx
                    .entry(source)
                    .and_modify(|h| {
                        if seq >= *h {
                            *h = seq;
                        }
                    })
                    .or_insert(seq);
                if self.is_buffered(source, seq) {
                    debug!(node = %self.id, source = %source, seq, "duplicate fragment ignored");
                } else {
                    self.buffer.push(RxFragment { source, seq, body });
                }
                self.gap_timers.insert(source, GAP_TIMEOUT_TICKS);
                Vec::new()
            }
            Segment::Nack { source, seq, .. } => {
                info!(node = %self.id, from = %source, seq, "NACK received");
                if seq > self.next_tx_seq {
                    // Terminal: the receiver has everything.
                    self.ack_buffer.clear();
                    return Vec::new();
                }
                // Everything below the NACKed sequence is implicitly acked.
                self.ack_buffer.retain(|(s, _)| *s >= seq);
                self.ack_buffer
                    .iter()
                    .find(|(s, _)| *s == seq)
                    .map(|(_, seg)| vec![seg.clone()])
                    .unwrap_or_default()
            }
        }
    }

    fn is_buffered(&self, source: NodeId, seq: u8) -> bool {
        self.buffer
            .iter()
            .any(|f| f.source == source && f.seq == seq)
    }

    /// Reassemble everything received into one `(source, text)` line per
    /// source, fragments ordered by sequence number.
    pub fn reassemble(&self) -> Vec<(NodeId, String)> {
        let mut fragments: Vec<&RxFragment> = self.buffer.iter().collect();
        fragments.sort_by_key(|f| (f.source, f.seq));

        let mut out: Vec<(NodeId, String)> = Vec::new();
        for fragment in fragments {
            let text = String::from_utf8_lossy(&fragment.body);
            match out.last_mut() {
                Some((source, line)) if *source == fragment.source => line.push_str(&text),
                _ => out.push((fragment.source, text.into_owned())),
            }
        }
        out
    }

    // ─── Introspection (used by the node and by tests) ──────────────────

    pub fn next_tx_seq(&self) -> u8 {
        self.next_tx_seq
    }

    pub fn highest_rx(&self, source: NodeId) -> Option<u8> {
        self.highest_rx.get(&source).copied()
    }

    pub fn ack_buffer_len(&self) -> usize {
        self.ack_buffer.len()
    }

    pub fn buffered_from(&self, source: NodeId) -> usize {
        self.buffer.iter().filter(|f| f.source == source).count()
    }
}
