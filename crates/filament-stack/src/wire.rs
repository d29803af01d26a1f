//! # Filament Wire Format
//!
//! All-ASCII fixed-width framing. Every field offset in the stack lives in
//! this module; the layers above deal only in typed values.
//!
//! ## Frame (datalink, exactly 19 bytes)
//!
//! ```text
//! +----+---------------------------+----+
//! | XX |   payload (15 bytes)      | CS |
//! +----+---------------------------+----+
//!   2              15                2
//! ```
//!
//! `CS` is the zero-padded decimal sum of the payload's ASCII byte values,
//! modulo 100.
//!
//! ## Network packet (the 15-byte payload, discriminated by first byte)
//!
//! - Data: `"D" <dest:1> <len:02> <segment…>`, space-padded to 15
//! - LSP:  `"L" <origin:1> <seq:02> <neighbor digits…>`, space-padded to 15
//!
//! ## Transport segment (embedded in a data packet)
//!
//! - Data: `"D" <source:1> <dest:1> <seq:02> <fragment:≤5>`
//! - NACK: `"N" <source:1> <dest:1> <seq:02>`

use bytes::{BufMut, BytesMut};
use std::fmt;
use thiserror::Error;

// ─── Constants ───────────────────────────────────────────────────────────────

/// A complete frame on a channel: preamble + payload + checksum.
pub const FRAME_LEN: usize = 19;

/// The network-layer packet carried by every frame.
pub const PAYLOAD_LEN: usize = 15;

/// Frame-sync marker opening every frame.
pub const PREAMBLE: [u8; 2] = *b"XX";

/// Sequence numbers live in `[0..SEQ_MOD)` and wrap.
pub const SEQ_MOD: u8 = 100;

/// Maximum application bytes per transport data segment.
pub const FRAGMENT_LEN: usize = 5;

/// Byte count of the `"D" <dest> <len:02>` data-packet header.
const DATA_HEADER_LEN: usize = 4;

/// Byte count of the `"D" <source> <dest> <seq:02>` segment header
/// (a NACK segment is exactly this long).
const SEGMENT_HEADER_LEN: usize = 5;

// ─── Node Identity ───────────────────────────────────────────────────────────

/// A node address: a single decimal digit, `0..=9`.
///
/// Node ids double as wire bytes — the `Display` form is the on-wire form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u8);

impl NodeId {
    /// Create a `NodeId`, returning `None` unless `id` is a single digit.
    pub fn new(id: u8) -> Option<Self> {
        (id <= 9).then_some(NodeId(id))
    }

    /// Parse a `NodeId` from its ASCII digit byte.
    pub fn from_digit(byte: u8) -> Option<Self> {
        byte.is_ascii_digit().then(|| NodeId(byte - b'0'))
    }

    /// The numeric value, `0..=9`.
    pub fn value(self) -> u8 {
        self.0
    }

    /// The ASCII digit byte this id encodes to.
    pub fn digit(self) -> u8 {
        b'0' + self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

// ─── Payload ────────────────────────────────────────────────────────────────

/// A network-layer packet in wire form: exactly [`PAYLOAD_LEN`] bytes.
///
/// Forwarding nodes relay the payload untouched, so the raw form is kept
/// alongside the parsed [`Packet`] view.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload([u8; PAYLOAD_LEN]);

impl Payload {
    /// Wrap raw bytes; `None` unless exactly [`PAYLOAD_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; PAYLOAD_LEN] = bytes.try_into().ok()?;
        Some(Payload(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    /// The mod-100 sum of the payload's ASCII byte values.
    pub fn checksum(&self) -> u8 {
        checksum(&self.0)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({:?})", String::from_utf8_lossy(&self.0))
    }
}

fn checksum(payload: &[u8]) -> u8 {
    (payload.iter().map(|&b| b as u32).sum::<u32>() % SEQ_MOD as u32) as u8
}

// ─── Frame Codec ────────────────────────────────────────────────────────────

/// Why a 19-byte window failed frame validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The first two bytes are not the `"XX"` preamble.
    #[error("bad preamble")]
    BadPreamble,
    /// The trailing digits do not match the payload checksum.
    #[error("checksum mismatch (computed {computed:02})")]
    BadChecksum { computed: u8 },
}

/// Encode a payload into a complete frame.
pub fn encode_frame(payload: &Payload) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..2].copy_from_slice(&PREAMBLE);
    frame[2..2 + PAYLOAD_LEN].copy_from_slice(payload.as_bytes());
    frame[FRAME_LEN - 2..].copy_from_slice(&two_digits(payload.checksum()));
    frame
}

/// Validate a 19-byte window and extract its payload.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> Result<Payload, FrameError> {
    if frame[..2] != PREAMBLE {
        return Err(FrameError::BadPreamble);
    }
    let payload = Payload(frame[2..2 + PAYLOAD_LEN].try_into().unwrap());
    let computed = payload.checksum();
    match parse_two_digits(&frame[FRAME_LEN - 2..]) {
        Some(stated) if stated == computed => Ok(payload),
        _ => Err(FrameError::BadChecksum { computed }),
    }
}

fn two_digits(n: u8) -> [u8; 2] {
    [b'0' + (n / 10) % 10, b'0' + n % 10]
}

fn parse_two_digits(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => {
            Some((a - b'0') * 10 + (b - b'0'))
        }
        _ => None,
    }
}

// ─── Network Packet ─────────────────────────────────────────────────────────

/// A parsed network-layer packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A transport segment in transit toward `dest`.
    Data { dest: NodeId, segment: Vec<u8> },
    /// A link-state announcement of `origin`'s current neighbor set.
    Lsp {
        origin: NodeId,
        seq: u8,
        neighbors: Vec<NodeId>,
    },
}

impl Packet {
    /// Serialize into the fixed 15-byte wire payload.
    pub fn encode(&self) -> Payload {
        let mut buf = BytesMut::with_capacity(PAYLOAD_LEN);
        match self {
            Packet::Data { dest, segment } => {
                debug_assert!(segment.len() <= PAYLOAD_LEN - DATA_HEADER_LEN);
                buf.put_u8(b'D');
                buf.put_u8(dest.digit());
                buf.put_slice(&two_digits(segment.len() as u8));
                buf.put_slice(segment);
            }
            Packet::Lsp {
                origin,
                seq,
                neighbors,
            } => {
                buf.put_u8(b'L');
                buf.put_u8(origin.digit());
                buf.put_slice(&two_digits(*seq));
                for n in neighbors {
                    buf.put_u8(n.digit());
                }
            }
        }
        buf.resize(PAYLOAD_LEN, b' ');
        Payload(buf[..].try_into().unwrap())
    }

    /// Parse a wire payload. `None` for unknown discriminators or
    /// malformed fields.
    pub fn decode(payload: &Payload) -> Option<Packet> {
        let bytes = payload.as_bytes();
        match bytes[0] {
            b'D' => {
                let dest = NodeId::from_digit(bytes[1])?;
                let len = parse_two_digits(&bytes[2..4])? as usize;
                if DATA_HEADER_LEN + len > PAYLOAD_LEN {
                    return None;
                }
                Some(Packet::Data {
                    dest,
                    segment: bytes[DATA_HEADER_LEN..DATA_HEADER_LEN + len].to_vec(),
                })
            }
            b'L' => {
                let origin = NodeId::from_digit(bytes[1])?;
                let seq = parse_two_digits(&bytes[2..4])?;
                let mut neighbors = Vec::new();
                for &b in &bytes[4..] {
                    if b == b' ' {
                        break;
                    }
                    neighbors.push(NodeId::from_digit(b)?);
                }
                Some(Packet::Lsp {
                    origin,
                    seq,
                    neighbors,
                })
            }
            _ => None,
        }
    }
}

// ─── Transport Segment ──────────────────────────────────────────────────────

/// A parsed transport-layer segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// One fragment of an application message.
    Data {
        source: NodeId,
        dest: NodeId,
        seq: u8,
        body: Vec<u8>,
    },
    /// A receiver's request for retransmission of `seq`. `source` is the
    /// NACKing node; `dest` is the original sender.
    Nack { source: NodeId, dest: NodeId, seq: u8 },
}

impl Segment {
    /// Serialize to segment wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SEGMENT_HEADER_LEN + FRAGMENT_LEN);
        match self {
            Segment::Data {
                source,
                dest,
                seq,
                body,
            } => {
                debug_assert!(body.len() <= FRAGMENT_LEN);
                buf.put_u8(b'D');
                buf.put_u8(source.digit());
                buf.put_u8(dest.digit());
                buf.put_slice(&two_digits(*seq));
                buf.put_slice(body);
            }
            Segment::Nack { source, dest, seq } => {
                buf.put_u8(b'N');
                buf.put_u8(source.digit());
                buf.put_u8(dest.digit());
                buf.put_slice(&two_digits(*seq));
            }
        }
        buf.to_vec()
    }

    /// Parse segment bytes. `None` for unknown discriminators or
    /// malformed headers.
    pub fn decode(bytes: &[u8]) -> Option<Segment> {
        if bytes.len() < SEGMENT_HEADER_LEN {
            return None;
        }
        let source = NodeId::from_digit(bytes[1])?;
        let dest = NodeId::from_digit(bytes[2])?;
        let seq = parse_two_digits(&bytes[3..5])?;
        match bytes[0] {
            b'D' => Some(Segment::Data {
                source,
                dest,
                seq,
                body: bytes[SEGMENT_HEADER_LEN..].to_vec(),
            }),
            b'N' => Some(Segment::Nack { source, dest, seq }),
            _ => None,
        }
    }

    /// Where the network layer should route this segment: a data fragment
    /// travels to its receiver, a NACK travels to the sender being NACKed.
    pub fn network_dest(&self) -> NodeId {
        match self {
            Segment::Data { dest, .. } | Segment::Nack { dest, .. } => *dest,
        }
    }

    pub fn seq(&self) -> u8 {
        match self {
            Segment::Data { seq, .. } | Segment::Nack { seq, .. } => *seq,
        }
    }

    /// Best-effort recovery of `(source, seq)` from the payload region of a
    /// frame that failed validation, so the receiver can NACK the original
    /// sender. `None` when the corrupted bytes don't look like a data
    /// segment carrying digits where the header fields belong.
    pub fn nack_hint(payload_region: &[u8]) -> Option<(NodeId, u8)> {
        let segment = payload_region.get(DATA_HEADER_LEN..)?;
        if segment.first() != Some(&b'D') {
            return None;
        }
        let source = NodeId::from_digit(*segment.get(1)?)?;
        let seq = parse_two_digits(segment.get(3..5)?)?;
        Some((source, seq))
    }
}
