//! # Datalink Layer
//!
//! Pure logic — no I/O. Accepts raw byte chunks the channel substrate read
//! from each inbound link, reassembles fixed-width frames across chunk
//! boundaries, validates preamble and checksum, and emits events the node
//! dispatches upward.
//!
//! Outbound framing is [`wire::encode_frame`]; this module owns only the
//! inbound reassembly state.
//!
//! ## Corruption recovery
//!
//! A 19-byte window that fails validation is discarded whole. Before the
//! discard, the transport-segment header region is probed for a plausible
//! `(source, seq)` so the receiver can NACK the original sender. The line
//! then loses sync and hunts for the next full `"XX"` preamble — a lone
//! `'X'` is never treated as a frame boundary, and sync is only regained
//! once a whole frame validates at the candidate boundary (a preamble
//! found inside noise does not emit further NACKs).

use bytes::{Buf, BytesMut};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::wire::{self, NodeId, Payload, FRAME_LEN, PAYLOAD_LEN, PREAMBLE};

// ─── Events ─────────────────────────────────────────────────────────────────

/// What the datalink produced while digesting inbound bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatalinkEvent {
    /// A validated payload rising to the network layer.
    Payload { from: NodeId, payload: Payload },
    /// A frame failed validation. `hint` carries the recovered
    /// `(source, seq)` to NACK, when the corrupt bytes allowed one.
    Corrupt { hint: Option<(NodeId, u8)> },
}

// ─── Per-Link Reassembly ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LineState {
    buf: BytesMut,
    /// False while hunting for a preamble after corruption.
    synced: bool,
}

// ─── Datalink ───────────────────────────────────────────────────────────────

/// Inbound frame reassembler, one accumulator per neighbor link.
///
/// Accumulators persist across ticks: a frame split by a short read is
/// completed whenever its tail arrives.
#[derive(Debug, Default)]
pub struct Datalink {
    lines: BTreeMap<NodeId, LineState>,
}

impl Datalink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest a chunk of bytes that arrived from `from`'s channel,
    /// appending any resulting events to `events`.
    pub fn ingest(&mut self, from: NodeId, chunk: &[u8], events: &mut Vec<DatalinkEvent>) {
        let line = self.lines.entry(from).or_insert_with(|| LineState {
            buf: BytesMut::new(),
            // A fresh channel starts at a frame boundary.
            synced: true,
        });
        line.buf.extend_from_slice(chunk);

        loop {
            if !line.synced {
                let Some(pos) = find_preamble(&line.buf) else {
                    // Drop the junk but keep a trailing 'X' that might be
                    // the first half of a preamble split across reads.
                    let keep = usize::from(line.buf.last() == Some(&PREAMBLE[0]));
                    let junk = line.buf.len() - keep;
                    line.buf.advance(junk);
                    break;
                };
                line.buf.advance(pos);
                if line.buf.len() < FRAME_LEN {
                    break;
                }
                let window: &[u8; FRAME_LEN] = line.buf[..FRAME_LEN].try_into().unwrap();
                match wire::decode_frame(window) {
                    Ok(payload) => {
                        debug!(from = %from, "resynchronized on validated frame");
                        line.buf.advance(FRAME_LEN);
                        line.synced = true;
                        events.push(DatalinkEvent::Payload { from, payload });
                    }
                    // A preamble that showed up inside noise; keep hunting.
                    Err(_) => line.buf.advance(1),
                }
                continue;
            }
            if line.buf.len() < FRAME_LEN {
                break;
            }
            let window: &[u8; FRAME_LEN] = line.buf[..FRAME_LEN].try_into().unwrap();
            match wire::decode_frame(window) {
                Ok(payload) => {
                    line.buf.advance(FRAME_LEN);
                    events.push(DatalinkEvent::Payload { from, payload });
                }
                Err(err) => {
                    let hint = wire::Segment::nack_hint(&window[2..2 + PAYLOAD_LEN]);
                    warn!(
                        from = %from,
                        error = %err,
                        frame = %String::from_utf8_lossy(window),
                        "corrupt frame, discarding and resynchronizing"
                    );
                    line.buf.advance(FRAME_LEN);
                    line.synced = false;
                    events.push(DatalinkEvent::Corrupt { hint });
                }
            }
        }
    }

    /// Bytes currently buffered for a link (partial frame or junk tail).
    pub fn buffered(&self, from: NodeId) -> usize {
        self.lines.get(&from).map_or(0, |l| l.buf.len())
    }
}

/// Offset of the first full `"XX"` preamble in `buf`, if any.
fn find_preamble(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == PREAMBLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{encode_frame, Packet, Segment};
    use proptest::prelude::*;

    fn id(n: u8) -> NodeId {
        NodeId::new(n).unwrap()
    }

    fn data_frame(seq: u8, body: &[u8]) -> [u8; FRAME_LEN] {
        let segment = Segment::Data {
            source: id(0),
            dest: id(1),
            seq,
            body: body.to_vec(),
        };
        let payload = Packet::Data {
            dest: id(1),
            segment: segment.encode(),
        }
        .encode();
        encode_frame(&payload)
    }

    fn payload_events(events: &[DatalinkEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, DatalinkEvent::Payload { .. }))
            .count()
    }

    // ─── Clean Reassembly ───────────────────────────────────────────────

    #[test]
    fn two_frames_in_one_chunk() {
        let mut dl = Datalink::new();
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&data_frame(0, b"hello"));
        chunk.extend_from_slice(&data_frame(1, b"world"));

        let mut events = Vec::new();
        dl.ingest(id(0), &chunk, &mut events);
        assert_eq!(payload_events(&events), 2);
        assert_eq!(dl.buffered(id(0)), 0);
    }

    #[test]
    fn frame_split_across_chunks() {
        let mut dl = Datalink::new();
        let frame = data_frame(0, b"hello");
        let mut events = Vec::new();

        dl.ingest(id(0), &frame[..7], &mut events);
        assert!(events.is_empty());
        assert_eq!(dl.buffered(id(0)), 7);

        dl.ingest(id(0), &frame[7..], &mut events);
        assert_eq!(payload_events(&events), 1);
        assert_eq!(dl.buffered(id(0)), 0);
    }

    // ─── Corruption & Resync ────────────────────────────────────────────

    #[test]
    fn corrupt_frame_yields_hint_and_resyncs() {
        let mut dl = Datalink::new();
        let mut bad = data_frame(7, b"hello");
        bad[12] ^= 0x01; // body byte; segment header stays parsable
        let good = data_frame(8, b"again");

        let mut chunk = Vec::new();
        chunk.extend_from_slice(&bad);
        chunk.extend_from_slice(&good);

        let mut events = Vec::new();
        dl.ingest(id(0), &chunk, &mut events);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            DatalinkEvent::Corrupt {
                hint: Some((id(0), 7))
            }
        );
        match &events[1] {
            DatalinkEvent::Payload { payload, .. } => {
                assert!(Packet::decode(payload).is_some());
            }
            other => panic!("expected payload after resync, got {other:?}"),
        }
    }

    #[test]
    fn garbage_between_frames_is_skipped() {
        let mut dl = Datalink::new();
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&data_frame(0, b"first"));
        // 19 bytes of line noise that is not preamble-aligned.
        chunk.extend_from_slice(b"...noise+noise.....");
        chunk.extend_from_slice(&data_frame(1, b"later"));

        let mut events = Vec::new();
        dl.ingest(id(0), &chunk, &mut events);
        // First frame valid, noise window corrupt, trailing frame recovered.
        assert_eq!(payload_events(&events), 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, DatalinkEvent::Corrupt { .. })));
    }

    #[test]
    fn lone_x_is_not_a_boundary() {
        let mut dl = Datalink::new();
        let mut bad = data_frame(0, b"hello");
        bad[3] = b'!';
        let mut events = Vec::new();
        dl.ingest(id(0), &bad, &mut events);
        assert_eq!(events.len(), 1);

        // While resyncing, a lone 'X' followed by junk must not regain sync.
        dl.ingest(id(0), b"X.junk.X", &mut events);
        assert_eq!(events.len(), 1);

        // A real preamble does.
        let good = data_frame(1, b"again");
        dl.ingest(id(0), &good, &mut events);
        assert_eq!(payload_events(&events), 1);
    }

    #[test]
    fn trailing_x_survives_chunk_boundary() {
        let mut dl = Datalink::new();
        let mut bad = data_frame(0, b"hello");
        bad[0] = b'Y';
        let mut events = Vec::new();
        dl.ingest(id(0), &bad, &mut events);

        // The next frame arrives byte-split right inside its preamble.
        let good = data_frame(1, b"again");
        dl.ingest(id(0), &good[..1], &mut events);
        assert_eq!(dl.buffered(id(0)), 1, "leading 'X' must be retained");
        dl.ingest(id(0), &good[1..], &mut events);
        assert_eq!(payload_events(&events), 1);
    }

    #[test]
    fn corrupt_lsp_has_no_hint() {
        let mut dl = Datalink::new();
        let payload = Packet::Lsp {
            origin: id(2),
            seq: 5,
            neighbors: vec![id(1)],
        }
        .encode();
        let mut frame = encode_frame(&payload);
        frame[6] ^= 0x01;

        let mut events = Vec::new();
        dl.ingest(id(2), &frame, &mut events);
        assert_eq!(events, vec![DatalinkEvent::Corrupt { hint: None }]);
    }

    // ─── Robustness ─────────────────────────────────────────────────────

    proptest! {
        /// Arbitrary junk in arbitrary chunkings never panics, and every
        /// payload the datalink emits carries a valid checksum by
        /// construction.
        #[test]
        fn proptest_junk_never_panics(
            junk in proptest::collection::vec(any::<u8>(), 0..256),
            cut in 0usize..256,
        ) {
            let mut dl = Datalink::new();
            let mut events = Vec::new();
            let cut = cut.min(junk.len());
            dl.ingest(id(3), &junk[..cut], &mut events);
            dl.ingest(id(3), &junk[cut..], &mut events);
        }

        /// A clean stream of frames is fully delivered no matter how the
        /// reads slice it.
        #[test]
        fn proptest_chunking_is_transparent(cuts in proptest::collection::vec(1usize..56, 0..8)) {
            let mut stream = Vec::new();
            for seq in 0..3u8 {
                stream.extend_from_slice(&data_frame(seq, b"abcde"));
            }
            let mut dl = Datalink::new();
            let mut events = Vec::new();
            let mut rest: &[u8] = &stream;
            for cut in cuts {
                let cut = cut.min(rest.len());
                let (head, tail) = rest.split_at(cut);
                dl.ingest(id(0), head, &mut events);
                rest = tail;
            }
            dl.ingest(id(0), rest, &mut events);
            prop_assert_eq!(payload_events(&events), 3);
        }
    }
}
