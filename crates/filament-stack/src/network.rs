//! # Network Layer
//!
//! Pure logic — no I/O. Routes transport segments across the topology and
//! maintains the topology picture itself through link-state packets.
//!
//! ## Responsibilities
//!
//! 1. **Egress**: wrap outbound segments in data packets toward a next hop
//! 2. **Forwarding**: relay data packets not addressed to this node
//! 3. **Flooding**: propagate LSPs with sequence-number suppression
//! 4. **Liveness**: confirm neighbors whose LSPs list this node
//! 5. **Routing**: Dijkstra over the flooded topology, next-hop compaction
//!
//! The routing table is rebuilt from scratch on every recomputation, so a
//! destination that became unreachable drops out instead of keeping a
//! stale next hop. Equal-cost candidates are ordered by `(distance, id)`
//! in the heap: the lowest-id route wins, deterministically.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::{debug, warn};

use crate::neighbors::NeighborTable;
use crate::wire::{NodeId, Packet, Payload, SEQ_MOD};

/// Ticks between a node's own LSP emissions.
pub const LSP_INTERVAL: u32 = 10;

// ─── Events ─────────────────────────────────────────────────────────────────

/// What the network layer asks the node to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Hand a wire payload to the datalink toward a direct neighbor.
    Transmit { payload: Payload, next_hop: NodeId },
    /// The embedded segment is addressed to this node; deliver upward.
    Deliver { segment: Vec<u8> },
}

// ─── Link-State Records ─────────────────────────────────────────────────────

/// Latest accepted link-state announcement from one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspRecord {
    pub seq: u8,
    pub neighbors: Vec<NodeId>,
}

// ─── Network ────────────────────────────────────────────────────────────────

/// Network-layer state machine.
#[derive(Debug)]
pub struct Network {
    id: NodeId,
    /// Destination → next-hop neighbor. Always contains the self-route.
    routing: BTreeMap<NodeId, NodeId>,
    /// Origin → latest accepted LSP. Records never expire; stale origins
    /// fall out of the routing table once nobody links to them.
    lsp_db: BTreeMap<NodeId, LspRecord>,
    /// Origin → highest LSP sequence number ever seen (flood suppression).
    lsp_seen: BTreeMap<NodeId, u8>,
    /// Sequence number for this node's own LSPs.
    lsp_seq: u8,
}

impl Network {
    pub fn new(id: NodeId) -> Self {
        let mut routing = BTreeMap::new();
        routing.insert(id, id);
        Network {
            id,
            routing,
            lsp_db: BTreeMap::new(),
            lsp_seen: BTreeMap::new(),
            lsp_seq: 0,
        }
    }

    /// Wrap an outbound transport segment for `dest` and pick the next
    /// hop. `None` (with a diagnostic) when no route exists yet.
    pub fn egress(&self, segment: &[u8], dest: NodeId) -> Option<(Payload, NodeId)> {
        let Some(&next_hop) = self.routing.get(&dest) else {
            warn!(node = %self.id, dest = %dest, "no route, dropping segment");
            return None;
        };
        let payload = Packet::Data {
            dest,
            segment: segment.to_vec(),
        }
        .encode();
        Some((payload, next_hop))
    }

    /// Process a payload the datalink validated off `from`'s channel.
    pub fn ingress(
        &mut self,
        payload: &Payload,
        from: NodeId,
        neighbors: &mut NeighborTable,
        events: &mut Vec<NetworkEvent>,
    ) {
        match Packet::decode(payload) {
            Some(Packet::Data { dest, segment }) => {
                if dest == self.id {
                    events.push(NetworkEvent::Deliver { segment });
                } else if let Some(&next_hop) = self.routing.get(&dest) {
                    // Relay the original payload untouched.
                    events.push(NetworkEvent::Transmit {
                        payload: *payload,
                        next_hop,
                    });
                } else {
                    warn!(node = %self.id, dest = %dest, "no route for transit packet, dropping");
                }
            }
            Some(Packet::Lsp {
                origin,
                seq,
                neighbors: listed,
            }) => self.handle_lsp(payload, origin, seq, &listed, neighbors, events),
            None => {
                debug!(node = %self.id, from = %from, "unparseable payload, dropping");
            }
        }
    }

    fn handle_lsp(
        &mut self,
        payload: &Payload,
        origin: NodeId,
        seq: u8,
        listed: &[NodeId],
        neighbors: &mut NeighborTable,
        events: &mut Vec<NetworkEvent>,
    ) {
        // The origin claiming us as a neighbor proves the reverse link.
        if origin != self.id && listed.contains(&self.id) {
            neighbors.confirm(origin);
        }

        // Flood suppression: accept only first-seen or strictly newer.
        match self.lsp_seen.get(&origin) {
            Some(&seen) if seq <= seen => {
                debug!(node = %self.id, origin = %origin, seq, "suppressing already-seen LSP");
                return;
            }
            _ => {
                self.lsp_seen.insert(origin, seq);
            }
        }

        let newer = self.lsp_db.get(&origin).is_none_or(|rec| seq > rec.seq);
        if newer {
            self.lsp_db.insert(
                origin,
                LspRecord {
                    seq,
                    neighbors: listed.to_vec(),
                },
            );
        }

        // Re-flood to everyone who plausibly hasn't seen it: skip the
        // origin and the neighbors the origin already announced to.
        for next_hop in neighbors.ids() {
            if next_hop != origin && !listed.contains(&next_hop) {
                events.push(NetworkEvent::Transmit {
                    payload: *payload,
                    next_hop,
                });
            }
        }

        self.recompute(neighbors);
    }

    /// Build this node's own LSP and advance the sequence counter.
    /// The caller transmits it to every current neighbor.
    pub fn build_lsp(&mut self, neighbors: &NeighborTable) -> Payload {
        let payload = Packet::Lsp {
            origin: self.id,
            seq: self.lsp_seq,
            neighbors: neighbors.ids().collect(),
        }
        .encode();
        self.lsp_seq = (self.lsp_seq + 1) % SEQ_MOD;
        payload
    }

    /// Dijkstra with unit weights over the flooded topology: edges from
    /// this node to each live neighbor and from each LSP origin to the
    /// neighbors it announced. Predecessor chains compact into next hops.
    fn recompute(&mut self, neighbors: &NeighborTable) {
        let mut dist: BTreeMap<NodeId, u32> = BTreeMap::new();
        let mut pred: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut heap = BinaryHeap::new();

        dist.insert(self.id, 0);
        heap.push(Reverse((0u32, self.id)));

        while let Some(Reverse((d, u))) = heap.pop() {
            if d > dist.get(&u).copied().unwrap_or(u32::MAX) {
                continue;
            }
            let edges: Vec<NodeId> = if u == self.id {
                neighbors.ids().collect()
            } else {
                self.lsp_db
                    .get(&u)
                    .map(|rec| rec.neighbors.clone())
                    .unwrap_or_default()
            };
            for v in edges {
                let nd = d + 1;
                if nd < dist.get(&v).copied().unwrap_or(u32::MAX) {
                    dist.insert(v, nd);
                    pred.insert(v, u);
                    heap.push(Reverse((nd, v)));
                }
            }
        }

        let mut routing = BTreeMap::new();
        routing.insert(self.id, self.id);
        for &dest in dist.keys() {
            if dest == self.id {
                continue;
            }
            // Walk the predecessor chain back to the hop adjacent to us.
            let mut hop = dest;
            while let Some(&p) = pred.get(&hop) {
                if p == self.id {
                    break;
                }
                hop = p;
            }
            routing.insert(dest, hop);
        }
        self.routing = routing;
        debug!(node = %self.id, routes = self.routing.len(), "routing table rebuilt");
    }

    /// Next hop toward `dest`, if routed.
    pub fn route_to(&self, dest: NodeId) -> Option<NodeId> {
        self.routing.get(&dest).copied()
    }

    /// The full routing table (destination → next hop).
    pub fn routing_table(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.routing
    }

    /// Latest accepted LSP from an origin.
    pub fn lsp_record(&self, origin: NodeId) -> Option<&LspRecord> {
        self.lsp_db.get(&origin)
    }
}
