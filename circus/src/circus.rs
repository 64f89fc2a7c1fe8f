//! The circus: a sorted list of per-pending-count rings (spec.md §4.2).
//!
//! A carrier node names a ring by storing its `pending` value
//! (`Node::pending`) and pointing at the ring's head (`Node::ring_index`);
//! the ring's head node points back at its carrier via its own
//! `ring_index`, so a peer node reaches its carrier in two indirections:
//! `carrier = arena.node(arena.node(peer.ring_index).ring_index)`.
//!
//! These three functions are the only things in the crate that know what
//! a "ring of peers sharing a pending count" means; everything above them
//! (the peer-state machine, `Choose`, `finish`) only ever calls
//! `push_to_circus`/`pop_from_circus`/`least_pending_node`.

use crate::arena::{Arena, NodeIndex, CIRCUS_HEAD};

/// Inserts `node_idx` into the ring for `pending`, creating that ring
/// (and, if the circus is empty, the carrier list itself) if none exists
/// yet. Maintains invariant 3 (spec.md §3): carriers stay sorted
/// ascending by `pending` when walked from the circus head.
pub(crate) fn push_to_circus(arena: &mut Arena, node_idx: NodeIndex, pending: usize) {
    if arena.empty(CIRCUS_HEAD) {
        let ring_head_idx = new_ring(arena, CIRCUS_HEAD, pending);
        seat(arena, node_idx, ring_head_idx, pending);
        return;
    }

    let mut carrier_idx = arena.node(CIRCUS_HEAD).next;
    while carrier_idx != CIRCUS_HEAD {
        let carrier_pending = arena.node(carrier_idx).pending;
        if carrier_pending == pending {
            let ring_head_idx = arena.node(carrier_idx).ring_index.expect("carrier names a ring");
            seat(arena, node_idx, ring_head_idx, pending);
            return;
        }
        if carrier_pending > pending {
            break;
        }
        carrier_idx = arena.node(carrier_idx).next;
    }

    // `carrier_idx` is either CIRCUS_HEAD (every existing ring has fewer
    // pending requests, so we append) or the first ring with more
    // pending requests than we need (so we insert just before it).
    let ring_head_idx = new_ring(arena, carrier_idx, pending);
    seat(arena, node_idx, ring_head_idx, pending);
}

/// Removes `node_idx` from whatever ring it currently occupies, tearing
/// the ring (and its carrier) down if that was the ring's last member
/// (invariant 5).
pub(crate) fn pop_from_circus(arena: &mut Arena, node_idx: NodeIndex) {
    let ring_head_idx = arena
        .node(node_idx)
        .ring_index
        .expect("node must be on a ring to pop from the circus");

    if arena.alone(ring_head_idx) {
        arena.pop(node_idx);
        let carrier_idx = arena
            .node(ring_head_idx)
            .ring_index
            .expect("ring head names its carrier");
        arena.pop(ring_head_idx);
        arena.pop(carrier_idx);
        arena.node_mut(ring_head_idx).ring_index = None;
        arena.node_mut(carrier_idx).ring_index = None;
        arena
            .release_node(ring_head_idx)
            .expect("emptied ring head is always a clean, isolated slot");
        arena
            .release_node(carrier_idx)
            .expect("emptied carrier is always a clean, isolated slot");
    } else {
        arena.pop(node_idx);
    }
    arena.node_mut(node_idx).ring_index = None;
}

/// Returns the node on the least-pending ring, rotating it to the back
/// of its ring so a subsequent call (before the caller re-slots this
/// node) serves a different member round-robin.
///
/// The caller is expected to immediately `pop_from_circus` /
/// `push_to_circus(pending + 1)` this node to reflect a newly-dispatched
/// request (spec.md §4.2).
pub(crate) fn least_pending_node(arena: &mut Arena) -> NodeIndex {
    let carrier_idx = arena.node(CIRCUS_HEAD).next;
    let ring_head_idx = arena
        .node(carrier_idx)
        .ring_index
        .expect("least pending carrier names a ring");
    let node_idx = arena.node(ring_head_idx).next;
    arena.pop(node_idx);
    arena.push(node_idx, ring_head_idx);
    node_idx
}

/// Walks the circus from its head, yielding `(pending, ring_len)` for
/// every ring. Used by `Chooser::snapshot` and by tests asserting
/// invariants 1-2.
pub(crate) fn walk_rings(arena: &Arena, mut f: impl FnMut(usize, usize)) {
    let mut carrier_idx = arena.node(CIRCUS_HEAD).next;
    while carrier_idx != CIRCUS_HEAD {
        let carrier = arena.node(carrier_idx);
        let ring_head_idx = carrier.ring_index.expect("carrier names a ring");
        let mut len = 0;
        arena.walk(ring_head_idx, |_, _| len += 1);
        f(carrier.pending, len);
        carrier_idx = carrier.next;
    }
}

/// Allocates a fresh carrier + ring-head pair, splices the carrier
/// immediately before `before_carrier`, and returns the new ring's head
/// index.
fn new_ring(arena: &mut Arena, before_carrier: NodeIndex, pending: usize) -> NodeIndex {
    let carrier_idx = arena.retain_node();
    arena.push(carrier_idx, before_carrier);
    let ring_head_idx = arena.retain_node();
    arena.node_mut(carrier_idx).pending = pending;
    arena.node_mut(carrier_idx).ring_index = Some(ring_head_idx);
    arena.node_mut(ring_head_idx).ring_index = Some(carrier_idx);
    ring_head_idx
}

fn seat(arena: &mut Arena, node_idx: NodeIndex, ring_head_idx: NodeIndex, pending: usize) {
    arena.push(node_idx, ring_head_idx);
    arena.node_mut(node_idx).ring_index = Some(ring_head_idx);
    arena.node_mut(node_idx).pending = pending;
}
