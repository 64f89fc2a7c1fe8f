//! The arena and its ring algebra.
//!
//! A single flat vector of [`Node`] records forms every doubly-linked
//! structure the chooser needs: the free list, the unused list, the
//! connecting list, the circus's carrier list, and every per-pending-count
//! peer ring. Nothing here knows what a "ring" *means* — `push`, `pop`,
//! `empty`, `alone`, `retain_node`, `release_node` and `walk` are the only
//! primitives that touch `prev`/`next`, and every higher-level operation in
//! `circus.rs` and `chooser.rs` composes them.

use std::sync::Arc;

use crate::error::ArenaInvariantError;
use crate::peer::{Peer, PeerIdentifier};
use crate::subscriber::PeerSubscriber;

pub type NodeIndex = usize;

pub const FREE_HEAD: NodeIndex = 0;
pub const UNUSED_HEAD: NodeIndex = 1;
pub const CONNECTING_HEAD: NodeIndex = 2;
pub const CIRCUS_HEAD: NodeIndex = 3;

/// One arena slot.
///
/// Depending on which list currently holds it, a `Node` plays one of
/// several roles (spec.md §3):
///
/// - a list head (free/unused/connecting/circus) — `id`/`peer` unused;
/// - a peer slot: Unused (`peer: None`), Connecting (`peer: Some`,
///   `ring_index: None`), or Available (`peer: Some`, `ring_index: Some`
///   naming the peer ring's head);
/// - a ring-head node — `ring_index` names the circus carrier for this
///   ring;
/// - a circus carrier node — `pending` is the pending count this ring
///   represents, `ring_index` names the ring's head node.
///
/// `ring_index` realizes the source's `-1` sentinel as `None`: an
/// idiomatic substitution that changes no behavior (see `DESIGN.md`).
pub(crate) struct Node {
    pub id: Option<PeerIdentifier>,
    pub peer: Option<Arc<dyn Peer>>,
    pub prev: NodeIndex,
    pub next: NodeIndex,
    pub ring_index: Option<NodeIndex>,
    pub pending: usize,
    /// Bound once at slot creation and retained across slot reuse.
    pub subscriber: Arc<PeerSubscriber>,
}

impl Node {
    fn head(index: NodeIndex, subscriber: Arc<PeerSubscriber>) -> Self {
        Node {
            id: None,
            peer: None,
            prev: index,
            next: index,
            ring_index: None,
            pending: 0,
            subscriber,
        }
    }

    pub fn is_available(&self) -> bool {
        self.peer.is_some() && self.ring_index.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.peer.is_some() && self.ring_index.is_none()
    }

    pub fn is_unused(&self) -> bool {
        self.peer.is_none() && self.ring_index.is_none()
    }
}

/// The arena plus the pure ring algebra that operates on it.
pub(crate) struct Arena {
    nodes: Vec<Node>,
    /// Factory for the subscriber bound to a freshly grown slot. Stored
    /// as a trait object so `Arena` itself stays free of any dependency
    /// on `Chooser`.
    make_subscriber: Box<dyn Fn(NodeIndex) -> Arc<PeerSubscriber> + Send + Sync>,
}

impl Arena {
    pub fn new(make_subscriber: Box<dyn Fn(NodeIndex) -> Arc<PeerSubscriber> + Send + Sync>) -> Self {
        let mut arena = Arena {
            nodes: Vec::with_capacity(32),
            make_subscriber,
        };
        // Index 0 is the free list's own head; the zero-th slot is never
        // retained through retain_node, it is synthesized directly so
        // retain_node's "grow by one" path starts at index 1.
        let subscriber0 = (arena.make_subscriber)(FREE_HEAD);
        arena.nodes.push(Node::head(FREE_HEAD, subscriber0));
        // Indices 1 (unused), 2 (connecting) and 3 (circus) are retained
        // as plain head nodes, exactly mirroring `circus.New`'s three
        // bootstrap `retainNode` calls.
        for expected in [UNUSED_HEAD, CONNECTING_HEAD, CIRCUS_HEAD] {
            // retain_node() on a freshly-grown arena returns an
            // already self-linked (empty ring) node, which is exactly
            // what a fresh list head must be.
            let index = arena.retain_node();
            debug_assert_eq!(index, expected);
        }
        arena
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index]
    }

    pub fn empty(&self, head: NodeIndex) -> bool {
        self.nodes[head].next == head
    }

    pub fn alone(&self, head: NodeIndex) -> bool {
        if self.empty(head) {
            return false;
        }
        self.nodes[self.nodes[head].next].next == head
    }

    /// Splices `index` out of whatever ring holds it and self-links it.
    pub fn pop(&mut self, index: NodeIndex) {
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        self.nodes[next].prev = prev;
        self.nodes[prev].next = next;
        self.nodes[index].prev = index;
        self.nodes[index].next = index;
    }

    /// Inserts `index` immediately before `before`.
    pub fn push(&mut self, index: NodeIndex, before: NodeIndex) {
        let prev = self.nodes[before].prev;
        self.nodes[prev].next = index;
        self.nodes[index].prev = prev;
        self.nodes[index].next = before;
        self.nodes[before].prev = index;
    }

    /// Returns the index of an unused node, growing the arena if the free
    /// list is empty. The returned node is a self-linked ring of one; the
    /// caller must push it onto a real ring.
    pub fn retain_node(&mut self) -> NodeIndex {
        if self.empty(FREE_HEAD) {
            let index = self.nodes.len();
            let subscriber = (self.make_subscriber)(index);
            self.nodes.push(Node::head(index, subscriber));
            return index;
        }
        let index = self.nodes[FREE_HEAD].next;
        self.pop(index);
        index
    }

    /// Returns a node to the free list. The node must be an isolated
    /// ring of one with no id, no peer, and no ring membership — the
    /// state every code path leaves a node in immediately after its last
    /// `pop`.
    pub fn release_node(&mut self, index: NodeIndex) -> Result<(), ArenaInvariantError> {
        let node = &self.nodes[index];
        if node.id.is_some() {
            return Err(ArenaInvariantError {
                index,
                reason: "expected no id when released",
            });
        }
        if node.peer.is_some() {
            return Err(ArenaInvariantError {
                index,
                reason: "expected no peer reference when released",
            });
        }
        if node.next != index || node.prev != index {
            return Err(ArenaInvariantError {
                index,
                reason: "expected to be an empty ring (self-linked)",
            });
        }
        if node.ring_index.is_some() {
            return Err(ArenaInvariantError {
                index,
                reason: "expected ring_index to be None",
            });
        }
        self.push(index, FREE_HEAD);
        Ok(())
    }

    /// Walks a ring from its head, calling `f` on every member (not the
    /// head itself).
    pub fn walk(&self, head: NodeIndex, mut f: impl FnMut(NodeIndex, &Node)) {
        let mut index = self.nodes[head].next;
        while index != head {
            f(index, &self.nodes[index]);
            index = self.nodes[index].next;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
