//! The per-node subscriber handed to the transport.
//!
//! One `PeerSubscriber` is bound to each arena slot at slot creation and
//! persists across the slot's reuse (spec.md §4.4). It holds a weak
//! back-reference to the chooser rather than a captured closure —
//! idiomatic Rust has no allocation-free bound closure, but a method call
//! through a `Weak` upgrade gives the same "no allocation on the `finish`
//! hot path" property spec.md §9 asks for.

use std::sync::{Arc, Weak};

use crate::arena::NodeIndex;
use crate::chooser::Chooser;
use crate::error::BoxError;
use crate::peer::PeerIdentifier;

/// The callback surface a [`Transport`](crate::Transport) holds onto for
/// a retained peer.
pub trait Subscriber: Send + Sync + 'static {
    /// Invoked by the transport whenever the peer's connection status or
    /// pending-request count may have changed. Takes the chooser lock.
    fn notify_status_changed(&self, id: &PeerIdentifier);
}

pub struct PeerSubscriber {
    chooser: Weak<Chooser>,
    pub(crate) index: NodeIndex,
}

impl PeerSubscriber {
    pub(crate) fn new(chooser: Weak<Chooser>, index: NodeIndex) -> Self {
        PeerSubscriber { chooser, index }
    }

    /// The continuation returned alongside a peer from
    /// [`Chooser::choose`]. Decrements the peer's pending count and
    /// re-slots it in the circus; `err` is informational only — the
    /// chooser logs it via `tracing::debug!` but otherwise ignores it,
    /// and no [`Monitor`](crate::Monitor) hook observes it.
    pub fn finish(&self, err: Option<BoxError>) {
        if let Some(chooser) = self.chooser.upgrade() {
            chooser.finish(self.index, err);
        }
    }
}

impl Subscriber for PeerSubscriber {
    fn notify_status_changed(&self, id: &PeerIdentifier) {
        if let Some(chooser) = self.chooser.upgrade() {
            chooser.lock_notify_status_changed(self.index, id);
        }
    }
}
