use crate::peer::{Peer, PeerIdentifier};

/// Observational hooks into the chooser's lifecycle (spec.md §9 Open
/// Question 4).
///
/// Every method is called from the same critical section as the event it
/// describes — an implementation must never call back into the chooser
/// (e.g. `Choose`, `Update`) from within one of these methods, or it will
/// deadlock against the chooser's own lock.
pub trait Monitor: Send + Sync + 'static {
    /// A peer's connection status or pending-request count changed.
    fn notify_status_changed(&self, _peer: &dyn Peer) {}

    /// A peer was just retained from the transport.
    fn retain_peer(&self, _id: &PeerIdentifier) {}

    /// `Update` was called (regardless of whether it changed anything).
    fn update(&self) {}
}
