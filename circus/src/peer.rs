use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::subscriber::Subscriber;

/// An opaque peer identifier, cheap to clone and hash.
///
/// The chooser never interprets the contents; the load/chaos harness in
/// `circus-test` fabricates addresses of the form `"127.0.0.<n>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerIdentifier(Arc<str>);

impl PeerIdentifier {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        PeerIdentifier(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerIdentifier {
    fn from(s: &str) -> Self {
        PeerIdentifier::new(s)
    }
}

impl From<String> for PeerIdentifier {
    fn from(s: String) -> Self {
        PeerIdentifier::new(s)
    }
}

/// The connection status a [`Peer`] reports through [`PeerStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Available,
    Connecting,
    Unavailable,
}

/// A snapshot of a peer's connection status and pending-request count.
///
/// This is advisory: the chooser's own `node.pending` is the ground
/// truth used for circus placement (spec.md §5). `pending_request_count`
/// is only consulted when a peer first reports itself Available.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerStatus {
    pub connection_status: ConnectionStatus,
    pub pending_request_count: usize,
}

/// A logical endpoint to which requests may be sent.
pub trait Peer: Send + Sync + 'static {
    fn identifier(&self) -> &PeerIdentifier;

    fn status(&self) -> PeerStatus;

    /// Called outside the chooser lock when a request is dispatched.
    fn start_request(&self);

    /// Called outside the chooser lock when a request completes.
    fn end_request(&self);
}

/// The transport interface consumed by the chooser to obtain and
/// release reference-counted peer handles.
///
/// `retain_peer`/`release_peer` wire `subscriber` to future status
/// change notifications; the chooser never calls these except from
/// `satisfyGoal` and `Update`'s removal path.
pub trait Transport: Send + Sync + 'static {
    fn retain_peer(
        &self,
        id: &PeerIdentifier,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<Arc<dyn Peer>, BoxError>;

    fn release_peer(
        &self,
        id: &PeerIdentifier,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<(), BoxError>;
}
