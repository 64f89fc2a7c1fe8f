use std::fmt;

/// A type-erased error from a [`Transport`](crate::Transport) or
/// [`Peer`](crate::Peer) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`Chooser::choose`](crate::Chooser::choose).
///
/// Both variants are the source's single `CallerCancelled` kind split by
/// cause, plus the list-wide `ListStopped` kind.
#[derive(Debug, thiserror::Error)]
pub enum ChooseError {
    /// The caller's cancellation token fired, or the deadline passed,
    /// while waiting for an available peer.
    #[error("cancelled while waiting for an available peer")]
    Cancelled,

    /// The chooser was stopped while this call was waiting for an
    /// available peer.
    #[error("chooser stopped while waiting for an available peer")]
    Stopped,
}

/// A non-fatal failure to retain a peer from the transport.
///
/// `satisfyGoal`'s retention loop logs this and gives up for the current
/// call; the unused node is left in place for the next retry.
#[derive(Debug, thiserror::Error)]
#[error("failed to retain peer {id}: {source}")]
pub struct RetainError {
    pub id: String,
    #[source]
    pub source: BoxError,
}

/// A violated arena invariant: `release_node` was asked to free a node
/// that was not an isolated, cleared ring of one.
///
/// This is a programmer-error class, not a runtime condition callers can
/// recover from; the sole caller converts it with `.expect(..)` so the
/// panic message names the violated invariant, per spec.md §7.
#[derive(Debug)]
pub struct ArenaInvariantError {
    pub index: usize,
    pub reason: &'static str,
}

impl fmt::Display for ArenaInvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arena invariant violated releasing node {}: {}",
            self.index, self.reason
        )
    }
}

impl std::error::Error for ArenaInvariantError {}
