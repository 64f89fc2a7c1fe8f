//! A pending-request-aware peer chooser for RPC clients.
//!
//! Given a fleet of candidate backend peers whose connection state and
//! in-flight request counts change concurrently, [`Chooser::choose`]
//! returns, on each call, a peer with the fewest currently-pending
//! requests among those currently connected — blocking the caller until
//! such a peer exists, the caller's deadline elapses, the caller cancels,
//! or the chooser is stopped.
//!
//! The implementation is the **circus**: an arena-backed, doubly-linked
//! list of per-pending-count rings (see [`mod@circus`]). Wire transports,
//! request/response encoding, and alternative selection strategies are
//! out of scope — only the pluggable [`Transport`]/[`Peer`] interfaces
//! through which a real transport plugs in are defined here.

mod arena;
mod chooser;
mod circus;
mod error;
mod monitor;
mod peer;
mod subscriber;

pub use crate::chooser::{Chooser, ChooseContext, ChooserSnapshot, Finish, Request};
pub use crate::error::{ArenaInvariantError, BoxError, ChooseError, RetainError};
pub use crate::monitor::Monitor;
pub use crate::peer::{ConnectionStatus, Peer, PeerIdentifier, PeerStatus, Transport};
pub use crate::subscriber::Subscriber;
