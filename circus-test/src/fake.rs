//! An in-memory [`Transport`]/[`Peer`] pair, standing in for a real wire
//! transport (out of scope for the core crate, spec.md §1). Tests and the
//! load/chaos harness drive peers' reported status and pending counts
//! directly, rather than through any network I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use circus::{BoxError, ConnectionStatus, Peer, PeerIdentifier, PeerStatus, Subscriber, Transport};

pub struct FakePeer {
    id: PeerIdentifier,
    status: Mutex<ConnectionStatus>,
    pending: AtomicUsize,
}

impl FakePeer {
    fn new(id: PeerIdentifier, status: ConnectionStatus) -> Arc<Self> {
        Arc::new(FakePeer {
            id,
            status: Mutex::new(status),
            pending: AtomicUsize::new(0),
        })
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn set_pending(&self, pending: usize) {
        self.pending.store(pending, Ordering::SeqCst);
    }
}

impl Peer for FakePeer {
    fn identifier(&self) -> &PeerIdentifier {
        &self.id
    }

    fn status(&self) -> PeerStatus {
        PeerStatus {
            connection_status: *self.status.lock().unwrap(),
            pending_request_count: self.pending.load(Ordering::SeqCst),
        }
    }

    fn start_request(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn end_request(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Retained {
    peer: Arc<FakePeer>,
    subscriber: Arc<dyn Subscriber>,
}

/// A transport double that retains every peer it's asked for and, unless
/// told otherwise, reports it `Available` immediately — exercising the
/// "RetainPeer may synchronously return an already-Available peer" race
/// spec.md §4.3 calls out.
pub struct FakeTransport {
    retained: Mutex<HashMap<String, Retained>>,
    initial_status: ConnectionStatus,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Self::with_initial_status(ConnectionStatus::Available)
    }

    /// A transport whose peers start out `Connecting` and must be
    /// promoted with [`FakeTransport::set_status`].
    pub fn slow_connecting() -> Arc<Self> {
        Self::with_initial_status(ConnectionStatus::Connecting)
    }

    fn with_initial_status(initial_status: ConnectionStatus) -> Arc<Self> {
        Arc::new(FakeTransport {
            retained: Mutex::new(HashMap::new()),
            initial_status,
        })
    }

    /// Simulates an asynchronous connection status change: flips the
    /// peer's reported status and fires its subscriber, the way a real
    /// transport would after a handshake completes or a socket drops.
    pub fn set_status(&self, id: &PeerIdentifier, status: ConnectionStatus) {
        let (peer, subscriber) = {
            let retained = self.retained.lock().unwrap();
            match retained.get(id.as_str()) {
                Some(r) => (r.peer.clone(), r.subscriber.clone()),
                None => return,
            }
        };
        peer.set_status(status);
        subscriber.notify_status_changed(id);
    }

    /// Simulates the transport noticing its own pending-count snapshot
    /// has drifted from the chooser's (e.g. a request the chooser didn't
    /// originate) and re-announcing it out of band.
    pub fn set_pending(&self, id: &PeerIdentifier, pending: usize) {
        let (peer, subscriber) = {
            let retained = self.retained.lock().unwrap();
            match retained.get(id.as_str()) {
                Some(r) => (r.peer.clone(), r.subscriber.clone()),
                None => return,
            }
        };
        peer.set_pending(pending);
        subscriber.notify_status_changed(id);
    }

    pub fn is_retained(&self, id: &PeerIdentifier) -> bool {
        self.retained.lock().unwrap().contains_key(id.as_str())
    }

    pub fn retained_count(&self) -> usize {
        self.retained.lock().unwrap().len()
    }
}

impl Transport for FakeTransport {
    fn retain_peer(&self, id: &PeerIdentifier, subscriber: Arc<dyn Subscriber>) -> Result<Arc<dyn Peer>, BoxError> {
        let peer = FakePeer::new(id.clone(), self.initial_status);
        self.retained.lock().unwrap().insert(
            id.as_str().to_string(),
            Retained {
                peer: peer.clone(),
                subscriber,
            },
        );
        // The chooser itself checks the returned peer's status before
        // releasing its lock (spec.md §4.3's "race with initial
        // availability"), so an already-Available peer is promoted
        // without any callback here. Calling back through `subscriber`
        // from inside `retain_peer` would re-enter the chooser while its
        // lock is held by the very call that got us here.
        Ok(peer)
    }

    fn release_peer(&self, id: &PeerIdentifier, _subscriber: Arc<dyn Subscriber>) -> Result<(), BoxError> {
        self.retained.lock().unwrap().remove(id.as_str());
        Ok(())
    }
}
