use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::arena::{Arena, NodeIndex, CONNECTING_HEAD, UNUSED_HEAD};
use crate::circus::{least_pending_node, pop_from_circus, push_to_circus, walk_rings};
use crate::error::{BoxError, ChooseError, RetainError};
use crate::monitor::Monitor;
use crate::peer::{ConnectionStatus, Peer, PeerIdentifier, Transport};
use crate::subscriber::PeerSubscriber;

/// The continuation returned alongside a chosen peer. Exactly one
/// `finish` call must follow a successful [`Chooser::choose`], whether
/// the request it guarded succeeded or failed.
pub type Finish = Arc<PeerSubscriber>;

/// Placeholder for the (out-of-scope) request being routed. `Choose`
/// accepts it for symmetry with a real RPC client's call site; this
/// chooser's selection never inspects it.
#[derive(Debug, Default)]
pub struct Request;

/// The caller-supplied half of `Choose`'s blocking contract: an optional
/// deadline and an optional cancellation token, together covering
/// everything a `context.Context` select arm covers in the source
/// (spec.md §4.5).
#[derive(Clone)]
pub struct ChooseContext {
    pub deadline: Option<Instant>,
    pub cancellation: CancellationToken,
}

impl Default for ChooseContext {
    fn default() -> Self {
        ChooseContext {
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }
}

impl ChooseContext {
    pub fn with_deadline(deadline: Instant) -> Self {
        ChooseContext {
            deadline: Some(deadline),
            ..Default::default()
        }
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }
}

/// A point-in-time view of the chooser's counts and ring shape, for
/// tests and debugging (spec.md §9 Open Question 3 — replaces the
/// source's stdout `Dump`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChooserSnapshot {
    pub unused: usize,
    pub connecting: usize,
    pub available: usize,
    /// `(pending, ring_len)` pairs, ascending by `pending`.
    pub rings: Vec<(usize, usize)>,
}

struct State {
    arena: Arena,
    locator: HashMap<String, NodeIndex>,
    goal: usize,
    unused: usize,
    connecting: usize,
    available: usize,
}

impl State {
    fn satisfy_goal(&mut self, transport: &dyn Transport, monitor: Option<&dyn Monitor>, availability: &Notify) {
        while self.goal > self.connecting + self.available && self.unused > 0 {
            if let Err(err) = self.retain_peer(transport, monitor, availability) {
                tracing::warn!(%err, "failed to retain peer, will retry on the next satisfyGoal");
                break;
            }
        }
        if self.available > 0 {
            availability.notify_one();
        }
    }

    fn retain_peer(
        &mut self,
        transport: &dyn Transport,
        monitor: Option<&dyn Monitor>,
        availability: &Notify,
    ) -> Result<(), RetainError> {
        let index = self.arena.node(UNUSED_HEAD).next;
        let id = self.arena.node(index).id.clone().expect("unused node has an id");
        let subscriber = self.arena.node(index).subscriber.clone();

        match transport.retain_peer(&id, subscriber) {
            Ok(peer) => {
                if let Some(m) = monitor {
                    m.retain_peer(&id);
                }
                self.arena.node_mut(index).peer = Some(peer);
                self.arena.pop(index);
                self.arena.push(index, CONNECTING_HEAD);
                self.unused -= 1;
                self.connecting += 1;
                tracing::debug!(peer = %id, "peer connecting");
                // Fires in the same critical section as the retention,
                // so a peer whose RetainPeer synchronously returns an
                // already-Available handle is promoted before the lock
                // is released (spec.md §4.3 "Race with initial
                // availability").
                self.notify_status_changed(index, monitor, availability);
                Ok(())
            }
            Err(source) => Err(RetainError {
                id: id.as_str().to_string(),
                source,
            }),
        }
    }

    fn notify_status_changed(&mut self, index: NodeIndex, monitor: Option<&dyn Monitor>, availability: &Notify) {
        let peer = match self.arena.node(index).peer.clone() {
            Some(peer) => peer,
            None => return,
        };
        let status = peer.status();

        if let Some(m) = monitor {
            m.notify_status_changed(peer.as_ref());
        }

        let node = self.arena.node(index);
        if status.connection_status == ConnectionStatus::Available && !node.is_available() {
            if node.is_connecting() {
                self.connecting -= 1;
            } else if node.is_unused() {
                self.unused -= 1;
            }
            self.available += 1;

            self.arena.pop(index);
            push_to_circus(&mut self.arena, index, status.pending_request_count);
            tracing::debug!(peer = %peer.identifier(), pending = status.pending_request_count, "peer available");

            availability.notify_one();
            return;
        }

        if status.connection_status == ConnectionStatus::Available
            && node.is_available()
            && node.pending != status.pending_request_count
        {
            // Available, still Available, but the transport's advisory
            // snapshot disagrees with our own ground truth: re-slot into
            // the ring matching the reported count (spec.md §4.3,
            // "Available -> (same, different ring)").
            pop_from_circus(&mut self.arena, index);
            push_to_circus(&mut self.arena, index, status.pending_request_count);
            tracing::debug!(
                peer = %peer.identifier(),
                pending = status.pending_request_count,
                "peer re-slotted after an out-of-band pending count change"
            );
            return;
        }

        // Every other transition (a Connecting peer still connecting, or
        // an Available peer reporting itself unavailable) is the known,
        // intentionally preserved gap of spec.md §9 Open Question 1:
        // this state machine never demotes an Available peer back to
        // Connecting.
    }

    /// Removes a retained-or-unused node entirely: pops it from
    /// whichever list holds it, releases it through the transport if it
    /// had been retained, and returns the slot to the free list. Used by
    /// both `Update`'s `Removals` and `Stop`'s full drain.
    fn release_peer(&mut self, index: NodeIndex, transport: &dyn Transport) {
        let id = self.arena.node(index).id.clone().expect("node to release has an id");
        let peer = self.arena.node(index).peer.clone();
        let subscriber = self.arena.node(index).subscriber.clone();

        let node = self.arena.node(index);
        if node.is_available() {
            pop_from_circus(&mut self.arena, index);
            self.available -= 1;
        } else if node.is_connecting() {
            self.arena.pop(index);
            self.connecting -= 1;
        } else {
            self.arena.pop(index);
            self.unused -= 1;
        }

        if peer.is_some() {
            if let Err(err) = transport.release_peer(&id, subscriber) {
                tracing::warn!(peer = %id, %err, "transport failed to release peer");
            }
        }

        self.arena.node_mut(index).id = None;
        self.arena.node_mut(index).peer = None;
        self.arena.node_mut(index).pending = 0;
        self.arena
            .release_node(index)
            .expect("node was just cleared of id, peer and ring membership");
    }
}

/// The chooser itself: a single mutex-guarded [`State`] plus the
/// availability relay and shutdown signal that let `Choose` block
/// without spinning (spec.md §2, §5).
pub struct Chooser {
    transport: Arc<dyn Transport>,
    monitor: Option<Arc<dyn Monitor>>,
    state: Mutex<State>,
    availability: Notify,
    stop: CancellationToken,
    started: AtomicBool,
}

impl Chooser {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_monitor(transport, None)
    }

    pub fn with_monitor(transport: Arc<dyn Transport>, monitor: Option<Arc<dyn Monitor>>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Chooser>| {
            let weak = weak.clone();
            let arena = Arena::new(Box::new(move |index| Arc::new(PeerSubscriber::new(weak.clone(), index))));
            Chooser {
                transport,
                monitor,
                state: Mutex::new(State {
                    arena,
                    locator: HashMap::new(),
                    goal: usize::MAX,
                    unused: 0,
                    connecting: 0,
                    available: 0,
                }),
                availability: Notify::new(),
                stop: CancellationToken::new(),
                started: AtomicBool::new(false),
            }
        })
    }

    /// Idempotent. Runs `satisfyGoal` once so peers added before `Start`
    /// begin connecting.
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.satisfy_goal(self.transport.as_ref(), self.monitor.as_deref(), &self.availability);
        tracing::info!("chooser started");
    }

    /// Idempotent. Sets the goal to zero, releases every retained peer
    /// and unretires every unused one back through the transport, and
    /// unblocks every `Choose` call currently waiting with
    /// [`ChooseError::Stopped`].
    ///
    /// This is a full drain, distinct from lowering the goal via
    /// [`Chooser::set_goal`] — which never reclaims already-retained
    /// peers (spec.md §9 Open Question 2, preserved as a gap). See
    /// `DESIGN.md` for why `Stop` is the one place this crate implements
    /// more than the source does.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.goal = 0;
        let indices: Vec<NodeIndex> = state.locator.values().copied().collect();
        for index in indices {
            if let Some(id) = state.arena.node(index).id.clone() {
                state.locator.remove(id.as_str());
            }
            state.release_peer(index, self.transport.as_ref());
        }
        drop(state);
        self.stop.cancel();
        tracing::info!("chooser stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stop.is_cancelled()
    }

    /// Sets the target retained (connecting + available) peer count and
    /// runs `satisfyGoal`. Lowering the goal below the current retained
    /// count does not release any peers (the source's unimplemented
    /// clamp, preserved per spec.md §9 Open Question 2).
    pub fn set_goal(&self, goal: usize) {
        let mut state = self.state.lock().unwrap();
        state.goal = goal;
        tracing::info!(goal, "goal changed");
        state.satisfy_goal(self.transport.as_ref(), self.monitor.as_deref(), &self.availability);
    }

    pub fn goal(&self) -> usize {
        self.state.lock().unwrap().goal
    }

    /// Batched peer-set mutation. Adding an already-known id, or
    /// removing an unknown one, is a no-op (spec.md §6).
    pub fn update(&self, additions: Vec<PeerIdentifier>, removals: Vec<PeerIdentifier>) {
        let mut state = self.state.lock().unwrap();
        if let Some(m) = &self.monitor {
            m.update();
        }

        if additions.is_empty() && removals.is_empty() {
            return;
        }

        for id in additions {
            if state.locator.contains_key(id.as_str()) {
                continue;
            }
            let index = state.arena.retain_node();
            state.arena.node_mut(index).id = Some(id.clone());
            state.arena.push(index, UNUSED_HEAD);
            state.locator.insert(id.as_str().to_string(), index);
            state.unused += 1;
            tracing::debug!(peer = %id, "peer added");
        }

        for id in removals {
            if let Some(index) = state.locator.remove(id.as_str()) {
                state.release_peer(index, self.transport.as_ref());
                tracing::debug!(peer = %id, "peer removed");
            }
        }

        state.satisfy_goal(self.transport.as_ref(), self.monitor.as_deref(), &self.availability);
    }

    /// Blocks until a peer with the fewest pending requests is
    /// available, the caller's context is cancelled, or `Stop` is
    /// called. On success, pairs with exactly one `finish` call on the
    /// returned continuation (spec.md §4.5, §5).
    pub async fn choose(&self, _request: &Request, ctx: &ChooseContext) -> Result<(Arc<dyn Peer>, Finish), ChooseError> {
        loop {
            let chosen = {
                let mut state = self.state.lock().unwrap();
                if state.available > 0 {
                    // We may be consuming a notification intended for
                    // another waiter; warn them too.
                    self.availability.notify_one();

                    let index = least_pending_node(&mut state.arena);
                    let pending = state.arena.node(index).pending;
                    pop_from_circus(&mut state.arena, index);
                    push_to_circus(&mut state.arena, index, pending + 1);

                    let peer = state.arena.node(index).peer.clone().expect("available node has a peer");
                    let subscriber = state.arena.node(index).subscriber.clone();
                    Some((peer, subscriber))
                } else {
                    None
                }
            };

            if let Some((peer, subscriber)) = chosen {
                peer.start_request();
                return Ok((peer, subscriber));
            }

            let wait = async {
                tokio::select! {
                    _ = self.availability.notified() => Ok(()),
                    _ = self.stop.cancelled() => Err(ChooseError::Stopped),
                    _ = ctx.cancellation.cancelled() => Err(ChooseError::Cancelled),
                }
            };

            match ctx.deadline {
                Some(deadline) => match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), wait).await {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => return Err(err),
                    Err(_elapsed) => return Err(ChooseError::Cancelled),
                },
                None => match wait.await {
                    Ok(()) => continue,
                    Err(err) => return Err(err),
                },
            }
        }
    }

    /// Called by a [`PeerSubscriber`]'s `finish`: decrements the peer's
    /// pending count and re-slots it, then calls `peer.EndRequest()`
    /// outside the lock.
    pub(crate) fn finish(&self, index: NodeIndex, err: Option<BoxError>) {
        let peer = {
            let mut state = self.state.lock().unwrap();
            let pending = state.arena.node(index).pending;
            pop_from_circus(&mut state.arena, index);
            push_to_circus(&mut state.arena, index, pending - 1);
            state.arena.node(index).peer.clone()
        };
        if let Some(peer) = peer {
            peer.end_request();
        }
        if let Some(err) = err {
            tracing::debug!(%err, "request finished with an error");
        }
    }

    /// Called by a [`PeerSubscriber`]'s `notify_status_changed`.
    pub(crate) fn lock_notify_status_changed(&self, index: NodeIndex, _id: &PeerIdentifier) {
        let mut state = self.state.lock().unwrap();
        state.notify_status_changed(index, self.monitor.as_deref(), &self.availability);
    }

    pub fn snapshot(&self) -> ChooserSnapshot {
        let state = self.state.lock().unwrap();
        let mut rings = Vec::new();
        walk_rings(&state.arena, |pending, len| rings.push((pending, len)));
        ChooserSnapshot {
            unused: state.unused,
            connecting: state.connecting,
            available: state.available,
            rings,
        }
    }
}
