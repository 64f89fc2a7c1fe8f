//! End-to-end scenarios driving a [`Chooser`] through a [`FakeTransport`],
//! one test per behavior spec.md calls out by name.

use std::time::Duration;

use circus::{ChooseContext, ChooseError, Chooser, PeerIdentifier, Request};
use circus_test::{generate_chaos, generate_load, FakeTransport};

fn ring_shape_is_sorted_and_nonempty(snapshot: &circus::ChooserSnapshot) {
    let mut last = None;
    for &(pending, len) in &snapshot.rings {
        assert!(len > 0, "a carrier with no members should have been torn down");
        if let Some(last) = last {
            assert!(pending > last, "rings must be sorted strictly ascending by pending count");
        }
        last = Some(pending);
    }
}

// S1: an empty chooser's `choose` blocks until the caller's deadline
// elapses, never panicking or returning a phantom peer.
#[tokio::test]
async fn choose_on_empty_chooser_times_out() {
    let transport = FakeTransport::new();
    let chooser = Chooser::new(transport);
    chooser.start();

    let ctx = ChooseContext::with_timeout(Duration::from_millis(20));
    let result = chooser.choose(&Request, &ctx).await;
    assert!(matches!(result, Err(ChooseError::Cancelled)));
}

// S2: a single peer can be chosen, finished, and chosen again.
#[tokio::test]
async fn single_peer_cycles_through_choose_and_finish() {
    let transport = FakeTransport::new();
    let chooser = Chooser::new(transport);
    chooser.update(vec![PeerIdentifier::new("127.0.0.1")], Vec::new());
    chooser.start();

    let ctx = ChooseContext::with_timeout(Duration::from_millis(200));
    let (peer, finish) = chooser.choose(&Request, &ctx).await.expect("only peer should be available");
    assert_eq!(peer.identifier().as_str(), "127.0.0.1");
    finish.finish(None);

    let (peer, finish) = chooser.choose(&Request, &ctx).await.expect("peer should be available again");
    assert_eq!(peer.identifier().as_str(), "127.0.0.1");
    finish.finish(None);
}

// S3: three peers added together, all Available at pending=0, are handed
// out to three successive unfinished `Choose` calls in addition order; a
// fourth call then sees all three at pending=1 and wraps back to the
// first.
#[tokio::test]
async fn three_peers_round_robin_under_unfinished_requests() {
    let transport = FakeTransport::new();
    let chooser = Chooser::new(transport);
    chooser.update(
        vec![
            PeerIdentifier::new("127.0.0.1"),
            PeerIdentifier::new("127.0.0.2"),
            PeerIdentifier::new("127.0.0.3"),
        ],
        Vec::new(),
    );
    chooser.start();

    let ctx = ChooseContext::with_timeout(Duration::from_millis(200));
    let mut chosen = Vec::new();
    for _ in 0..3 {
        let (peer, _finish) = chooser.choose(&Request, &ctx).await.expect("three peers are available");
        chosen.push(peer.identifier().as_str().to_string());
    }
    assert_eq!(chosen, vec!["127.0.0.1", "127.0.0.2", "127.0.0.3"]);

    let snapshot = chooser.snapshot();
    assert_eq!(snapshot.available, 3);
    assert_eq!(snapshot.rings, vec![(1, 3)]);
    ring_shape_is_sorted_and_nonempty(&snapshot);

    let (fourth, _finish) = chooser.choose(&Request, &ctx).await.expect("all three are at pending=1");
    assert_eq!(fourth.identifier().as_str(), "127.0.0.1");
}

// S4: goal=2 with 4 known peers retains exactly 2; `Stop` then drains
// everything and wakes a blocked `Choose` caller with `Stopped`.
#[tokio::test]
async fn goal_limits_retention_and_stop_drains_and_wakes_waiters() {
    // Peers that never self-report Available, so nothing is ever handed
    // out and a waiting `choose` call stays blocked until `Stop`.
    let transport = FakeTransport::slow_connecting();
    let chooser = Chooser::new(transport.clone());
    chooser.set_goal(2);
    let _ids = generate_chaos(&chooser, 4);
    chooser.start();

    let snapshot = chooser.snapshot();
    assert_eq!(snapshot.connecting, 2);
    assert_eq!(snapshot.available, 0);
    assert_eq!(snapshot.unused, 2);
    assert_eq!(transport.retained_count(), 2);

    let waiter = {
        let chooser = chooser.clone();
        tokio::spawn(async move {
            let ctx = ChooseContext::with_timeout(Duration::from_secs(5));
            chooser.choose(&Request, &ctx).await
        })
    };
    // Give the waiter a chance to actually reach the blocking select
    // before Stop fires, so this exercises the wakeup path and not a
    // pre-Stop race.
    tokio::time::sleep(Duration::from_millis(20)).await;

    chooser.stop();
    assert!(!chooser.is_running());
    assert_eq!(transport.retained_count(), 0);

    let snapshot = chooser.snapshot();
    assert_eq!(snapshot.unused, 0);
    assert_eq!(snapshot.connecting, 0);
    assert_eq!(snapshot.available, 0);

    let result = waiter.await.expect("task did not panic");
    assert!(matches!(result, Err(ChooseError::Stopped)));
}

// S5: 100 concurrent callers against 4 Available peers each doing random
// 0-10ns work: every caller makes forward progress, the ring invariants
// hold throughout, and the carrier count stays bounded by the number of
// distinct pending counts in play.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_load_preserves_ring_invariants() {
    circus_test::init();
    let transport = FakeTransport::new();
    let chooser = Chooser::new(transport);
    let _ids = generate_chaos(&chooser, 4);
    chooser.start();

    let callers = 100;
    let cycles = generate_load(chooser.clone(), callers, Duration::from_millis(500)).await;
    assert!(
        cycles >= callers,
        "every one of the {callers} callers should have completed at least one choose/finish cycle"
    );

    let snapshot = chooser.snapshot();
    ring_shape_is_sorted_and_nonempty(&snapshot);
    assert_eq!(snapshot.available, 4);
    assert!(snapshot.rings.len() <= 5, "carrier count should stay small relative to 4 peers");
}

// An Available peer whose transport reports a changed pending count out
// of band (without the chooser's own Choose/finish driving it) is
// re-slotted into the ring matching the new count, per spec.md §4.3's
// "Available -> (same, different ring)" transition.
#[tokio::test]
async fn available_peer_reslots_on_out_of_band_pending_change() {
    let transport = FakeTransport::new();
    let chooser = Chooser::new(transport.clone());
    let id = PeerIdentifier::new("127.0.0.1");
    chooser.update(vec![id.clone()], Vec::new());
    chooser.start();

    let snapshot = chooser.snapshot();
    assert_eq!(snapshot.rings, vec![(0, 1)]);

    transport.set_pending(&id, 5);

    let snapshot = chooser.snapshot();
    assert_eq!(snapshot.available, 1);
    assert_eq!(snapshot.rings, vec![(5, 1)]);
}

// `Update`'s `Removals` (SPEC_FULL.md §4.3.1) must tear down an
// Available peer's ring/carrier, release a Connecting peer through the
// transport, release an Unused peer without ever touching the
// transport, and treat an unknown id as a no-op (spec.md §6).
#[tokio::test]
async fn update_removals_release_peers_in_every_state() {
    // Peers that stay Connecting until explicitly promoted, so the
    // Connecting and Available branches can be told apart (Available
    // never demotes back to Connecting — spec.md §9 Open Question 1 —
    // so there's no way to reach this mix starting from a transport
    // that makes everything Available immediately).
    let transport = FakeTransport::slow_connecting();
    let chooser = Chooser::new(transport.clone());
    let available = PeerIdentifier::new("127.0.0.1");
    let connecting = PeerIdentifier::new("127.0.0.2");
    let unused = PeerIdentifier::new("127.0.0.3");

    // goal=2 so exactly two of the three peers are retained, leaving
    // the third Unused with no transport-side state at all.
    chooser.set_goal(2);
    chooser.update(vec![available.clone(), connecting.clone(), unused.clone()], Vec::new());
    chooser.start();
    transport.set_status(&available, circus::ConnectionStatus::Available);

    let snapshot = chooser.snapshot();
    assert_eq!(snapshot.rings, vec![(0, 1)], "only 127.0.0.1 should be Available");
    assert_eq!(snapshot.available, 1);
    assert_eq!(snapshot.connecting, 1);
    assert_eq!(snapshot.unused, 1);
    assert!(transport.is_retained(&available));
    assert!(transport.is_retained(&connecting));
    assert!(!transport.is_retained(&unused));

    // Removing an unknown id is a no-op.
    chooser.update(Vec::new(), vec![PeerIdentifier::new("127.0.0.99")]);
    let unchanged = chooser.snapshot();
    assert_eq!(unchanged, snapshot);

    chooser.update(Vec::new(), vec![available.clone(), connecting.clone(), unused.clone()]);

    let snapshot = chooser.snapshot();
    assert_eq!(snapshot.rings, Vec::<(usize, usize)>::new(), "the emptied ring must be torn down");
    assert_eq!(snapshot.available, 0);
    assert_eq!(snapshot.connecting, 0);
    assert_eq!(snapshot.unused, 0);
    assert!(!transport.is_retained(&available));
    assert!(!transport.is_retained(&connecting));

    // Re-adding 127.0.0.1 after removal gets a fresh slot, not the stale one.
    chooser.set_goal(usize::MAX);
    chooser.update(vec![available.clone()], Vec::new());
    transport.set_status(&available, circus::ConnectionStatus::Available);
    let ctx = ChooseContext::with_timeout(Duration::from_millis(200));
    let (peer, finish) = chooser.choose(&Request, &ctx).await.expect("127.0.0.1 should be available again");
    assert_eq!(peer.identifier().as_str(), "127.0.0.1");
    finish.finish(None);
}

// S6: adding the same identifiers again is a no-op, even at a larger
// peer-set size.
#[tokio::test]
async fn repeated_update_with_same_additions_is_idempotent() {
    let transport = FakeTransport::new();
    let chooser = Chooser::new(transport);
    // Pin the goal at zero so this exercises pure `Update` bookkeeping,
    // undisturbed by `satisfyGoal` retaining anything.
    chooser.set_goal(0);
    let ids = generate_chaos(&chooser, 256);
    let snapshot_first = chooser.snapshot();

    chooser.update(ids, Vec::new());
    let snapshot_second = chooser.snapshot();

    assert_eq!(snapshot_first, snapshot_second);
    assert_eq!(snapshot_second.unused, 256);
}
