//! Load and chaos generators for exercising a running [`Chooser`] (modeled
//! on `zebra-test`'s network-load harnesses).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use circus::{ChooseContext, Chooser, PeerIdentifier, Request};

/// Runs `concurrency` tasks that each repeatedly `choose`, hold the peer
/// for a random sub-microsecond tick, and `finish` it, until `duration`
/// elapses or the chooser stops. Returns the number of successful
/// choose/finish cycles completed across all tasks.
pub async fn generate_load(chooser: Arc<Chooser>, concurrency: usize, duration: Duration) -> usize {
    tracing::info!(concurrency, ?duration, "starting load generation");
    let deadline = tokio::time::Instant::now() + duration;
    let mut handles = Vec::with_capacity(concurrency);

    for _ in 0..concurrency {
        let chooser = chooser.clone();
        handles.push(tokio::spawn(async move {
            let mut cycles = 0usize;
            loop {
                let ctx = ChooseContext::with_deadline(deadline.into_std());
                match chooser.choose(&Request, &ctx).await {
                    Ok((_peer, finish)) => {
                        let nanos = rand::thread_rng().gen_range(0..10);
                        tokio::time::sleep(Duration::from_nanos(nanos)).await;
                        finish.finish(None);
                        cycles += 1;
                    }
                    Err(_) => break,
                }
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
            }
            cycles
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap_or(0);
    }
    tracing::info!(cycles = total, "load generation finished");
    total
}

/// Seeds `chooser` with `n` synthetic peer identifiers of the form
/// `127.0.0.<n>` via a single `Update` call, returning the identifiers
/// added. Used to drive chaos scenarios (peers flapping, goal changes)
/// against a chooser that already has a realistic-sized peer set.
pub fn generate_chaos(chooser: &Chooser, n: usize) -> Vec<PeerIdentifier> {
    let ids: Vec<PeerIdentifier> = (0..n).map(|i| PeerIdentifier::new(format!("127.0.0.{}", i))).collect();
    tracing::info!(count = n, "seeding chaos cluster");
    chooser.update(ids.clone(), Vec::new());
    ids
}
