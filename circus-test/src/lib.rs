//! Fakes and load/chaos generators for exercising a [`circus::Chooser`]
//! without a real wire transport, modeled on `zebra-test`.

mod fake;
mod harness;

pub use crate::fake::{FakePeer, FakeTransport};
pub use crate::harness::{generate_chaos, generate_load};

/// Installs a `tracing` subscriber that writes to the test harness,
/// mirroring `zebra_test::init()`. Safe to call from every test; only
/// the first call in a process takes effect.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
