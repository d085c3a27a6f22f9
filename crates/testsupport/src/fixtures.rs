//! Common test fixtures and data generators.

use common::{Config, Xid};
use engine::Engine;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::{path::Path, sync::Once, thread, time::Duration};

/// Config with caches small enough to force eviction in tests.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let cfg = test_config(std::path::Path::new("/tmp/t"));
/// assert_eq!(cfg.name, "test");
/// ```
pub fn test_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir.to_path_buf())
        .name("test")
        .page_cache_bytes(1 << 20)
        .data_cache_items(512)
        .build()
}

/// `0..n` in an order fixed by `seed`.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let keys = shuffled_keys(100, 7);
/// assert_eq!(keys, shuffled_keys(100, 7));
/// let mut sorted = keys.clone();
/// sorted.sort();
/// assert_eq!(sorted, (0..100).collect::<Vec<_>>());
/// ```
pub fn shuffled_keys(n: i64, seed: u64) -> Vec<i64> {
    let mut keys: Vec<i64> = (0..n).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(seed));
    keys
}

/// Distinct, recognisable row payload for `i`.
pub fn payload(i: u64) -> Vec<u8> {
    format!("row-{i:06}").into_bytes()
}

/// Block until `xid` is queued behind another transaction's row lock.
///
/// # Panics
///
/// Panics if `xid` is still running freely after two seconds.
pub fn wait_until_blocked(engine: &Engine, xid: Xid) {
    for _ in 0..2_000 {
        if engine.waiting_on(xid).is_some() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("transaction {xid} never blocked on a row lock");
}

static TRACING: Once = Once::new();

/// Install a test-writer subscriber filtered by `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .with_thread_ids(true)
            .try_init();
    });
}
