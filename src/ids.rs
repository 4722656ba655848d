use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Identifier factory shared by every component that mints ids.
///
/// Production code uses [`UuidProvider`]; tests swap in [`SequentialProvider`]
/// so that identifiers are deterministic and assertions can name them.
pub trait IdProvider: Send + Sync {
    /// Mint a fresh identifier with the given entity prefix (e.g. "session").
    fn next_id(&self, prefix: &str) -> String;
}

/// Random v4 UUIDs, collision-free without coordination.
#[derive(Debug, Default)]
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, Uuid::new_v4())
    }
}

/// Monotonic counter ids for deterministic tests.
#[derive(Debug, Default)]
pub struct SequentialProvider {
    counter: AtomicU64,
}

impl IdProvider for SequentialProvider {
    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{:04}", prefix, n)
    }
}
