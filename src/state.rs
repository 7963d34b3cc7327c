//! Published name table state shared with the responder.
//!
//! Tables are built off to the side by the reconciliation driver and then
//! swapped in whole, so a query always sees either the previous table or the
//! new one, never a half-populated one.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;
use crate::table::NameTable;

/// Thread-safe handle to the current name table.
#[derive(Debug, Clone)]
pub struct DnsState {
    inner: Arc<RwLock<DnsStateInner>>,
}

#[derive(Debug, Default)]
struct DnsStateInner {
    /// Current table snapshot.
    table: Arc<NameTable>,

    /// Incremented on every publish.
    generation: u32,

    /// True once a table has been published.
    ready: bool,
}

impl Default for DnsState {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsState {
    /// Create a state with an empty, unpublished table.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(DnsStateInner::default())),
        }
    }

    /// Create a state with `table` already published.
    pub fn with_table(table: NameTable) -> Self {
        let state = Self::new();
        state.publish(table);
        state
    }

    /// Replace the current table.
    pub fn publish(&self, table: NameTable) {
        let mut inner = self.inner.write();
        inner.table = Arc::new(table);
        inner.generation = inner.generation.wrapping_add(1);
        inner.ready = true;
        debug!(
            entries = inner.table.len(),
            generation = inner.generation,
            "published name table"
        );
    }

    /// The current table. Cheap; the lock is held only to clone the `Arc`.
    pub fn snapshot(&self) -> Arc<NameTable> {
        self.inner.read().table.clone()
    }

    /// Whether a table has been published.
    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    /// Number of publishes so far.
    pub fn generation(&self) -> u32 {
        self.inner.read().generation
    }

    /// Emit current state metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_table_counts(inner.table.len(), inner.table.wildcard_count());
        metrics::record_generation(inner.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn table_with(name: &str, addr: [u8; 4]) -> NameTable {
        let mut table = NameTable::new();
        table.put(name, Ipv4Addr::from(addr)).unwrap();
        table
    }

    #[test]
    fn test_new_state_is_empty_and_not_ready() {
        let state = DnsState::new();
        assert!(!state.is_ready());
        assert!(state.snapshot().is_empty());
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn test_publish_marks_ready() {
        let state = DnsState::new();
        state.publish(table_with("host.ona.im", [104, 198, 14, 52]));

        assert!(state.is_ready());
        assert_eq!(state.generation(), 1);
        assert_eq!(
            state.snapshot().lookup("host.ona.im"),
            Some(Ipv4Addr::new(104, 198, 14, 52))
        );
    }

    #[test]
    fn test_snapshot_survives_republish() {
        let state = DnsState::with_table(table_with("old.ona.im", [10, 0, 0, 1]));
        let before = state.snapshot();

        state.publish(table_with("new.ona.im", [10, 0, 0, 2]));

        assert!(before.lookup("old.ona.im").is_some());
        assert!(state.snapshot().lookup("old.ona.im").is_none());
        assert!(state.snapshot().lookup("new.ona.im").is_some());
        assert_eq!(state.generation(), 2);
    }

    #[test]
    fn test_clones_share_table() {
        let state = DnsState::new();
        let other = state.clone();
        state.publish(table_with("host.ona.im", [1, 2, 3, 4]));

        assert!(other.is_ready());
        assert_eq!(other.snapshot().len(), 1);
    }
}
