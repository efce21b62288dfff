use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use paperlens_core::{CompletionClient, Config, PdfBackend, ResultTable};

/// Finished tables kept for download before the oldest is evicted.
pub const DEFAULT_STORE_CAPACITY: usize = 32;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn PdfBackend>,
    /// `None` when no API key is configured; sessions then fail up front.
    pub client: Option<Arc<dyn CompletionClient>>,
    pub store: SessionStore,
}

/// In-memory store of completed tables, keyed by session id.
///
/// Bounded: inserting past capacity evicts the oldest table. Nothing is
/// persisted across restarts.
pub struct SessionStore {
    capacity: usize,
    tables: Mutex<VecDeque<(String, Arc<ResultTable>)>>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tables: Mutex::new(VecDeque::new()),
        }
    }

    /// A fresh random session id (16 hex digits).
    pub fn new_id() -> String {
        format!("{:016x}", fastrand::u64(..))
    }

    pub fn insert(&self, id: String, table: ResultTable) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.retain(|(existing, _)| *existing != id);
        while tables.len() >= self.capacity {
            if let Some((evicted, _)) = tables.pop_front() {
                tracing::debug!(session = %evicted, "evicted stored table");
            }
        }
        tables.push_back((id, Arc::new(table)));
    }

    pub fn get(&self, id: &str) -> Option<Arc<ResultTable>> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, table)| Arc::clone(table))
    }

    pub fn len(&self) -> usize {
        self.tables.lock().map(|t| t.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperlens_core::Schema;

    fn empty_table() -> ResultTable {
        ResultTable::new(Arc::new(Schema::academic_paper()))
    }

    #[test]
    fn ids_are_hex_and_distinct() {
        let a = SessionStore::new_id();
        let b = SessionStore::new_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn oldest_table_is_evicted() {
        let store = SessionStore::new(2);
        store.insert("one".into(), empty_table());
        store.insert("two".into(), empty_table());
        store.insert("three".into(), empty_table());
        assert_eq!(store.len(), 2);
        assert!(store.get("one").is_none());
        assert!(store.get("two").is_some());
        assert!(store.get("three").is_some());
    }

    #[test]
    fn reinserting_an_id_replaces_it() {
        let store = SessionStore::new(4);
        store.insert("same".into(), empty_table());
        store.insert("same".into(), empty_table());
        assert_eq!(store.len(), 1);
    }
}
