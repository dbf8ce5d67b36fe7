//! Module `registry` implements the namespaced table registry (spec §4.3,
//! C4): a thread-safe dictionary of tables keyed by both name and numeric
//! id, with idempotent lazy creation (spec §3 Lifecycle: "Tables are
//! created lazily the first time a DS instance referencing an attribute
//! of that table is constructed").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering::SeqCst};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::table::{ColumnLayout, Table};

/// Namespaced, thread-safe table registry. Table ids are assigned by
/// fetch-add on a shared atomic counter starting at 1, so `0` stays
/// reserved for [crate::record::RecordRef::NULL].
pub struct TableRegistry {
    by_name: RwLock<HashMap<String, Arc<Table>>>,
    by_id: RwLock<HashMap<u32, Arc<Table>>>,
    next_id: AtomicU32,
}

impl TableRegistry {
    pub fn new() -> TableRegistry {
        TableRegistry {
            by_name: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn exists_by_name(&self, name: &str) -> bool {
        self.by_name.read().unwrap().contains_key(name)
    }

    pub fn exists_by_id(&self, id: u32) -> bool {
        self.by_id.read().unwrap().contains_key(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Arc<Table>> {
        self.by_name
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownName(format!("table {:?}", name)))
    }

    pub fn get_by_id(&self, id: u32) -> Result<Arc<Table>> {
        self.by_id
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Fatal(format!("no table with id {}", id)))
    }

    /// Creation is atomic with respect to "table exists": if a concurrent
    /// creator wins the race, the loser returns the winner's table rather
    /// than erroring or creating a duplicate.
    pub fn create_table(&self, name: &str, kinds: Vec<crate::value::Kind>) -> Arc<Table> {
        {
            let by_name = self.by_name.read().unwrap();
            if let Some(t) = by_name.get(name) {
                return t.clone();
            }
        }
        let mut by_name = self.by_name.write().unwrap();
        if let Some(t) = by_name.get(name) {
            return t.clone();
        }
        let id = self.next_id.fetch_add(1, SeqCst);
        let table = Arc::new(Table::new(id, name, ColumnLayout::new(kinds)));
        log::debug!("created table {:?} id={}", name, id);
        by_name.insert(name.to_string(), table.clone());
        self.by_id.write().unwrap().insert(id, table.clone());
        table
    }

    /// Process/namespace teardown: drop every table, freeing their
    /// records.
    pub fn clear(&self) {
        self.by_name.write().unwrap().clear();
        self.by_id.write().unwrap().clear();
    }

    pub fn table_count(&self) -> usize {
        self.by_id.read().unwrap().len()
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        TableRegistry::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Kind;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_create_idempotent() {
        let reg = TableRegistry::new();
        let t1 = reg.create_table("nodes", vec![Kind::Int64]);
        let t2 = reg.create_table("nodes", vec![Kind::Int64]);
        assert_eq!(t1.id(), t2.id());
        assert_eq!(reg.table_count(), 1);
    }

    #[test]
    fn test_concurrent_create_single_winner() {
        let reg = Arc::new(TableRegistry::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    reg.create_table("shared", vec![Kind::Int32]).id()
                })
            })
            .collect();
        let ids: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(reg.table_count(), 1);
    }
}
