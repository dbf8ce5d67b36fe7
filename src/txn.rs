//! Module `txn` implements the per-call transaction, its undo log, and
//! rollback (spec §4.4, C5).

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::record::RecordRef;
use crate::registry::TableRegistry;

pub type TxnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Committed,
    Aborted,
}

enum UndoEntry {
    Insert { rec: RecordRef, n: u32 },
    Update { rec: RecordRef, idx: usize, prev: Vec<u8> },
}

/// Created for one public operation call (spec §3). Owns the undo log and
/// the two held-lock sets; released/cleared at commit or abort.
pub struct Txn {
    id: TxnId,
    start_ts: u64,
    read_only: bool,
    status: Status,
    log: Vec<UndoEntry>,
    shared_locks: HashSet<RecordRef>,
    exclusive_locks: HashSet<RecordRef>,
    registry: Arc<TableRegistry>,
}

impl Txn {
    pub(crate) fn new(id: TxnId, start_ts: u64, read_only: bool, registry: Arc<TableRegistry>) -> Txn {
        Txn {
            id,
            start_ts,
            read_only,
            status: Status::Active,
            log: Vec::new(),
            shared_locks: HashSet::new(),
            exclusive_locks: HashSet::new(),
            registry,
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn start_ts(&self) -> u64 {
        self.start_ts
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn log_insert(&mut self, rec: RecordRef, n: u32) {
        if !self.read_only {
            self.log.push(UndoEntry::Insert { rec, n });
        }
    }

    pub(crate) fn log_update(&mut self, rec: RecordRef, idx: usize, prev: Vec<u8>) {
        if !self.read_only {
            self.log.push(UndoEntry::Update { rec, idx, prev });
        }
    }

    /// Record that this transaction now holds a record's shared lock, so
    /// it can be released at commit/abort time (spec §4.5 `unlock_all`).
    pub(crate) fn note_shared(&mut self, rec: RecordRef) {
        self.shared_locks.insert(rec);
    }

    /// Record an exclusive hold, removing any shared entry (spec
    /// invariant 3: no nested shared+exclusive on the same record).
    pub(crate) fn note_exclusive(&mut self, rec: RecordRef) {
        self.shared_locks.remove(&rec);
        self.exclusive_locks.insert(rec);
    }

    pub(crate) fn holds_exclusive(&self, rec: RecordRef) -> bool {
        self.exclusive_locks.contains(&rec)
    }

    /// Rollback walks the log in reverse (spec §4.4) so an insert
    /// followed by an update of that same record undoes correctly: the
    /// update is reverted first, then the insert's rollback reclaims the
    /// record.
    fn rollback(&mut self) -> Result<()> {
        for entry in self.log.iter().rev() {
            match entry {
                UndoEntry::Update { rec, idx, prev } => {
                    let table = self.registry.get_by_id(rec.table_id())?;
                    table.rollback_update(*rec, *idx, prev)?;
                }
                UndoEntry::Insert { rec, n } => {
                    let table = self.registry.get_by_id(rec.table_id())?;
                    table.rollback_create(*rec, *n);
                }
            }
        }
        Ok(())
    }

    fn release_all_locks(&mut self) -> Result<()> {
        for rec in self.exclusive_locks.drain().collect::<Vec<_>>() {
            let table = self.registry.get_by_id(rec.table_id())?;
            table.lock_of(rec)?.lock.unlock_exclusive(self.id);
        }
        for rec in self.shared_locks.drain().collect::<Vec<_>>() {
            let table = self.registry.get_by_id(rec.table_id())?;
            table.lock_of(rec)?.lock.unlock_shared(self.id);
        }
        Ok(())
    }

    /// Commit: release every held lock and discard the undo log. No
    /// flushing — state is in-memory only (spec Non-goals).
    pub(crate) fn commit(&mut self) -> Result<()> {
        self.status = Status::Committed;
        self.release_all_locks()?;
        self.log.clear();
        Ok(())
    }

    /// Abort: roll back, then release every held lock.
    pub(crate) fn abort(&mut self) -> Result<()> {
        self.status = Status::Aborted;
        self.rollback()?;
        self.release_all_locks()?;
        self.log.clear();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Kind;

    #[test]
    fn test_abort_rolls_back_update() {
        let registry = Arc::new(TableRegistry::new());
        let table = registry.create_table("t", vec![Kind::Int64]);
        let rec = table.insert_record(None, &crate::value::Value::Int64(0).to_bytes()).unwrap();

        let mut txn = Txn::new(1, 0, false, registry.clone());
        table
            .update_attribute(Some(&mut txn), rec, 0, &crate::value::Value::Int64(5).to_bytes())
            .unwrap();
        assert_eq!(
            crate::value::Value::from_bytes(Kind::Int64, &table.get_attribute(rec, 0).unwrap()).unwrap(),
            crate::value::Value::Int64(5)
        );
        txn.abort().unwrap();
        assert_eq!(
            crate::value::Value::from_bytes(Kind::Int64, &table.get_attribute(rec, 0).unwrap()).unwrap(),
            crate::value::Value::Int64(0)
        );
    }
}
