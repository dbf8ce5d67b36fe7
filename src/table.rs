//! Module `table` implements the single-version row store (spec §4.2, C3).
//!
//! Columns are packed with no padding (spec §4.1): offsets are computed
//! once, in declaration order, when the table is created. A record's data
//! is `record_size_data_only` bytes; per-record metadata (here: the
//! [RecordLock]) lives alongside the data rather than packed into the same
//! byte buffer, since this store addresses records by slot id rather than
//! raw pointer (see [crate::record]) and so has no need to recover
//! metadata via pointer arithmetic the way the teacher's packed-pointer
//! design would.

use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Error, Result};
use crate::lock::RecordLock;
use crate::record::RecordRef;
use crate::txn::Txn;
use crate::value::Kind;

/// One row's storage: its transactional lock plus its raw attribute
/// bytes. Lives behind `Arc` so the bag's `Vec` can grow (reallocating the
/// vector of pointers) without moving or invalidating a row already
/// handed out to a caller.
pub struct RecordSlot {
    pub lock: RecordLock,
    bytes: RwLock<Vec<u8>>,
}

impl RecordSlot {
    fn new(data: Vec<u8>) -> RecordSlot {
        RecordSlot {
            lock: RecordLock::new(),
            bytes: RwLock::new(data),
        }
    }
}

/// Column layout computed once at table creation (spec §4.1): offset and
/// width per attribute, in declaration order.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    pub kinds: Vec<Kind>,
    pub offsets: Vec<usize>,
    pub record_size_data_only: usize,
}

impl ColumnLayout {
    pub fn new(kinds: Vec<Kind>) -> ColumnLayout {
        let mut offsets = Vec::with_capacity(kinds.len());
        let mut at = 0usize;
        for k in &kinds {
            offsets.push(at);
            at += k.width();
        }
        ColumnLayout {
            kinds,
            offsets,
            record_size_data_only: at,
        }
    }
}

/// Single-version row store for one registered (sub-)type. Table memory
/// is owned outright: records live until the table itself is dropped
/// (spec §3 Lifecycle — no mid-life deallocation of individual rows).
pub struct Table {
    id: u32,
    name: String,
    layout: ColumnLayout,
    bag: Mutex<Vec<Arc<RecordSlot>>>,
}

impl Table {
    pub fn new(id: u32, name: impl Into<String>, layout: ColumnLayout) -> Table {
        Table {
            id,
            name: name.into(),
            layout,
            bag: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    fn slot(&self, rec: RecordRef) -> Result<Arc<RecordSlot>> {
        if rec.table_id() != self.id {
            return err_at!(
                Fatal,
                msg: "record {} does not belong to table {}",
                rec,
                self.id
            );
        }
        let bag = self.bag.lock().unwrap();
        bag.get(rec.slot_id() as usize)
            .cloned()
            .ok_or_else(|| Error::Fatal(format!("no such slot {}", rec)))
    }

    pub fn lock_of(&self, rec: RecordRef) -> Result<Arc<RecordSlot>> {
        self.slot(rec)
    }

    /// `insertRecord` (spec §4.2): allocate one record, copy `src` into
    /// its data area, log an *insert* undo entry if `txn` is given.
    pub fn insert_record(&self, txn: Option<&mut Txn>, src: &[u8]) -> Result<RecordRef> {
        self.insert_n_records(txn, 1, Some(src))
    }

    /// `insertNRecords` (spec §4.2): allocate `n` contiguous rows,
    /// returning a reference to the first. If `src` is given the same
    /// bytes seed every row; otherwise rows are zero-initialized.
    pub fn insert_n_records(
        &self,
        txn: Option<&mut Txn>,
        n: u32,
        src: Option<&[u8]>,
    ) -> Result<RecordRef> {
        if let Some(s) = src {
            if s.len() != self.layout.record_size_data_only {
                return err_at!(
                    SchemaViolation,
                    msg: "src len {} != record size {}",
                    s.len(),
                    self.layout.record_size_data_only
                );
            }
        }
        // Slot id and storage position must be assigned atomically with the
        // push itself: reserving a slot id ahead of the bag lock (e.g. from
        // a separate counter) lets two concurrent inserts interleave so the
        // id one caller gets back does not match the index the other
        // caller's push lands at, corrupting every later lookup.
        let first_slot = {
            let mut bag = self.bag.lock().unwrap();
            let first_slot = bag.len() as u32;
            for _ in 0..n {
                let data = match src {
                    Some(s) => s.to_vec(),
                    None => vec![0u8; self.layout.record_size_data_only],
                };
                bag.push(Arc::new(RecordSlot::new(data)));
            }
            first_slot
        };
        let first_ref = RecordRef::new(self.id, first_slot);
        if let Some(txn) = txn {
            txn.log_insert(first_ref, n);
        }
        Ok(first_ref)
    }

    /// `getData` (spec §4.2): raw byte copy, does not lock.
    pub fn get_data(&self, rec: RecordRef, offset: usize, len: usize) -> Result<Vec<u8>> {
        let slot = self.slot(rec)?;
        let bytes = slot.bytes.read().unwrap();
        if offset + len > bytes.len() {
            return err_at!(
                SchemaViolation,
                msg: "get_data {}+{} out of bounds ({})",
                offset,
                len,
                bytes.len()
            );
        }
        Ok(bytes[offset..offset + len].to_vec())
    }

    /// `getAttribute` (spec §4.2): does not lock; callers acquire via
    /// [crate::lock] beforehand (the CC injector guarantees this for
    /// interpreted operations).
    pub fn get_attribute(&self, rec: RecordRef, idx: usize) -> Result<Vec<u8>> {
        let (offset, width) = self.attr_offset_width(idx)?;
        self.get_data(rec, offset, width)
    }

    /// `updateAttribute` (spec §4.2): records an undo entry capturing the
    /// previous bytes (skipped when `txn` is `None`, the build-time
    /// single-threaded path), then overwrites.
    pub fn update_attribute(&self, txn: Option<&mut Txn>, rec: RecordRef, idx: usize, src: &[u8]) -> Result<()> {
        let (offset, width) = self.attr_offset_width(idx)?;
        if src.len() != width {
            return err_at!(SchemaViolation, msg: "attribute {} width {} != {}", idx, width, src.len());
        }
        let slot = self.slot(rec)?;
        let mut bytes = slot.bytes.write().unwrap();
        if let Some(txn) = txn {
            if !txn.is_read_only() {
                let prev = bytes[offset..offset + width].to_vec();
                txn.log_update(rec, idx, prev);
            }
        }
        bytes[offset..offset + width].copy_from_slice(src);
        Ok(())
    }

    /// `getNthRecordReference` (spec §4.2): treat `base` as the head of a
    /// contiguous array and address row `n`.
    pub fn get_nth_record_reference(&self, base: RecordRef, n: u32) -> RecordRef {
        base.nth(n)
    }

    pub fn get_nth_record(&self, base: RecordRef, n: u32) -> Result<Vec<u8>> {
        let rec = self.get_nth_record_reference(base, n);
        let len = self.layout.record_size_data_only;
        self.get_data(rec, 0, len)
    }

    pub fn update_nth_record(&self, txn: Option<&mut Txn>, base: RecordRef, n: u32, src: &[u8]) -> Result<()> {
        let rec = self.get_nth_record_reference(base, n);
        let slot = self.slot(rec)?;
        let mut bytes = slot.bytes.write().unwrap();
        if src.len() != bytes.len() {
            return err_at!(SchemaViolation, msg: "row width mismatch {} != {}", src.len(), bytes.len());
        }
        if let Some(txn) = txn {
            if !txn.is_read_only() {
                txn.log_update(rec, usize::MAX, bytes.clone());
            }
        }
        bytes.copy_from_slice(src);
        Ok(())
    }

    /// `rollback_update` (spec §4.2): restore a field from undo bytes.
    /// `idx == usize::MAX` marks a whole-row undo captured by
    /// `update_nth_record`.
    pub fn rollback_update(&self, rec: RecordRef, idx: usize, prev: &[u8]) -> Result<()> {
        let slot = self.slot(rec)?;
        let mut bytes = slot.bytes.write().unwrap();
        if idx == usize::MAX {
            bytes.copy_from_slice(prev);
        } else {
            let (offset, width) = self.attr_offset_width(idx)?;
            bytes[offset..offset + width].copy_from_slice(prev);
        }
        Ok(())
    }

    /// `rollback_create` (spec §4.2): frees the record. This store has no
    /// mid-life slot deallocation (spec §3: removals are logical, memory
    /// lives until table teardown) so an aborted insert's rows are simply
    /// left unreachable — no transaction that observed the abort ever
    /// captured a reference to them in a committed attribute, since any
    /// such write would itself have been undone first (log replays in
    /// reverse, spec §4.4).
    pub fn rollback_create(&self, _rec: RecordRef, _n: u32) {}

    fn attr_offset_width(&self, idx: usize) -> Result<(usize, usize)> {
        let width = self
            .layout
            .kinds
            .get(idx)
            .ok_or_else(|| Error::SchemaViolation(format!("no attribute at index {}", idx)))?
            .width();
        let offset = self.layout.offsets[idx];
        Ok((offset, width))
    }

    pub fn len(&self) -> usize {
        self.bag.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::{Kind, Value};

    fn layout() -> ColumnLayout {
        ColumnLayout::new(vec![Kind::Int64, Kind::RecordPtr])
    }

    #[test]
    fn test_insert_and_read() {
        let t = Table::new(1, "t", layout());
        let src = [Value::Int64(42).to_bytes(), Value::RecordPtr(0).to_bytes()].concat();
        let r = t.insert_record(None, &src).unwrap();
        assert_eq!(r.table_id(), 1);
        let got = t.get_attribute(r, 0).unwrap();
        assert_eq!(Value::from_bytes(Kind::Int64, &got).unwrap(), Value::Int64(42));
    }

    #[test]
    fn test_update_and_rollback() {
        let t = Table::new(1, "t", layout());
        let src = [Value::Int64(0).to_bytes(), Value::RecordPtr(0).to_bytes()].concat();
        let r = t.insert_record(None, &src).unwrap();
        t.update_attribute(None, r, 0, &Value::Int64(99).to_bytes()).unwrap();
        let got = t.get_attribute(r, 0).unwrap();
        assert_eq!(Value::from_bytes(Kind::Int64, &got).unwrap(), Value::Int64(99));
        t.rollback_update(r, 0, &Value::Int64(0).to_bytes()).unwrap();
        let got = t.get_attribute(r, 0).unwrap();
        assert_eq!(Value::from_bytes(Kind::Int64, &got).unwrap(), Value::Int64(0));
    }

    #[test]
    fn test_array_contiguous_rows() {
        let t = Table::new(2, "arr", layout());
        let base = t.insert_n_records(None, 3, None).unwrap();
        for n in 0..3 {
            let row = t.get_nth_record(base, n).unwrap();
            assert_eq!(row.len(), t.layout().record_size_data_only);
        }
        assert_eq!(t.len(), 3);
    }

    /// Regression test for a slot-id/push-order race: every concurrent
    /// single-record insert must see a distinct slot id that matches the
    /// position its bytes actually landed at, with no duplicates or gaps
    /// (spec invariant 1: a `record_ptr` must decode to the same record it
    /// was handed back for).
    #[test]
    fn test_concurrent_inserts_get_distinct_consistent_slots() {
        use std::sync::{Arc as StdArc, Barrier};
        use std::thread;

        let t = StdArc::new(Table::new(1, "t", layout()));
        let n = 16;
        let barrier = StdArc::new(Barrier::new(n));
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let t = t.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let src = [Value::Int64(i as i64).to_bytes(), Value::RecordPtr(0).to_bytes()].concat();
                    barrier.wait();
                    let r = t.insert_record(None, &src).unwrap();
                    (r, i as i64)
                })
            })
            .collect();

        let results: Vec<(RecordRef, i64)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut slots: Vec<u32> = results.iter().map(|(r, _)| r.slot_id()).collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), n, "every insert must land on a distinct slot");

        for (r, expected) in &results {
            let got = t.get_attribute(*r, 0).unwrap();
            assert_eq!(Value::from_bytes(Kind::Int64, &got).unwrap(), Value::Int64(*expected));
        }
    }
}
