//! Module `index` implements the value-type-parametric hash index (spec
//! §4.6, C8) that backs indexed-list attributes, plus the process-wide
//! registry that lets an 8-byte `record_ptr` column carry an opaque
//! handle to one of these indexes (spec §4.8: "constructs a new index of
//! the declared key kind and stores its pointer in the main record").
//!
//! Secondary indexes proper (an opaque key→uintptr map the core merely
//! consults) are out of scope per spec §1; this module is the *in-scope*
//! index adapter indexed-list attributes are built on, not that feature.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};
use std::sync::RwLock;

use crate::value::Value;

/// A [Value] wrapped for use as a hash-map key. Float/Double keys hash
/// and compare on their bit pattern — acceptable for an index key, which
/// is never subject to the arithmetic-equality subtleties of NaN/`-0.0`
/// comparisons the way a general numeric `Eq` would be.
#[derive(Debug, Clone, Copy)]
struct IndexKey(Value);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self.0, other.0) {
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Bool(a), Bool(b)) => a == b,
            (RecordPtr(a), RecordPtr(b)) => a == b,
            (Void, Void) => true,
            _ => false,
        }
    }
}
impl Eq for IndexKey {}

impl Hash for IndexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        match self.0 {
            Int32(v) => v.hash(state),
            Int64(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Double(v) => v.to_bits().hash(state),
            Bool(v) => v.hash(state),
            RecordPtr(v) => v.hash(state),
            Void => 0u8.hash(state),
        }
    }
}

/// A hash multimap from a declared value kind to a `uintptr` (here, a
/// [crate::record::RecordRef] packed as `u64`). Internally concurrent
/// (spec §4.6): the interpreter may call these without holding the
/// DCDS record lock on the attribute carrying the index.
#[derive(Default)]
pub struct Index {
    map: RwLock<HashMap<IndexKey, u64>>,
}

impl Index {
    pub fn new() -> Index {
        Index {
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn find(&self, key: Value) -> Option<u64> {
        self.map.read().unwrap().get(&IndexKey(key)).copied()
    }

    pub fn contains(&self, key: Value) -> bool {
        self.map.read().unwrap().contains_key(&IndexKey(key))
    }

    /// Returns `true` if the key was previously absent and the insert
    /// took effect; `false` (no-op) if the key already existed.
    pub fn insert(&self, key: Value, value: u64) -> bool {
        let mut map = self.map.write().unwrap();
        if map.contains_key(&IndexKey(key)) {
            false
        } else {
            map.insert(IndexKey(key), value);
            true
        }
    }

    /// Overwrite an existing key's value; returns `false` if the key was
    /// absent (no-op).
    pub fn update(&self, key: Value, value: u64) -> bool {
        let mut map = self.map.write().unwrap();
        if let Some(slot) = map.get_mut(&IndexKey(key)) {
            *slot = value;
            true
        } else {
            false
        }
    }

    pub fn remove(&self, key: Value) {
        self.map.write().unwrap().remove(&IndexKey(key));
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<Value> {
        self.map.read().unwrap().keys().map(|k| k.0).collect()
    }
}

/// Process-wide registry of live indexes, keyed by an opaque `u64`
/// handle. An indexed-list attribute's column stores this handle (as a
/// `record_ptr`-kind value) rather than a decodable table reference.
#[derive(Default)]
pub struct IndexRegistry {
    next_id: AtomicU64,
    map: RwLock<HashMap<u64, std::sync::Arc<Index>>>,
}

impl IndexRegistry {
    pub fn new() -> IndexRegistry {
        IndexRegistry {
            next_id: AtomicU64::new(1),
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self) -> u64 {
        let id = self.next_id.fetch_add(1, SeqCst);
        self.map.write().unwrap().insert(id, std::sync::Arc::new(Index::new()));
        id
    }

    pub fn get(&self, id: u64) -> Option<std::sync::Arc<Index>> {
        self.map.read().unwrap().get(&id).cloned()
    }
}

lazy_static::lazy_static! {
    pub static ref INDEXES: IndexRegistry = IndexRegistry::new();
}

/// Stable, deterministic fallback hash for callers that want a sharding
/// key from a [Value] without going through an [Index] (unused by the
/// core today; kept as a small utility alongside the adapter it backs).
#[allow(dead_code)]
pub(crate) fn hash_value(v: Value) -> u64 {
    let mut h = DefaultHasher::new();
    IndexKey(v).hash(&mut h);
    h.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_insert_find_remove() {
        let idx = Index::new();
        assert!(idx.insert(Value::Int64(42), 100));
        assert!(!idx.insert(Value::Int64(42), 999)); // duplicate
        assert_eq!(idx.find(Value::Int64(42)), Some(100));
        assert!(idx.contains(Value::Int64(42)));
        idx.remove(Value::Int64(42));
        assert_eq!(idx.find(Value::Int64(42)), None);
    }

    #[test]
    fn test_update() {
        let idx = Index::new();
        assert!(!idx.update(Value::Int32(1), 5)); // absent
        idx.insert(Value::Int32(1), 5);
        assert!(idx.update(Value::Int32(1), 6));
        assert_eq!(idx.find(Value::Int32(1)), Some(6));
    }

    #[test]
    fn test_registry_handles() {
        let reg = IndexRegistry::new();
        let h1 = reg.create();
        let h2 = reg.create();
        assert_ne!(h1, h2);
        reg.get(h1).unwrap().insert(Value::Bool(true), 7);
        assert_eq!(reg.get(h1).unwrap().find(Value::Bool(true)), Some(7));
        assert!(reg.get(h2).unwrap().is_empty());
    }
}
