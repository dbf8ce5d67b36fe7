//! Module `value` enumerates the typed-value model (spec §3, C1): the
//! primitive kinds DCDS columns may hold, their fixed byte widths, and a
//! packed/unpacked encoding used by the row store and the interpreter's
//! expression evaluator.

use std::convert::TryInto;

use crate::error::{Error, Result};

/// A primitive value kind an attribute may declare (spec §3).
///
/// `RecordPtr` is the packed 64-bit [crate::record::RecordRef] tag; `Void`
/// is return-only and never backs a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Int32,
    Int64,
    Float,
    Double,
    Bool,
    RecordPtr,
    Void,
}

impl Kind {
    /// Fixed byte width used to compute packed column offsets (spec §4.1).
    /// `Void` has no storage width; callers must not place it in a column.
    pub fn width(self) -> usize {
        match self {
            Kind::Int32 => 4,
            Kind::Int64 => 8,
            Kind::Float => 4,
            Kind::Double => 8,
            Kind::Bool => 1,
            Kind::RecordPtr => 8,
            Kind::Void => 0,
        }
    }
}

/// A concrete value, tagged by [Kind]. Expression evaluation (spec §4.7)
/// and attribute read/update both move values around as `Value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    RecordPtr(u64),
    Void,
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int32(_) => Kind::Int32,
            Value::Int64(_) => Kind::Int64,
            Value::Float(_) => Kind::Float,
            Value::Double(_) => Kind::Double,
            Value::Bool(_) => Kind::Bool,
            Value::RecordPtr(_) => Kind::RecordPtr,
            Value::Void => Kind::Void,
        }
    }

    /// Default value for a declared [Kind], used to initialize attribute
    /// defaults and zero-filled array rows (spec §4.2 `insertNRecords`).
    pub fn default_of(kind: Kind) -> Value {
        match kind {
            Kind::Int32 => Value::Int32(0),
            Kind::Int64 => Value::Int64(0),
            Kind::Float => Value::Float(0.0),
            Kind::Double => Value::Double(0.0),
            Kind::Bool => Value::Bool(false),
            Kind::RecordPtr => Value::RecordPtr(0),
            Kind::Void => Value::Void,
        }
    }

    /// `memcpy`-style encode into a fixed-width little-endian byte buffer
    /// (spec §4.1: packed rows avoid padding, raw bytes avoid
    /// strict-aliasing concerns).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Int32(v) => v.to_le_bytes().to_vec(),
            Value::Int64(v) => v.to_le_bytes().to_vec(),
            Value::Float(v) => v.to_le_bytes().to_vec(),
            Value::Double(v) => v.to_le_bytes().to_vec(),
            Value::Bool(v) => vec![if *v { 1 } else { 0 }],
            Value::RecordPtr(v) => v.to_le_bytes().to_vec(),
            Value::Void => Vec::new(),
        }
    }

    pub fn from_bytes(kind: Kind, bytes: &[u8]) -> Result<Value> {
        let width = kind.width();
        if bytes.len() < width {
            return err_at!(
                Fatal,
                msg: "short buffer decoding {:?}: {} < {}",
                kind,
                bytes.len(),
                width
            );
        }
        Ok(match kind {
            Kind::Int32 => Value::Int32(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
            Kind::Int64 => Value::Int64(i64::from_le_bytes(bytes[..8].try_into().unwrap())),
            Kind::Float => Value::Float(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
            Kind::Double => Value::Double(f64::from_le_bytes(bytes[..8].try_into().unwrap())),
            Kind::Bool => Value::Bool(bytes[0] != 0),
            Kind::RecordPtr => Value::RecordPtr(u64::from_le_bytes(bytes[..8].try_into().unwrap())),
            Kind::Void => Value::Void,
        })
    }

    pub fn is_null(&self) -> Result<bool> {
        match self {
            Value::RecordPtr(v) => Ok(*v == 0),
            other => err_at!(TypeMismatch, msg: "is_null on non record_ptr {:?}", other),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int32(v) => Ok(*v as i64),
            Value::Int64(v) => Ok(*v),
            other => err_at!(TypeMismatch, msg: "expected integer, found {:?}", other),
        }
    }

    pub fn as_record_ptr(&self) -> Result<u64> {
        match self {
            Value::RecordPtr(v) => Ok(*v),
            other => err_at!(TypeMismatch, msg: "expected record_ptr, found {:?}", other),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => err_at!(TypeMismatch, msg: "expected bool, found {:?}", other),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roundtrip_all_kinds() {
        let vals = vec![
            Value::Int32(-7),
            Value::Int64(1 << 40),
            Value::Float(1.5),
            Value::Double(3.25),
            Value::Bool(true),
            Value::RecordPtr(0xdead_beef),
        ];
        for v in vals {
            let bytes = v.to_bytes();
            assert_eq!(bytes.len(), v.kind().width());
            let back = Value::from_bytes(v.kind(), &bytes).unwrap();
            assert_eq!(v, back);
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(Value::default_of(Kind::Int64), Value::Int64(0));
        assert_eq!(Value::default_of(Kind::RecordPtr), Value::RecordPtr(0));
        assert!(Value::default_of(Kind::RecordPtr).is_null().unwrap());
    }
}
