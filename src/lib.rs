//! DCDS — a declarative-to-executable engine for concurrent data
//! structures.
//!
//! A caller assembles an [ir::Ir] describing a data structure's attributes,
//! sub-types, and operations (today by hand, via [builder]; a declarative
//! front-end is out of scope), hands it to [harness::DcdsHandle::create],
//! and calls operations by name through [harness::DcdsHandle::op]. Every
//! operation runs inside a no-wait two-phase-locked transaction over a
//! single-version row store: a lock conflict aborts and retries rather
//! than blocking, so there is no deadlock to detect.
//!
//! Module map:
//! - [value] — the primitive value/kind model every column and expression
//!   is built from.
//! - [record] — the packed, non-owning record reference.
//! - [table] — the single-version row store.
//! - [registry] — the process-wide table registry.
//! - [txn] / [txn_manager] — per-call transactions, undo logging, and the
//!   namespaced transaction manager.
//! - [lock] — the per-record no-wait shared/exclusive lock.
//! - [index] — the hash-index adapter backing indexed-list attributes.
//! - [ir] / [interp] — the frozen statement-tree IR and its interpreter.
//! - [cc_injector] — the static pass that inserts lock statements ahead of
//!   each first touch of a record.
//! - [optimizer] — dead-attribute and dead-function pruning run once
//!   before the CC injector.
//! - [builder] — a thin hand-assembly front-end for [ir::Ir].
//! - [harness] — the begin/run/commit-or-retry loop and the public handle.

#[macro_use]
mod error;

pub mod builder;
pub mod cc_injector;
mod ctor;
pub mod harness;
pub mod index;
pub mod interp;
pub mod ir;
pub mod lock;
pub mod optimizer;
pub mod record;
pub mod registry;
pub mod table;
pub mod txn;
pub mod txn_manager;
pub mod value;

pub use crate::error::{Error, Result};
pub use crate::harness::{DcdsHandle, RetryPolicy};
pub use crate::ir::Ir;
pub use crate::record::RecordRef;
pub use crate::txn_manager::{namespace, shutdown, DEFAULT_NAMESPACE};
pub use crate::value::{Kind, Value};
