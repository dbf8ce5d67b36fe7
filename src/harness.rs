//! Module `harness` implements the operation harness (spec §4.4, C11): the
//! begin/run/commit-or-retry outer loop every public operation runs
//! inside, plus the public handle surface (`createInstance`/`op`) spec §6
//! describes.
//!
//! ```text
//! loop:
//!   txn := begin(read_only?)
//!   ok  := run_interpreter(operation, txn, args, out_retval)
//!   if ok:
//!     if commit(txn): return
//!     else continue          // very rare: commit-time conflict
//!   else:
//!     abort(txn)
//!     continue
//! ```
//! This store's commit never itself conflicts (locks are already held by
//! the time an operation reaches `Return`, so `commit` only releases them),
//! so the "commit failed, retry" arm of the pseudocode never actually
//! triggers here; it is kept as a loop iteration rather than special-cased
//! away; see `DESIGN.md`.

use std::sync::Arc;

use crate::cc_injector;
use crate::ctor::construct_inner;
use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::ir::{FunctionDef, Ir};
use crate::optimizer;
use crate::record::RecordRef;
use crate::txn_manager::{self, TransactionManager};
use crate::value::Value;

/// Bounds the harness's retry loop so a pathological deadlock-free-but-
/// starved schedule cannot spin forever in a test. Spec §5 treats the
/// retry cap as "a policy knob, not a contract" — this is a constructor
/// parameter, not baked into the protocol.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn unbounded() -> RetryPolicy {
        RetryPolicy { max_attempts: u32::MAX }
    }
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy { max_attempts: 10_000 }
    }
}

/// A live instance of one declared data structure: the CC-injected,
/// optimized IR, the namespace's transaction manager, and the main
/// record created at `createInstance` time.
pub struct DcdsHandle {
    ir: Arc<Ir>,
    tm: Arc<TransactionManager>,
    main_record: RecordRef,
    retry_policy: RetryPolicy,
}

impl DcdsHandle {
    /// `createInstance` (spec §6): run the build-time optimizer, then the
    /// CC injector, over the builder's raw IR exactly once, then construct
    /// the main record inside its own committed transaction.
    pub fn create(ir: Ir, namespace: &str) -> Result<DcdsHandle> {
        DcdsHandle::create_with_policy(ir, namespace, RetryPolicy::default())
    }

    pub fn create_with_policy(ir: Ir, namespace: &str, retry_policy: RetryPolicy) -> Result<DcdsHandle> {
        let optimized = optimizer::optimize(&ir);
        let injected = Arc::new(cc_injector::inject(&optimized));
        let tm = txn_manager::namespace(namespace);

        let mut txn = tm.begin(false);
        let main_record = construct_inner(&injected, tm.tables(), &injected.main_type, &mut txn)?;
        tm.commit(&mut txn)?;

        Ok(DcdsHandle {
            ir: injected,
            tm,
            main_record,
            retry_policy,
        })
    }

    fn lookup_op(&self, name: &str) -> Result<FunctionDef> {
        self.ir
            .type_of(&self.ir.main_type)
            .and_then(|t| t.functions.get(name))
            .cloned()
            .ok_or_else(|| Error::UnknownName(format!("operation {:?}", name)))
    }

    /// `op(name, args...)` (spec §6): dynamic dispatch by declared
    /// signature, arity/type-checked inside `Interp::run`, wrapped in the
    /// begin/run/commit-or-retry loop above.
    pub fn op(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let fdef = self.lookup_op(name)?;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let mut txn = self.tm.begin(fdef.read_only_hint);
            let mut interp = Interp::new(&self.ir, self.tm.tables(), &mut txn);
            match interp.run(&self.ir.main_type, self.main_record, &fdef, args.clone())? {
                Some(v) => {
                    self.tm.commit(&mut txn)?;
                    return Ok(v);
                }
                None => {
                    self.tm.abort(&mut txn)?;
                    #[cfg(feature = "debug")]
                    println!("op {:?} retry attempt {}", name, attempts);
                    if attempts >= self.retry_policy.max_attempts {
                        return err_at!(Fatal, msg: "operation {:?} exceeded {} retries", name, attempts);
                    }
                }
            }
        }
    }
}
