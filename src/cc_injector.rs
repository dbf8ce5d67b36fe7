//! Module `cc_injector` implements the CC (concurrency-control) injector
//! (spec §4.9, C10): a static pass over every function's statement tree
//! that inserts `Lock` statements ahead of each first touch of a record.
//!
//! This store's lock protocol is per-*record*, not per-attribute (spec
//! §4.5: "Per-record shared/exclusive lock semantics"), so the scope map
//! the spec describes as *attribute → active lock statement* collapses
//! here to *record-holding variable → active lock statement*: the first
//! touch of **any** attribute of a given record triggers one lock on that
//! record, and every subsequent attribute touch on the same record in
//! the same scope is already covered. A `MethodCall` still needs its own
//! lock on the callee's record before recursing, exactly as spec §4.9
//! point 4 describes, since that is a different record than `main`.
//!
//! Because locking here is record-granular rather than attribute-granular,
//! a sub-type function never needs its *own* internal lock statements for
//! its own `main_record` — whichever call site reaches it has already
//! locked that exact record whole. So, unlike the spec's attribute-level
//! design (which clones callee functions per call-site so the clone can
//! carry call-site-specific internal lock placement), this injector
//! processes each function exactly once: the call-site lock in the
//! caller is sufficient, and there is nothing context-sensitive left for
//! the callee body to vary. This is a deliberate simplification recorded
//! in `DESIGN.md`, not an accidental omission of spec §4.9 point 4/point
//! 6's intent — the *outcome* (every attribute touch is covered by a held
//! lock, point-to-point with no redundant work across call sites) is
//! preserved.
//!
//! A `MethodCall`'s lock is shared rather than exclusive when the callee is
//! read-only (spec §4.4: a read-only transaction takes only shared locks),
//! so two concurrent read-only operations that both call down into the
//! same record never conflict with each other.

use std::collections::{HashMap, HashSet};

use crate::ir::{AttributeCategory, FunctionDef, Ir, Statement};

#[derive(Clone)]
struct Scope {
    /// variable name (or `"main"`) -> currently held at exclusive?
    locked: HashMap<String, bool>,
    nascent: HashSet<String>,
}

impl Scope {
    fn new() -> Scope {
        Scope {
            locked: HashMap::new(),
            nascent: HashSet::new(),
        }
    }

    /// Intersection merge after two diverging branches (spec §4.9 point
    /// 6): only what both branches are guaranteed to hold carries
    /// forward.
    fn intersect(a: &Scope, b: &Scope) -> Scope {
        let mut locked = HashMap::new();
        for (k, &excl_a) in &a.locked {
            if let Some(&excl_b) = b.locked.get(k) {
                locked.insert(k.clone(), excl_a && excl_b);
            }
        }
        let nascent = a.nascent.intersection(&b.nascent).cloned().collect();
        Scope { locked, nascent }
    }
}

/// Run the CC pass over every function (public operations and sub-type
/// inner functions alike) in `ir`, returning a rewritten copy with `Lock`
/// statements inserted.
pub fn inject(ir: &Ir) -> Ir {
    let mut out = ir.clone();
    for ty in out.types.values_mut() {
        for func in ty.functions.values_mut() {
            let mut scope = Scope::new();
            func.body = inject_block(ir, &func.body, &mut scope);
        }
    }
    out
}

/// Spec §4.4: a read-only transaction takes only shared locks. A
/// `MethodCall` target only ever needs to be locked exclusively if the
/// callee might write through it; conservatively, if any type declaring a
/// function by this name marks it anything but `read_only_hint`, or no type
/// declares it at all (name should have been resolved by now), treat the
/// call as a potential writer. Call targets are resolved dynamically by the
/// callee's table at run time (see `interp::Interp::exec` `MethodCall`), so
/// this mirrors `optimizer::prune_unused_functions`'s same conservative
/// every-type-by-name scan rather than assuming a single static callee type.
fn callee_is_read_only(ir: &Ir, func_name: &str) -> bool {
    let mut found = false;
    for ty in ir.types.values() {
        if let Some(f) = ty.functions.get(func_name) {
            found = true;
            if !f.read_only_hint {
                return false;
            }
        }
    }
    found
}

fn lock_stmt(var: &str, attr: Option<&str>, exclusive: bool) -> Statement {
    Statement::Lock {
        target_var: var.to_string(),
        attr: attr.map(|a| a.to_string()),
        exclusive,
    }
}

/// Ensure `var` (almost always `"main"`) is locked in `scope` at at least
/// `exclusive`, emitting a `Lock` statement the first time, or an
/// upgrade the first time a write follows a read, and never for a
/// nascent record.
fn ensure_locked(scope: &mut Scope, var: &str, attr: Option<&str>, exclusive: bool, out: &mut Vec<Statement>) {
    if scope.nascent.contains(var) {
        return;
    }
    match scope.locked.get(var).copied() {
        None => {
            out.push(lock_stmt(var, attr, exclusive));
            scope.locked.insert(var.to_string(), exclusive);
        }
        Some(true) => {} // already exclusive, no-op regardless of request
        Some(false) if exclusive => {
            out.push(lock_stmt(var, attr, true));
            scope.locked.insert(var.to_string(), true);
        }
        Some(false) => {} // shared suffices
    }
}

fn inject_block(ir: &Ir, stmts: &[Statement], scope: &mut Scope) -> Vec<Statement> {
    let mut out = Vec::with_capacity(stmts.len());
    for s in stmts {
        inject_stmt(ir, s, scope, &mut out);
    }
    out
}

fn inject_stmt(ir: &Ir, stmt: &Statement, scope: &mut Scope, out: &mut Vec<Statement>) {
    match stmt {
        Statement::Read { attr, dest } => {
            ensure_locked(scope, "main", Some(attr), false, out);
            out.push(Statement::Read { attr: attr.clone(), dest: dest.clone() });
        }
        Statement::ReadIndexed { attr, key, dest } => {
            ensure_locked(scope, "main", Some(attr), false, out);
            out.push(Statement::ReadIndexed { attr: attr.clone(), key: key.clone(), dest: dest.clone() });
        }
        Statement::InsertIndexed { attr, key, value } => {
            // the index is internally concurrent (spec §4.6); only the
            // base-pointer read off `main` needs the record lock.
            ensure_locked(scope, "main", Some(attr), false, out);
            out.push(Statement::InsertIndexed { attr: attr.clone(), key: key.clone(), value: value.clone() });
        }
        Statement::RemoveIndexed { attr, key } => {
            ensure_locked(scope, "main", Some(attr), false, out);
            out.push(Statement::RemoveIndexed { attr: attr.clone(), key: key.clone() });
        }
        Statement::Update { attr, src } => {
            ensure_locked(scope, "main", Some(attr), true, out);
            out.push(Statement::Update { attr: attr.clone(), src: src.clone() });
            // the write makes this attribute observable; nascency on
            // `main` itself is set only by `Create` of another record,
            // so nothing to invalidate here besides the lock state
            // already recorded by `ensure_locked`.
        }
        Statement::TempVarAssign { .. } | Statement::LogString { .. } | Statement::Return(_) => {
            out.push(stmt.clone());
        }
        Statement::Create { type_name: _, dest } => {
            out.push(stmt.clone());
            scope.nascent.insert(dest.clone());
        }
        Statement::MethodCall { ref_var, func, args: _, ret_dest: _ } => {
            if ref_var != "main" {
                ensure_locked(scope, ref_var, None, !callee_is_read_only(ir, func), out);
            }
            out.push(stmt.clone());
        }
        Statement::ConditionalBranch { cond, then_block, else_block } => {
            let mut then_scope = scope.clone();
            let then_out = inject_block(ir, then_block, &mut then_scope);
            let mut else_scope = scope.clone();
            let else_out = inject_block(ir, else_block, &mut else_scope);
            *scope = Scope::intersect(&then_scope, &else_scope);
            out.push(Statement::ConditionalBranch {
                cond: cond.clone(),
                then_block: then_out,
                else_block: else_out,
            });
        }
        Statement::ForLoop { init, cond, iter, body } => {
            // `init`/`iter` are always a plain local-variable update in
            // this IR (a loop counter), never a record touch, so they
            // carry no lock of their own and are passed through as-is.
            let mut body_scope = scope.clone();
            let body_out = inject_block(ir, body, &mut body_scope);
            out.push(Statement::ForLoop {
                init: init.clone(),
                cond: cond.clone(),
                iter: iter.clone(),
                body: body_out,
            });
            // loop body may run zero times: outer scope is unaffected.
        }
        Statement::WhileLoop { cond, body } => {
            let mut body_scope = scope.clone();
            let body_out = inject_block(ir, body, &mut body_scope);
            out.push(Statement::WhileLoop { cond: cond.clone(), body: body_out });
        }
        Statement::DoWhileLoop { cond, body } => {
            // runs at least once: locks the body unconditionally takes
            // DO carry forward.
            let body_out = inject_block(ir, body, scope);
            out.push(Statement::DoWhileLoop { cond: cond.clone(), body: body_out });
        }
        Statement::Lock { .. } => {
            // Only the injector itself produces these; a builder-supplied
            // tree should never contain one, but pass through unchanged
            // if it does (idempotent re-run, spec §9: clone identity must
            // survive repeated optimizer passes).
            out.push(stmt.clone());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Expr, TypeDef};
    use crate::value::{Kind, Value};

    fn count_locks(stmts: &[Statement]) -> usize {
        stmts.iter().filter(|s| matches!(s, Statement::Lock { .. })).count()
    }

    #[test]
    fn test_read_then_write_upgrades_single_lock() {
        let mut ir = Ir::new("ds", "main");
        let mut main = TypeDef::new("main");
        main.functions.insert(
            "op".into(),
            FunctionDef {
                name: "op".into(),
                args: vec![],
                ret: Kind::Void,
                read_only_hint: false,
                body: vec![
                    Statement::Read { attr: "a".into(), dest: "v".into() },
                    Statement::Update { attr: "a".into(), src: Expr::local("v") },
                ],
            },
        );
        ir.types.insert("main".into(), main);

        let injected = inject(&ir);
        let body = &injected.types["main"].functions["op"].body;
        // exactly 2 lock statements: initial shared, then upgrade to exclusive
        assert_eq!(count_locks(body), 2);
        assert!(matches!(body[0], Statement::Lock { exclusive: false, .. }));
        assert!(matches!(body[1], Statement::Lock { exclusive: true, .. }));
    }

    #[test]
    fn test_nascent_create_skips_lock_on_method_call() {
        let mut ir = Ir::new("ds", "main");
        let mut node = TypeDef::new("node");
        node.functions.insert(
            "touch".into(),
            FunctionDef { name: "touch".into(), args: vec![], ret: Kind::Void, read_only_hint: false, body: vec![] },
        );
        ir.types.insert("node".into(), node);

        let mut main = TypeDef::new("main");
        main.functions.insert(
            "op".into(),
            FunctionDef {
                name: "op".into(),
                args: vec![],
                ret: Kind::Void,
                read_only_hint: false,
                body: vec![
                    Statement::Create { type_name: "node".into(), dest: "n".into() },
                    Statement::MethodCall { ref_var: "n".into(), func: "touch".into(), args: vec![], ret_dest: None },
                ],
            },
        );
        ir.types.insert("main".into(), main);

        let injected = inject(&ir);
        let body = &injected.types["main"].functions["op"].body;
        assert_eq!(count_locks(body), 0);
    }

    #[test]
    fn test_method_call_on_non_nascent_locks_once() {
        let mut ir = Ir::new("ds", "main");
        let mut node = TypeDef::new("node");
        node.functions.insert(
            "touch".into(),
            FunctionDef { name: "touch".into(), args: vec![], ret: Kind::Void, read_only_hint: false, body: vec![] },
        );
        ir.types.insert("node".into(), node);

        let mut main = TypeDef::new("main");
        main.attributes.push(crate::ir::AttributeDef {
            name: "head".into(),
            category: AttributeCategory::SubType { type_name: "node".into() },
            default: Value::RecordPtr(0),
        });
        main.functions.insert(
            "op".into(),
            FunctionDef {
                name: "op".into(),
                args: vec![],
                ret: Kind::Void,
                read_only_hint: false,
                body: vec![
                    Statement::Read { attr: "head".into(), dest: "h".into() },
                    Statement::MethodCall { ref_var: "h".into(), func: "touch".into(), args: vec![], ret_dest: None },
                    Statement::MethodCall { ref_var: "h".into(), func: "touch".into(), args: vec![], ret_dest: None },
                ],
            },
        );
        ir.types.insert("main".into(), main);

        let injected = inject(&ir);
        let body = &injected.types["main"].functions["op"].body;
        // one shared lock on main (to read "head"), one exclusive lock on "h"
        // (not repeated for the second MethodCall).
        assert_eq!(count_locks(body), 2);
    }

    #[test]
    fn test_method_call_on_read_only_callee_locks_shared() {
        let mut ir = Ir::new("ds", "main");
        let mut node = TypeDef::new("node");
        node.functions.insert(
            "get_value".into(),
            FunctionDef { name: "get_value".into(), args: vec![], ret: Kind::Int64, read_only_hint: true, body: vec![] },
        );
        ir.types.insert("node".into(), node);

        let mut main = TypeDef::new("main");
        main.attributes.push(crate::ir::AttributeDef {
            name: "head".into(),
            category: AttributeCategory::SubType { type_name: "node".into() },
            default: Value::RecordPtr(0),
        });
        main.functions.insert(
            "lookup".into(),
            FunctionDef {
                name: "lookup".into(),
                args: vec![],
                ret: Kind::Int64,
                read_only_hint: true,
                body: vec![
                    Statement::Read { attr: "head".into(), dest: "h".into() },
                    Statement::MethodCall { ref_var: "h".into(), func: "get_value".into(), args: vec![], ret_dest: Some("v".into()) },
                ],
            },
        );
        ir.types.insert("main".into(), main);

        let injected = inject(&ir);
        let body = &injected.types["main"].functions["lookup"].body;
        assert_eq!(count_locks(body), 2);
        assert!(matches!(body[0], Statement::Lock { exclusive: false, .. }));
        assert!(matches!(body[1], Statement::Lock { exclusive: false, .. }), "read-only callee must take a shared, not exclusive, lock");
    }
}
