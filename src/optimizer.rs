//! Module `optimizer` implements the build-time optimizer (spec §4.10,
//! C12): dead-attribute removal and cross-type unused-function pruning,
//! run once over the frozen IR before the CC injector (C10) sees it.
//!
//! Statements reference attributes and functions *by name*, not column
//! index (spec §4.1's offsets are computed from [crate::table::ColumnLayout]
//! at table-creation time, not baked into the IR) so dropping an unused
//! attribute or function here is just removing it from its owning type's
//! collection — no renumbering pass is needed.

use std::collections::{HashMap, HashSet};

use crate::ir::{Ir, Statement};

/// Run both passes and return a pruned copy of `ir`.
pub fn optimize(ir: &Ir) -> Ir {
    let mut out = prune_unused_functions(ir);
    prune_unused_attributes(&mut out);
    out
}

/// For each registered type, compute the set of functions actually
/// called (transitively, starting from the main type's functions — its
/// public operations) and drop everything else.
///
/// Call targets are resolved dynamically at run time by the callee
/// record's owning table name (see `interp::Interp::exec` `MethodCall`),
/// so a `ref_var`'s concrete sub-type is not always statically known
/// here (e.g. when it flows from another function's return value). This
/// pass is conservative in that case: it marks a called name as reachable
/// on *every* type that declares a function by that name, rather than
/// risk pruning a function that is in fact still called.
fn prune_unused_functions(ir: &Ir) -> Ir {
    let mut reachable: HashSet<(String, String)> = HashSet::new();
    let mut queue: Vec<(String, String)> = Vec::new();

    if let Some(main) = ir.types.get(&ir.main_type) {
        for fname in main.functions.keys() {
            let key = (ir.main_type.clone(), fname.clone());
            reachable.insert(key.clone());
            queue.push(key);
        }
    }

    while let Some((tname, fname)) = queue.pop() {
        let called = ir
            .types
            .get(&tname)
            .and_then(|t| t.functions.get(&fname))
            .map(|f| called_names(&f.body))
            .unwrap_or_default();
        for name in called {
            for (other_tname, ty) in &ir.types {
                if ty.functions.contains_key(&name) {
                    let key = (other_tname.clone(), name.clone());
                    if reachable.insert(key.clone()) {
                        queue.push(key);
                    }
                }
            }
        }
    }

    let mut out = ir.clone();
    for (tname, ty) in out.types.iter_mut() {
        ty.functions.retain(|fname, _| reachable.contains(&(tname.clone(), fname.clone())));
    }
    out
}

fn called_names(stmts: &[Statement]) -> Vec<String> {
    let mut names = Vec::new();
    walk(stmts, &mut names);
    return names;

    fn walk(stmts: &[Statement], names: &mut Vec<String>) {
        for s in stmts {
            match s {
                Statement::MethodCall { func, .. } => names.push(func.clone()),
                Statement::ConditionalBranch { then_block, else_block, .. } => {
                    walk(then_block, names);
                    walk(else_block, names);
                }
                Statement::ForLoop { body, .. }
                | Statement::WhileLoop { body, .. }
                | Statement::DoWhileLoop { body, .. } => walk(body, names),
                _ => {}
            }
        }
    }
}

/// For each type, count attribute reads/writes across that type's own
/// functions (an attribute is only ever touched by its owning type's
/// functions, since `main_record` in a frame is always of the function's
/// owning type) and drop attributes with zero total touches. Per spec
/// §4.10: attributes written but never read are *kept* (external
/// collaborators may read them through the handle).
fn prune_unused_attributes(ir: &mut Ir) {
    let mut counts: HashMap<String, HashMap<String, (usize, usize)>> = HashMap::new(); // type -> attr -> (reads, writes)

    for (tname, ty) in &ir.types {
        let entry = counts.entry(tname.clone()).or_default();
        for a in &ty.attributes {
            entry.entry(a.name.clone()).or_insert((0, 0));
        }
        for f in ty.functions.values() {
            tally(&f.body, entry);
        }
    }

    for (tname, ty) in ir.types.iter_mut() {
        let usage = &counts[tname];
        ty.attributes.retain(|a| {
            let (reads, writes) = usage.get(&a.name).copied().unwrap_or((0, 0));
            reads != 0 || writes != 0
        });
    }

    fn tally(stmts: &[Statement], entry: &mut HashMap<String, (usize, usize)>) {
        for s in stmts {
            match s {
                Statement::Read { attr, .. } | Statement::ReadIndexed { attr, .. } => {
                    entry.entry(attr.clone()).or_insert((0, 0)).0 += 1;
                }
                Statement::InsertIndexed { attr, .. } | Statement::RemoveIndexed { attr, .. } => {
                    entry.entry(attr.clone()).or_insert((0, 0)).0 += 1;
                }
                Statement::Update { attr, .. } => {
                    entry.entry(attr.clone()).or_insert((0, 0)).1 += 1;
                }
                Statement::ConditionalBranch { then_block, else_block, .. } => {
                    tally(then_block, entry);
                    tally(else_block, entry);
                }
                Statement::ForLoop { body, .. }
                | Statement::WhileLoop { body, .. }
                | Statement::DoWhileLoop { body, .. } => tally(body, entry),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{AttributeCategory, AttributeDef, Expr, FunctionDef, TypeDef};
    use crate::value::{Kind, Value};

    fn f(body: Vec<Statement>) -> FunctionDef {
        FunctionDef { name: "f".into(), args: vec![], ret: Kind::Void, read_only_hint: false, body }
    }

    #[test]
    fn test_prunes_unreferenced_function() {
        let mut ir = Ir::new("ds", "main");
        let mut node = TypeDef::new("node");
        node.functions.insert("used".into(), f(vec![]));
        node.functions.insert("dead".into(), f(vec![]));
        ir.types.insert("node".into(), node);

        let mut main = TypeDef::new("main");
        main.functions.insert(
            "op".into(),
            f(vec![Statement::MethodCall { ref_var: "main".into(), func: "used".into(), args: vec![], ret_dest: None }]),
        );
        ir.types.insert("main".into(), main);

        let out = prune_unused_functions(&ir);
        assert!(out.types["node"].functions.contains_key("used"));
        assert!(!out.types["node"].functions.contains_key("dead"));
        assert!(out.types["main"].functions.contains_key("op"));
    }

    #[test]
    fn test_prunes_unused_attribute_but_keeps_write_only() {
        let mut ir = Ir::new("ds", "main");
        let mut main = TypeDef::new("main");
        main.attributes.push(AttributeDef { name: "dead".into(), category: AttributeCategory::Primitive(Kind::Int64), default: Value::Int64(0) });
        main.attributes.push(AttributeDef { name: "write_only".into(), category: AttributeCategory::Primitive(Kind::Int64), default: Value::Int64(0) });
        main.functions.insert(
            "op".into(),
            f(vec![Statement::Update { attr: "write_only".into(), src: Expr::Const(Value::Int64(1)) }]),
        );
        ir.types.insert("main".into(), main);

        let mut out = ir.clone();
        prune_unused_attributes(&mut out);
        let names: Vec<&str> = out.types["main"].attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["write_only"]);
    }
}
