//! Module `interp` implements the statement interpreter (spec §4.7, C9):
//! it executes a function's frozen statement tree against the row store,
//! the lock protocol, and sub-type tables.

use std::collections::HashMap;

use crate::ctor::construct_inner;
use crate::error::{Error, Result};
use crate::ir::{ArithOp, AttributeCategory, CmpOp, Expr, FunctionDef, Ir, Statement, UnaryOp};
use crate::record::RecordRef;
use crate::registry::TableRegistry;
use crate::txn::Txn;
use crate::value::{Kind, Value};

/// What a statement (or block of statements) produced.
pub enum Flow {
    /// Keep executing the next statement in this scope.
    Continue,
    /// `Return` was hit; the frame's `retval` is authoritative.
    Return,
    /// A lock attempt or an indexed-insert-duplicate signalled abort
    /// (spec §7: locally recoverable). The harness rolls back and
    /// retries; this is never surfaced to the caller as an `Err`.
    Abort,
}

/// One level of the call stack: the interpreter recurses into a fresh
/// frame for every `MethodCall` (spec §4.7), so sub-type functions see
/// their own `main_record`/args/locals.
struct Frame {
    type_name: String,
    main_record: RecordRef,
    args: HashMap<String, Value>,
    locals: HashMap<String, Value>,
    retval: Value,
}

/// Interpreter execution context, threaded through recursive calls.
pub struct Interp<'a> {
    pub ir: &'a Ir,
    pub registry: &'a TableRegistry,
    pub txn: &'a mut Txn,
}

impl<'a> Interp<'a> {
    pub fn new(ir: &'a Ir, registry: &'a TableRegistry, txn: &'a mut Txn) -> Interp<'a> {
        Interp { ir, registry, txn }
    }

    /// Run a top-level or inner function to completion. Returns the
    /// function's return value on success; `None` signals abort.
    pub fn run(&mut self, type_name: &str, main_record: RecordRef, func: &FunctionDef, args: Vec<Value>) -> Result<Option<Value>> {
        if args.len() != func.args.len() {
            return err_at!(
                TypeMismatch,
                msg: "{} expects {} args, got {}",
                func.name,
                func.args.len(),
                args.len()
            );
        }
        let mut argmap = HashMap::new();
        for ((name, kind), val) in func.args.iter().zip(args.into_iter()) {
            if val.kind() != *kind {
                return err_at!(
                    TypeMismatch,
                    msg: "arg {:?} expects {:?}, got {:?}",
                    name,
                    kind,
                    val.kind()
                );
            }
            argmap.insert(name.clone(), val);
        }
        let mut frame = Frame {
            type_name: type_name.to_string(),
            main_record,
            args: argmap,
            locals: HashMap::new(),
            retval: Value::default_of(func.ret),
        };
        match self.exec_block(&mut frame, &func.body)? {
            Flow::Abort => Ok(None),
            Flow::Return | Flow::Continue => Ok(Some(frame.retval)),
        }
    }

    fn exec_block(&mut self, frame: &mut Frame, stmts: &[Statement]) -> Result<Flow> {
        for s in stmts {
            match self.exec(frame, s)? {
                Flow::Continue => continue,
                other => return Ok(other),
            }
        }
        Ok(Flow::Continue)
    }

    fn eval(&self, frame: &Frame, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Const(v) => Ok(*v),
            Expr::Local(name) => frame
                .locals
                .get(name)
                .copied()
                .ok_or_else(|| Error::UnknownName(format!("local {:?}", name))),
            Expr::Arg(name) => frame
                .args
                .get(name)
                .copied()
                .ok_or_else(|| Error::UnknownName(format!("arg {:?}", name))),
            Expr::BinArith(l, op, r) => {
                let l = self.eval(frame, l)?;
                let r = self.eval(frame, r)?;
                arith(l, *op, r)
            }
            Expr::BinCmp(l, op, r) => {
                let l = self.eval(frame, l)?;
                let r = self.eval(frame, r)?;
                Ok(Value::Bool(compare(l, *op, r)?))
            }
            Expr::Unary(op, e) => {
                let v = self.eval(frame, e)?;
                match op {
                    UnaryOp::IsNull => Ok(Value::Bool(v.is_null()?)),
                    UnaryOp::IsNotNull => Ok(Value::Bool(!v.is_null()?)),
                    UnaryOp::IsEven => Ok(Value::Bool(v.as_i64()? % 2 == 0)),
                }
            }
        }
    }

    fn current_type(&self, frame: &Frame) -> Result<&crate::ir::TypeDef> {
        self.ir
            .type_of(&frame.type_name)
            .ok_or_else(|| Error::UnknownName(format!("type {:?}", frame.type_name)))
    }

    fn try_lock(&mut self, rec: RecordRef, exclusive: bool) -> Result<bool> {
        let table = self.registry.get_by_id(rec.table_id())?;
        let slot = table.lock_of(rec)?;
        let ok = if exclusive {
            slot.lock.try_lock_exclusive(self.txn.id())
        } else {
            slot.lock.try_lock_shared(self.txn.id())
        };
        if ok {
            if exclusive {
                self.txn.note_exclusive(rec);
            } else if !self.txn.holds_exclusive(rec) {
                // a reentrant shared request against a record this txn
                // already holds exclusively is a no-op (invariant 3: never
                // list the same record in both sets).
                self.txn.note_shared(rec);
            }
        } else {
            log::debug!("lock conflict on {} exclusive={}", rec, exclusive);
        }
        Ok(ok)
    }

    fn exec(&mut self, frame: &mut Frame, stmt: &Statement) -> Result<Flow> {
        match stmt {
            Statement::Lock { target_var, attr: _, exclusive } => {
                let rec = self.resolve_record(frame, target_var)?;
                if !self.try_lock(rec, *exclusive)? {
                    return Ok(Flow::Abort);
                }
                Ok(Flow::Continue)
            }

            Statement::Read { attr, dest } => {
                let ty = self.current_type(frame)?;
                let idx = ty
                    .attr_index(attr)
                    .ok_or_else(|| Error::SchemaViolation(format!("no attribute {:?} on {:?}", attr, ty.name)))?;
                let kind = ty.attributes[idx].category.column_kind();
                let table = self.registry.get_by_name(&frame.type_name)?;
                let bytes = table.get_attribute(frame.main_record, idx)?;
                let v = Value::from_bytes(kind, &bytes)?;
                frame.locals.insert(dest.clone(), v);
                Ok(Flow::Continue)
            }

            Statement::ReadIndexed { attr, key, dest } => {
                let ty = self.current_type(frame)?;
                let idx = ty
                    .attr_index(attr)
                    .ok_or_else(|| Error::SchemaViolation(format!("no attribute {:?} on {:?}", attr, ty.name)))?;
                let category = ty.attributes[idx].category.clone();
                let table = self.registry.get_by_name(&frame.type_name)?;
                let base_bytes = table.get_attribute(frame.main_record, idx)?;
                let base = Value::from_bytes(Kind::RecordPtr, &base_bytes)?.as_record_ptr()?;
                let key_val = self.eval(frame, key)?;

                let result = match category {
                    AttributeCategory::Array { element_type, .. } => {
                        let n = key_val.as_i64()? as u32;
                        let elem_table = self.registry.get_by_name(&element_type)?;
                        Value::RecordPtr(elem_table.get_nth_record_reference(RecordRef(base), n).as_u64())
                    }
                    AttributeCategory::IndexedList { .. } => {
                        let idxh = crate::index::INDEXES
                            .get(base)
                            .ok_or_else(|| Error::Fatal(format!("dangling index handle {}", base)))?;
                        Value::RecordPtr(idxh.find(key_val).unwrap_or(0))
                    }
                    other => return err_at!(SchemaViolation, msg: "ReadIndexed on non-list attribute {:?}", other),
                };
                frame.locals.insert(dest.clone(), result);
                Ok(Flow::Continue)
            }

            Statement::InsertIndexed { attr, key, value } => {
                let handle = self.indexed_handle(frame, attr)?;
                let key_val = self.eval(frame, key)?;
                let value_val = self.eval(frame, value)?;
                let idxh = crate::index::INDEXES
                    .get(handle)
                    .ok_or_else(|| Error::Fatal(format!("dangling index handle {}", handle)))?;
                if !idxh.insert(key_val, value_val.as_record_ptr()?) {
                    log::debug!("index insert duplicate key, signalling abort");
                    return Ok(Flow::Abort);
                }
                Ok(Flow::Continue)
            }

            Statement::RemoveIndexed { attr, key } => {
                let handle = self.indexed_handle(frame, attr)?;
                let key_val = self.eval(frame, key)?;
                crate::index::INDEXES
                    .get(handle)
                    .ok_or_else(|| Error::Fatal(format!("dangling index handle {}", handle)))?
                    .remove(key_val);
                Ok(Flow::Continue)
            }

            Statement::Update { attr, src } => {
                let ty = self.current_type(frame)?;
                let idx = ty
                    .attr_index(attr)
                    .ok_or_else(|| Error::SchemaViolation(format!("no attribute {:?} on {:?}", attr, ty.name)))?;
                let v = self.eval(frame, src)?;
                let table = self.registry.get_by_name(&frame.type_name)?;
                table.update_attribute(Some(self.txn), frame.main_record, idx, &v.to_bytes())?;
                Ok(Flow::Continue)
            }

            Statement::TempVarAssign { dest, src } => {
                let v = self.eval(frame, src)?;
                frame.locals.insert(dest.clone(), v);
                Ok(Flow::Continue)
            }

            Statement::LogString { fmt, args } => {
                let mut rendered = String::new();
                let mut rest = fmt.as_str();
                for a in args {
                    let v = self.eval(frame, a)?;
                    match rest.find("{}") {
                        Some(at) => {
                            rendered.push_str(&rest[..at]);
                            rendered.push_str(&format!("{:?}", v));
                            rest = &rest[at + 2..];
                        }
                        None => break,
                    }
                }
                rendered.push_str(rest);
                log::info!("{}", rendered);
                Ok(Flow::Continue)
            }

            Statement::Return(expr) => {
                if let Some(e) = expr {
                    frame.retval = self.eval(frame, e)?;
                }
                Ok(Flow::Return)
            }

            Statement::Create { type_name, dest } => {
                let rec = construct_inner(self.ir, self.registry, type_name, self.txn)?;
                frame.locals.insert(dest.clone(), Value::RecordPtr(rec.as_u64()));
                Ok(Flow::Continue)
            }

            Statement::MethodCall { ref_var, func, args, ret_dest } => {
                let rec = self.resolve_record(frame, ref_var)?;
                let table = self.registry.get_by_id(rec.table_id())?;
                let target_type = table.name().to_string();
                let fdef = self
                    .ir
                    .type_of(&target_type)
                    .and_then(|t| t.functions.get(func))
                    .ok_or_else(|| Error::UnknownName(format!("function {:?} on {:?}", func, target_type)))?
                    .clone();
                let argvals: Result<Vec<Value>> = args.iter().map(|e| self.eval(frame, e)).collect();
                let argvals = argvals?;
                match self.run(&target_type, rec, &fdef, argvals)? {
                    None => Ok(Flow::Abort),
                    Some(v) => {
                        if let Some(dest) = ret_dest {
                            frame.locals.insert(dest.clone(), v);
                        }
                        Ok(Flow::Continue)
                    }
                }
            }

            Statement::ConditionalBranch { cond, then_block, else_block } => {
                if self.eval(frame, cond)?.as_bool()? {
                    self.exec_block(frame, then_block)
                } else {
                    self.exec_block(frame, else_block)
                }
            }

            Statement::ForLoop { init, cond, iter, body } => {
                match self.exec(frame, init)? {
                    Flow::Continue => {}
                    other => return Ok(other),
                }
                loop {
                    if !self.eval(frame, cond)?.as_bool()? {
                        break;
                    }
                    match self.exec_block(frame, body)? {
                        Flow::Continue => {}
                        other => return Ok(other),
                    }
                    match self.exec(frame, iter)? {
                        Flow::Continue => {}
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Continue)
            }

            Statement::WhileLoop { cond, body } => {
                while self.eval(frame, cond)?.as_bool()? {
                    match self.exec_block(frame, body)? {
                        Flow::Continue => {}
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Continue)
            }

            Statement::DoWhileLoop { cond, body } => {
                loop {
                    match self.exec_block(frame, body)? {
                        Flow::Continue => {}
                        other => return Ok(other),
                    }
                    if !self.eval(frame, cond)?.as_bool()? {
                        break;
                    }
                }
                Ok(Flow::Continue)
            }
        }
    }

    /// Resolve a statement's `target_var`/`ref_var` name to a record
    /// reference: `"main"` denotes the current frame's main record,
    /// anything else is a local or argument holding a `record_ptr`.
    fn resolve_record(&self, frame: &Frame, name: &str) -> Result<RecordRef> {
        if name == "main" {
            return Ok(frame.main_record);
        }
        let v = frame
            .locals
            .get(name)
            .or_else(|| frame.args.get(name))
            .ok_or_else(|| Error::UnknownName(format!("variable {:?}", name)))?;
        Ok(RecordRef(v.as_record_ptr()?))
    }

    fn indexed_handle(&self, frame: &Frame, attr: &str) -> Result<u64> {
        let ty = self.current_type(frame)?;
        let idx = ty
            .attr_index(attr)
            .ok_or_else(|| Error::SchemaViolation(format!("no attribute {:?} on {:?}", attr, ty.name)))?;
        match &ty.attributes[idx].category {
            AttributeCategory::IndexedList { .. } => {}
            other => return err_at!(SchemaViolation, msg: "{:?} is not an indexed-list attribute ({:?})", attr, other),
        }
        let table = self.registry.get_by_name(&frame.type_name)?;
        let bytes = table.get_attribute(frame.main_record, idx)?;
        Value::from_bytes(Kind::RecordPtr, &bytes)?.as_record_ptr()
    }
}

fn arith(l: Value, op: ArithOp, r: Value) -> Result<Value> {
    use Value::*;
    let out = match (l, r) {
        (Int32(a), Int32(b)) => Int32(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
        }),
        (Int64(a), Int64(b)) => Int64(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
        }),
        (Float(a), Float(b)) => Float(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
        }),
        (Double(a), Double(b)) => Double(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
        }),
        (a, b) => return err_at!(TypeMismatch, msg: "arithmetic on mismatched kinds {:?}/{:?}", a.kind(), b.kind()),
    };
    Ok(out)
}

fn compare(l: Value, op: CmpOp, r: Value) -> Result<bool> {
    use Value::*;
    let ord = match (l, r) {
        (Int32(a), Int32(b)) => a.cmp(&b),
        (Int64(a), Int64(b)) => a.cmp(&b),
        (Bool(a), Bool(b)) => a.cmp(&b),
        (RecordPtr(a), RecordPtr(b)) => a.cmp(&b),
        (Float(a), Float(b)) => a.partial_cmp(&b).ok_or_else(|| Error::TypeMismatch("NaN compare".into()))?,
        (Double(a), Double(b)) => a.partial_cmp(&b).ok_or_else(|| Error::TypeMismatch("NaN compare".into()))?,
        (a, b) => return err_at!(TypeMismatch, msg: "comparison on mismatched kinds {:?}/{:?}", a.kind(), b.kind()),
    };
    Ok(match op {
        CmpOp::Eq => ord == std::cmp::Ordering::Equal,
        CmpOp::Ne => ord != std::cmp::Ordering::Equal,
        CmpOp::Lt => ord == std::cmp::Ordering::Less,
        CmpOp::Le => ord != std::cmp::Ordering::Greater,
        CmpOp::Gt => ord == std::cmp::Ordering::Greater,
        CmpOp::Ge => ord != std::cmp::Ordering::Less,
    })
}
