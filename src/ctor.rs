//! Module `ctor` implements the constructor protocol shared by the
//! interpreter's `Create` statement and the public handle's creation API
//! (spec §4.8, C9 cooperating with C11).
//!
//! Every registered type has an *inner* constructor `(txn_manager, txn) ->
//! record_ref` and an *outer* constructor `() -> handle` used only at the
//! top level. The outer form begins a transaction, calls the inner form,
//! and commits.

use crate::error::{Error, Result};
use crate::ir::Ir;
use crate::record::RecordRef;
use crate::registry::TableRegistry;
use crate::txn::Txn;
use crate::value::Value;

/// Inner constructor (spec §4.8): lazily create/look up the type's
/// table, insert its main record from declared defaults, then initialize
/// every array-list attribute in declaration order.
pub fn construct_inner(ir: &Ir, registry: &TableRegistry, type_name: &str, txn: &mut Txn) -> Result<RecordRef> {
    let ty = ir
        .type_of(type_name)
        .ok_or_else(|| Error::UnknownName(format!("type {:?}", type_name)))?;

    let table = registry.create_table(type_name, ty.kinds());

    let defaults: Vec<u8> = ty.attributes.iter().flat_map(|a| a.default.to_bytes()).collect();
    let main_ref = table.insert_record(Some(txn), &defaults)?;

    for (idx, attr) in ty.attributes.iter().enumerate() {
        use crate::ir::AttributeCategory::*;
        match &attr.category {
            Primitive(_) | SubType { .. } => {}
            Array { element_type, n } => {
                let elem_ty = ir
                    .type_of(element_type)
                    .ok_or_else(|| Error::UnknownName(format!("type {:?}", element_type)))?;
                let elem_table = registry.create_table(element_type, elem_ty.kinds());
                let row_defaults: Vec<u8> = elem_ty.attributes.iter().flat_map(|a| a.default.to_bytes()).collect();
                let first = elem_table.insert_n_records(Some(txn), *n, Some(&row_defaults))?;
                table.update_attribute(Some(txn), main_ref, idx, &Value::RecordPtr(first.as_u64()).to_bytes())?;
            }
            IndexedList { .. } => {
                let handle = crate::index::INDEXES.create();
                table.update_attribute(Some(txn), main_ref, idx, &Value::RecordPtr(handle).to_bytes())?;
            }
        }
    }

    Ok(main_ref)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{AttributeCategory, AttributeDef, TypeDef};
    use crate::value::Kind;
    use std::sync::Arc;

    #[test]
    fn test_construct_inner_initializes_array() {
        let mut ir = Ir::new("ds", "main");
        let mut node = TypeDef::new("node");
        node.attributes.push(AttributeDef {
            name: "payload".into(),
            category: AttributeCategory::Primitive(Kind::Int64),
            default: Value::Int64(0),
        });
        ir.types.insert("node".into(), node);

        let mut main = TypeDef::new("main");
        main.attributes.push(AttributeDef {
            name: "slots".into(),
            category: AttributeCategory::Array { element_type: "node".into(), n: 3 },
            default: Value::RecordPtr(0),
        });
        ir.types.insert("main".into(), main);

        let registry = Arc::new(TableRegistry::new());
        let mut txn = Txn::new(1, 0, false, registry.clone());
        let main_ref = construct_inner(&ir, &registry, "main", &mut txn).unwrap();
        txn.commit().unwrap();

        let table = registry.get_by_name("main").unwrap();
        let bytes = table.get_attribute(main_ref, 0).unwrap();
        let head = Value::from_bytes(Kind::RecordPtr, &bytes).unwrap().as_record_ptr().unwrap();
        assert_ne!(head, 0);

        let node_table = registry.get_by_name("node").unwrap();
        assert_eq!(node_table.len(), 3);
    }

    #[test]
    fn test_construct_inner_initializes_indexed_list() {
        let mut ir = Ir::new("ds", "main");
        let mut elem = TypeDef::new("elem");
        elem.attributes.push(AttributeDef {
            name: "key".into(),
            category: AttributeCategory::Primitive(Kind::Int32),
            default: Value::Int32(0),
        });
        ir.types.insert("elem".into(), elem);

        let mut main = TypeDef::new("main");
        main.attributes.push(AttributeDef {
            name: "map".into(),
            category: AttributeCategory::IndexedList {
                element_type: "elem".into(),
                key_kind: Kind::Int32,
                key_attr: "key".into(),
            },
            default: Value::RecordPtr(0),
        });
        ir.types.insert("main".into(), main);

        let registry = Arc::new(TableRegistry::new());
        let mut txn = Txn::new(1, 0, false, registry.clone());
        let main_ref = construct_inner(&ir, &registry, "main", &mut txn).unwrap();

        let table = registry.get_by_name("main").unwrap();
        let bytes = table.get_attribute(main_ref, 0).unwrap();
        let handle = Value::from_bytes(Kind::RecordPtr, &bytes).unwrap().as_record_ptr().unwrap();
        assert!(crate::index::INDEXES.get(handle).is_some());
    }
}
