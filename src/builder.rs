//! Module `builder` is a thin front-end for assembling an [Ir] by hand.
//!
//! A full declarative front-end (parser, DSL macros, a fluent operation
//! expression builder) is out of scope — spec §1 names the builder surface
//! itself as a non-goal. What remains in scope, and lives here, is the
//! bare minimum needed to hand-assemble a [TypeDef]/[Ir] so the core can be
//! exercised end to end: a `DsBuilder` that collects [TypeDef]s into an
//! [Ir], and a `TypeBuilder` that collects attributes and functions onto
//! one [TypeDef].

use crate::ir::{AttributeCategory, AttributeDef, FunctionDef, Ir, TypeDef};
use crate::value::Value;

pub struct TypeBuilder {
    ty: TypeDef,
}

impl TypeBuilder {
    pub fn new(name: impl Into<String>) -> TypeBuilder {
        TypeBuilder { ty: TypeDef::new(name) }
    }

    pub fn attribute(mut self, name: impl Into<String>, category: AttributeCategory, default: Value) -> TypeBuilder {
        self.ty.attributes.push(AttributeDef { name: name.into(), category, default });
        self
    }

    pub fn function(mut self, f: FunctionDef) -> TypeBuilder {
        self.ty.functions.insert(f.name.clone(), f);
        self
    }

    pub fn build(self) -> TypeDef {
        self.ty
    }
}

pub struct DsBuilder {
    ir: Ir,
}

impl DsBuilder {
    pub fn new(ds_name: impl Into<String>, main_type: impl Into<String>) -> DsBuilder {
        DsBuilder { ir: Ir::new(ds_name, main_type) }
    }

    pub fn with_type(mut self, ty: TypeDef) -> DsBuilder {
        self.ir.types.insert(ty.name.clone(), ty);
        self
    }

    pub fn build(self) -> Ir {
        self.ir
    }
}
