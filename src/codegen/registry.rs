//! # Standard Library Registry
//!
//! A process-wide, read-only mapping from module name to a module descriptor
//! (spec.md §3, §9): "express it as a lazily initialized immutable table —
//! one-time construction at startup; read-only thereafter." Each intrinsic
//! is a function value over `(Generator, &[Expression])` — "a struct with a
//! function pointer field; no dynamic dispatch over trait objects required
//! beyond that single indirection."

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::intrinsics::{
    collections, file, hash, http, md5, mem, net, num, sha256, str_ops, sys_math, time,
};
use crate::codegen::print;
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Expands one intrinsic call inline at its call site, leaving the result
/// (if any) in `%rax` (spec.md §4.5.4, §4.5.5). `-1` arity marks a variadic
/// intrinsic that skips the fixed arity check.
pub type Expander = fn(&mut Generator, &[Expression], SourceLocation) -> Result<(), CompileError>;

pub struct IntrinsicDescriptor {
    pub name: &'static str,
    pub module_name: &'static str,
    pub arity: i32,
    pub expander: Expander,
}

pub struct ModuleDescriptor {
    pub name: &'static str,
    pub items: Vec<IntrinsicDescriptor>,
}

pub fn module(name: &'static str, items: Vec<IntrinsicDescriptor>) -> ModuleDescriptor {
    ModuleDescriptor { name, items }
}

pub fn intrinsic(
    name: &'static str,
    module_name: &'static str,
    arity: i32,
    expander: Expander,
) -> IntrinsicDescriptor {
    IntrinsicDescriptor {
        name,
        module_name,
        arity,
        expander,
    }
}

fn registry() -> &'static HashMap<&'static str, ModuleDescriptor> {
    static REGISTRY: OnceLock<HashMap<&'static str, ModuleDescriptor>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

fn build_registry() -> HashMap<&'static str, ModuleDescriptor> {
    let modules = vec![
        mem::module(),
        sys_math::module(),
        num::module(),
        str_ops::module(),
        collections::module(),
        hash::module(),
        sha256::module(),
        md5::module(),
        net::module(),
        http::module(),
        file::module(),
        time::module(),
        print::module(),
    ];
    modules.into_iter().map(|m| (m.name, m)).collect()
}

pub fn module_exists(name: &str) -> bool {
    registry().contains_key(name)
}

pub fn item_exists(module_name: &str, item: &str) -> bool {
    registry()
        .get(module_name)
        .is_some_and(|m| m.items.iter().any(|d| d.name == item))
}

pub fn lookup(module_name: &str, item: &str) -> Option<&'static IntrinsicDescriptor> {
    registry()
        .get(module_name)
        .and_then(|m| m.items.iter().find(|d| d.name == item))
}
