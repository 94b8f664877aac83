//! # Import Resolver
//!
//! Walks the top level of the AST for `ImportStatement` nodes and builds the
//! translation unit's import context (spec.md §4.3). Three forms: whole
//! module, specific items, and wildcard. No transitive imports — the
//! standard library is a closed set, so every name is checked against the
//! registry eagerly.

use crate::ast::nodes::{Program, Statement};
use crate::codegen::registry;
use crate::compiler::error::CompileError;
use std::collections::HashMap;

/// Records which module aliases and which individual intrinsic names have
/// been brought into scope for one translation unit.
#[derive(Debug, Default, Clone)]
pub struct ImportContext {
    /// alias/module name -> real module name, for whole-module imports.
    whole_modules: HashMap<String, String>,
    /// local name -> (module, item), for specific-item imports.
    items: HashMap<String, (String, String)>,
    /// modules imported with `import * from <module>;`.
    wildcard_modules: Vec<String>,
}

impl ImportContext {
    /// Resolves a bare call name (e.g. `sha256` or `mem.mmap`) to
    /// `(module, function)` if it refers to an imported intrinsic.
    pub fn resolve_call(&self, name: &str) -> Option<(&str, &str)> {
        if let Some((module, item)) = self.items.get(name) {
            return Some((module.as_str(), item.as_str()));
        }

        if let Some((qualifier, function)) = name.split_once('.') {
            if let Some(module) = self.whole_modules.get(qualifier) {
                return Some((module.as_str(), function));
            }
        }

        for module in &self.wildcard_modules {
            if registry::item_exists(module, name) {
                return Some((module.as_str(), name));
            }
        }

        None
    }
}

/// Walks `program`'s top-level statements and resolves every import against
/// the standard-library registry, failing fast on an unknown module or item.
pub fn resolve(program: &Program) -> Result<ImportContext, CompileError> {
    let mut context = ImportContext::default();

    for statement in &program.statements {
        let Statement::ImportStatement {
            module,
            items,
            alias,
            is_wildcard,
            location,
        } = statement
        else {
            continue;
        };

        if !registry::module_exists(module) {
            return Err(CompileError::unknown_module(*location, module.clone()));
        }

        if *is_wildcard {
            context.wildcard_modules.push(module.clone());
            continue;
        }

        if !items.is_empty() {
            for item in items {
                if !registry::item_exists(module, item) {
                    return Err(CompileError::unknown_import_item(
                        *location,
                        module.clone(),
                        item.clone(),
                    ));
                }
                context
                    .items
                    .insert(item.clone(), (module.clone(), item.clone()));
            }
            continue;
        }

        let bound_name = alias.clone().unwrap_or_else(|| module.clone());
        context.whole_modules.insert(bound_name, module.clone());
    }

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::token::SourceLocation;

    fn import(module: &str, items: Vec<&str>, alias: Option<&str>, wildcard: bool) -> Statement {
        Statement::ImportStatement {
            module: module.to_string(),
            items: items.into_iter().map(String::from).collect(),
            alias: alias.map(String::from),
            is_wildcard: wildcard,
            location: SourceLocation::new(1, 1),
        }
    }

    #[test]
    fn whole_module_import_resolves_qualified_calls() {
        let program = Program {
            statements: vec![import("math", vec![], None, false)],
        };
        let ctx = resolve(&program).unwrap();
        assert_eq!(ctx.resolve_call("math.abs"), Some(("math", "abs")));
    }

    #[test]
    fn unknown_module_is_an_error() {
        let program = Program {
            statements: vec![import("not_a_real_module", vec![], None, false)],
        };
        assert!(resolve(&program).is_err());
    }

    #[test]
    fn specific_item_import_resolves_unqualified() {
        let program = Program {
            statements: vec![import("math", vec!["abs"], None, false)],
        };
        let ctx = resolve(&program).unwrap();
        assert_eq!(ctx.resolve_call("abs"), Some(("math", "abs")));
    }
}
