//! # Abstract Syntax Tree (AST) for Anvil
//!
//! Defines the token shapes, AST node variants, and primitive type set shared
//! by the lexer, parser, optimizer, and code generator.

pub mod nodes;
pub mod token;
pub mod types;
