//! # anvilc
//!
//! Ahead-of-time compiler for Anvil, a small statically-typed systems
//! language that targets GNU x86-64 assembly on Linux. See
//! [`compiler::Compiler`] for the build/run/test pipeline.

pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod lexer;
