//! # Parser Module
//!
//! Converts the lexer's token stream into the AST defined in `ast::nodes`.

pub mod common;
pub mod expression_parser;
pub mod statement_parser;

use crate::ast::nodes::Program;
use crate::ast::token::Token;
use crate::compiler::error::CompileError;
use common::Parser;
use statement_parser::StatementParser;

/// Parses a full translation unit into a [`Program`]. On the first syntax
/// error, returns immediately — there is no error recovery (spec.md §4.2).
pub fn parse(tokens: Vec<Token>) -> Result<Program, CompileError> {
    let mut parser = Parser::new(tokens);
    StatementParser::parse_program(&mut parser)
}
