//! # Statement Parser
//!
//! Parses declarations and control-flow forms (spec.md §4.2): every block is
//! a flat `Vec<Statement>` with no implicit merging.

use super::common::Parser;
use super::expression_parser::ExpressionParser;
use crate::ast::nodes::*;
use crate::ast::token::TokenKind;
use crate::ast::types::Type;
use crate::compiler::error::CompileError;

pub struct StatementParser;

impl StatementParser {
    pub fn parse_program(parser: &mut Parser) -> Result<Program, CompileError> {
        let mut statements = Vec::new();
        while !parser.is_at_end() {
            statements.push(Self::parse_statement(parser)?);
        }
        Ok(Program { statements })
    }

    fn parse_block(parser: &mut Parser) -> Result<Vec<Statement>, CompileError> {
        parser.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !parser.check(&TokenKind::RBrace) && !parser.is_at_end() {
            statements.push(Self::parse_statement(parser)?);
        }
        parser.expect(TokenKind::RBrace)?;
        Ok(statements)
    }

    fn parse_type(parser: &mut Parser) -> Result<Type, CompileError> {
        let loc = parser.location();
        match parser.peek_kind().clone() {
            TokenKind::PrimitiveType(ty) => {
                parser.advance();
                Ok(ty)
            }
            other => Err(CompileError::syntax(
                loc,
                format!("expected type name, found {:?}", other),
            )),
        }
    }

    pub fn parse_statement(parser: &mut Parser) -> Result<Statement, CompileError> {
        match parser.peek_kind() {
            TokenKind::Let => Self::parse_variable_declaration(parser),
            TokenKind::Const => Self::parse_constant_declaration(parser),
            TokenKind::Return => Self::parse_return_statement(parser),
            TokenKind::If => Self::parse_if_statement(parser),
            TokenKind::While => Self::parse_while_loop(parser),
            TokenKind::For => Self::parse_for_loop(parser),
            TokenKind::Fn => Self::parse_function_definition(parser),
            TokenKind::Try => Self::parse_try_statement(parser),
            TokenKind::Import => Self::parse_import_statement(parser),
            _ => Self::parse_assignment_or_expression(parser),
        }
    }

    fn parse_variable_declaration(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `let`
        let name = parser.expect_identifier()?;
        parser.expect(TokenKind::Colon)?;
        let ty = Self::parse_type(parser)?;
        parser.expect(TokenKind::Eq)?;
        let value = ExpressionParser::parse_expression(parser)?;
        parser.expect(TokenKind::Semicolon)?;
        Ok(Statement::VariableDeclaration {
            name,
            ty,
            value: Box::new(value),
            location: loc,
        })
    }

    fn parse_constant_declaration(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `const`
        let name = parser.expect_identifier()?;
        parser.expect(TokenKind::Colon)?;
        let ty = Self::parse_type(parser)?;
        parser.expect(TokenKind::Eq)?;
        let value = ExpressionParser::parse_expression(parser)?;
        parser.expect(TokenKind::Semicolon)?;
        Ok(Statement::ConstantDeclaration {
            name,
            ty,
            value: Box::new(value),
            location: loc,
        })
    }

    fn parse_return_statement(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `return`
        let value = if parser.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(ExpressionParser::parse_expression(parser)?))
        };
        parser.expect(TokenKind::Semicolon)?;
        Ok(Statement::ReturnStatement {
            value,
            location: loc,
        })
    }

    fn parse_if_statement(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `if`
        parser.expect(TokenKind::LParen)?;
        let condition = ExpressionParser::parse_expression(parser)?;
        parser.expect(TokenKind::RParen)?;
        let then_body = Self::parse_block(parser)?;
        let else_body = if parser.check(&TokenKind::Else) {
            parser.advance();
            if parser.check(&TokenKind::If) {
                Some(vec![Self::parse_if_statement(parser)?])
            } else {
                Some(Self::parse_block(parser)?)
            }
        } else {
            None
        };
        Ok(Statement::IfStatement {
            condition: Box::new(condition),
            then_body,
            else_body,
            location: loc,
        })
    }

    fn parse_while_loop(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `while`
        parser.expect(TokenKind::LParen)?;
        let condition = ExpressionParser::parse_expression(parser)?;
        parser.expect(TokenKind::RParen)?;
        let body = Self::parse_block(parser)?;
        Ok(Statement::WhileLoop {
            condition: Box::new(condition),
            body,
            location: loc,
        })
    }

    fn parse_for_loop(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `for`
        parser.expect(TokenKind::LParen)?;

        let init = if parser.check(&TokenKind::Semicolon) {
            parser.advance();
            None
        } else {
            let stmt = Self::parse_assignment_or_expression(parser)?;
            Some(Box::new(stmt))
        };

        let condition = if parser.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(ExpressionParser::parse_expression(parser)?))
        };
        parser.expect(TokenKind::Semicolon)?;

        let update = if parser.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(Self::parse_bare_assignment_or_expression(
                parser,
            )?))
        };
        parser.expect(TokenKind::RParen)?;

        let body = Self::parse_block(parser)?;
        Ok(Statement::ForLoop {
            init,
            condition,
            update,
            body,
            location: loc,
        })
    }

    fn parse_function_definition(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `fn`
        let name = parser.expect_identifier()?;
        parser.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if !parser.check(&TokenKind::RParen) {
            loop {
                let param_name = parser.expect_identifier()?;
                parser.expect(TokenKind::Colon)?;
                let ty = Self::parse_type(parser)?;
                params.push(Param { name: param_name, ty });
                if parser.check(&TokenKind::Comma) {
                    parser.advance();
                } else {
                    break;
                }
            }
        }
        parser.expect(TokenKind::RParen)?;

        let return_type = if parser.check(&TokenKind::Arrow) {
            parser.advance();
            Self::parse_type(parser)?
        } else {
            Type::Void
        };

        let body = Self::parse_block(parser)?;
        Ok(Statement::FunctionDefinition {
            name,
            params,
            return_type,
            body,
            location: loc,
        })
    }

    fn parse_try_statement(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `try`
        let try_block = Self::parse_block(parser)?;

        let mut catch_clauses = Vec::new();
        while parser.check(&TokenKind::Catch) {
            parser.advance();
            parser.expect(TokenKind::LParen)?;
            let error_binding = parser.expect_identifier()?;
            parser.expect(TokenKind::RParen)?;
            let body = Self::parse_block(parser)?;
            catch_clauses.push(CatchClause {
                error_binding,
                body,
            });
        }

        let finally_block = if parser.check(&TokenKind::Finally) {
            parser.advance();
            Some(Self::parse_block(parser)?)
        } else {
            None
        };

        if catch_clauses.is_empty() && finally_block.is_none() {
            return Err(CompileError::syntax(
                loc,
                "`try` requires at least one `catch` or a `finally` block",
            ));
        }

        Ok(Statement::TryStatement {
            try_block,
            catch_clauses,
            finally_block,
            location: loc,
        })
    }

    fn parse_import_statement(parser: &mut Parser) -> Result<Statement, CompileError> {
        let loc = parser.location();
        parser.advance(); // `import`

        // import <module>;
        // import <module> as <alias>;
        // import { a, b } from <module>;
        // import * from <module>;
        if parser.check(&TokenKind::LBrace) {
            parser.advance();
            let mut items = Vec::new();
            if !parser.check(&TokenKind::RBrace) {
                loop {
                    items.push(parser.expect_identifier()?);
                    if parser.check(&TokenKind::Comma) {
                        parser.advance();
                    } else {
                        break;
                    }
                }
            }
            parser.expect(TokenKind::RBrace)?;
            parser.expect(TokenKind::From)?;
            let module = parser.expect_identifier()?;
            parser.expect(TokenKind::Semicolon)?;
            return Ok(Statement::ImportStatement {
                module,
                items,
                alias: None,
                is_wildcard: false,
                location: loc,
            });
        }

        if parser.check(&TokenKind::Star) {
            parser.advance();
            parser.expect(TokenKind::From)?;
            let module = parser.expect_identifier()?;
            parser.expect(TokenKind::Semicolon)?;
            return Ok(Statement::ImportStatement {
                module,
                items: Vec::new(),
                alias: None,
                is_wildcard: true,
                location: loc,
            });
        }

        let module = parser.expect_identifier()?;
        let alias = if parser.check(&TokenKind::As) {
            parser.advance();
            Some(parser.expect_identifier()?)
        } else {
            None
        };
        parser.expect(TokenKind::Semicolon)?;
        Ok(Statement::ImportStatement {
            module,
            items: Vec::new(),
            alias,
            is_wildcard: false,
            location: loc,
        })
    }

    /// Parses an assignment/compound-assignment/expression statement,
    /// consuming the trailing `;`.
    fn parse_assignment_or_expression(parser: &mut Parser) -> Result<Statement, CompileError> {
        let stmt = Self::parse_bare_assignment_or_expression(parser)?;
        parser.expect(TokenKind::Semicolon)?;
        Ok(stmt)
    }

    /// Same as above but without consuming a trailing `;` — used for the
    /// `for (init; cond; update)` clauses, which are not `;`-terminated by
    /// the grammar at the `update` position and already consumed at `init`.
    fn parse_bare_assignment_or_expression(
        parser: &mut Parser,
    ) -> Result<Statement, CompileError> {
        let loc = parser.location();
        let expr = ExpressionParser::parse_expression(parser)?;

        let compound = match parser.peek_kind() {
            TokenKind::PlusEq => Some(CompoundOperator::AddAssign),
            TokenKind::MinusEq => Some(CompoundOperator::SubAssign),
            TokenKind::StarEq => Some(CompoundOperator::MulAssign),
            TokenKind::SlashEq => Some(CompoundOperator::DivAssign),
            TokenKind::PercentEq => Some(CompoundOperator::ModAssign),
            _ => None,
        };

        if let Some(operator) = compound {
            parser.advance();
            let value = ExpressionParser::parse_expression(parser)?;
            return Ok(Statement::CompoundAssignment {
                target: Box::new(expr),
                operator,
                value: Box::new(value),
                location: loc,
            });
        }

        if parser.check(&TokenKind::Eq) {
            parser.advance();
            let value = ExpressionParser::parse_expression(parser)?;
            return Ok(Statement::Assignment {
                target: Box::new(expr),
                value: Box::new(value),
                location: loc,
            });
        }

        Ok(Statement::ExpressionStatement {
            expression: Box::new(expr),
            location: loc,
        })
    }
}
