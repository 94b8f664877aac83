//! # Expression Parser
//!
//! A recursive-descent precedence ladder (spec.md §4.2): multiplicative above
//! additive above shift above comparison above bitwise-and above bitwise-xor
//! above bitwise-or above logical-and above logical-or. Unary operators bind
//! tighter than multiplicative.

use super::common::Parser;
use crate::ast::nodes::{
    BinaryOperator, BitwiseOperator, ComparisonOperator, Expression, LogicalOperator,
    UnaryOperator,
};
use crate::ast::token::TokenKind;
use crate::compiler::error::CompileError;

pub struct ExpressionParser;

impl ExpressionParser {
    pub fn parse_expression(parser: &mut Parser) -> Result<Expression, CompileError> {
        Self::parse_logical_or(parser)
    }

    fn parse_logical_or(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_logical_and(parser)?;
        while parser.check(&TokenKind::PipePipe) {
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_logical_and(parser)?;
            left = Expression::LogicalOp {
                left: Box::new(left),
                operator: LogicalOperator::Or,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_logical_and(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_bitwise_or(parser)?;
        while parser.check(&TokenKind::AmpAmp) {
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_bitwise_or(parser)?;
            left = Expression::LogicalOp {
                left: Box::new(left),
                operator: LogicalOperator::And,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_bitwise_or(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_bitwise_xor(parser)?;
        while parser.check(&TokenKind::Pipe) {
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_bitwise_xor(parser)?;
            left = Expression::BitwiseOp {
                left: Box::new(left),
                operator: BitwiseOperator::Or,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_bitwise_xor(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_bitwise_and(parser)?;
        while parser.check(&TokenKind::Caret) {
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_bitwise_and(parser)?;
            left = Expression::BitwiseOp {
                left: Box::new(left),
                operator: BitwiseOperator::Xor,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_bitwise_and(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_comparison(parser)?;
        while parser.check(&TokenKind::Ampersand) {
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_comparison(parser)?;
            left = Expression::BitwiseOp {
                left: Box::new(left),
                operator: BitwiseOperator::And,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_comparison(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_shift(parser)?;
        loop {
            let operator = match parser.peek_kind() {
                TokenKind::EqEq => ComparisonOperator::Equal,
                TokenKind::BangEq => ComparisonOperator::NotEqual,
                TokenKind::Lt => ComparisonOperator::Less,
                TokenKind::Gt => ComparisonOperator::Greater,
                TokenKind::LtEq => ComparisonOperator::LessEqual,
                TokenKind::GtEq => ComparisonOperator::GreaterEqual,
                _ => break,
            };
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_shift(parser)?;
            left = Expression::Comparison {
                left: Box::new(left),
                operator,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_shift(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_additive(parser)?;
        loop {
            let operator = match parser.peek_kind() {
                TokenKind::Shl => BitwiseOperator::Shl,
                TokenKind::Shr => BitwiseOperator::Shr,
                _ => break,
            };
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_additive(parser)?;
            left = Expression::BitwiseOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_additive(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_multiplicative(parser)?;
        loop {
            let operator = match parser.peek_kind() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_multiplicative(parser)?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut left = Self::parse_unary(parser)?;
        loop {
            let operator = match parser.peek_kind() {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                TokenKind::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            let loc = parser.location();
            parser.advance();
            let right = Self::parse_unary(parser)?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
                location: loc,
            };
        }
        Ok(left)
    }

    fn parse_unary(parser: &mut Parser) -> Result<Expression, CompileError> {
        let loc = parser.location();
        let operator = match parser.peek_kind() {
            TokenKind::Minus => Some(UnaryOperator::Negate),
            TokenKind::Tilde => Some(UnaryOperator::BitwiseNot),
            TokenKind::Bang => Some(UnaryOperator::LogicalNot),
            _ => None,
        };

        if let Some(operator) = operator {
            parser.advance();
            let operand = Self::parse_unary(parser)?;
            return Ok(Expression::UnaryOp {
                operator,
                operand: Box::new(operand),
                location: loc,
            });
        }

        Self::parse_postfix(parser)
    }

    fn parse_postfix(parser: &mut Parser) -> Result<Expression, CompileError> {
        let mut expr = Self::parse_primary(parser)?;
        while parser.check(&TokenKind::LBracket) {
            let loc = parser.location();
            parser.advance();
            let index = Self::parse_expression(parser)?;
            parser.expect(TokenKind::RBracket)?;
            expr = Expression::ArrayAccess {
                array: Box::new(expr),
                index: Box::new(index),
                location: loc,
            };
        }
        Ok(expr)
    }

    fn parse_primary(parser: &mut Parser) -> Result<Expression, CompileError> {
        let loc = parser.location();
        match parser.peek_kind().clone() {
            TokenKind::IntegerLiteral(n) => {
                parser.advance();
                Ok(Expression::Integer(n, loc))
            }
            TokenKind::FloatLiteral(n) => {
                parser.advance();
                Ok(Expression::Float(n, loc))
            }
            TokenKind::StringLiteral(s) => {
                parser.advance();
                Ok(Expression::Str(s, loc))
            }
            TokenKind::CharLiteral(c) => {
                parser.advance();
                Ok(Expression::Char(c, loc))
            }
            TokenKind::BoolLiteral(b) => {
                parser.advance();
                Ok(Expression::Boolean(b, loc))
            }
            TokenKind::Null => {
                parser.advance();
                Ok(Expression::Null(loc))
            }
            TokenKind::Identifier(name) => {
                parser.advance();
                let mut name = name;
                // Qualified intrinsic calls (`hash.djb2`, `net.resolve`) are a
                // single dotted name, not member access: this language has no
                // structs, so `.` between identifiers only ever introduces a
                // module qualifier ahead of a call.
                while parser.check(&TokenKind::Dot) {
                    parser.advance();
                    let TokenKind::Identifier(part) = parser.peek_kind().clone() else {
                        return Err(CompileError::syntax(
                            parser.location(),
                            "expected identifier after `.`",
                        ));
                    };
                    parser.advance();
                    name.push('.');
                    name.push_str(&part);
                }
                if parser.check(&TokenKind::LParen) {
                    parser.advance();
                    let mut args = Vec::new();
                    if !parser.check(&TokenKind::RParen) {
                        loop {
                            args.push(Self::parse_expression(parser)?);
                            if parser.check(&TokenKind::Comma) {
                                parser.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    parser.expect(TokenKind::RParen)?;
                    Ok(Expression::FunctionCall {
                        name,
                        args,
                        location: loc,
                    })
                } else {
                    Ok(Expression::Identifier(name, loc))
                }
            }
            TokenKind::LParen => {
                parser.advance();
                let expr = Self::parse_expression(parser)?;
                parser.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            other => Err(CompileError::syntax(
                loc,
                format!("expected expression, found {:?}", other),
            )),
        }
    }
}
