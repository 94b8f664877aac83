//! # AST Nodes
//!
//! The Anvil abstract syntax tree. Every node owns its children by value; the
//! tree is acyclic and walked single-threaded (spec.md §3, §5). Every
//! statement and expression variant carries its originating [`SourceLocation`]
//! so later stages (codegen, diagnostics) never need to re-derive position.

use crate::ast::token::SourceLocation;
use crate::ast::types::Type;

/// The root of a translation unit's AST.
#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Statement>,
}

// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitwiseOperator {
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    BitwiseNot,
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOperator {
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

// -----------------------------------------------------------------------------

/// An Anvil expression. Every variant's last field is its source location.
#[derive(Debug, Clone)]
pub enum Expression {
    Integer(i64, SourceLocation),
    /// A float literal pre-scaled ×1000 into a fixed-point integer (spec.md §4.1).
    Float(i64, SourceLocation),
    Str(String, SourceLocation),
    Char(char, SourceLocation),
    Boolean(bool, SourceLocation),
    Null(SourceLocation),
    Identifier(String, SourceLocation),

    FunctionCall {
        name: String,
        args: Vec<Expression>,
        location: SourceLocation,
    },

    BinaryOp {
        left: Box<Expression>,
        operator: BinaryOperator,
        right: Box<Expression>,
        location: SourceLocation,
    },

    UnaryOp {
        operator: UnaryOperator,
        operand: Box<Expression>,
        location: SourceLocation,
    },

    BitwiseOp {
        left: Box<Expression>,
        operator: BitwiseOperator,
        right: Box<Expression>,
        location: SourceLocation,
    },

    Comparison {
        left: Box<Expression>,
        operator: ComparisonOperator,
        right: Box<Expression>,
        location: SourceLocation,
    },

    LogicalOp {
        left: Box<Expression>,
        operator: LogicalOperator,
        right: Box<Expression>,
        location: SourceLocation,
    },

    ArrayAccess {
        array: Box<Expression>,
        index: Box<Expression>,
        location: SourceLocation,
    },
}

impl Expression {
    pub fn location(&self) -> SourceLocation {
        match self {
            Expression::Integer(_, loc)
            | Expression::Float(_, loc)
            | Expression::Str(_, loc)
            | Expression::Char(_, loc)
            | Expression::Boolean(_, loc)
            | Expression::Null(loc)
            | Expression::Identifier(_, loc) => *loc,
            Expression::FunctionCall { location, .. }
            | Expression::BinaryOp { location, .. }
            | Expression::UnaryOp { location, .. }
            | Expression::BitwiseOp { location, .. }
            | Expression::Comparison { location, .. }
            | Expression::LogicalOp { location, .. }
            | Expression::ArrayAccess { location, .. } => *location,
        }
    }

    /// True for literal nodes with no possible side effect. Used by the
    /// optimizer's short-circuit and identity rules (spec.md §4.4): only a
    /// provably pure operand may be elided.
    pub fn is_pure_leaf(&self) -> bool {
        matches!(
            self,
            Expression::Integer(..)
                | Expression::Float(..)
                | Expression::Str(..)
                | Expression::Char(..)
                | Expression::Boolean(..)
                | Expression::Null(..)
                | Expression::Identifier(..)
        )
    }

    /// True when this expression (or any subexpression) is or contains a
    /// `FunctionCall`. The optimizer must not fold past one (spec.md §4.4,
    /// §9.6): calls may be intrinsics with observable effects.
    pub fn contains_call(&self) -> bool {
        match self {
            Expression::Integer(..)
            | Expression::Float(..)
            | Expression::Str(..)
            | Expression::Char(..)
            | Expression::Boolean(..)
            | Expression::Null(..)
            | Expression::Identifier(..) => false,
            Expression::FunctionCall { .. } => true,
            Expression::BinaryOp { left, right, .. }
            | Expression::BitwiseOp { left, right, .. }
            | Expression::Comparison { left, right, .. }
            | Expression::LogicalOp { left, right, .. } => {
                left.contains_call() || right.contains_call()
            }
            Expression::UnaryOp { operand, .. } => operand.contains_call(),
            Expression::ArrayAccess { array, index, .. } => {
                array.contains_call() || index.contains_call()
            }
        }
    }
}

// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub error_binding: String,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub enum Statement {
    VariableDeclaration {
        name: String,
        ty: Type,
        value: Box<Expression>,
        location: SourceLocation,
    },

    ConstantDeclaration {
        name: String,
        ty: Type,
        value: Box<Expression>,
        location: SourceLocation,
    },

    Assignment {
        target: Box<Expression>,
        value: Box<Expression>,
        location: SourceLocation,
    },

    CompoundAssignment {
        target: Box<Expression>,
        operator: CompoundOperator,
        value: Box<Expression>,
        location: SourceLocation,
    },

    ExpressionStatement {
        expression: Box<Expression>,
        location: SourceLocation,
    },

    ReturnStatement {
        value: Option<Box<Expression>>,
        location: SourceLocation,
    },

    IfStatement {
        condition: Box<Expression>,
        then_body: Vec<Statement>,
        else_body: Option<Vec<Statement>>,
        location: SourceLocation,
    },

    WhileLoop {
        condition: Box<Expression>,
        body: Vec<Statement>,
        location: SourceLocation,
    },

    ForLoop {
        init: Option<Box<Statement>>,
        condition: Option<Box<Expression>>,
        update: Option<Box<Statement>>,
        body: Vec<Statement>,
        location: SourceLocation,
    },

    FunctionDefinition {
        name: String,
        params: Vec<Param>,
        return_type: Type,
        body: Vec<Statement>,
        location: SourceLocation,
    },

    TryStatement {
        try_block: Vec<Statement>,
        catch_clauses: Vec<CatchClause>,
        finally_block: Option<Vec<Statement>>,
        location: SourceLocation,
    },

    ImportStatement {
        module: String,
        items: Vec<String>,
        alias: Option<String>,
        is_wildcard: bool,
        location: SourceLocation,
    },
}

impl Statement {
    pub fn location(&self) -> SourceLocation {
        match self {
            Statement::VariableDeclaration { location, .. }
            | Statement::ConstantDeclaration { location, .. }
            | Statement::Assignment { location, .. }
            | Statement::CompoundAssignment { location, .. }
            | Statement::ExpressionStatement { location, .. }
            | Statement::ReturnStatement { location, .. }
            | Statement::IfStatement { location, .. }
            | Statement::WhileLoop { location, .. }
            | Statement::ForLoop { location, .. }
            | Statement::FunctionDefinition { location, .. }
            | Statement::TryStatement { location, .. }
            | Statement::ImportStatement { location, .. } => *location,
        }
    }
}
