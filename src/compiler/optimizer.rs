//! # AST Optimizer
//!
//! Rewrites the AST into a semantically equivalent but smaller form prior to
//! code generation (spec.md §4.4): constant folding, strength reduction,
//! identity removal, and short-circuit simplification. Never descends past a
//! `FunctionCall` node when deciding whether an operand is side-effect-free.

use crate::ast::nodes::{
    BinaryOperator, BitwiseOperator, ComparisonOperator, Expression, LogicalOperator, Statement,
    UnaryOperator,
};
use crate::ast::nodes::Program;

/// Runs the optimizer to a fixed point is not required by the contract —
/// a single pass already satisfies idempotence (spec.md §9.1) because every
/// rewrite rule produces a form no further rule in this pass matches again.
pub fn optimize(program: Program) -> Program {
    Program {
        statements: program.statements.into_iter().map(optimize_statement).collect(),
    }
}

fn optimize_statement(statement: Statement) -> Statement {
    match statement {
        Statement::VariableDeclaration {
            name,
            ty,
            value,
            location,
        } => Statement::VariableDeclaration {
            name,
            ty,
            value: Box::new(optimize_expression(*value)),
            location,
        },
        Statement::ConstantDeclaration {
            name,
            ty,
            value,
            location,
        } => Statement::ConstantDeclaration {
            name,
            ty,
            value: Box::new(optimize_expression(*value)),
            location,
        },
        Statement::Assignment {
            target,
            value,
            location,
        } => Statement::Assignment {
            target: Box::new(optimize_expression(*target)),
            value: Box::new(optimize_expression(*value)),
            location,
        },
        Statement::CompoundAssignment {
            target,
            operator,
            value,
            location,
        } => Statement::CompoundAssignment {
            target: Box::new(optimize_expression(*target)),
            operator,
            value: Box::new(optimize_expression(*value)),
            location,
        },
        Statement::ExpressionStatement { expression, location } => Statement::ExpressionStatement {
            expression: Box::new(optimize_expression(*expression)),
            location,
        },
        Statement::ReturnStatement { value, location } => Statement::ReturnStatement {
            value: value.map(|v| Box::new(optimize_expression(*v))),
            location,
        },
        Statement::IfStatement {
            condition,
            then_body,
            else_body,
            location,
        } => Statement::IfStatement {
            condition: Box::new(optimize_expression(*condition)),
            then_body: optimize_block(then_body),
            else_body: else_body.map(optimize_block),
            location,
        },
        Statement::WhileLoop {
            condition,
            body,
            location,
        } => Statement::WhileLoop {
            condition: Box::new(optimize_expression(*condition)),
            body: optimize_block(body),
            location,
        },
        Statement::ForLoop {
            init,
            condition,
            update,
            body,
            location,
        } => Statement::ForLoop {
            init: init.map(|s| Box::new(optimize_statement(*s))),
            condition: condition.map(|c| Box::new(optimize_expression(*c))),
            update: update.map(|s| Box::new(optimize_statement(*s))),
            body: optimize_block(body),
            location,
        },
        Statement::FunctionDefinition {
            name,
            params,
            return_type,
            body,
            location,
        } => Statement::FunctionDefinition {
            name,
            params,
            return_type,
            body: optimize_block(body),
            location,
        },
        Statement::TryStatement {
            try_block,
            catch_clauses,
            finally_block,
            location,
        } => Statement::TryStatement {
            try_block: optimize_block(try_block),
            catch_clauses: catch_clauses
                .into_iter()
                .map(|clause| crate::ast::nodes::CatchClause {
                    error_binding: clause.error_binding,
                    body: optimize_block(clause.body),
                })
                .collect(),
            finally_block: finally_block.map(optimize_block),
            location,
        },
        Statement::ImportStatement { .. } => statement,
    }
}

fn optimize_block(body: Vec<Statement>) -> Vec<Statement> {
    body.into_iter().map(optimize_statement).collect()
}

fn optimize_expression(expr: Expression) -> Expression {
    match expr {
        Expression::BinaryOp {
            left,
            operator,
            right,
            location,
        } => {
            let left = optimize_expression(*left);
            let right = optimize_expression(*right);
            fold_binary(left, operator, right, location)
        }
        Expression::UnaryOp {
            operator,
            operand,
            location,
        } => {
            let operand = optimize_expression(*operand);
            fold_unary(operator, operand, location)
        }
        Expression::BitwiseOp {
            left,
            operator,
            right,
            location,
        } => {
            let left = optimize_expression(*left);
            let right = optimize_expression(*right);
            fold_bitwise(left, operator, right, location)
        }
        Expression::Comparison {
            left,
            operator,
            right,
            location,
        } => {
            let left = optimize_expression(*left);
            let right = optimize_expression(*right);
            fold_comparison(left, operator, right, location)
        }
        Expression::LogicalOp {
            left,
            operator,
            right,
            location,
        } => {
            let left = optimize_expression(*left);
            let right = optimize_expression(*right);
            fold_logical(left, operator, right, location)
        }
        Expression::ArrayAccess {
            array,
            index,
            location,
        } => Expression::ArrayAccess {
            array: Box::new(optimize_expression(*array)),
            index: Box::new(optimize_expression(*index)),
            location,
        },
        Expression::FunctionCall { name, args, location } => Expression::FunctionCall {
            name,
            args: args.into_iter().map(optimize_expression).collect(),
            location,
        },
        leaf => leaf,
    }
}

fn as_int(expr: &Expression) -> Option<i64> {
    match expr {
        Expression::Integer(n, _) => Some(*n),
        _ => None,
    }
}

fn as_bool(expr: &Expression) -> Option<bool> {
    match expr {
        Expression::Boolean(b, _) => Some(*b),
        _ => None,
    }
}

fn fold_binary(
    left: Expression,
    operator: BinaryOperator,
    right: Expression,
    location: crate::ast::token::SourceLocation,
) -> Expression {
    if let (Some(a), Some(b)) = (as_int(&left), as_int(&right)) {
        let folded = match operator {
            BinaryOperator::Add => Some(a.wrapping_add(b)),
            BinaryOperator::Subtract => Some(a.wrapping_sub(b)),
            BinaryOperator::Multiply => Some(a.wrapping_mul(b)),
            BinaryOperator::Divide if b != 0 => Some(a.wrapping_div(b)),
            BinaryOperator::Modulo if b != 0 => Some(a.wrapping_rem(b)),
            _ => None,
        };
        if let Some(value) = folded {
            return Expression::Integer(value, location);
        }
    }

    // Identity removal (spec.md §4.4), only after failing to fully fold.
    match (&left, operator, &right) {
        (_, BinaryOperator::Add, r) if as_int(r) == Some(0) => return left,
        (l, BinaryOperator::Add, _) if as_int(l) == Some(0) => return right,
        (_, BinaryOperator::Subtract, r) if as_int(r) == Some(0) => return left,
        (l, BinaryOperator::Multiply, _) if as_int(l) == Some(1) => return right,
        (_, BinaryOperator::Multiply, r) if as_int(r) == Some(1) => return left,
        (l, BinaryOperator::Multiply, r) if as_int(l) == Some(0) && !r.contains_call() => {
            return Expression::Integer(0, location);
        }
        (l, BinaryOperator::Multiply, r) if as_int(r) == Some(0) && !l.contains_call() => {
            return Expression::Integer(0, location);
        }
        (_, BinaryOperator::Divide, r) if as_int(r) == Some(1) => return left,
        (_, BinaryOperator::Modulo, r) if as_int(r) == Some(1) => {
            return Expression::Integer(0, location);
        }
        _ => {}
    }

    // Strength reduction: multiply by a positive power of two -> shift left.
    if operator == BinaryOperator::Multiply {
        if let Some(n) = as_int(&right).filter(|n| *n > 0 && (*n as u64).is_power_of_two()) {
            let shift = n.trailing_zeros() as i64;
            return Expression::BitwiseOp {
                left: Box::new(left),
                operator: BitwiseOperator::Shl,
                right: Box::new(Expression::Integer(shift, location)),
                location,
            };
        }
        if let Some(n) = as_int(&left).filter(|n| *n > 0 && (*n as u64).is_power_of_two()) {
            let shift = n.trailing_zeros() as i64;
            return Expression::BitwiseOp {
                left: Box::new(right),
                operator: BitwiseOperator::Shl,
                right: Box::new(Expression::Integer(shift, location)),
                location,
            };
        }
    }

    Expression::BinaryOp {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        location,
    }
}

fn fold_unary(
    operator: UnaryOperator,
    operand: Expression,
    location: crate::ast::token::SourceLocation,
) -> Expression {
    match (operator, &operand) {
        (UnaryOperator::Negate, Expression::Integer(n, _)) => {
            return Expression::Integer(n.wrapping_neg(), location);
        }
        (UnaryOperator::BitwiseNot, Expression::Integer(n, _)) => {
            return Expression::Integer(!n, location);
        }
        (UnaryOperator::LogicalNot, Expression::Boolean(b, _)) => {
            return Expression::Boolean(!b, location);
        }
        _ => {}
    }

    Expression::UnaryOp {
        operator,
        operand: Box::new(operand),
        location,
    }
}

fn fold_bitwise(
    left: Expression,
    operator: BitwiseOperator,
    right: Expression,
    location: crate::ast::token::SourceLocation,
) -> Expression {
    if let (Some(a), Some(b)) = (as_int(&left), as_int(&right)) {
        let folded = match operator {
            BitwiseOperator::And => Some(a & b),
            BitwiseOperator::Or => Some(a | b),
            BitwiseOperator::Xor => Some(a ^ b),
            BitwiseOperator::Shl if (0..64).contains(&b) => Some(a << b),
            BitwiseOperator::Shr if (0..64).contains(&b) => Some(a >> b),
            _ => None,
        };
        if let Some(value) = folded {
            return Expression::Integer(value, location);
        }
    }

    match (&left, operator, &right) {
        (_, BitwiseOperator::And, r) if as_int(r) == Some(-1) => return left,
        (l, BitwiseOperator::And, _) if as_int(l) == Some(-1) => return right,
        (l, BitwiseOperator::And, r) if as_int(r) == Some(0) && !l.contains_call() => {
            return Expression::Integer(0, location);
        }
        (l, BitwiseOperator::And, r) if as_int(l) == Some(0) && !r.contains_call() => {
            return Expression::Integer(0, location);
        }
        (_, BitwiseOperator::Or, r) if as_int(r) == Some(0) => return left,
        (l, BitwiseOperator::Or, _) if as_int(l) == Some(0) => return right,
        (l, BitwiseOperator::Or, r) if as_int(r) == Some(-1) && !l.contains_call() => {
            return Expression::Integer(-1, location);
        }
        (l, BitwiseOperator::Or, r) if as_int(l) == Some(-1) && !r.contains_call() => {
            return Expression::Integer(-1, location);
        }
        (_, BitwiseOperator::Xor, r) if as_int(r) == Some(0) => return left,
        (l, BitwiseOperator::Xor, _) if as_int(l) == Some(0) => return right,
        (_, BitwiseOperator::Shl, r) if as_int(r) == Some(0) => return left,
        (_, BitwiseOperator::Shr, r) if as_int(r) == Some(0) => return left,
        _ => {}
    }

    Expression::BitwiseOp {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        location,
    }
}

fn fold_comparison(
    left: Expression,
    operator: ComparisonOperator,
    right: Expression,
    location: crate::ast::token::SourceLocation,
) -> Expression {
    if let (Some(a), Some(b)) = (as_int(&left), as_int(&right)) {
        let result = match operator {
            ComparisonOperator::Equal => a == b,
            ComparisonOperator::NotEqual => a != b,
            ComparisonOperator::Less => a < b,
            ComparisonOperator::Greater => a > b,
            ComparisonOperator::LessEqual => a <= b,
            ComparisonOperator::GreaterEqual => a >= b,
        };
        return Expression::Boolean(result, location);
    }

    Expression::Comparison {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        location,
    }
}

fn fold_logical(
    left: Expression,
    operator: LogicalOperator,
    right: Expression,
    location: crate::ast::token::SourceLocation,
) -> Expression {
    // Only elide an operand when it cannot hide a call's side effect.
    let right_is_call = right.contains_call();

    match operator {
        LogicalOperator::And => {
            if as_bool(&left) == Some(false) {
                return Expression::Boolean(false, location);
            }
            if as_bool(&left) == Some(true) {
                return right;
            }
            if !right_is_call && as_bool(&right) == Some(true) {
                return left;
            }
            if !right_is_call && as_bool(&right) == Some(false) && !left.contains_call() {
                return Expression::Boolean(false, location);
            }
        }
        LogicalOperator::Or => {
            if as_bool(&left) == Some(true) {
                return Expression::Boolean(true, location);
            }
            if as_bool(&left) == Some(false) {
                return right;
            }
            if !right_is_call && as_bool(&right) == Some(false) {
                return left;
            }
            if !right_is_call && as_bool(&right) == Some(true) && !left.contains_call() {
                return Expression::Boolean(true, location);
            }
        }
    }

    Expression::LogicalOp {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        location,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::token::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    fn int(n: i64) -> Expression {
        Expression::Integer(n, loc())
    }

    #[test]
    fn folds_nested_arithmetic() {
        // 2*3+4*5 -> 26
        let expr = Expression::BinaryOp {
            left: Box::new(Expression::BinaryOp {
                left: Box::new(int(2)),
                operator: BinaryOperator::Multiply,
                right: Box::new(int(3)),
                location: loc(),
            }),
            operator: BinaryOperator::Add,
            right: Box::new(Expression::BinaryOp {
                left: Box::new(int(4)),
                operator: BinaryOperator::Multiply,
                right: Box::new(int(5)),
                location: loc(),
            }),
            location: loc(),
        };
        let result = optimize_expression(expr);
        assert!(matches!(result, Expression::Integer(26, _)));
    }

    #[test]
    fn does_not_fold_division_by_zero() {
        let expr = Expression::BinaryOp {
            left: Box::new(int(5)),
            operator: BinaryOperator::Divide,
            right: Box::new(int(0)),
            location: loc(),
        };
        let result = optimize_expression(expr);
        assert!(matches!(result, Expression::BinaryOp { .. }));
    }

    #[test]
    fn strength_reduces_multiply_by_power_of_two() {
        let ident = Expression::Identifier("x".to_string(), loc());
        let expr = Expression::BinaryOp {
            left: Box::new(ident),
            operator: BinaryOperator::Multiply,
            right: Box::new(int(8)),
            location: loc(),
        };
        let result = optimize_expression(expr);
        match result {
            Expression::BitwiseOp {
                operator: BitwiseOperator::Shl,
                right,
                ..
            } => assert!(matches!(*right, Expression::Integer(3, _))),
            other => panic!("expected shift, got {:?}", other),
        }
    }

    #[test]
    fn removes_additive_identity() {
        let ident = Expression::Identifier("x".to_string(), loc());
        let expr = Expression::BinaryOp {
            left: Box::new(ident.clone()),
            operator: BinaryOperator::Add,
            right: Box::new(int(0)),
            location: loc(),
        };
        let result = optimize_expression(expr);
        assert!(matches!(result, Expression::Identifier(name, _) if name == "x"));
    }

    #[test]
    fn does_not_drop_a_call_behind_a_multiply_by_zero() {
        let call = Expression::FunctionCall {
            name: "sideEffect".to_string(),
            args: vec![],
            location: loc(),
        };
        let expr = Expression::BinaryOp {
            left: Box::new(call),
            operator: BinaryOperator::Multiply,
            right: Box::new(int(0)),
            location: loc(),
        };
        let result = optimize_expression(expr);
        assert!(matches!(result, Expression::BinaryOp { .. }), "the call must survive: {:?}", result);
    }

    #[test]
    fn does_not_drop_a_call_behind_an_and_zero() {
        let call = Expression::FunctionCall {
            name: "sideEffect".to_string(),
            args: vec![],
            location: loc(),
        };
        let expr = Expression::BitwiseOp {
            left: Box::new(int(0)),
            operator: BitwiseOperator::And,
            right: Box::new(call),
            location: loc(),
        };
        let result = optimize_expression(expr);
        assert!(matches!(result, Expression::BitwiseOp { .. }), "the call must survive: {:?}", result);
    }

    #[test]
    fn optimizer_is_idempotent() {
        let ident = Expression::Identifier("x".to_string(), loc());
        let expr = Expression::BinaryOp {
            left: Box::new(Expression::BinaryOp {
                left: Box::new(ident),
                operator: BinaryOperator::Multiply,
                right: Box::new(int(4)),
                location: loc(),
            }),
            operator: BinaryOperator::Add,
            right: Box::new(int(0)),
            location: loc(),
        };
        let once = optimize_expression(expr.clone());
        let twice = optimize_expression(once.clone());
        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn does_not_fold_past_a_call_in_short_circuit() {
        let call = Expression::FunctionCall {
            name: "has_side_effect".to_string(),
            args: vec![],
            location: loc(),
        };
        let expr = Expression::LogicalOp {
            left: Box::new(Expression::Boolean(true, loc())),
            operator: LogicalOperator::And,
            right: Box::new(call),
            location: loc(),
        };
        let result = optimize_expression(expr);
        // `true && call()` still reduces to `call()` itself (not elided,
        // just simplified) -- the call must survive in the output tree.
        assert!(result.contains_call());
    }
}
