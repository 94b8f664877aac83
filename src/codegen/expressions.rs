//! # Expression Code Generation
//!
//! Evaluates an [`Expression`] into `%rax` (spec.md §4.5.2). Nested
//! sub-evaluations that would otherwise clobber an already-computed operand
//! are guarded with a `pushq`/`popq` pair around the second evaluation.

use crate::ast::nodes::{
    BinaryOperator, BitwiseOperator, ComparisonOperator, Expression, LogicalOperator,
    UnaryOperator,
};
use crate::codegen::dispatch;
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

pub fn generate_expression(gen: &mut Generator, expr: &Expression) -> Result<(), CompileError> {
    match expr {
        Expression::Integer(n, _) => {
            gen.emit(format!("    movq ${}, %rax", n));
            Ok(())
        }
        Expression::Float(n, _) => {
            gen.emit(format!("    movq ${}, %rax", n));
            Ok(())
        }
        Expression::Str(s, _) => {
            let label = gen.intern_string(s);
            gen.emit(format!("    leaq {}(%rip), %rax", label));
            Ok(())
        }
        Expression::Char(c, _) => {
            gen.emit(format!("    movq ${}, %rax", *c as u32));
            Ok(())
        }
        Expression::Boolean(b, _) => {
            gen.emit(format!("    movq ${}, %rax", if *b { 1 } else { 0 }));
            Ok(())
        }
        Expression::Null(_) => {
            gen.emit("    xorq %rax, %rax");
            Ok(())
        }
        Expression::Identifier(name, _) => {
            if let Some(slot) = gen.lookup_variable(name) {
                gen.emit(format!("    movq -{}(%rbp), %rax", slot.offset));
            } else {
                // Semantic-light: undefined identifier loads zero (spec.md §7).
                log::warn!("reference to undeclared identifier `{}`", name);
                gen.emit("    xorq %rax, %rax");
            }
            Ok(())
        }
        Expression::FunctionCall { name, args, location } => {
            dispatch::generate_call(gen, name, args, *location)
        }
        Expression::BinaryOp {
            left,
            operator,
            right,
            ..
        } => generate_binary(gen, left, *operator, right),
        Expression::UnaryOp {
            operator, operand, ..
        } => generate_unary(gen, *operator, operand),
        Expression::BitwiseOp {
            left,
            operator,
            right,
            ..
        } => generate_bitwise(gen, left, *operator, right),
        Expression::Comparison {
            left,
            operator,
            right,
            ..
        } => generate_comparison(gen, left, *operator, right),
        Expression::LogicalOp {
            left,
            operator,
            right,
            ..
        } => generate_logical(gen, left, *operator, right),
        Expression::ArrayAccess { array, index, .. } => generate_array_access(gen, array, index),
    }
}

/// Evaluates `left` then `right`, leaving `left` in `%rax` and `right` in
/// `%rcx` on return.
fn evaluate_pair(
    gen: &mut Generator,
    left: &Expression,
    right: &Expression,
) -> Result<(), CompileError> {
    generate_expression(gen, left)?;
    gen.emit("    pushq %rax");
    generate_expression(gen, right)?;
    gen.emit("    movq %rax, %rcx");
    gen.emit("    popq %rax");
    Ok(())
}

fn generate_binary(
    gen: &mut Generator,
    left: &Expression,
    operator: BinaryOperator,
    right: &Expression,
) -> Result<(), CompileError> {
    evaluate_pair(gen, left, right)?;
    match operator {
        BinaryOperator::Add => gen.emit("    addq %rcx, %rax"),
        BinaryOperator::Subtract => gen.emit("    subq %rcx, %rax"),
        BinaryOperator::Multiply => gen.emit("    imulq %rcx, %rax"),
        BinaryOperator::Divide => {
            gen.emit("    cqto");
            gen.emit("    idivq %rcx");
        }
        BinaryOperator::Modulo => {
            gen.emit("    cqto");
            gen.emit("    idivq %rcx");
            gen.emit("    movq %rdx, %rax");
        }
    }
    Ok(())
}

fn generate_unary(
    gen: &mut Generator,
    operator: UnaryOperator,
    operand: &Expression,
) -> Result<(), CompileError> {
    generate_expression(gen, operand)?;
    match operator {
        UnaryOperator::Negate => gen.emit("    negq %rax"),
        UnaryOperator::BitwiseNot => gen.emit("    notq %rax"),
        UnaryOperator::LogicalNot => {
            gen.emit("    cmpq $0, %rax");
            gen.emit("    sete %al");
            gen.emit("    movzbq %al, %rax");
        }
    }
    Ok(())
}

fn generate_bitwise(
    gen: &mut Generator,
    left: &Expression,
    operator: BitwiseOperator,
    right: &Expression,
) -> Result<(), CompileError> {
    evaluate_pair(gen, left, right)?;
    match operator {
        BitwiseOperator::And => gen.emit("    andq %rcx, %rax"),
        BitwiseOperator::Or => gen.emit("    orq %rcx, %rax"),
        BitwiseOperator::Xor => gen.emit("    xorq %rcx, %rax"),
        BitwiseOperator::Shl => {
            gen.emit("    movq %rcx, %rcx");
            gen.emit("    shlq %cl, %rax");
        }
        BitwiseOperator::Shr => {
            gen.emit("    shrq %cl, %rax");
        }
    }
    Ok(())
}

fn generate_comparison(
    gen: &mut Generator,
    left: &Expression,
    operator: ComparisonOperator,
    right: &Expression,
) -> Result<(), CompileError> {
    evaluate_pair(gen, left, right)?;
    gen.emit("    cmpq %rcx, %rax");
    let set_op = match operator {
        ComparisonOperator::Equal => "sete",
        ComparisonOperator::NotEqual => "setne",
        ComparisonOperator::Less => "setl",
        ComparisonOperator::Greater => "setg",
        ComparisonOperator::LessEqual => "setle",
        ComparisonOperator::GreaterEqual => "setge",
    };
    gen.emit(format!("    {} %al", set_op));
    gen.emit("    movzbq %al, %rax");
    Ok(())
}

fn generate_logical(
    gen: &mut Generator,
    left: &Expression,
    operator: LogicalOperator,
    right: &Expression,
) -> Result<(), CompileError> {
    generate_expression(gen, left)?;
    gen.emit("    cmpq $0, %rax");

    let short_circuit_label = gen.fresh_label(".Lshort");
    let end_label = gen.fresh_label(".Lend");

    match operator {
        LogicalOperator::And => gen.emit(format!("    je {}", short_circuit_label)),
        LogicalOperator::Or => gen.emit(format!("    jne {}", short_circuit_label)),
    }

    generate_expression(gen, right)?;
    gen.emit("    cmpq $0, %rax");
    gen.emit("    setne %al");
    gen.emit("    movzbq %al, %rax");
    gen.emit(format!("    jmp {}", end_label));

    gen.emit_label(&short_circuit_label);
    let short_circuit_value = match operator {
        LogicalOperator::And => 0,
        LogicalOperator::Or => 1,
    };
    gen.emit(format!("    movq ${}, %rax", short_circuit_value));

    gen.emit_label(&end_label);
    Ok(())
}

fn generate_array_access(
    gen: &mut Generator,
    array: &Expression,
    index: &Expression,
) -> Result<(), CompileError> {
    evaluate_pair(gen, array, index)?;
    // %rax = base pointer, %rcx = index; elements are 8-byte ints.
    gen.emit("    movq (%rax,%rcx,8), %rax");
    Ok(())
}
