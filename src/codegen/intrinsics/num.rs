//! # Numeric Cast Intrinsics (`num`)
//!
//! Sign/zero-extension and the `toBool` predicate (spec.md §4.5.5).

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

pub fn module() -> ModuleDescriptor {
    make_module(
        "num",
        vec![
            intrinsic("toInt8", "num", 1, sign_extend_8),
            intrinsic("toInt16", "num", 1, sign_extend_16),
            intrinsic("toInt32", "num", 1, sign_extend_32),
            intrinsic("toUint8", "num", 1, zero_extend_8),
            intrinsic("toUint16", "num", 1, zero_extend_16),
            intrinsic("toUint32", "num", 1, zero_extend_32),
            intrinsic("toBool", "num", 1, to_bool),
        ],
    )
}

fn sign_extend_8(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movsbq %al, %rax");
    Ok(())
}

fn sign_extend_16(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movswq %ax, %rax");
    Ok(())
}

fn sign_extend_32(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movslq %eax, %rax");
    Ok(())
}

fn zero_extend_8(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    andq $0xFF, %rax");
    Ok(())
}

fn zero_extend_16(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    andq $0xFFFF, %rax");
    Ok(())
}

fn zero_extend_32(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movl %eax, %eax");
    Ok(())
}

fn to_bool(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    cmpq $0, %rax");
    gen.emit("    setne %al");
    gen.emit("    movzbq %al, %rax");
    Ok(())
}
