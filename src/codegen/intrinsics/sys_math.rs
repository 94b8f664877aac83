//! # Integer Math Intrinsics (`math`)
//!
//! Registered under the module name `"math"` (spec.md §4.5.5). File is named
//! `sys_math` to avoid shadowing the `std::f64`-style builtin namespace.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

pub fn module() -> ModuleDescriptor {
    make_module(
        "math",
        vec![
            intrinsic("abs", "math", 1, abs),
            intrinsic("min", "math", 2, min),
            intrinsic("max", "math", 2, max),
            intrinsic("sqrt", "math", 1, sqrt),
            intrinsic("pow", "math", 2, pow),
            intrinsic("floor", "math", 1, identity),
            intrinsic("ceil", "math", 1, identity),
            intrinsic("round", "math", 1, identity),
            intrinsic("gcd", "math", 2, gcd),
            intrinsic("lcm", "math", 2, lcm),
        ],
    )
}

fn evaluate_pair(gen: &mut Generator, args: &[Expression]) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax");
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %rcx");
    gen.emit("    popq %rax");
    Ok(())
}

/// Branchless `(x xor (x>>63)) - (x>>63)`.
fn abs(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movq %rax, %rdx");
    gen.emit("    sarq $63, %rdx");
    gen.emit("    xorq %rdx, %rax");
    gen.emit("    subq %rdx, %rax");
    Ok(())
}

fn min(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    evaluate_pair(gen, args)?;
    gen.emit("    cmpq %rcx, %rax");
    gen.emit("    cmovgq %rcx, %rax");
    Ok(())
}

fn max(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    evaluate_pair(gen, args)?;
    gen.emit("    cmpq %rcx, %rax");
    gen.emit("    cmovlq %rcx, %rax");
    Ok(())
}

/// `x < 0` returns `-1`; otherwise round-trips through SSE2.
fn sqrt(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    let negative_label = gen.fresh_label(".Lsqrt_neg");
    let end_label = gen.fresh_label(".Lsqrt_end");
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!("    jl {}", negative_label));
    gen.emit("    cvtsi2sdq %rax, %xmm0");
    gen.emit("    sqrtsd %xmm0, %xmm0");
    gen.emit("    cvttsd2siq %xmm0, %rax");
    gen.emit(format!("    jmp {}", end_label));
    gen.emit_label(&negative_label);
    gen.emit("    movq $-1, %rax");
    gen.emit_label(&end_label);
    Ok(())
}

/// Iterative square-and-multiply. A negative exponent returns 0.
fn pow(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    evaluate_pair(gen, args)?;
    // %rax = base, %rcx = exponent.
    gen.emit("    movq %rax, %rbx");
    gen.emit("    movq %rcx, %r12");
    gen.emit("    movq $1, %rax");
    let neg_label = gen.fresh_label(".Lpow_neg");
    let loop_label = gen.fresh_label(".Lpow_loop");
    let skip_label = gen.fresh_label(".Lpow_skip");
    let end_label = gen.fresh_label(".Lpow_end");
    gen.emit("    cmpq $0, %r12");
    gen.emit(format!("    jl {}", neg_label));
    gen.emit_label(&loop_label);
    gen.emit("    cmpq $0, %r12");
    gen.emit(format!("    jle {}", end_label));
    gen.emit("    testq $1, %r12");
    gen.emit(format!("    jz {}", skip_label));
    gen.emit("    imulq %rbx, %rax");
    gen.emit_label(&skip_label);
    gen.emit("    imulq %rbx, %rbx");
    gen.emit("    sarq $1, %r12");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&neg_label);
    gen.emit("    xorq %rax, %rax");
    gen.emit_label(&end_label);
    Ok(())
}

fn identity(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])
}

/// Euclidean algorithm over `%rbx`=a, `%r12`=b; leaves the result in `%rax`.
fn gcd_raw(gen: &mut Generator) {
    let loop_label = gen.fresh_label(".Lgcd_loop");
    let end_label = gen.fresh_label(".Lgcd_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq $0, %r12");
    gen.emit(format!("    je {}", end_label));
    gen.emit("    movq %rbx, %rax");
    gen.emit("    cqto");
    gen.emit("    idivq %r12");
    gen.emit("    movq %r12, %rbx");
    gen.emit("    movq %rdx, %r12");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    gen.emit("    movq %rbx, %rax");
}

fn gcd(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    evaluate_pair(gen, args)?;
    gen.emit("    movq %rax, %rbx");
    gen.emit("    movq %rcx, %r12");
    gcd_raw(gen);
    Ok(())
}

/// `lcm(a,b) = (a / gcd(a,b)) * b`.
fn lcm(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    evaluate_pair(gen, args)?;
    gen.emit("    movq %rax, %rbx"); // a
    gen.emit("    movq %rcx, %r12"); // b
    gen.emit("    pushq %rbx");
    gen.emit("    pushq %r12");
    gcd_raw(gen);
    gen.emit("    movq %rax, %r13"); // gcd(a,b)
    gen.emit("    popq %r12"); // b
    gen.emit("    popq %rbx"); // a
    gen.emit("    movq %rbx, %rax");
    gen.emit("    cqto");
    gen.emit("    idivq %r13");
    gen.emit("    imulq %r12, %rax");
    Ok(())
}
