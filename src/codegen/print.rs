//! # Print-Formatting Collaborator (`io`)
//!
//! The narrow interface spec.md §1 carves out of the core: a small family of
//! `write(2)`-backed intrinsics, one per primitive type, registered under the
//! module name `"io"`. Each one evaluates its single argument, formats it
//! into a scratch buffer if needed, and writes it to stdout (fd 1). The
//! `println*` half of the family is the `print*` half plus a trailing `\n`.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const SYS_WRITE: i64 = 1;
const STDOUT_FD: i64 = 1;

pub fn module() -> ModuleDescriptor {
    make_module(
        "io",
        vec![
            intrinsic("print", "io", 1, print),
            intrinsic("println", "io", 1, println),
            intrinsic("printInt", "io", 1, print_int),
            intrinsic("printlnInt", "io", 1, println_int),
            intrinsic("printBool", "io", 1, print_bool),
            intrinsic("printlnBool", "io", 1, println_bool),
            intrinsic("printChar", "io", 1, print_char),
            intrinsic("printlnChar", "io", 1, println_char),
        ],
    )
}

/// Known-length fast path for a literal/string-valued identifier; otherwise
/// walks the buffer counting up to the NUL terminator. Leaves the length in
/// `%rax` and the pointer in `%r11`.
fn emit_strlen(gen: &mut Generator, arg: &Expression) -> Result<(), CompileError> {
    if let Expression::Identifier(name, _) = arg {
        if let Some(len) = gen.known_string_length(name) {
            generate_expression(gen, arg)?;
            gen.emit("    movq %rax, %r11");
            gen.emit(format!("    movq ${}, %rax", len));
            return Ok(());
        }
    }

    generate_expression(gen, arg)?;
    gen.emit("    movq %rax, %r11"); // ptr
    gen.emit("    movq %rax, %rdi"); // cursor
    gen.emit("    xorq %rax, %rax"); // length accumulator
    let loop_label = gen.fresh_label(".Lioprint_strlen_loop");
    let end_label = gen.fresh_label(".Lioprint_strlen_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpb $0, (%rdi)");
    gen.emit(format!("    je {}", end_label));
    gen.emit("    incq %rdi");
    gen.emit("    incq %rax");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    Ok(())
}

/// `write(STDOUT_FD, ptr, len)` with `ptr` in `%rsi` and `len` in `%rdx`.
fn emit_write(gen: &mut Generator) {
    gen.emit(format!("    movq ${}, %rdi", STDOUT_FD));
    gen.emit(format!("    movq ${}, %rax", SYS_WRITE));
    gen.emit("    syscall");
}

fn emit_newline(gen: &mut Generator) {
    let label = gen.intern_string("\n");
    gen.emit(format!("    leaq {}(%rip), %rsi", label));
    gen.emit("    movq $1, %rdx");
    emit_write(gen);
}

fn emit_print_str(gen: &mut Generator, arg: &Expression) -> Result<(), CompileError> {
    emit_strlen(gen, arg)?;
    gen.emit("    movq %r11, %rsi");
    gen.emit("    movq %rax, %rdx");
    emit_write(gen);
    Ok(())
}

/// `print(s)`.
fn print(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_print_str(gen, &args[0])
}

/// `println(s)`.
fn println(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_print_str(gen, &args[0])?;
    emit_newline(gen);
    Ok(())
}

/// Formats a signed 64-bit integer into a 24-byte stack scratch buffer
/// (enough for a sign byte plus 20 digits) and writes it. Built back to
/// front: repeated `idivq` by 10 peels off the least-significant digit
/// first, so the cursor walks from the end of the buffer toward the start.
fn emit_print_int(gen: &mut Generator, arg: &Expression) -> Result<(), CompileError> {
    generate_expression(gen, arg)?;
    gen.emit("    subq $24, %rsp");
    gen.emit("    movq %rax, %r10"); // remaining value
    gen.emit("    xorq %rbx, %rbx"); // sign flag
    gen.emit("    leaq 24(%rsp), %r9"); // one-past-end cursor
    gen.emit("    xorq %r11, %r11"); // digit count

    let positive_label = gen.fresh_label(".Lprintint_positive");
    gen.emit("    testq %r10, %r10");
    gen.emit(format!("    jns {}", positive_label));
    gen.emit("    movq $1, %rbx");
    gen.emit("    negq %r10");
    gen.emit_label(&positive_label);

    let nonzero_label = gen.fresh_label(".Lprintint_nonzero");
    let digits_done_label = gen.fresh_label(".Lprintint_digits_done");
    gen.emit("    testq %r10, %r10");
    gen.emit(format!("    jnz {}", nonzero_label));
    gen.emit("    decq %r9");
    gen.emit("    movb $'0', (%r9)");
    gen.emit("    incq %r11");
    gen.emit(format!("    jmp {}", digits_done_label));
    gen.emit_label(&nonzero_label);

    let loop_label = gen.fresh_label(".Lprintint_loop");
    gen.emit_label(&loop_label);
    gen.emit("    testq %r10, %r10");
    gen.emit(format!("    jz {}", digits_done_label));
    gen.emit("    movq %r10, %rax");
    gen.emit("    xorq %rdx, %rdx");
    gen.emit("    movq $10, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    addb $'0', %dl");
    gen.emit("    decq %r9");
    gen.emit("    movb %dl, (%r9)");
    gen.emit("    incq %r11");
    gen.emit("    movq %rax, %r10");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&digits_done_label);

    let no_sign_label = gen.fresh_label(".Lprintint_no_sign");
    gen.emit("    testq %rbx, %rbx");
    gen.emit(format!("    jz {}", no_sign_label));
    gen.emit("    decq %r9");
    gen.emit("    movb $'-', (%r9)");
    gen.emit("    incq %r11");
    gen.emit_label(&no_sign_label);

    gen.emit("    movq %r9, %rsi");
    gen.emit("    movq %r11, %rdx");
    emit_write(gen);
    gen.emit("    addq $24, %rsp");
    Ok(())
}

/// `printInt(n)`.
fn print_int(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_print_int(gen, &args[0])
}

/// `printlnInt(n)`.
fn println_int(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_print_int(gen, &args[0])?;
    emit_newline(gen);
    Ok(())
}

fn emit_print_bool(gen: &mut Generator, arg: &Expression) -> Result<(), CompileError> {
    generate_expression(gen, arg)?;
    let true_label = gen.intern_string("true");
    let false_label = gen.intern_string("false");
    let is_true_label = gen.fresh_label(".Lprintbool_true");
    let done_label = gen.fresh_label(".Lprintbool_done");
    gen.emit("    testq %rax, %rax");
    gen.emit(format!("    jnz {}", is_true_label));
    gen.emit(format!("    leaq {}(%rip), %rsi", false_label));
    gen.emit("    movq $5, %rdx");
    gen.emit(format!("    jmp {}", done_label));
    gen.emit_label(&is_true_label);
    gen.emit(format!("    leaq {}(%rip), %rsi", true_label));
    gen.emit("    movq $4, %rdx");
    gen.emit_label(&done_label);
    emit_write(gen);
    Ok(())
}

/// `printBool(b)`.
fn print_bool(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_print_bool(gen, &args[0])
}

/// `printlnBool(b)`.
fn println_bool(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_print_bool(gen, &args[0])?;
    emit_newline(gen);
    Ok(())
}

fn emit_print_char(gen: &mut Generator, arg: &Expression) -> Result<(), CompileError> {
    generate_expression(gen, arg)?;
    gen.emit("    subq $8, %rsp");
    gen.emit("    movb %al, (%rsp)");
    gen.emit("    movq %rsp, %rsi");
    gen.emit("    movq $1, %rdx");
    emit_write(gen);
    gen.emit("    addq $8, %rsp");
    Ok(())
}

/// `printChar(c)`.
fn print_char(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_print_char(gen, &args[0])
}

/// `printlnChar(c)`.
fn println_char(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_print_char(gen, &args[0])?;
    emit_newline(gen);
    Ok(())
}
