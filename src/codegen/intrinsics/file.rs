//! # File Intrinsics (`file`)
//!
//! Direct wrappers around the `open`/`close`/`read`/`write`/`lseek`/`stat`
//! syscalls (spec.md §4.5.5). `exists` layers `stat` onto a 144-byte stack
//! buffer and collapses the result to 0/1.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const SYS_READ: i64 = 0;
const SYS_WRITE: i64 = 1;
const SYS_OPEN: i64 = 2;
const SYS_CLOSE: i64 = 3;
const SYS_STAT: i64 = 4;
const SYS_LSEEK: i64 = 8;

/// Size of `struct stat` on x86-64 Linux.
const STAT_BUF_SIZE: i64 = 144;

pub fn module() -> ModuleDescriptor {
    make_module(
        "file",
        vec![
            intrinsic("open", "file", 3, open),
            intrinsic("close", "file", 1, close),
            intrinsic("read", "file", 3, read),
            intrinsic("write", "file", 3, write),
            intrinsic("lseek", "file", 3, lseek),
            intrinsic("stat", "file", 2, stat),
            intrinsic("exists", "file", 1, exists),
        ],
    )
}

/// A negative syscall return is rewritten to `-1` (spec.md §7): the kernel's
/// actual negative errno is collapsed to the single failure sentinel rather
/// than surfaced to Anvil code.
fn emit_clamp_negative_to_minus_one(gen: &mut Generator) {
    let ok_label = gen.fresh_label(".Lfile_ok");
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!("    jge {}", ok_label));
    gen.emit("    movq $-1, %rax");
    gen.emit_label(&ok_label);
}

/// `open(path, flags, mode)`.
fn open(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // path
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // flags
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rdx"); // mode
    gen.emit("    popq %rsi"); // flags
    gen.emit("    popq %rdi"); // path
    gen.emit(format!("    movq ${}, %rax", SYS_OPEN));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// `close(fd)`.
fn close(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movq %rax, %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_CLOSE));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// `read(fd, buf, count)`.
fn read(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rdx"); // count
    gen.emit("    popq %rsi"); // buf
    gen.emit("    popq %rdi"); // fd
    gen.emit(format!("    movq ${}, %rax", SYS_READ));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// `write(fd, buf, count)`.
fn write(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rdx"); // count
    gen.emit("    popq %rsi"); // buf
    gen.emit("    popq %rdi"); // fd
    gen.emit(format!("    movq ${}, %rax", SYS_WRITE));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// `lseek(fd, offset, whence)`.
fn lseek(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // offset
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rdx"); // whence
    gen.emit("    popq %rsi"); // offset
    gen.emit("    popq %rdi"); // fd
    gen.emit(format!("    movq ${}, %rax", SYS_LSEEK));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// `stat(path, buf)`: caller supplies the 144-byte output buffer.
fn stat(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // path
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %rsi"); // buf
    gen.emit("    popq %rdi"); // path
    gen.emit(format!("    movq ${}, %rax", SYS_STAT));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// `exists(path)`: `stat` onto a scratch 144-byte stack buffer, collapsed to
/// 0/1. The buffer's contents are discarded — only the syscall's success is
/// observed.
fn exists(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    gen.emit(format!("    subq ${}, %rsp", STAT_BUF_SIZE));
    generate_expression(gen, &args[0])?;
    gen.emit("    movq %rax, %rdi"); // path
    gen.emit("    movq %rsp, %rsi"); // scratch stat buf
    gen.emit(format!("    movq ${}, %rax", SYS_STAT));
    gen.emit("    syscall");
    let found_label = gen.fresh_label(".Lexists_found");
    let done_label = gen.fresh_label(".Lexists_done");
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!("    jge {}", found_label));
    gen.emit("    xorq %rax, %rax");
    gen.emit(format!("    jmp {}", done_label));
    gen.emit_label(&found_label);
    gen.emit("    movq $1, %rax");
    gen.emit_label(&done_label);
    gen.emit(format!("    addq ${}, %rsp", STAT_BUF_SIZE));
    Ok(())
}
