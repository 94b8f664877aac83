//! # Memory Intrinsics (`mem`)
//!
//! `malloc`/`mmap` wrap the `mmap` syscall directly (spec.md §4.5.5): no
//! allocator, no free list, no runtime. `free` is a no-op — callers are
//! expected to `munmap`.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const SYS_MMAP: i64 = 9;
const SYS_MUNMAP: i64 = 11;
const PROT_READ_WRITE: i64 = 0x3;
const MAP_PRIVATE_ANON: i64 = 0x22;

pub fn module() -> ModuleDescriptor {
    make_module(
        "mem",
        vec![
            intrinsic("malloc", "mem", 1, malloc),
            intrinsic("mmap", "mem", 1, malloc),
            intrinsic("munmap", "mem", 2, munmap),
            intrinsic("free", "mem", 1, free),
            intrinsic("sizeof", "mem", 1, sizeof),
            intrinsic("memcpy", "mem", 3, memcpy),
            intrinsic("memset", "mem", 3, memset),
        ],
    )
}

/// `mmap(PROT_READ|PROT_WRITE, MAP_PRIVATE|MAP_ANONYMOUS, fd=-1, offset=0)`.
/// A negative return is rewritten to `0` (spec.md §7).
fn malloc(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    emit_alloc(gen);
    Ok(())
}

/// Assumes the requested byte length is already in `%rax`; performs the
/// `mmap` syscall and leaves the resulting pointer (or `0` on failure) in
/// `%rax`. Shared by every intrinsic module that allocates a fresh buffer
/// (strings, collections, the HTTP pool).
///
/// `syscall` clobbers `%rcx` and `%r11` (it stashes the return address and
/// flags there); callers routinely keep loop state in those registers
/// across an allocation, so this saves and restores both around the call.
pub(crate) fn emit_alloc(gen: &mut Generator) {
    gen.emit("    pushq %rcx");
    gen.emit("    pushq %r11");
    gen.emit("    movq %rax, %rsi"); // length
    gen.emit("    xorq %rdi, %rdi"); // addr = NULL
    gen.emit(format!("    movq ${}, %rdx", PROT_READ_WRITE));
    gen.emit(format!("    movq ${}, %r10", MAP_PRIVATE_ANON));
    gen.emit("    movq $-1, %r8"); // fd
    gen.emit("    xorq %r9, %r9"); // offset
    gen.emit(format!("    movq ${}, %rax", SYS_MMAP));
    gen.emit("    syscall");
    let ok_label = gen.fresh_label(".Lmmap_ok");
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!("    jge {}", ok_label));
    gen.emit("    xorq %rax, %rax");
    gen.emit_label(&ok_label);
    gen.emit("    popq %r11");
    gen.emit("    popq %rcx");
}

fn munmap(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax");
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %rsi");
    gen.emit("    popq %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_MUNMAP));
    gen.emit("    syscall");
    Ok(())
}

fn free(gen: &mut Generator, _args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    gen.emit("    xorq %rax, %rax");
    Ok(())
}

/// Constant-folded at generate time: the declared byte size of the
/// argument's static type, or 8 if the type cannot be determined (every
/// Anvil value narrower than a pointer still occupies a full slot).
fn sizeof(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    let size = match &args[0] {
        Expression::Identifier(name, _) => gen
            .lookup_variable(name)
            .map(|slot| slot.ty.byte_size())
            .unwrap_or(8),
        _ => 8,
    };
    gen.emit(format!("    movq ${}, %rax", size));
    Ok(())
}

/// Straight byte loop: `memcpy(dst, src, n)`.
fn memcpy(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // dst
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // src
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rcx"); // n
    gen.emit("    popq %rsi"); // src
    gen.emit("    popq %rdi"); // dst
    gen.emit("    movq %rdi, %rax"); // return dst
    let loop_label = gen.fresh_label(".Lmemcpy_loop");
    let end_label = gen.fresh_label(".Lmemcpy_end");
    gen.emit("    pushq %rax");
    gen.emit_label(&loop_label);
    gen.emit("    testq %rcx, %rcx");
    gen.emit(format!("    jz {}", end_label));
    gen.emit("    movb (%rsi), %dl");
    gen.emit("    movb %dl, (%rdi)");
    gen.emit("    incq %rsi");
    gen.emit("    incq %rdi");
    gen.emit("    decq %rcx");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    gen.emit("    popq %rax");
    Ok(())
}

/// `memset(ptr, value, n)`.
fn memset(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // ptr
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %rdx"); // value
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rcx"); // n
    gen.emit("    popq %rdi"); // ptr
    gen.emit("    movq %rdi, %rax"); // return ptr
    let loop_label = gen.fresh_label(".Lmemset_loop");
    let end_label = gen.fresh_label(".Lmemset_end");
    gen.emit("    pushq %rax");
    gen.emit_label(&loop_label);
    gen.emit("    testq %rcx, %rcx");
    gen.emit(format!("    jz {}", end_label));
    gen.emit("    movb %dl, (%rdi)");
    gen.emit("    incq %rdi");
    gen.emit("    decq %rcx");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    gen.emit("    popq %rax");
    Ok(())
}
