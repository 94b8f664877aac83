//! # String Intrinsics (`str`)
//!
//! Strings are immutable by convention (spec.md §4.5.5): every mutating
//! operation allocates a fresh NUL-terminated buffer via `mem::mmap` rather
//! than writing through the argument. Registered under the module name
//! `"str"`; the file is named `str_ops` to avoid colliding with the `str`
//! primitive type.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::intrinsics::mem::emit_alloc;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

pub fn module() -> ModuleDescriptor {
    make_module(
        "str",
        vec![
            intrinsic("len", "str", 1, len),
            intrinsic("concat", "str", 2, concat),
            intrinsic("copy", "str", 1, copy),
            intrinsic("substring", "str", 3, substring),
            intrinsic("split", "str", 2, split),
            intrinsic("join", "str", 2, join),
            intrinsic("replace", "str", 3, replace),
            intrinsic("toLower", "str", 1, to_lower),
            intrinsic("toUpper", "str", 1, to_upper),
            intrinsic("trim", "str", 1, trim),
            intrinsic("indexOf", "str", 2, index_of),
            intrinsic("contains", "str", 2, contains),
            intrinsic("startsWith", "str", 2, starts_with),
            intrinsic("endsWith", "str", 2, ends_with),
            intrinsic("compare", "str", 2, compare),
        ],
    )
}

/// Known-length fast path for a literal/string-valued identifier; otherwise
/// walks the buffer counting up to the NUL terminator. Leaves the length in
/// `%rax` and (if `keep_ptr`) the original pointer in `%r11`.
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
    let loop_label = gen.fresh_label(".Lstrlen_loop");
    let end_label = gen.fresh_label(".Lstrlen_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpb $0, (%rdi)");
    gen.emit(format!("    je {}", end_label));
    gen.emit("    incq %rdi");
    gen.emit("    incq %rax");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    Ok(())
}

fn len(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])
}

fn concat(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    pushq %r11"); // a ptr
    gen.emit("    pushq %rax"); // a len
    emit_strlen(gen, &args[1])?;
    gen.emit("    pushq %r11"); // b ptr
    gen.emit("    pushq %rax"); // b len

    gen.emit("    movq 8(%rsp), %rax"); // a len
    gen.emit("    addq (%rsp), %rax"); // + b len
    gen.emit("    incq %rax"); // + NUL
    emit_alloc(gen);
    gen.emit("    movq %rax, %r13"); // dst, return value

    gen.emit("    popq %rcx"); // b len
    gen.emit("    popq %rsi"); // b ptr
    gen.emit("    popq %r8"); // a len
    gen.emit("    popq %rdi"); // a ptr
    gen.emit("    movq %r13, %r9"); // cursor

    copy_bytes(gen, "%rdi", "%r9", "%r8");
    gen.emit("    addq %r8, %r9");
    copy_bytes(gen, "%rsi", "%r9", "%rcx");
    gen.emit("    addq %rcx, %r9");
    gen.emit("    movb $0, (%r9)");
    gen.emit("    movq %r13, %rax");
    Ok(())
}

/// Copies `count_reg` bytes from `src_reg` to a running cursor `dst_reg`,
/// advancing neither register — callers add the count themselves.
fn copy_bytes(gen: &mut Generator, src_reg: &str, dst_reg: &str, count_reg: &str) {
    gen.emit(format!("    xorq %r14, %r14"));
    let loop_label = gen.fresh_label(".Lcopy_loop");
    let end_label = gen.fresh_label(".Lcopy_end");
    gen.emit_label(&loop_label);
    gen.emit(format!("    cmpq {}, %r14", count_reg));
    gen.emit(format!("    jge {}", end_label));
    gen.emit(format!("    movb ({},%r14), %r15b", src_reg));
    gen.emit(format!("    movb %r15b, ({},%r14)", dst_reg));
    gen.emit("    incq %r14");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
}

fn copy(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    pushq %r11"); // src
    gen.emit("    pushq %rax"); // len
    gen.emit("    movq %rax, %rcx"); // len, kept live across the alloc call
    gen.emit("    incq %rax"); // + NUL
    emit_alloc(gen);
    gen.emit("    movq %rax, %rdi"); // dst
    gen.emit("    popq %rax"); // discard the duplicate len push
    gen.emit("    popq %rsi"); // src
    copy_bytes(gen, "%rsi", "%rdi", "%rcx");
    gen.emit("    movb $0, (%rdi,%rcx)");
    gen.emit("    movq %rdi, %rax");
    Ok(())
}

fn substring(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // src
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // start
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %r8"); // length requested
    gen.emit("    pushq %r8");

    gen.emit("    movq %r8, %rax");
    gen.emit("    incq %rax");
    emit_alloc(gen);
    gen.emit("    movq %rax, %rdi"); // dst

    gen.emit("    popq %rcx"); // length
    gen.emit("    popq %r9"); // start
    gen.emit("    popq %rsi"); // src
    gen.emit("    addq %r9, %rsi"); // src + start

    copy_bytes(gen, "%rsi", "%rdi", "%rcx");
    gen.emit("    movb $0, (%rdi,%rcx)");
    gen.emit("    movq %rdi, %rax");
    Ok(())
}

/// Single-character delimiter split, laid out as `[i64 count][ptr × count]`.
fn split(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    pushq %r11"); // src
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[1])?;
    gen.emit("    movb %al, %r12b"); // delimiter byte
    gen.emit("    popq %r13"); // len
    gen.emit("    popq %rbx"); // src

    // Worst case one part per byte plus the count header.
    gen.emit("    movq %r13, %rax");
    gen.emit("    incq %rax");
    gen.emit("    imulq $8, %rax");
    emit_alloc(gen);
    gen.emit("    movq %rax, %r14"); // out buffer
    gen.emit("    movq $0, %r15"); // running part count

    gen.emit("    leaq 8(%r14), %r9"); // next slot to write
    gen.emit("    movq %rbx, %r10"); // start of current part
    gen.emit("    xorq %rcx, %rcx"); // cursor

    let loop_label = gen.fresh_label(".Lsplit_loop");
    let not_delim_label = gen.fresh_label(".Lsplit_not_delim");
    let end_label = gen.fresh_label(".Lsplit_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %r13, %rcx");
    gen.emit(format!("    jge {}", end_label));
    gen.emit("    movq %rbx, %rax");
    gen.emit("    addq %rcx, %rax");
    gen.emit("    cmpb %r12b, (%rax)");
    gen.emit(format!("    jne {}", not_delim_label));
    gen.emit("    movq %r10, (%r9)");
    gen.emit("    addq $8, %r9");
    gen.emit("    incq %r15");
    gen.emit("    movq %rbx, %r10");
    gen.emit("    addq %rcx, %r10");
    gen.emit("    incq %r10");
    gen.emit_label(&not_delim_label);
    gen.emit("    incq %rcx");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    gen.emit("    movq %r10, (%r9)"); // final trailing part
    gen.emit("    incq %r15");
    gen.emit("    movq %r15, (%r14)");
    gen.emit("    movq %r14, %rax");
    Ok(())
}

/// `join(array, sep)` where `array` is laid out `[i64 count][ptr × count]`.
fn join(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // array
    emit_strlen(gen, &args[1])?;
    gen.emit("    pushq %r11"); // sep ptr
    gen.emit("    pushq %rax"); // sep len

    // Conservative over-allocation: 256 bytes per part plus separators.
    gen.emit("    movq 16(%rsp), %rax"); // array ptr
    gen.emit("    movq (%rax), %rcx"); // count
    gen.emit("    imulq $256, %rcx");
    gen.emit("    movq %rcx, %rax");
    gen.emit("    addq $64, %rax");
    emit_alloc(gen);
    gen.emit("    movq %rax, %r14"); // dst buffer
    gen.emit("    movq %rax, %r9"); // cursor

    gen.emit("    popq %r8"); // sep len
    gen.emit("    popq %rbx"); // sep ptr
    gen.emit("    popq %r10"); // array ptr
    gen.emit("    movq (%r10), %r13"); // count
    gen.emit("    xorq %r12, %r12"); // index

    let loop_label = gen.fresh_label(".Ljoin_loop");
    let skip_sep_label = gen.fresh_label(".Ljoin_skip_sep");
    let end_label = gen.fresh_label(".Ljoin_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %r13, %r12");
    gen.emit(format!("    jge {}", end_label));
    gen.emit("    testq %r12, %r12");
    gen.emit(format!("    jz {}", skip_sep_label));
    copy_bytes(gen, "%rbx", "%r9", "%r8");
    gen.emit("    addq %r8, %r9");
    gen.emit_label(&skip_sep_label);
    gen.emit("    leaq 8(%r10,%r12,8), %rax");
    gen.emit("    movq (%rax), %rsi"); // this part's pointer
    gen.emit("    pushq %r9");
    gen.emit("    movq %rsi, %rax");
    emit_strlen_ptr(gen);
    gen.emit("    popq %r9");
    copy_bytes(gen, "%rsi", "%r9", "%rax");
    gen.emit("    addq %rax, %r9");
    gen.emit("    incq %r12");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    gen.emit("    movb $0, (%r9)");
    gen.emit("    movq %r14, %rax");
    Ok(())
}

/// Like [`emit_strlen`] but assumes the pointer is already in `%rax` and
/// there is no known-length identifier to fast-path through.
fn emit_strlen_ptr(gen: &mut Generator) {
    gen.emit("    movq %rax, %rdi");
    gen.emit("    xorq %rax, %rax");
    let loop_label = gen.fresh_label(".Lstrlen_ptr_loop");
    let end_label = gen.fresh_label(".Lstrlen_ptr_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpb $0, (%rdi)");
    gen.emit(format!("    je {}", end_label));
    gen.emit("    incq %rdi");
    gen.emit("    incq %rax");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
}

fn replace(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    pushq %r11"); // src
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[1])?;
    gen.emit("    movb %al, %r12b"); // old char
    generate_expression(gen, &args[2])?;
    gen.emit("    movb %al, %r13b"); // new char
    gen.emit("    popq %rax"); // len
    gen.emit("    pushq %rax");
    gen.emit("    incq %rax");
    emit_alloc(gen);
    gen.emit("    movq %rax, %rdi"); // dst
    gen.emit("    popq %rcx"); // len
    gen.emit("    popq %rsi"); // src

    gen.emit("    xorq %r14, %r14");
    let loop_label = gen.fresh_label(".Lreplace_loop");
    let no_match_label = gen.fresh_label(".Lreplace_no_match");
    let end_label = gen.fresh_label(".Lreplace_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %rcx, %r14");
    gen.emit(format!("    jge {}", end_label));
    gen.emit("    movb (%rsi,%r14), %r15b");
    gen.emit("    cmpb %r12b, %r15b");
    gen.emit(format!("    jne {}", no_match_label));
    gen.emit("    movb %r13b, %r15b");
    gen.emit_label(&no_match_label);
    gen.emit("    movb %r15b, (%rdi,%r14)");
    gen.emit("    incq %r14");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    gen.emit("    movb $0, (%rdi,%rcx)");
    gen.emit("    movq %rdi, %rax");
    Ok(())
}

fn case_convert(gen: &mut Generator, args: &[Expression], to_upper: bool) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    pushq %r11"); // src
    // emit_alloc clobbers %r8-%r10/%rdx/%rsi/%rdi; hold the length in %rcx,
    // which it saves and restores around its syscall.
    gen.emit("    movq %rax, %rcx");
    gen.emit("    incq %rax");
    emit_alloc(gen);
    gen.emit("    movq %rax, %rdi"); // dst
    gen.emit("    popq %rsi"); // src

    let (lo, hi, delta) = if to_upper {
        ('a', 'z', -32i64)
    } else {
        ('A', 'Z', 32i64)
    };

    gen.emit("    xorq %r14, %r14");
    let loop_label = gen.fresh_label(".Lcase_loop");
    let skip_label = gen.fresh_label(".Lcase_skip");
    let end_label = gen.fresh_label(".Lcase_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %rcx, %r14");
    gen.emit(format!("    jge {}", end_label));
    gen.emit("    movb (%rsi,%r14), %al");
    gen.emit(format!("    cmpb ${}, %al", lo as u8));
    gen.emit(format!("    jl {}", skip_label));
    gen.emit(format!("    cmpb ${}, %al", hi as u8));
    gen.emit(format!("    jg {}", skip_label));
    gen.emit(format!("    addb ${}, %al", delta as i8));
    gen.emit_label(&skip_label);
    gen.emit("    movb %al, (%rdi,%r14)");
    gen.emit("    incq %r14");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    gen.emit("    movb $0, (%rdi,%rcx)");
    gen.emit("    movq %rdi, %rax");
    Ok(())
}

fn to_lower(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    case_convert(gen, args, false)
}

fn to_upper(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    case_convert(gen, args, true)
}

/// Trims the ASCII whitespace set `{' ', '\t', '\n', '\r'}` from both ends.
fn trim(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    movq %r11, %rsi"); // src
    gen.emit("    movq %rax, %rcx"); // len
    gen.emit("    xorq %r8, %r8"); // start
    gen.emit("    movq %rcx, %r9"); // end (exclusive)

    let start_loop = gen.fresh_label(".Ltrim_start_loop");
    let start_end = gen.fresh_label(".Ltrim_start_end");
    gen.emit_label(&start_loop);
    gen.emit("    cmpq %r9, %r8");
    gen.emit(format!("    jge {}", start_end));
    gen.emit("    movb (%rsi,%r8), %al");
    emit_is_whitespace_check(gen, &start_end, true);
    gen.emit("    incq %r8");
    gen.emit(format!("    jmp {}", start_loop));
    gen.emit_label(&start_end);

    let end_loop = gen.fresh_label(".Ltrim_end_loop");
    let end_end = gen.fresh_label(".Ltrim_end_end");
    gen.emit_label(&end_loop);
    gen.emit("    cmpq %r8, %r9");
    gen.emit(format!("    jle {}", end_end));
    gen.emit("    movq %r9, %rax");
    gen.emit("    decq %rax");
    gen.emit("    movb (%rsi,%rax), %al");
    emit_is_whitespace_check(gen, &end_end, false);
    gen.emit("    decq %r9");
    gen.emit(format!("    jmp {}", end_loop));
    gen.emit_label(&end_end);

    gen.emit("    movq %r9, %rax");
    gen.emit("    subq %r8, %rax"); // trimmed length
    gen.emit("    pushq %r8");
    gen.emit("    pushq %rax");
    gen.emit("    incq %rax");
    emit_alloc(gen);
    gen.emit("    movq %rax, %rdi");
    gen.emit("    popq %rcx"); // trimmed length
    gen.emit("    popq %r8"); // start offset
    gen.emit("    leaq (%rsi,%r8), %rsi");
    copy_bytes(gen, "%rsi", "%rdi", "%rcx");
    gen.emit("    movb $0, (%rdi,%rcx)");
    gen.emit("    movq %rdi, %rax");
    Ok(())
}

/// Checks `%al` against the whitespace set; jumps to `exit_label` (the
/// "stop scanning" branch) when the byte is *not* whitespace, using a
/// fallthrough continuation otherwise.
fn emit_is_whitespace_check(gen: &mut Generator, exit_label: &str, _from_start: bool) {
    let is_ws_label = gen.fresh_label(".Lws_hit");
    gen.emit(format!("    cmpb $' ', %al"));
    gen.emit(format!("    je {}", is_ws_label));
    gen.emit("    cmpb $9, %al"); // \t
    gen.emit(format!("    je {}", is_ws_label));
    gen.emit("    cmpb $10, %al"); // \n
    gen.emit(format!("    je {}", is_ws_label));
    gen.emit("    cmpb $13, %al"); // \r
    gen.emit(format!("    je {}", is_ws_label));
    gen.emit(format!("    jmp {}", exit_label));
    gen.emit_label(&is_ws_label);
}

/// `indexOf` over a single-character needle; returns the byte index or `-1`.
fn index_of(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    movq %r11, %rsi");
    gen.emit("    movq %rax, %rcx");
    generate_expression(gen, &args[1])?;
    gen.emit("    movb %al, %dl");

    gen.emit("    xorq %rax, %rax");
    let loop_label = gen.fresh_label(".Lindexof_loop");
    let found_label = gen.fresh_label(".Lindexof_found");
    let not_found_label = gen.fresh_label(".Lindexof_not_found");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %rcx, %rax");
    gen.emit(format!("    jge {}", not_found_label));
    gen.emit("    cmpb %dl, (%rsi,%rax)");
    gen.emit(format!("    je {}", found_label));
    gen.emit("    incq %rax");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&not_found_label);
    gen.emit("    movq $-1, %rax");
    gen.emit_label(&found_label);
    Ok(())
}

fn contains(gen: &mut Generator, args: &[Expression], location: SourceLocation) -> Result<(), CompileError> {
    index_of(gen, args, location)?;
    gen.emit("    cmpq $-1, %rax");
    gen.emit("    setne %al");
    gen.emit("    movzbq %al, %rax");
    Ok(())
}

fn starts_with(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // haystack
    emit_strlen(gen, &args[1])?;
    gen.emit("    movq %r11, %rsi"); // needle
    gen.emit("    movq %rax, %rcx"); // needle len
    gen.emit("    popq %rdi"); // haystack

    gen.emit("    xorq %r8, %r8");
    let loop_label = gen.fresh_label(".Lstarts_loop");
    let mismatch_label = gen.fresh_label(".Lstarts_mismatch");
    let match_label = gen.fresh_label(".Lstarts_match");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %rcx, %r8");
    gen.emit(format!("    jge {}", match_label));
    gen.emit("    movb (%rdi,%r8), %al");
    gen.emit("    cmpb (%rsi,%r8), %al");
    gen.emit(format!("    jne {}", mismatch_label));
    gen.emit("    incq %r8");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&mismatch_label);
    gen.emit("    xorq %rax, %rax");
    let end_label = gen.fresh_label(".Lstarts_end");
    gen.emit(format!("    jmp {}", end_label));
    gen.emit_label(&match_label);
    gen.emit("    movq $1, %rax");
    gen.emit_label(&end_label);
    Ok(())
}

fn ends_with(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    movq %r11, %rdi"); // haystack
    gen.emit("    movq %rax, %r9"); // haystack len
    gen.emit("    pushq %rdi");
    gen.emit("    pushq %r9");
    emit_strlen(gen, &args[1])?;
    gen.emit("    movq %r11, %rsi"); // needle
    gen.emit("    movq %rax, %rcx"); // needle len
    gen.emit("    popq %r9");
    gen.emit("    popq %rdi");

    let underflow_label = gen.fresh_label(".Lends_underflow");
    gen.emit("    cmpq %r9, %rcx");
    gen.emit(format!("    jg {}", underflow_label));
    gen.emit("    movq %r9, %r8");
    gen.emit("    subq %rcx, %r8"); // offset where the needle would start

    gen.emit("    xorq %r10, %r10");
    let loop_label = gen.fresh_label(".Lends_loop");
    let mismatch_label = gen.fresh_label(".Lends_mismatch");
    let match_label = gen.fresh_label(".Lends_match");
    let end_label = gen.fresh_label(".Lends_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %rcx, %r10");
    gen.emit(format!("    jge {}", match_label));
    gen.emit("    movq %r8, %rax");
    gen.emit("    addq %r10, %rax");
    gen.emit("    movb (%rdi,%rax), %al");
    gen.emit("    cmpb (%rsi,%r10), %al");
    gen.emit(format!("    jne {}", mismatch_label));
    gen.emit("    incq %r10");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&underflow_label);
    gen.emit_label(&mismatch_label);
    gen.emit("    xorq %rax, %rax");
    gen.emit(format!("    jmp {}", end_label));
    gen.emit_label(&match_label);
    gen.emit("    movq $1, %rax");
    gen.emit_label(&end_label);
    Ok(())
}

/// Sign of the lexicographic difference, compared byte-by-byte up to the
/// shorter length, falling back to a length comparison on a common prefix.
fn compare(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_strlen(gen, &args[0])?;
    gen.emit("    movq %r11, %rdi");
    gen.emit("    movq %rax, %r8");
    gen.emit("    pushq %rdi");
    gen.emit("    pushq %r8");
    emit_strlen(gen, &args[1])?;
    gen.emit("    movq %r11, %rsi");
    gen.emit("    movq %rax, %r9");
    gen.emit("    popq %r8");
    gen.emit("    popq %rdi");

    gen.emit("    movq %r8, %rcx");
    gen.emit("    cmpq %r9, %rcx");
    let use_r9_label = gen.fresh_label(".Lcompare_use_r9");
    gen.emit(format!("    jle {}", use_r9_label));
    gen.emit("    movq %r9, %rcx");
    gen.emit_label(&use_r9_label);

    gen.emit("    xorq %r10, %r10");
    let loop_label = gen.fresh_label(".Lcompare_loop");
    let diff_label = gen.fresh_label(".Lcompare_diff");
    let tie_label = gen.fresh_label(".Lcompare_tie");
    let end_label = gen.fresh_label(".Lcompare_end");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %rcx, %r10");
    gen.emit(format!("    jge {}", tie_label));
    gen.emit("    movb (%rdi,%r10), %al");
    gen.emit("    movb (%rsi,%r10), %r11b");
    gen.emit("    cmpb %r11b, %al");
    gen.emit(format!("    jne {}", diff_label));
    gen.emit("    incq %r10");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&diff_label);
    gen.emit("    movsbq %al, %rax");
    gen.emit("    movsbq %r11b, %r11");
    gen.emit("    subq %r11, %rax");
    gen.emit(format!("    jmp {}", end_label));
    gen.emit_label(&tie_label);
    gen.emit("    movq %r8, %rax");
    gen.emit("    subq %r9, %rax");
    gen.emit_label(&end_label);
    Ok(())
}
