//! # HTTP Intrinsics (`http`)
//!
//! Minimal HTTP/1.0 request emission and response parsing over an
//! already-connected socket fd (spec.md §4.5.5, Scenario E), plus a flat
//! connection pool keyed by `(djb2(host), port)`.
//!
//! None of these functions touch `%rbp` — it is the active frame pointer
//! for the surrounding function's locals (see `codegen::statements`), so
//! argument staging here goes through callee-saved registers or explicit
//! `N(%rsp)` stack slots instead.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::intrinsics::mem::emit_alloc;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const SYS_READ: i64 = 0;
const SYS_WRITE: i64 = 1;
const SYS_CLOSE: i64 = 3;
const SYS_MUNMAP: i64 = 11;

const POOL_HEADER_SIZE: i64 = 16; // [maxSlots][usedCount]
const POOL_SLOT_SIZE: i64 = 24; // [fd][hostHash][port]

pub fn module() -> ModuleDescriptor {
    make_module(
        "http",
        vec![
            intrinsic("get", "http", 7, http_get),
            intrinsic("post", "http", 9, http_post),
            intrinsic("parse_status", "http", 2, parse_status),
            intrinsic("get_header", "http", 4, get_header),
            intrinsic("get_body", "http", 2, get_body),
            intrinsic("parse_headers", "http", 3, parse_headers),
            intrinsic("pool_new", "http", 1, pool_new),
            intrinsic("pool_get", "http", 3, pool_get),
            intrinsic("pool_put", "http", 4, pool_put),
            intrinsic("pool_close", "http", 1, pool_close),
        ],
    )
}

fn escape_asciz(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

fn emit_literal_label(gen: &mut Generator, text: &str, label: &str) {
    if gen.mark_emitted_once(label) {
        gen.emit_data(format!("{}:", label));
        gen.emit_data(format!("    .ascii \"{}\"", escape_asciz(text)));
    }
}

/// `write(fd_reg, ptr_reg, len_reg)` where all three are already in registers.
fn emit_write_reg(gen: &mut Generator, fd_reg: &str, ptr_reg: &str, len_reg: &str) {
    gen.emit(format!("    movq {}, %rdi", fd_reg));
    gen.emit(format!("    movq {}, %rsi", ptr_reg));
    gen.emit(format!("    movq {}, %rdx", len_reg));
    gen.emit(format!("    movq ${}, %rax", SYS_WRITE));
    gen.emit("    syscall");
}

fn emit_write_literal_reg(gen: &mut Generator, fd_reg: &str, text: &str, label: &str) {
    emit_literal_label(gen, text, label);
    gen.emit(format!("    movq {}, %rdi", fd_reg));
    gen.emit(format!("    leaq {}(%rip), %rsi", label));
    gen.emit(format!("    movq ${}, %rdx", text.len()));
    gen.emit(format!("    movq ${}, %rax", SYS_WRITE));
    gen.emit("    syscall");
}

/// `write` where fd/ptr/len are `N(%rsp)` memory operands (used once the
/// argument values live in a fixed stack frame rather than registers).
fn emit_write_mem(gen: &mut Generator, fd_mem: &str, ptr_mem: &str, len_mem: &str) {
    gen.emit(format!("    movq {}, %rdi", fd_mem));
    gen.emit(format!("    movq {}, %rsi", ptr_mem));
    gen.emit(format!("    movq {}, %rdx", len_mem));
    gen.emit(format!("    movq ${}, %rax", SYS_WRITE));
    gen.emit("    syscall");
}

fn emit_write_literal_mem(gen: &mut Generator, fd_mem: &str, text: &str, label: &str) {
    emit_literal_label(gen, text, label);
    gen.emit(format!("    movq {}, %rdi", fd_mem));
    gen.emit(format!("    leaq {}(%rip), %rsi", label));
    gen.emit(format!("    movq ${}, %rdx", text.len()));
    gen.emit(format!("    movq ${}, %rax", SYS_WRITE));
    gen.emit("    syscall");
}

fn emit_clamp_negative(gen: &mut Generator) {
    let ok = gen.fresh_label(".Lhttp_ok");
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!("    jge {}", ok));
    gen.emit("    movq $-1, %rax");
    gen.emit_label(&ok);
}

/// `get(fd, host, hostLen, path, pathLen, buf, bufLen)`. Emits the request
/// as a sequence of `write`s (literal pieces plus the caller-supplied
/// host/path spans) then a single `read` into `buf`. Linux syscalls clobber
/// only `%rax`/`%rcx`/`%r11`, so `%r8`/`%r9` safely hold `buf`/`bufLen`
/// across the intervening writes.
fn http_get(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // host
    generate_expression(gen, &args[2])?;
    gen.emit("    pushq %rax"); // hostLen
    generate_expression(gen, &args[3])?;
    gen.emit("    pushq %rax"); // path
    generate_expression(gen, &args[4])?;
    gen.emit("    pushq %rax"); // pathLen
    generate_expression(gen, &args[5])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[6])?;
    gen.emit("    movq %rax, %r9"); // bufLen
    gen.emit("    popq %r8"); // buf
    gen.emit("    popq %r14"); // pathLen
    gen.emit("    popq %r13"); // path
    gen.emit("    popq %r12"); // hostLen
    gen.emit("    popq %rbx"); // host
    gen.emit("    popq %r15"); // fd

    emit_write_literal_reg(gen, "%r15", "GET ", "http_lit_get");
    emit_write_reg(gen, "%r15", "%r13", "%r14");
    emit_write_literal_reg(gen, "%r15", " HTTP/1.0\r\nHost: ", "http_lit_ver_host");
    emit_write_reg(gen, "%r15", "%rbx", "%r12");
    emit_write_literal_reg(gen, "%r15", "\r\nConnection: close\r\n\r\n", "http_lit_close_crlf");

    gen.emit("    movq %r15, %rdi");
    gen.emit("    movq %r8, %rsi");
    gen.emit("    movq %r9, %rdx");
    gen.emit(format!("    movq ${}, %rax", SYS_READ));
    gen.emit("    syscall");
    emit_clamp_negative(gen);
    Ok(())
}

/// `post(fd, host, hostLen, path, pathLen, body, bodyLen, buf, bufLen)`.
/// Nine live values don't fit in the register file alongside syscall
/// staging, so after evaluation they stay in a fixed `N(%rsp)` frame
/// (below a 24-byte itoa scratch buffer) for the whole function instead.
fn http_post(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    for arg in args {
        generate_expression(gen, arg)?;
        gen.emit("    pushq %rax");
    }
    // Stack now (0 = top = last pushed): bufLen, buf, bodyLen, body,
    // pathLen, path, hostLen, host, fd. Reserve itoa scratch below that.
    gen.emit("    subq $24, %rsp");

    let fd = "88(%rsp)";
    let host = "80(%rsp)";
    let host_len = "72(%rsp)";
    let path = "64(%rsp)";
    let path_len = "56(%rsp)";
    let body = "48(%rsp)";
    let body_len = "40(%rsp)";
    let buf = "32(%rsp)";
    let buf_len = "24(%rsp)";

    emit_write_literal_mem(gen, fd, "POST ", "http_lit_post");
    emit_write_mem(gen, fd, path, path_len);
    emit_write_literal_mem(gen, fd, " HTTP/1.0\r\nHost: ", "http_lit_ver_host");
    emit_write_mem(gen, fd, host, host_len);
    emit_write_literal_mem(
        gen,
        fd,
        "\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: ",
        "http_lit_ctype_clen",
    );

    // itoa(bodyLen) into the 24-byte scratch buffer at 0(%rsp), digits
    // filled from the end backward; %r8 = first digit ptr, %r9 = count.
    gen.emit(format!("    movq {}, %rax", body_len));
    gen.emit("    leaq 24(%rsp), %r8");
    gen.emit("    xorq %r9, %r9");
    gen.emit("    testq %rax, %rax");
    let nonzero = gen.fresh_label(".Lpost_itoa_nonzero");
    let done = gen.fresh_label(".Lpost_itoa_done");
    gen.emit(format!("    jnz {}", nonzero));
    gen.emit("    decq %r8");
    gen.emit("    movb $0x30, (%r8)");
    gen.emit("    movq $1, %r9");
    gen.emit(format!("    jmp {}", done));
    gen.emit_label(&nonzero);
    let loop_label = gen.fresh_label(".Lpost_itoa_loop");
    gen.emit_label(&loop_label);
    gen.emit("    testq %rax, %rax");
    gen.emit(format!("    jz {}", done));
    gen.emit("    xorq %rdx, %rdx");
    gen.emit("    movq $10, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    addb $0x30, %dl");
    gen.emit("    decq %r8");
    gen.emit("    movb %dl, (%r8)");
    gen.emit("    incq %r9");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&done);

    emit_write_mem(gen, fd, "%r8", "%r9");
    emit_write_literal_mem(gen, fd, "\r\n\r\n", "http_lit_double_crlf");
    emit_write_mem(gen, fd, body, body_len);

    gen.emit(format!("    movq {}, %rdi", fd));
    gen.emit(format!("    movq {}, %rsi", buf));
    gen.emit(format!("    movq {}, %rdx", buf_len));
    gen.emit(format!("    movq ${}, %rax", SYS_READ));
    gen.emit("    syscall");
    gen.emit("    addq $96, %rsp"); // 24 scratch + 9*8 args
    emit_clamp_negative(gen);
    Ok(())
}

/// `parse_status(buf, len)`: finds the first space, reads the following
/// three ASCII digits as an integer; `0` if any of them isn't a digit.
fn parse_status(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %rcx"); // len (remaining)
    gen.emit("    popq %rsi"); // cursor

    let scan = gen.fresh_label(".Lstatus_scan");
    let malformed = gen.fresh_label(".Lstatus_malformed");
    let found_space = gen.fresh_label(".Lstatus_found_space");
    gen.emit_label(&scan);
    gen.emit("    testq %rcx, %rcx");
    gen.emit(format!("    jz {}", malformed));
    gen.emit("    cmpb $32, (%rsi)");
    gen.emit(format!("    je {}", found_space));
    gen.emit("    incq %rsi");
    gen.emit("    decq %rcx");
    gen.emit(format!("    jmp {}", scan));
    gen.emit_label(&found_space);
    gen.emit("    incq %rsi"); // past the space
    gen.emit("    decq %rcx");

    gen.emit("    xorq %rax, %rax");
    for _ in 0..3 {
        gen.emit("    cmpq $0, %rcx");
        gen.emit(format!("    jle {}", malformed));
        gen.emit("    movzbl (%rsi), %edx");
        gen.emit("    cmpb $48, %dl");
        gen.emit(format!("    jl {}", malformed));
        gen.emit("    cmpb $57, %dl");
        gen.emit(format!("    jg {}", malformed));
        gen.emit("    subb $48, %dl");
        gen.emit("    imulq $10, %rax, %rax");
        gen.emit("    movzbl %dl, %edx");
        gen.emit("    addq %rdx, %rax");
        gen.emit("    incq %rsi");
        gen.emit("    decq %rcx");
    }
    let done = gen.fresh_label(".Lstatus_done");
    gen.emit(format!("    jmp {}", done));
    gen.emit_label(&malformed);
    gen.emit("    xorq %rax, %rax");
    gen.emit_label(&done);
    Ok(())
}

/// Emits `toupper` of the byte at `(reg)` into `%eax` (ASCII only).
fn emit_load_upper_byte(gen: &mut Generator, reg: &str) {
    gen.emit(format!("    movzbl ({}), %eax", reg));
    gen.emit("    cmpb $97, %al"); // 'a'
    let skip = gen.fresh_label(".Lupper_skip");
    gen.emit(format!("    jl {}", skip));
    gen.emit("    cmpb $122, %al"); // 'z'
    gen.emit(format!("    jg {}", skip));
    gen.emit("    subb $32, %al");
    gen.emit_label(&skip);
}

/// `get_header(buf, len, name, outValue)`: scans line-by-line past the
/// first CRLF/LF, case-insensitively matches `name` up to `:`, copies the
/// value (leading spaces trimmed) until CR/LF, NUL-terminates, returns the
/// byte count, or `0` if not found / headers end (blank line).
fn get_header(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[2])?;
    gen.emit("    pushq %rax"); // name
    generate_expression(gen, &args[3])?;
    gen.emit("    movq %rax, %r12"); // outValue
    gen.emit("    popq %r13"); // name
    gen.emit("    popq %rcx"); // len
    gen.emit("    popq %rsi"); // cursor

    gen.emit("    leaq (%rsi,%rcx), %r15"); // end-of-buffer sentinel

    // Skip the status line.
    let skip_status = gen.fresh_label(".Lgh_skip_status");
    let not_found = gen.fresh_label(".Lgh_not_found");
    gen.emit_label(&skip_status);
    gen.emit("    cmpq %r15, %rsi");
    gen.emit(format!("    jge {}", not_found));
    gen.emit("    movzbl (%rsi), %eax");
    gen.emit("    incq %rsi");
    gen.emit("    cmpb $10, %al");
    gen.emit(format!("    jne {}", skip_status));

    let line_loop = gen.fresh_label(".Lgh_line_loop");
    let next_line = gen.fresh_label(".Lgh_next_line");
    let found = gen.fresh_label(".Lgh_found");
    let try_match = gen.fresh_label(".Lgh_try_match");
    gen.emit_label(&line_loop);
    gen.emit("    cmpq %r15, %rsi");
    gen.emit(format!("    jge {}", not_found));
    gen.emit("    cmpb $13, (%rsi)"); // blank line: CR or LF immediately
    gen.emit(format!("    je {}", not_found));
    gen.emit("    cmpb $10, (%rsi)");
    gen.emit(format!("    je {}", not_found));
    gen.emit(format!("    jmp {}", try_match));

    // Try to match `name` against this line up to ':'.
    gen.emit_label(&try_match);
    gen.emit("    movq %rsi, %rdi"); // line cursor
    gen.emit("    movq %r13, %r8"); // name cursor
    let cmp_loop = gen.fresh_label(".Lgh_cmp_loop");
    let cmp_name_end = gen.fresh_label(".Lgh_cmp_name_end");
    gen.emit_label(&cmp_loop);
    gen.emit("    movzbl (%r8), %eax");
    gen.emit("    testb %al, %al");
    gen.emit(format!("    jz {}", cmp_name_end));
    gen.emit("    cmpb $97, %al");
    let name_upper_skip = gen.fresh_label(".Lgh_name_upper_skip");
    gen.emit(format!("    jl {}", name_upper_skip));
    gen.emit("    cmpb $122, %al");
    gen.emit(format!("    jg {}", name_upper_skip));
    gen.emit("    subb $32, %al");
    gen.emit_label(&name_upper_skip);
    gen.emit("    movq %rax, %r9"); // save upper(name char)
    emit_load_upper_byte(gen, "%rdi");
    gen.emit("    cmpb %al, %r9b");
    let mismatch = gen.fresh_label(".Lgh_mismatch");
    gen.emit(format!("    jne {}", mismatch));
    gen.emit("    incq %rdi");
    gen.emit("    incq %r8");
    gen.emit(format!("    jmp {}", cmp_loop));
    gen.emit_label(&cmp_name_end);
    gen.emit("    cmpb $58, (%rdi)"); // ':'
    gen.emit(format!("    jne {}", mismatch));
    gen.emit("    incq %rdi"); // past ':'
    let skip_spaces = gen.fresh_label(".Lgh_skip_spaces");
    gen.emit_label(&skip_spaces);
    gen.emit("    cmpb $32, (%rdi)");
    gen.emit(format!("    jne {}", found));
    gen.emit("    incq %rdi");
    gen.emit(format!("    jmp {}", skip_spaces));

    gen.emit_label(&mismatch);
    gen.emit(format!("    jmp {}", next_line));

    gen.emit_label(&found);
    let copy_loop = gen.fresh_label(".Lgh_copy_loop");
    let copy_done = gen.fresh_label(".Lgh_copy_done");
    gen.emit("    xorq %rcx, %rcx"); // copied count
    gen.emit_label(&copy_loop);
    gen.emit("    cmpq %r15, %rdi");
    gen.emit(format!("    jge {}", copy_done));
    gen.emit("    movzbl (%rdi), %eax");
    gen.emit("    cmpb $13, %al");
    gen.emit(format!("    je {}", copy_done));
    gen.emit("    cmpb $10, %al");
    gen.emit(format!("    je {}", copy_done));
    gen.emit("    movb %al, (%r12,%rcx)");
    gen.emit("    incq %rdi");
    gen.emit("    incq %rcx");
    gen.emit(format!("    jmp {}", copy_loop));
    gen.emit_label(&copy_done);
    gen.emit("    movb $0, (%r12,%rcx)");
    gen.emit("    movq %rcx, %rax");
    let done = gen.fresh_label(".Lgh_done");
    gen.emit(format!("    jmp {}", done));

    gen.emit_label(&next_line);
    let nl_scan = gen.fresh_label(".Lgh_nl_scan");
    gen.emit_label(&nl_scan);
    gen.emit("    cmpq %r15, %rsi");
    gen.emit(format!("    jge {}", not_found));
    gen.emit("    movzbl (%rsi), %eax");
    gen.emit("    incq %rsi");
    gen.emit("    cmpb $10, %al");
    gen.emit(format!("    jne {}", nl_scan));
    gen.emit(format!("    jmp {}", line_loop));

    gen.emit_label(&not_found);
    gen.emit("    xorq %rax, %rax");
    gen.emit_label(&done);
    Ok(())
}

/// `get_body(buf, len)`: locates `\r\n\r\n`, returns the pointer right
/// after it, or `0` if absent.
fn get_body(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %rcx"); // len
    gen.emit("    popq %rsi"); // cursor

    let scan = gen.fresh_label(".Lgb_scan");
    let not_found = gen.fresh_label(".Lgb_not_found");
    let found = gen.fresh_label(".Lgb_found");
    let mismatch = gen.fresh_label(".Lgb_mismatch");
    gen.emit_label(&scan);
    gen.emit("    cmpq $4, %rcx");
    gen.emit(format!("    jl {}", not_found));
    gen.emit("    cmpb $13, (%rsi)");
    gen.emit(format!("    jne {}", mismatch));
    gen.emit("    cmpb $10, 1(%rsi)");
    gen.emit(format!("    jne {}", mismatch));
    gen.emit("    cmpb $13, 2(%rsi)");
    gen.emit(format!("    jne {}", mismatch));
    gen.emit("    cmpb $10, 3(%rsi)");
    gen.emit(format!("    jne {}", mismatch));
    gen.emit(format!("    jmp {}", found));
    gen.emit_label(&mismatch);
    gen.emit("    incq %rsi");
    gen.emit("    decq %rcx");
    gen.emit(format!("    jmp {}", scan));
    gen.emit_label(&found);
    gen.emit("    leaq 4(%rsi), %rax");
    let done = gen.fresh_label(".Lgb_done");
    gen.emit(format!("    jmp {}", done));
    gen.emit_label(&not_found);
    gen.emit("    xorq %rax, %rax");
    gen.emit_label(&done);
    Ok(())
}

/// `parse_headers(buf, len, outArray)`: walks header lines after the first
/// CRLF, writing a pointer to the start of each into 8-byte slots of
/// `outArray`; stops at the blank line or buffer end. Returns the count.
fn parse_headers(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %r12"); // outArray
    gen.emit("    popq %rcx"); // len
    gen.emit("    popq %rsi"); // cursor

    gen.emit("    leaq (%rsi,%rcx), %r15"); // end sentinel
    gen.emit("    xorq %r13, %r13"); // count

    let skip_status = gen.fresh_label(".Lph_skip_status");
    let done = gen.fresh_label(".Lph_done");
    gen.emit_label(&skip_status);
    gen.emit("    cmpq %r15, %rsi");
    gen.emit(format!("    jge {}", done));
    gen.emit("    movzbl (%rsi), %eax");
    gen.emit("    incq %rsi");
    gen.emit("    cmpb $10, %al");
    gen.emit(format!("    jne {}", skip_status));

    let line_loop = gen.fresh_label(".Lph_line_loop");
    let nl_scan = gen.fresh_label(".Lph_nl_scan");
    gen.emit_label(&line_loop);
    gen.emit("    cmpq %r15, %rsi");
    gen.emit(format!("    jge {}", done));
    gen.emit("    cmpb $13, (%rsi)");
    gen.emit(format!("    je {}", done));
    gen.emit("    cmpb $10, (%rsi)");
    gen.emit(format!("    je {}", done));

    gen.emit("    movq %rsi, (%r12,%r13,8)");
    gen.emit("    incq %r13");

    gen.emit_label(&nl_scan);
    gen.emit("    cmpq %r15, %rsi");
    gen.emit(format!("    jge {}", done));
    gen.emit("    movzbl (%rsi), %eax");
    gen.emit("    incq %rsi");
    gen.emit("    cmpb $10, %al");
    gen.emit(format!("    jne {}", nl_scan));
    gen.emit(format!("    jmp {}", line_loop));

    gen.emit_label(&done);
    gen.emit("    movq %r13, %rax");
    Ok(())
}

/// `pool_new(maxConns)`: header `[maxSlots][usedCount=0]` followed by
/// `maxConns` slots of `[fd=-1][hostHash][port]`.
fn pool_new(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movq %rax, %r13"); // maxSlots

    gen.emit("    movq %r13, %r14");
    gen.emit(format!("    imulq ${}, %r14, %r14", POOL_SLOT_SIZE));
    gen.emit(format!("    addq ${}, %r14", POOL_HEADER_SIZE));
    gen.emit("    movq %r14, %rax");
    emit_alloc(gen);
    gen.emit("    movq %rax, %r12"); // pool base

    gen.emit("    movq %r13, (%r12)");
    gen.emit("    movq $0, 8(%r12)"); // usedCount

    // mmap zero-fills the slot block; only the fd fields need `-1`.
    gen.emit("    xorq %r15, %r15"); // slot index
    let loop_label = gen.fresh_label(".Lpn_loop");
    let done = gen.fresh_label(".Lpn_done");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %r13, %r15");
    gen.emit(format!("    jge {}", done));
    gen.emit("    movq %r15, %rax");
    gen.emit(format!("    imulq ${}, %rax, %rax", POOL_SLOT_SIZE));
    gen.emit(format!("    leaq {}(%r12,%rax), %rdx", POOL_HEADER_SIZE));
    gen.emit("    movq $-1, (%rdx)");
    gen.emit("    incq %r15");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&done);

    gen.emit("    movq %r12, %rax");
    Ok(())
}

/// `djb2` over a NUL-terminated string pointer already in `%rsi`; leaves
/// the hash in `%rax`. Mirrors `hash::djb2`'s algorithm, kept local to
/// avoid an inter-module expander dependency.
fn emit_djb2_from_ptr(gen: &mut Generator) {
    gen.emit("    movq $5381, %rax");
    let loop_label = gen.fresh_label(".Lhttp_djb2_loop");
    let end_label = gen.fresh_label(".Lhttp_djb2_end");
    gen.emit_label(&loop_label);
    gen.emit("    movzbq (%rsi), %rdx");
    gen.emit("    testq %rdx, %rdx");
    gen.emit(format!("    jz {}", end_label));
    gen.emit("    movq %rax, %rcx");
    gen.emit("    shlq $5, %rcx");
    gen.emit("    addq %rcx, %rax");
    gen.emit("    addq %rdx, %rax");
    gen.emit("    incq %rsi");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
}

/// `pool_get(pool, host, port)`: takes and returns the fd of the first
/// live slot whose `(hostHash, port)` matches, or `-1`.
fn pool_get(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // pool
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // host
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %r14"); // port
    gen.emit("    popq %rsi"); // host -> djb2 input
    gen.emit("    popq %r12"); // pool

    emit_djb2_from_ptr(gen);
    gen.emit("    movq %rax, %r13"); // target hash

    gen.emit("    movq (%r12), %rbx"); // maxSlots
    gen.emit("    xorq %r15, %r15"); // slot index
    let loop_label = gen.fresh_label(".Lpg_loop");
    let not_found = gen.fresh_label(".Lpg_not_found");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %rbx, %r15");
    gen.emit(format!("    jge {}", not_found));
    gen.emit("    movq %r15, %rax");
    gen.emit(format!("    imulq ${}, %rax, %rax", POOL_SLOT_SIZE));
    gen.emit(format!("    leaq {}(%r12,%rax), %r8", POOL_HEADER_SIZE));
    gen.emit("    movq (%r8), %rax"); // fd
    gen.emit("    cmpq $-1, %rax");
    let advance = gen.fresh_label(".Lpg_advance");
    gen.emit(format!("    je {}", advance));
    gen.emit("    cmpq %r13, 8(%r8)"); // hostHash
    gen.emit(format!("    jne {}", advance));
    gen.emit("    cmpq %r14, 16(%r8)"); // port
    let found = gen.fresh_label(".Lpg_found");
    gen.emit(format!("    je {}", found));
    gen.emit_label(&advance);
    gen.emit("    incq %r15");
    gen.emit(format!("    jmp {}", loop_label));

    gen.emit_label(&found);
    gen.emit("    movq %rax, %r9"); // fd to return
    gen.emit("    movq $-1, (%r8)");
    gen.emit("    decq 8(%r12)"); // usedCount
    gen.emit("    movq %r9, %rax");
    let done = gen.fresh_label(".Lpg_done");
    gen.emit(format!("    jmp {}", done));

    gen.emit_label(&not_found);
    gen.emit("    movq $-1, %rax");
    gen.emit_label(&done);
    Ok(())
}

/// `pool_put(pool, fd, host, port)`: stores into the first free slot;
/// returns `1` on success, `0` if full.
fn pool_put(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // pool
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[2])?;
    gen.emit("    pushq %rax"); // host
    generate_expression(gen, &args[3])?;
    gen.emit("    movq %rax, %r14"); // port
    gen.emit("    popq %rsi"); // host -> djb2 input
    gen.emit("    popq %rbx"); // fd
    gen.emit("    popq %r12"); // pool

    emit_djb2_from_ptr(gen);
    gen.emit("    movq %rax, %r13"); // hostHash

    gen.emit("    movq (%r12), %r15"); // maxSlots
    gen.emit("    xorq %r10, %r10"); // slot index
    let loop_label = gen.fresh_label(".Lpp_loop");
    let full = gen.fresh_label(".Lpp_full");
    let found = gen.fresh_label(".Lpp_found");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %r15, %r10");
    gen.emit(format!("    jge {}", full));
    gen.emit("    movq %r10, %rax");
    gen.emit(format!("    imulq ${}, %rax, %rax", POOL_SLOT_SIZE));
    gen.emit(format!("    leaq {}(%r12,%rax), %r8", POOL_HEADER_SIZE));
    gen.emit("    cmpq $-1, (%r8)");
    gen.emit(format!("    je {}", found));
    gen.emit("    incq %r10");
    gen.emit(format!("    jmp {}", loop_label));

    gen.emit_label(&found);
    gen.emit("    movq %rbx, (%r8)");
    gen.emit("    movq %r13, 8(%r8)");
    gen.emit("    movq %r14, 16(%r8)");
    gen.emit("    incq 8(%r12)");
    gen.emit("    movq $1, %rax");
    let done = gen.fresh_label(".Lpp_done");
    gen.emit(format!("    jmp {}", done));

    gen.emit_label(&full);
    gen.emit("    xorq %rax, %rax");
    gen.emit_label(&done);
    Ok(())
}

/// `pool_close(pool)`: closes every live fd, `munmap`s the whole pool
/// block, returns the count closed.
fn pool_close(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movq %rax, %r12"); // pool

    gen.emit("    movq (%r12), %r13"); // maxSlots
    gen.emit("    xorq %r15, %r15"); // slot index
    gen.emit("    xorq %r14, %r14"); // closed count

    let loop_label = gen.fresh_label(".Lpc_loop");
    let skip = gen.fresh_label(".Lpc_skip");
    let done_loop = gen.fresh_label(".Lpc_done_loop");
    gen.emit_label(&loop_label);
    gen.emit("    cmpq %r13, %r15");
    gen.emit(format!("    jge {}", done_loop));
    gen.emit("    movq %r15, %rax");
    gen.emit(format!("    imulq ${}, %rax, %rax", POOL_SLOT_SIZE));
    gen.emit(format!("    leaq {}(%r12,%rax), %rbx", POOL_HEADER_SIZE));
    gen.emit("    movq (%rbx), %rax"); // fd
    gen.emit("    cmpq $-1, %rax");
    gen.emit(format!("    je {}", skip));
    gen.emit("    movq %rax, %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_CLOSE));
    gen.emit("    syscall");
    gen.emit("    incq %r14");
    gen.emit_label(&skip);
    gen.emit("    incq %r15");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&done_loop);

    gen.emit("    movq %r13, %rax");
    gen.emit(format!("    imulq ${}, %rax, %rax", POOL_SLOT_SIZE));
    gen.emit(format!("    addq ${}, %rax", POOL_HEADER_SIZE));
    gen.emit("    movq %rax, %rsi"); // munmap length
    gen.emit("    movq %r12, %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_MUNMAP));
    gen.emit("    syscall");

    gen.emit("    movq %r14, %rax");
    Ok(())
}
