//! # Networking Intrinsics (`net`)
//!
//! Raw `AF_INET`/`AF_INET6` socket syscalls (spec.md §4.5.5, §6 syscall
//! table). `connect_ipv4`/`bind_ipv4`/`sendto_ipv4` build a 16-byte
//! `sockaddr_in` on the stack; the `ipv6` family builds a 28-byte
//! `sockaddr_in6`. Every raw syscall here clobbers `%rcx`/`%r11`
//! independently of `mem::emit_alloc` — no loop state is ever kept in
//! either register across a `syscall` instruction in this file.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const SYS_READ: i64 = 0;
const SYS_WRITE: i64 = 1;
const SYS_CLOSE: i64 = 3;
const SYS_SOCKET: i64 = 41;
const SYS_CONNECT: i64 = 42;
const SYS_SENDTO: i64 = 44;
const SYS_RECVFROM: i64 = 45;
const SYS_BIND: i64 = 49;

const AF_INET: i64 = 2;
const AF_INET6: i64 = 10;

pub fn module() -> ModuleDescriptor {
    make_module(
        "net",
        vec![
            intrinsic("socket", "net", 3, socket),
            intrinsic("connect_ipv4", "net", 3, connect_ipv4),
            intrinsic("bind_ipv4", "net", 3, bind_ipv4),
            intrinsic("sendto_ipv4", "net", 5, sendto_ipv4),
            intrinsic("connect_ipv6", "net", 3, connect_ipv6),
            intrinsic("bind_ipv6", "net", 3, bind_ipv6),
            intrinsic("sendto_ipv6", "net", 5, sendto_ipv6),
            intrinsic("recvfrom", "net", 5, recvfrom),
            intrinsic("send", "net", 3, send_fn),
            intrinsic("recv", "net", 3, recv_fn),
            intrinsic("close", "net", 1, close_fn),
            intrinsic("resolve", "net", 2, resolve),
            intrinsic("resolve_ipv6", "net", 2, resolve_ipv6),
        ],
    )
}

/// Negative syscall returns (errno) are rewritten to `-1` (spec.md §7);
/// non-negative values (fd, byte count, `0` for success) pass through.
fn emit_clamp_negative_to_minus_one(gen: &mut Generator) {
    let ok = gen.fresh_label(".Lnet_ok");
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!("    jge {}", ok));
    gen.emit("    movq $-1, %rax");
    gen.emit_label(&ok);
}

fn socket(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // domain
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // type
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rdx"); // protocol
    gen.emit("    popq %rsi"); // type
    gen.emit("    popq %rdi"); // domain
    gen.emit(format!("    movq ${}, %rax", SYS_SOCKET));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// Builds a 16-byte `sockaddr_in` at `-16(%rsp)`: family (2 bytes), port
/// (2 bytes, byte-swapped), IPv4 address (4 bytes, byte-swapped), 8 bytes
/// of zero padding. `ip_reg`/`port_reg` hold the already-evaluated host-order
/// values; the struct's base address is left in `%rsi` on return.
fn emit_build_sockaddr_in(gen: &mut Generator, ip_reg: &str, port_reg: &str) {
    gen.emit("    subq $16, %rsp");
    gen.emit(format!("    movw ${}, -16(%rsp)", AF_INET));
    gen.emit(format!("    movw {}, %ax", port_reg));
    gen.emit("    rolw $8, %ax");
    gen.emit("    movw %ax, -14(%rsp)");
    gen.emit(format!("    movl {}, %eax", ip_reg));
    gen.emit("    bswap %eax");
    gen.emit("    movl %eax, -12(%rsp)");
    gen.emit("    movq $0, -8(%rsp)");
    gen.emit("    leaq -16(%rsp), %rsi");
}

fn connect_ipv4(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // ip
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rcx"); // port
    gen.emit("    popq %rbx"); // ip
    gen.emit("    popq %r12"); // fd

    emit_build_sockaddr_in(gen, "%ebx", "%cx");
    gen.emit("    movq %r12, %rdi");
    gen.emit("    movq $16, %rdx");
    gen.emit(format!("    movq ${}, %rax", SYS_CONNECT));
    gen.emit("    syscall");
    gen.emit("    addq $16, %rsp");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

fn bind_ipv4(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // ip
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rcx"); // port
    gen.emit("    popq %rbx"); // ip
    gen.emit("    popq %r12"); // fd

    emit_build_sockaddr_in(gen, "%ebx", "%cx");
    gen.emit("    movq %r12, %rdi");
    gen.emit("    movq $16, %rdx");
    gen.emit(format!("    movq ${}, %rax", SYS_BIND));
    gen.emit("    syscall");
    gen.emit("    addq $16, %rsp");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

fn sendto_ipv4(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[2])?;
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[3])?;
    gen.emit("    pushq %rax"); // ip
    generate_expression(gen, &args[4])?;
    gen.emit("    movq %rax, %rcx"); // port
    gen.emit("    popq %rbx"); // ip
    gen.emit("    popq %r13"); // len
    gen.emit("    popq %r14"); // buf
    gen.emit("    popq %r12"); // fd

    emit_build_sockaddr_in(gen, "%ebx", "%cx");
    gen.emit("    movq %r12, %rdi");
    gen.emit("    movq %r14, %rsi");
    gen.emit("    movq %r13, %rdx");
    gen.emit("    xorq %r10, %r10"); // flags
    gen.emit("    movq %rsp, %r8"); // sockaddr (just built)
    gen.emit("    movq $16, %r9"); // addrlen
    gen.emit(format!("    movq ${}, %rax", SYS_SENDTO));
    gen.emit("    syscall");
    gen.emit("    addq $16, %rsp");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// Builds a 28-byte `sockaddr_in6` at `-32(%rsp)` (rounded up from 28 for
/// 16-byte stack alignment): family (2), port (2, byte-swapped), flowinfo
/// (4, zero), the 16-byte address (copied via two 8-byte moves from
/// `addr_ptr_reg`), scope id (4, zero).
fn emit_build_sockaddr_in6(gen: &mut Generator, addr_ptr_reg: &str, port_reg: &str) {
    gen.emit("    subq $32, %rsp");
    gen.emit(format!("    movw ${}, -32(%rsp)", AF_INET6));
    gen.emit(format!("    movw {}, %ax", port_reg));
    gen.emit("    rolw $8, %ax");
    gen.emit("    movw %ax, -30(%rsp)");
    gen.emit("    movl $0, -28(%rsp)"); // flowinfo
    gen.emit(format!("    movq ({}), %rax", addr_ptr_reg));
    gen.emit("    movq %rax, -24(%rsp)");
    gen.emit(format!("    movq 8({}), %rax", addr_ptr_reg));
    gen.emit("    movq %rax, -16(%rsp)");
    gen.emit("    movl $0, -8(%rsp)"); // scope id
    gen.emit("    leaq -32(%rsp), %rsi");
}

fn connect_ipv6(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // addr ptr
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rcx"); // port
    gen.emit("    popq %rbx"); // addr ptr
    gen.emit("    popq %r12"); // fd

    emit_build_sockaddr_in6(gen, "%rbx", "%cx");
    gen.emit("    movq %r12, %rdi");
    gen.emit("    movq $28, %rdx");
    gen.emit(format!("    movq ${}, %rax", SYS_CONNECT));
    gen.emit("    syscall");
    gen.emit("    addq $32, %rsp");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

fn bind_ipv6(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // addr ptr
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rcx"); // port
    gen.emit("    popq %rbx"); // addr ptr
    gen.emit("    popq %r12"); // fd

    emit_build_sockaddr_in6(gen, "%rbx", "%cx");
    gen.emit("    movq %r12, %rdi");
    gen.emit("    movq $28, %rdx");
    gen.emit(format!("    movq ${}, %rax", SYS_BIND));
    gen.emit("    syscall");
    gen.emit("    addq $32, %rsp");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

fn sendto_ipv6(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[2])?;
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[3])?;
    gen.emit("    pushq %rax"); // addr ptr
    generate_expression(gen, &args[4])?;
    gen.emit("    movq %rax, %rcx"); // port
    gen.emit("    popq %rbx"); // addr ptr
    gen.emit("    popq %r13"); // len
    gen.emit("    popq %r14"); // buf
    gen.emit("    popq %r12"); // fd

    emit_build_sockaddr_in6(gen, "%rbx", "%cx");
    gen.emit("    movq %r12, %rdi");
    gen.emit("    movq %r14, %rsi");
    gen.emit("    movq %r13, %rdx");
    gen.emit("    xorq %r10, %r10");
    gen.emit("    movq %rsp, %r8");
    gen.emit("    movq $28, %r9");
    gen.emit(format!("    movq ${}, %rax", SYS_SENDTO));
    gen.emit("    syscall");
    gen.emit("    addq $32, %rsp");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// `recvfrom(fd, buf, len, outIp, outPort)`: IPv4 only. Builds a scratch
/// 16-byte `sockaddr_in` + socklen_t on the stack to receive the peer
/// address, then unpacks host-order IP/port into the two out-params.
fn recvfrom(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // fd
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // buf
    generate_expression(gen, &args[2])?;
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[3])?;
    gen.emit("    pushq %rax"); // outIp
    generate_expression(gen, &args[4])?;
    gen.emit("    movq %rax, %rbx"); // outPort
    gen.emit("    popq %r15"); // outIp
    gen.emit("    popq %r13"); // len
    gen.emit("    popq %r14"); // buf
    gen.emit("    popq %r12"); // fd

    gen.emit("    subq $32, %rsp"); // sockaddr_in scratch + socklen_t
    gen.emit("    movq $16, -8(%rsp)"); // socklen_t = 16
    gen.emit("    movq %r12, %rdi");
    gen.emit("    movq %r14, %rsi");
    gen.emit("    movq %r13, %rdx");
    gen.emit("    xorq %r10, %r10"); // flags
    gen.emit("    leaq -32(%rsp), %r8"); // sockaddr
    gen.emit("    leaq -8(%rsp), %r9"); // socklen_t ptr
    gen.emit(format!("    movq ${}, %rax", SYS_RECVFROM));
    gen.emit("    syscall");
    gen.emit("    movq %rax, %r12"); // preserve result; fd no longer needed

    gen.emit("    movzwl -30(%rsp), %eax"); // port, network order
    gen.emit("    rolw $8, %ax");
    gen.emit("    movzwl %ax, %eax");
    gen.emit("    movq %rax, (%rbx)"); // outPort
    gen.emit("    movl -28(%rsp), %eax"); // ip, network order
    gen.emit("    bswap %eax");
    gen.emit("    movq %rax, (%r15)"); // outIp (movl zero-extends into %rax already)
    gen.emit("    addq $32, %rsp");

    gen.emit("    movq %r12, %rax");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

fn send_fn(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax");
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax");
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rdx");
    gen.emit("    popq %rsi");
    gen.emit("    popq %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_WRITE));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

fn recv_fn(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax");
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax");
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %rdx");
    gen.emit("    popq %rsi");
    gen.emit("    popq %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_READ));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

fn close_fn(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movq %rax, %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_CLOSE));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// Parses `/etc/hosts` linearly: a hostname match on a non-comment,
/// non-blank line writes the dotted-quad IPv4 address (4 bytes, host
/// order packed as the caller's 4-byte fields in `outIPv4`) and returns 1;
/// otherwise 0.
fn resolve(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // host ptr
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %r15"); // outIPv4
    gen.emit("    popq %r14"); // host ptr

    const SYS_OPEN: i64 = 2;
    const O_RDONLY: i64 = 0;
    const PATH_LABEL: &str = "net_etc_hosts_path";
    if gen.mark_emitted_once(PATH_LABEL) {
        gen.emit_data(format!("{}:", PATH_LABEL));
        gen.emit_data("    .asciz \"/etc/hosts\"");
    }
    // Read buffer is reserved up front so every exit path (including the
    // open-failure one) can unwind the stack through the same `done` label.
    gen.emit("    subq $4096, %rsp");
    gen.emit(format!("    leaq {}(%rip), %rdi", PATH_LABEL));
    gen.emit(format!("    movq ${}, %rsi", O_RDONLY));
    gen.emit("    xorq %rdx, %rdx");
    gen.emit(format!("    movq ${}, %rax", SYS_OPEN));
    gen.emit("    syscall");
    gen.emit("    movq %rax, %r12"); // fd (or negative)

    let not_found = gen.fresh_label(".Lresolve_not_found");
    gen.emit("    cmpq $0, %r12");
    gen.emit(format!("    jl {}", not_found));

    gen.emit("    movq %r12, %rdi");
    gen.emit("    movq %rsp, %rsi");
    gen.emit("    movq $4095, %rdx");
    gen.emit(format!("    movq ${}, %rax", SYS_READ));
    gen.emit("    syscall");
    gen.emit("    cmpq $0, %rax");
    let have_data = gen.fresh_label(".Lresolve_have_data");
    gen.emit(format!("    jg {}", have_data));
    gen.emit("    movq $0, (%rsp)"); // treat read failure as empty file
    gen.emit_label(&have_data);
    gen.emit("    movq %rax, %rbx"); // bytes read, clamp index below
    gen.emit("    cmpq $0, %rbx");
    let clamp_ok = gen.fresh_label(".Lresolve_clamp_ok");
    gen.emit(format!("    jge {}", clamp_ok));
    gen.emit("    xorq %rbx, %rbx");
    gen.emit_label(&clamp_ok);
    gen.emit("    movb $0, (%rsp,%rbx)"); // NUL-terminate

    gen.emit("    movq %r12, %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_CLOSE));
    gen.emit("    syscall");

    gen.emit("    movq %rsp, %r13"); // line cursor
    let line_loop = gen.fresh_label(".Lresolve_line_loop");
    let skip_line = gen.fresh_label(".Lresolve_skip_line");
    let found = gen.fresh_label(".Lresolve_found");
    let done = gen.fresh_label(".Lresolve_done");
    gen.emit_label(&line_loop);
    gen.emit("    movzbl (%r13), %eax");
    gen.emit("    testl %eax, %eax");
    gen.emit(format!("    jz {}", not_found));
    gen.emit("    cmpb $35, (%r13)"); // '#'
    gen.emit(format!("    je {}", skip_line));
    gen.emit("    cmpb $10, (%r13)"); // '\n'
    gen.emit(format!("    je {}", skip_line));

    // Parse the IP token, then skip whitespace, then compare the hostname.
    gen.emit("    movq %r13, %rsi"); // ip token start
    gen.emit("    movq %r13, %rdi");
    let ip_scan = gen.fresh_label(".Lresolve_ip_scan");
    gen.emit_label(&ip_scan);
    gen.emit("    movzbl (%rdi), %eax");
    gen.emit("    cmpb $32, %al"); // space
    let ip_done = gen.fresh_label(".Lresolve_ip_done");
    gen.emit(format!("    je {}", ip_done));
    gen.emit("    cmpb $9, %al"); // tab
    gen.emit(format!("    je {}", ip_done));
    gen.emit("    testb %al, %al");
    gen.emit(format!("    jz {}", ip_done));
    gen.emit("    cmpb $10, %al");
    gen.emit(format!("    je {}", ip_done));
    gen.emit("    incq %rdi");
    gen.emit(format!("    jmp {}", ip_scan));
    gen.emit_label(&ip_done);
    gen.emit("    movq %rdi, %r9"); // save ip token end

    let ws_loop = gen.fresh_label(".Lresolve_ws_loop");
    let ws_advance = gen.fresh_label(".Lresolve_ws_advance");
    let ws_done = gen.fresh_label(".Lresolve_ws_done");
    gen.emit_label(&ws_loop);
    gen.emit("    movzbl (%rdi), %eax");
    gen.emit("    cmpb $32, %al");
    gen.emit(format!("    je {}", ws_advance));
    gen.emit("    cmpb $9, %al");
    gen.emit(format!("    jne {}", ws_done));
    gen.emit_label(&ws_advance);
    gen.emit("    incq %rdi");
    gen.emit(format!("    jmp {}", ws_loop));
    gen.emit_label(&ws_done);

    gen.emit("    movq %rdi, %r8"); // hostname token start
    gen.emit("    movq %r14, %rcx"); // target hostname
    let cmp_loop = gen.fresh_label(".Lresolve_cmp_loop");
    let cmp_mismatch = gen.fresh_label(".Lresolve_cmp_mismatch");
    gen.emit_label(&cmp_loop);
    gen.emit("    movzbl (%rcx), %eax");
    gen.emit("    testb %al, %al");
    let cmp_target_end = gen.fresh_label(".Lresolve_cmp_target_end");
    gen.emit(format!("    jz {}", cmp_target_end));
    gen.emit("    movzbl (%r8), %edx");
    gen.emit("    cmpb %dl, %al");
    gen.emit(format!("    jne {}", cmp_mismatch));
    gen.emit("    incq %rcx");
    gen.emit("    incq %r8");
    gen.emit(format!("    jmp {}", cmp_loop));
    gen.emit_label(&cmp_target_end);
    gen.emit("    movzbl (%r8), %edx"); // hostname must end here too (space/tab/CR/LF/NUL)
    gen.emit("    cmpb $32, %dl");
    gen.emit(format!("    je {}", found));
    gen.emit("    cmpb $9, %dl");
    gen.emit(format!("    je {}", found));
    gen.emit("    cmpb $13, %dl");
    gen.emit(format!("    je {}", found));
    gen.emit("    cmpb $10, %dl");
    gen.emit(format!("    je {}", found));
    gen.emit("    testb %dl, %dl");
    gen.emit(format!("    je {}", found));
    gen.emit_label(&cmp_mismatch);

    gen.emit_label(&skip_line);
    let nl_loop = gen.fresh_label(".Lresolve_nl_loop");
    gen.emit_label(&nl_loop);
    gen.emit("    movzbl (%r13), %eax");
    gen.emit("    testb %al, %al");
    gen.emit(format!("    jz {}", not_found));
    gen.emit("    incq %r13");
    gen.emit("    cmpb $10, %al");
    gen.emit(format!("    jne {}", nl_loop));
    gen.emit(format!("    jmp {}", line_loop));

    gen.emit_label(&found);
    // %rsi = ip token start, %r9 = ip token end. Parse dotted quad.
    gen.emit("    movq %rsi, %rdi"); // cursor
    gen.emit("    xorq %r10, %r10"); // octet index
    let octet_loop = gen.fresh_label(".Lresolve_octet_loop");
    gen.emit_label(&octet_loop);
    gen.emit("    xorq %rax, %rax"); // accumulated octet value
    let digit_loop = gen.fresh_label(".Lresolve_digit_loop");
    gen.emit_label(&digit_loop);
    gen.emit("    cmpq %r9, %rdi");
    let octet_end = gen.fresh_label(".Lresolve_octet_end");
    gen.emit(format!("    jge {}", octet_end));
    gen.emit("    movzbl (%rdi), %edx");
    gen.emit("    cmpb $46, %dl"); // '.'
    gen.emit(format!("    je {}", octet_end));
    gen.emit("    subb $48, %dl");
    gen.emit("    imulq $10, %rax, %rax");
    gen.emit("    movzbl %dl, %edx");
    gen.emit("    addq %rdx, %rax");
    gen.emit("    incq %rdi");
    gen.emit(format!("    jmp {}", digit_loop));
    gen.emit_label(&octet_end);
    gen.emit("    movb %al, (%r15,%r10)");
    gen.emit("    incq %r10");
    gen.emit("    cmpq %r9, %rdi");
    let success = gen.fresh_label(".Lresolve_success");
    gen.emit(format!("    jge {}", success));
    gen.emit("    incq %rdi"); // skip '.'
    gen.emit("    cmpq $4, %r10");
    gen.emit(format!("    jl {}", octet_loop));
    gen.emit(format!("    jmp {}", not_found)); // more than 4 octets: malformed

    gen.emit_label(&success);
    gen.emit("    movq $1, %rax");
    gen.emit(format!("    jmp {}", done));

    gen.emit_label(&not_found);
    gen.emit("    xorq %rax, %rax");
    gen.emit_label(&done);
    gen.emit("    addq $4096, %rsp");
    Ok(())
}

fn resolve_ipv6(gen: &mut Generator, _args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    gen.emit("    xorq %rax, %rax");
    Ok(())
}
