//! # MD5 Intrinsic (`md5`)
//!
//! RFC 1321. Working variables `a..d` live in a small stack scratch area,
//! mirroring the `sha256` module's compression routine; the per-round
//! message index and round function are selected by which quarter of the
//! 64-round schedule the current round falls in, computed straight from
//! the round counter rather than unrolled at generate time.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const T_LABEL: &str = "md5_t";
const S_LABEL: &str = "md5_s";
const COMPRESS_LABEL: &str = "md5_compress_block";

const T: [u32; 64] = [
    0xd76aa478, 0xe8c7b756, 0x242070db, 0xc1bdceee, 0xf57c0faf, 0x4787c62a, 0xa8304613, 0xfd469501,
    0x698098d8, 0x8b44f7af, 0xffff5bb1, 0x895cd7be, 0x6b901122, 0xfd987193, 0xa679438e, 0x49b40821,
    0xf61e2562, 0xc040b340, 0x265e5a51, 0xe9b6c7aa, 0xd62f105d, 0x02441453, 0xd8a1e681, 0xe7d3fbc8,
    0x21e1cde6, 0xc33707d6, 0xf4d50d87, 0x455a14ed, 0xa9e3e905, 0xfcefa3f8, 0x676f02d9, 0x8d2a4c8a,
    0xfffa3942, 0x8771f681, 0x6d9d6122, 0xfde5380c, 0xa4beea44, 0x4bdecfa9, 0xf6bb4b60, 0xbebfbc70,
    0x289b7ec6, 0xeaa127fa, 0xd4ef3085, 0x04881d05, 0xd9d4d039, 0xe6db99e5, 0x1fa27cf8, 0xc4ac5665,
    0xf4292244, 0x432aff97, 0xab9423a7, 0xfc93a039, 0x655b59c3, 0x8f0ccc92, 0xffeff47d, 0x85845dd1,
    0x6fa87e4f, 0xfe2ce6e0, 0xa3014314, 0x4e0811a1, 0xf7537e82, 0xbd3af235, 0x2ad7d2bb, 0xeb86d391,
];
const S: [u32; 64] = {
    let mut table = [0u32; 64];
    let groups: [[u32; 4]; 4] = [[7, 12, 17, 22], [5, 9, 14, 20], [4, 11, 16, 23], [6, 10, 15, 21]];
    let mut i = 0;
    while i < 64 {
        table[i] = groups[i / 16][i % 4];
        i += 1;
    }
    table
};
const A0: u32 = 0x67452301;
const B0: u32 = 0xefcdab89;
const C0: u32 = 0x98badcfe;
const D0: u32 = 0x10325476;

const VARS_BASE: i64 = 0; // a,b,c,d x 4 bytes
const FRAME_SIZE: i64 = 32;

pub fn module() -> ModuleDescriptor {
    make_module("md5", vec![intrinsic("md5", "md5", 3, md5)])
}

fn var_offset(index: i64) -> i64 {
    VARS_BASE + index * 4
}

fn emit_constant_tables(gen: &mut Generator) {
    if gen.mark_emitted_once(T_LABEL) {
        gen.emit_data(format!("{}:", T_LABEL));
        for chunk in T.chunks(8) {
            let values: Vec<String> = chunk.iter().map(|v| format!("0x{:08X}", v)).collect();
            gen.emit_data(format!("    .long {}", values.join(", ")));
        }
    }
    if gen.mark_emitted_once(S_LABEL) {
        gen.emit_data(format!("{}:", S_LABEL));
        for chunk in S.chunks(16) {
            let values: Vec<String> = chunk.iter().map(|v| v.to_string()).collect();
            gen.emit_data(format!("    .long {}", values.join(", ")));
        }
    }
}

/// Contract: `%rdi` points at the 4-word (16-byte) running state, `%rsi` at
/// the 64-byte message block. Preserves every SysV callee-saved register.
fn emit_compress(gen: &mut Generator) {
    if !gen.mark_emitted_once(COMPRESS_LABEL) {
        return;
    }
    gen.emit_label(COMPRESS_LABEL);
    gen.emit("    pushq %rbx");
    gen.emit("    pushq %r12");
    gen.emit("    pushq %r13");
    gen.emit("    pushq %r14");
    gen.emit("    pushq %r15");
    gen.emit("    pushq %rbp");
    gen.emit(format!("    subq ${}, %rsp", FRAME_SIZE));
    gen.emit("    movq %rdi, %r14"); // state ptr
    gen.emit("    movq %rsi, %r15"); // block ptr

    for i in 0..4i64 {
        gen.emit(format!("    movl {}(%r14), %eax", i * 4));
        gen.emit(format!("    movl %eax, {}(%rsp)", var_offset(i)));
    }

    gen.emit("    xorq %r13, %r13"); // round index 0..63
    let round_loop = gen.fresh_label(".Lmd5_round_loop");
    let round_end = gen.fresh_label(".Lmd5_round_end");
    gen.emit_label(&round_loop);
    gen.emit("    cmpq $64, %r13");
    gen.emit(format!("    jge {}", round_end));

    gen.emit("    movq %r13, %rax");
    gen.emit("    andq $15, %rax"); // local_i = round % 16
    gen.emit("    movq %r13, %rbx");
    gen.emit("    shrq $4, %rbx"); // group = round / 16

    let group1 = gen.fresh_label(".Lmd5_group1");
    let group2 = gen.fresh_label(".Lmd5_group2");
    let group3 = gen.fresh_label(".Lmd5_group3");
    let have_fg = gen.fresh_label(".Lmd5_have_fg");
    gen.emit("    cmpq $1, %rbx");
    gen.emit(format!("    je {}", group1));
    gen.emit("    cmpq $2, %rbx");
    gen.emit(format!("    je {}", group2));
    gen.emit("    cmpq $3, %rbx");
    gen.emit(format!("    je {}", group3));

    // Group 0: F(b,c,d) = (b & c) | (~b & d); g = local_i.
    gen.emit(format!("    movl {}(%rsp), %ecx", var_offset(1))); // b
    gen.emit(format!("    movl {}(%rsp), %edx", var_offset(2))); // c
    gen.emit(format!("    movl {}(%rsp), %esi", var_offset(3))); // d
    gen.emit("    movl %ecx, %r8d");
    gen.emit("    andl %edx, %r8d");
    gen.emit("    movl %ecx, %r9d");
    gen.emit("    notl %r9d");
    gen.emit("    andl %esi, %r9d");
    gen.emit("    orl %r9d, %r8d"); // F -> r8d
    gen.emit("    movq %rax, %r12"); // g = local_i
    gen.emit(format!("    jmp {}", have_fg));

    // Group 1: F(b,c,d) = (b & d) | (c & ~d); g = (5*local_i + 1) % 16.
    gen.emit_label(&group1);
    gen.emit(format!("    movl {}(%rsp), %ecx", var_offset(1))); // b
    gen.emit(format!("    movl {}(%rsp), %edx", var_offset(2))); // c
    gen.emit(format!("    movl {}(%rsp), %esi", var_offset(3))); // d
    gen.emit("    movl %ecx, %r8d");
    gen.emit("    andl %esi, %r8d");
    gen.emit("    movl %esi, %r9d");
    gen.emit("    notl %r9d");
    gen.emit("    andl %edx, %r9d");
    gen.emit("    orl %r9d, %r8d"); // F -> r8d
    gen.emit("    leaq 1(,%rax,5), %r12"); // 5*local_i + 1
    gen.emit("    andq $15, %r12");
    gen.emit(format!("    jmp {}", have_fg));

    // Group 2: F(b,c,d) = b ^ c ^ d; g = (3*local_i + 5) % 16.
    gen.emit_label(&group2);
    gen.emit(format!("    movl {}(%rsp), %ecx", var_offset(1))); // b
    gen.emit(format!("    movl {}(%rsp), %edx", var_offset(2))); // c
    gen.emit(format!("    movl {}(%rsp), %esi", var_offset(3))); // d
    gen.emit("    movl %ecx, %r8d");
    gen.emit("    xorl %edx, %r8d");
    gen.emit("    xorl %esi, %r8d"); // F -> r8d
    gen.emit("    leaq 5(,%rax,2), %r12"); // 2*local_i + 5
    gen.emit("    addq %rax, %r12"); // + local_i -> 3*local_i + 5
    gen.emit("    andq $15, %r12");
    gen.emit(format!("    jmp {}", have_fg));

    // Group 3: F(b,c,d) = c ^ (b | ~d); g = (7*local_i) % 16.
    gen.emit_label(&group3);
    gen.emit(format!("    movl {}(%rsp), %ecx", var_offset(1))); // b
    gen.emit(format!("    movl {}(%rsp), %edx", var_offset(2))); // c
    gen.emit(format!("    movl {}(%rsp), %esi", var_offset(3))); // d
    gen.emit("    movl %esi, %r8d");
    gen.emit("    notl %r8d");
    gen.emit("    orl %ecx, %r8d");
    gen.emit("    xorl %edx, %r8d"); // F -> r8d
    gen.emit("    leaq (%rax,%rax,2), %r12"); // 3*local_i
    gen.emit("    leaq (%r12,%rax,4), %r12"); // + 4*local_i = 7*local_i
    gen.emit("    andq $15, %r12");

    gen.emit_label(&have_fg);
    // f = F + a + K[round] + M[g]
    gen.emit(format!("    movl {}(%rsp), %r9d", var_offset(0))); // a
    gen.emit("    addl %r9d, %r8d");
    gen.emit(format!("    leaq {}(%rip), %rbp", T_LABEL));
    gen.emit("    movl (%rbp,%r13,4), %r9d");
    gen.emit("    addl %r9d, %r8d");
    gen.emit("    movl (%r15,%r12,4), %r9d"); // M[g]
    gen.emit("    addl %r9d, %r8d"); // f -> r8d

    // b = b + leftrotate(f, S[round])
    gen.emit(format!("    leaq {}(%rip), %rbp", S_LABEL));
    gen.emit("    movl (%rbp,%r13,4), %r9d");
    gen.emit("    movb %r9b, %cl"); // shift amount in %cl for roll
    gen.emit("    movl %r8d, %r10d");
    gen.emit("    roll %cl, %r10d");
    gen.emit(format!("    movl {}(%rsp), %r11d", var_offset(1))); // b
    gen.emit("    addl %r11d, %r10d"); // new_b

    // Cascade: new_a = d, new_d = c, new_c = b, new_b computed above.
    gen.emit(format!("    movl {}(%rsp), %eax", var_offset(3))); // d
    gen.emit(format!("    movl {}(%rsp), %ecx", var_offset(2))); // c
    gen.emit(format!("    movl %r11d, {}(%rsp)", var_offset(2))); // c = old b
    gen.emit(format!("    movl %ecx, {}(%rsp)", var_offset(3))); // d = old c
    gen.emit(format!("    movl %eax, {}(%rsp)", var_offset(0))); // a = old d
    gen.emit(format!("    movl %r10d, {}(%rsp)", var_offset(1))); // b = new_b

    gen.emit("    incq %r13");
    gen.emit(format!("    jmp {}", round_loop));
    gen.emit_label(&round_end);

    for i in 0..4i64 {
        gen.emit(format!("    movl {}(%rsp), %eax", var_offset(i)));
        gen.emit(format!("    addl %eax, {}(%r14)", i * 4));
    }

    gen.emit(format!("    addq ${}, %rsp", FRAME_SIZE));
    gen.emit("    popq %rbp");
    gen.emit("    popq %r15");
    gen.emit("    popq %r14");
    gen.emit("    popq %r13");
    gen.emit("    popq %r12");
    gen.emit("    popq %rbx");
    gen.emit("    ret");
}

/// `md5(ptr, len, out16)`. Never fails.
fn md5(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_constant_tables(gen);
    emit_compress(gen);

    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // ptr
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %r12"); // out ptr
    gen.emit("    popq %r13"); // len
    gen.emit("    popq %rbx"); // ptr

    gen.emit("    pushq %rbx");
    gen.emit("    pushq %r12");
    gen.emit("    pushq %r13");

    gen.emit("    subq $16, %rsp"); // running state
    gen.emit(format!("    movl $0x{:08X}, 0(%rsp)", A0));
    gen.emit(format!("    movl $0x{:08X}, 4(%rsp)", B0));
    gen.emit(format!("    movl $0x{:08X}, 8(%rsp)", C0));
    gen.emit(format!("    movl $0x{:08X}, 12(%rsp)", D0));

    gen.emit("    movq %r13, %rcx"); // remaining length
    let full_loop = gen.fresh_label(".Lmd5_full_loop");
    let full_end = gen.fresh_label(".Lmd5_full_end");
    gen.emit_label(&full_loop);
    gen.emit("    cmpq $64, %rcx");
    gen.emit(format!("    jl {}", full_end));
    gen.emit("    movq %rsp, %rdi");
    gen.emit("    movq %rbx, %rsi");
    gen.emit(format!("    call {}", COMPRESS_LABEL));
    gen.emit("    addq $64, %rbx");
    gen.emit("    subq $64, %rcx");
    gen.emit(format!("    jmp {}", full_loop));
    gen.emit_label(&full_end);

    // Padded final block(s): append 0x80, zero-fill, little-endian 64-bit
    // bit length at offset 56 of the last block.
    gen.emit("    subq $128, %rsp");
    gen.emit("    movq %rsp, %rdi");
    gen.emit("    xorq %rax, %rax");
    gen.emit("    movq $16, %r8");
    let zero_loop = gen.fresh_label(".Lmd5_zero_loop");
    let zero_end = gen.fresh_label(".Lmd5_zero_end");
    gen.emit_label(&zero_loop);
    gen.emit("    testq %r8, %r8");
    gen.emit(format!("    jz {}", zero_end));
    gen.emit("    movq %rax, (%rdi)");
    gen.emit("    addq $8, %rdi");
    gen.emit("    decq %r8");
    gen.emit(format!("    jmp {}", zero_loop));
    gen.emit_label(&zero_end);

    gen.emit("    movq %rsp, %rdi");
    gen.emit("    xorq %rdx, %rdx");
    let copy_loop = gen.fresh_label(".Lmd5_copy_loop");
    let copy_end = gen.fresh_label(".Lmd5_copy_end");
    gen.emit_label(&copy_loop);
    gen.emit("    cmpq %rcx, %rdx");
    gen.emit(format!("    jge {}", copy_end));
    gen.emit("    movb (%rbx,%rdx), %al");
    gen.emit("    movb %al, (%rdi,%rdx)");
    gen.emit("    incq %rdx");
    gen.emit(format!("    jmp {}", copy_loop));
    gen.emit_label(&copy_end);
    gen.emit("    movb $0x80, (%rdi,%rcx)");

    gen.emit("    movq $1, %r9");
    gen.emit("    leaq 9(%rcx), %rax");
    gen.emit("    cmpq $64, %rax");
    let two_blocks = gen.fresh_label(".Lmd5_two_blocks");
    let length_ready = gen.fresh_label(".Lmd5_length_ready");
    gen.emit(format!("    jg {}", two_blocks));
    gen.emit(format!("    jmp {}", length_ready));
    gen.emit_label(&two_blocks);
    gen.emit("    movq $2, %r9");
    gen.emit_label(&length_ready);

    gen.emit("    movq %r13, %rax");
    gen.emit("    shlq $3, %rax"); // bit length, little-endian (native)
    gen.emit("    movq %r9, %r10");
    gen.emit("    decq %r10");
    gen.emit("    imulq $64, %r10");
    gen.emit("    addq $56, %r10");
    gen.emit("    movq %rax, (%rdi,%r10)");

    gen.emit("    movq %rdi, %r14");
    gen.emit("    xorq %r15, %r15");
    let pad_loop = gen.fresh_label(".Lmd5_pad_loop");
    let pad_end = gen.fresh_label(".Lmd5_pad_end");
    gen.emit_label(&pad_loop);
    gen.emit("    cmpq %r9, %r15");
    gen.emit(format!("    jge {}", pad_end));
    gen.emit("    movq %rsp, %rdi");
    gen.emit("    movq %r15, %rax");
    gen.emit("    imulq $64, %rax");
    gen.emit("    leaq (%r14,%rax), %rsi");
    gen.emit(format!("    call {}", COMPRESS_LABEL));
    gen.emit("    incq %r15");
    gen.emit(format!("    jmp {}", pad_loop));
    gen.emit_label(&pad_end);

    gen.emit("    addq $128, %rsp");

    // Write the 16-byte little-endian digest.
    gen.emit("    movl 0(%rsp), %eax");
    gen.emit("    movl %eax, 0(%r12)");
    gen.emit("    movl 4(%rsp), %eax");
    gen.emit("    movl %eax, 4(%r12)");
    gen.emit("    movl 8(%rsp), %eax");
    gen.emit("    movl %eax, 8(%r12)");
    gen.emit("    movl 12(%rsp), %eax");
    gen.emit("    movl %eax, 12(%r12)");

    gen.emit("    addq $16, %rsp");
    gen.emit("    popq %r13");
    gen.emit("    popq %r12");
    gen.emit("    popq %rbx");
    gen.emit("    movq %r12, %rax");
    Ok(())
}
