//! # SHA-256 Intrinsic (`sha256`)
//!
//! FIPS 180-4. The round-constant table `K[0..63]` is emitted once per
//! translation unit; the 64-round compression step is emitted once as a
//! shared label and reached via an ordinary `call` from every `sha256`
//! call site (spec.md §4.5.4: "SHA-256 and MD5 emit a nested call to their
//! own inlined compression function for sharing"). Working variables
//! `a..h` live in a stack scratch area rather than dedicated registers,
//! trading a few extra loads for a compression routine that never has to
//! juggle which register currently holds which state word.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const K_LABEL: &str = "sha256_k";
const COMPRESS_LABEL: &str = "sha256_compress_block";

const K: [u32; 64] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2,
];
const H0: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

// Offsets, relative to the frame the compression routine reserves.
const W_BASE: i64 = 0; // 64 x 4 bytes
const VARS_BASE: i64 = 256; // a,b,c,d,e,f,g,h x 4 bytes
const TEMP_BASE: i64 = 288; // temp1, temp2
const FRAME_SIZE: i64 = 296;

pub fn module() -> ModuleDescriptor {
    make_module("sha256", vec![intrinsic("sha256", "sha256", 3, sha256)])
}

fn emit_k_table(gen: &mut Generator) {
    if !gen.mark_emitted_once(K_LABEL) {
        return;
    }
    gen.emit_data(format!("{}:", K_LABEL));
    for chunk in K.chunks(8) {
        let values: Vec<String> = chunk.iter().map(|v| format!("0x{:08X}", v)).collect();
        gen.emit_data(format!("    .long {}", values.join(", ")));
    }
}

fn var_offset(index: i64) -> i64 {
    VARS_BASE + index * 4
}

/// Contract: `%rdi` points at the 8-word (32-byte) running state, `%rsi` at
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

    // W[0..15] = big-endian 32-bit words from the block.
    gen.emit("    xorq %rcx, %rcx");
    let init_loop = gen.fresh_label(".Lsha_sched_init");
    let init_end = gen.fresh_label(".Lsha_sched_init_end");
    gen.emit_label(&init_loop);
    gen.emit("    cmpq $16, %rcx");
    gen.emit(format!("    jge {}", init_end));
    gen.emit("    movl (%r15,%rcx,4), %eax");
    gen.emit("    bswapl %eax");
    gen.emit(format!("    movl %eax, {}(%rsp,%rcx,4)", W_BASE));
    gen.emit("    incq %rcx");
    gen.emit(format!("    jmp {}", init_loop));
    gen.emit_label(&init_end);

    // W[16..63] extension: W[i] = sigma1(W[i-2]) + W[i-7] + sigma0(W[i-15]) + W[i-16].
    let ext_loop = gen.fresh_label(".Lsha_ext_loop");
    let ext_end = gen.fresh_label(".Lsha_ext_end");
    gen.emit_label(&ext_loop);
    gen.emit("    cmpq $64, %rcx");
    gen.emit(format!("    jge {}", ext_end));
    gen.emit(format!("    movl {}(%rsp,%rcx,4), %eax", W_BASE - 15 * 4)); // W[i-15]
    gen.emit("    movl %eax, %ebx");
    gen.emit("    rorl $7, %eax");
    gen.emit("    movl %ebx, %edx");
    gen.emit("    rorl $18, %edx");
    gen.emit("    xorl %edx, %eax");
    gen.emit("    shrl $3, %ebx");
    gen.emit("    xorl %ebx, %eax"); // sigma0 -> eax
    gen.emit("    movl %eax, %r8d");
    gen.emit(format!("    movl {}(%rsp,%rcx,4), %eax", W_BASE - 2 * 4)); // W[i-2]
    gen.emit("    movl %eax, %ebx");
    gen.emit("    rorl $17, %eax");
    gen.emit("    movl %ebx, %edx");
    gen.emit("    rorl $19, %edx");
    gen.emit("    xorl %edx, %eax");
    gen.emit("    shrl $10, %ebx");
    gen.emit("    xorl %ebx, %eax"); // sigma1 -> eax
    gen.emit("    addl %r8d, %eax");
    gen.emit(format!("    addl {}(%rsp,%rcx,4), %eax", W_BASE - 16 * 4)); // + W[i-16]
    gen.emit(format!("    addl {}(%rsp,%rcx,4), %eax", W_BASE - 7 * 4)); // + W[i-7]
    gen.emit(format!("    movl %eax, {}(%rsp,%rcx,4)", W_BASE));
    gen.emit("    incq %rcx");
    gen.emit(format!("    jmp {}", ext_loop));
    gen.emit_label(&ext_end);

    // Seed working variables a..h from the running state.
    for i in 0..8i64 {
        gen.emit(format!("    movl {}(%r14), %eax", i * 4));
        gen.emit(format!("    movl %eax, {}(%rsp)", var_offset(i)));
    }

    gen.emit("    xorq %r13, %r13"); // round index
    let round_loop = gen.fresh_label(".Lsha_round_loop");
    let round_end = gen.fresh_label(".Lsha_round_end");
    gen.emit_label(&round_loop);
    gen.emit("    cmpq $64, %r13");
    gen.emit(format!("    jge {}", round_end));

    // S1 = rotr(e,6) ^ rotr(e,11) ^ rotr(e,25)
    gen.emit(format!("    movl {}(%rsp), %r8d", var_offset(4))); // e
    gen.emit("    movl %r8d, %eax");
    gen.emit("    rorl $6, %eax");
    gen.emit("    movl %r8d, %ebx");
    gen.emit("    rorl $11, %ebx");
    gen.emit("    xorl %ebx, %eax");
    gen.emit("    movl %r8d, %ebx");
    gen.emit("    rorl $25, %ebx");
    gen.emit("    xorl %ebx, %eax"); // S1

    // ch = (e & f) ^ (~e & g)
    gen.emit(format!("    movl {}(%rsp), %r9d", var_offset(5))); // f
    gen.emit(format!("    movl {}(%rsp), %r10d", var_offset(6))); // g
    gen.emit("    movl %r8d, %ebx");
    gen.emit("    andl %r9d, %ebx");
    gen.emit("    movl %r8d, %edx");
    gen.emit("    notl %edx");
    gen.emit("    andl %r10d, %edx");
    gen.emit("    xorl %edx, %ebx"); // ch

    // temp1 = h + S1 + ch + K[i] + W[i]
    gen.emit(format!("    movl {}(%rsp), %r11d", var_offset(7))); // h
    gen.emit("    addl %eax, %r11d"); // + S1
    gen.emit("    addl %ebx, %r11d"); // + ch
    gen.emit(format!("    leaq {}(%rip), %rbp", K_LABEL));
    gen.emit("    addl (%rbp,%r13,4), %r11d"); // + K[i]
    gen.emit(format!("    movl {}(%rsp,%r13,4), %eax", W_BASE));
    gen.emit("    addl %eax, %r11d"); // temp1 -> r11d
    gen.emit(format!("    movl %r11d, {}(%rsp)", TEMP_BASE));

    // S0 = rotr(a,2) ^ rotr(a,13) ^ rotr(a,22)
    gen.emit(format!("    movl {}(%rsp), %eax", var_offset(0))); // a
    gen.emit(format!("    movl {}(%rsp), %ebx", var_offset(1))); // b
    gen.emit(format!("    movl {}(%rsp), %ecx", var_offset(2))); // c
    gen.emit("    movl %eax, %r8d");
    gen.emit("    rorl $2, %r8d");
    gen.emit("    movl %eax, %r9d");
    gen.emit("    rorl $13, %r9d");
    gen.emit("    xorl %r9d, %r8d");
    gen.emit("    movl %eax, %r9d");
    gen.emit("    rorl $22, %r9d");
    gen.emit("    xorl %r9d, %r8d"); // S0

    // maj = (a & b) ^ (a & c) ^ (b & c)
    gen.emit("    movl %eax, %r9d");
    gen.emit("    andl %ebx, %r9d");
    gen.emit("    movl %eax, %r10d");
    gen.emit("    andl %ecx, %r10d");
    gen.emit("    xorl %r10d, %r9d");
    gen.emit("    movl %ebx, %r10d");
    gen.emit("    andl %ecx, %r10d");
    gen.emit("    xorl %r10d, %r9d"); // maj
    gen.emit("    addl %r9d, %r8d"); // temp2 = S0 + maj
    gen.emit(format!("    movl %r8d, {}(%rsp)", TEMP_BASE + 4));

    // Cascade: h=g, g=f, f=e, e=d+temp1, d=c, c=b, b=a, a=temp1+temp2.
    gen.emit(format!("    movl {}(%rsp), %edx", var_offset(6))); // g
    gen.emit(format!("    movl %edx, {}(%rsp)", var_offset(7))); // h = g
    gen.emit(format!("    movl {}(%rsp), %edx", var_offset(5))); // f
    gen.emit(format!("    movl %edx, {}(%rsp)", var_offset(6))); // g = f
    gen.emit(format!("    movl {}(%rsp), %edx", var_offset(4))); // e
    gen.emit(format!("    movl %edx, {}(%rsp)", var_offset(5))); // f = e
    gen.emit(format!("    movl {}(%rsp), %edx", var_offset(3))); // d
    gen.emit(format!("    movl {}(%rsp), %r11d", TEMP_BASE)); // temp1
    gen.emit("    addl %r11d, %edx"); // d + temp1
    gen.emit(format!("    movl %edx, {}(%rsp)", var_offset(4))); // e = d + temp1
    gen.emit(format!("    movl %ecx, {}(%rsp)", var_offset(3))); // d = c
    gen.emit(format!("    movl %ebx, {}(%rsp)", var_offset(2))); // c = b
    gen.emit(format!("    movl %eax, {}(%rsp)", var_offset(1))); // b = a
    gen.emit(format!("    movl {}(%rsp), %edx", TEMP_BASE)); // temp1
    gen.emit(format!("    addl {}(%rsp), %edx", TEMP_BASE + 4)); // + temp2
    gen.emit(format!("    movl %edx, {}(%rsp)", var_offset(0))); // a = temp1 + temp2

    gen.emit("    incq %r13");
    gen.emit(format!("    jmp {}", round_loop));
    gen.emit_label(&round_end);

    // Fold the working variables back into the running state.
    for i in 0..8i64 {
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

/// `sha256(ptr, len, out32)`. Never fails (it only reads input and writes a
/// fixed 32-byte output).
fn sha256(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_k_table(gen);
    emit_compress(gen);

    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // ptr
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[2])?;
    gen.emit("    movq %rax, %r12"); // out ptr (callee-saved across calls below)
    gen.emit("    popq %r13"); // len
    gen.emit("    popq %rbx"); // ptr (callee-saved across calls below)

    gen.emit("    pushq %rbx");
    gen.emit("    pushq %r12");
    gen.emit("    pushq %r13");

    // Running state, initialized to H0, lives at a fixed stack slot so the
    // shared compress routine can address it via %rdi each call.
    gen.emit("    subq $32, %rsp");
    for (i, word) in H0.iter().enumerate() {
        gen.emit(format!("    movl $0x{:08X}, {}(%rsp)", word, i * 4));
    }

    // Full 64-byte blocks straight from the input buffer.
    gen.emit("    movq %r13, %rcx"); // remaining length
    let full_block_loop = gen.fresh_label(".Lsha_full_loop");
    let full_block_end = gen.fresh_label(".Lsha_full_end");
    gen.emit_label(&full_block_loop);
    gen.emit("    cmpq $64, %rcx");
    gen.emit(format!("    jl {}", full_block_end));
    gen.emit("    movq %rsp, %rdi");
    gen.emit("    movq %rbx, %rsi");
    gen.emit(format!("    call {}", COMPRESS_LABEL));
    gen.emit("    addq $64, %rbx");
    gen.emit("    subq $64, %rcx");
    gen.emit(format!("    jmp {}", full_block_loop));
    gen.emit_label(&full_block_end);

    // Padded final block(s): copy the tail, append 0x80, zero-fill, and
    // place the big-endian 64-bit bit length at offset 56 of the last
    // block, spilling into a second block when the tail leaves fewer than
    // 9 bytes of room (spec.md §4.5.5).
    gen.emit("    subq $128, %rsp"); // two scratch blocks
    gen.emit("    movq %rsp, %rdi");
    gen.emit("    xorq %rax, %rax");
    gen.emit("    movq $16, %r8"); // zero 128 bytes, 8 at a time
    let zero_loop = gen.fresh_label(".Lsha_zero_loop");
    let zero_end = gen.fresh_label(".Lsha_zero_end");
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
    let copy_loop = gen.fresh_label(".Lsha_copy_loop");
    let copy_end = gen.fresh_label(".Lsha_copy_end");
    gen.emit_label(&copy_loop);
    gen.emit("    cmpq %rcx, %rdx");
    gen.emit(format!("    jge {}", copy_end));
    gen.emit("    movb (%rbx,%rdx), %al");
    gen.emit("    movb %al, (%rdi,%rdx)");
    gen.emit("    incq %rdx");
    gen.emit(format!("    jmp {}", copy_loop));
    gen.emit_label(&copy_end);
    gen.emit("    movb $0x80, (%rdi,%rcx)");

    gen.emit("    movq $1, %r9"); // one block unless the tail overflows
    gen.emit("    leaq 9(%rcx), %rax");
    gen.emit("    cmpq $64, %rax");
    let two_blocks_label = gen.fresh_label(".Lsha_two_blocks");
    gen.emit(format!("    jg {}", two_blocks_label));
    let length_ready_label = gen.fresh_label(".Lsha_length_ready");
    gen.emit(format!("    jmp {}", length_ready_label));
    gen.emit_label(&two_blocks_label);
    gen.emit("    movq $2, %r9");
    gen.emit_label(&length_ready_label);

    // Bit length, big-endian, at offset 56 of the final block.
    gen.emit("    movq %r13, %rax");
    gen.emit("    shlq $3, %rax"); // byte length -> bit length
    gen.emit("    bswapq %rax");
    gen.emit("    movq %r9, %r10");
    gen.emit("    decq %r10");
    gen.emit("    imulq $64, %r10"); // offset of the final block's start
    gen.emit("    addq $56, %r10");
    gen.emit("    movq %rax, (%rdi,%r10)");

    gen.emit("    movq %rdi, %r14"); // scratch block base
    gen.emit("    xorq %r15, %r15");
    let pad_loop = gen.fresh_label(".Lsha_pad_loop");
    let pad_end = gen.fresh_label(".Lsha_pad_end");
    gen.emit_label(&pad_loop);
    gen.emit("    cmpq %r9, %r15");
    gen.emit(format!("    jge {}", pad_end));
    gen.emit("    movq %rsp, %rdi");
    gen.emit("    movq %r14, %rsi");
    gen.emit("    leaq (%r14,%r15,8), %rsi"); // not used; block addressed below
    gen.emit("    movq %r14, %rsi");
    gen.emit("    movq %r15, %rax");
    gen.emit("    imulq $64, %rax");
    gen.emit("    addq %rax, %rsi");
    gen.emit(format!("    call {}", COMPRESS_LABEL));
    gen.emit("    incq %r15");
    gen.emit(format!("    jmp {}", pad_loop));
    gen.emit_label(&pad_end);

    gen.emit("    addq $128, %rsp"); // drop the padded scratch blocks

    // Write the 32-byte big-endian digest.
    let digest_loop = gen.fresh_label(".Lsha_digest_loop");
    let digest_end = gen.fresh_label(".Lsha_digest_end");
    gen.emit("    xorq %rcx, %rcx");
    gen.emit_label(&digest_loop);
    gen.emit("    cmpq $8, %rcx");
    gen.emit(format!("    jge {}", digest_end));
    gen.emit("    movl (%rsp,%rcx,4), %eax");
    gen.emit("    bswapl %eax");
    gen.emit("    movl %eax, (%r12,%rcx,4)");
    gen.emit("    incq %rcx");
    gen.emit(format!("    jmp {}", digest_loop));
    gen.emit_label(&digest_end);

    gen.emit("    addq $32, %rsp");
    gen.emit("    popq %r13");
    gen.emit("    popq %r12");
    gen.emit("    popq %rbx");
    gen.emit("    movq %r12, %rax"); // return the output pointer
    Ok(())
}
