//! # Hashing Intrinsics (`hash`)
//!
//! CRC32 (IEEE 802.3, table-driven), FNV-1a, DJB2, and 32-bit MurmurHash3
//! (spec.md §4.5.5, §8.8-9). The CRC32 table is a per-translation-unit
//! constant emitted at most once, guarded by the emitted-label set.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const CRC32_TABLE_LABEL: &str = "crc32_table";

pub fn module() -> ModuleDescriptor {
    make_module(
        "hash",
        vec![
            intrinsic("crc32", "hash", 2, crc32),
            intrinsic("fnv1a", "hash", 2, fnv1a),
            intrinsic("djb2", "hash", 1, djb2),
            intrinsic("murmur", "hash", 3, murmur),
        ],
    )
}

/// Emits the 256-entry IEEE 802.3 CRC32 table exactly once per translation
/// unit.
fn emit_crc32_table(gen: &mut Generator) {
    if !gen.mark_emitted_once(CRC32_TABLE_LABEL) {
        return;
    }
    let mut entries = Vec::with_capacity(256);
    for byte in 0u32..256 {
        let mut crc = byte;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
        entries.push(crc);
    }
    gen.emit_data(format!("{}:", CRC32_TABLE_LABEL));
    for chunk in entries.chunks(8) {
        let values: Vec<String> = chunk.iter().map(|v| format!("0x{:08X}", v)).collect();
        gen.emit_data(format!("    .long {}", values.join(", ")));
    }
}

/// `crc32(ptr, len)`.
fn crc32(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_crc32_table(gen);
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // ptr
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %rcx"); // len
    gen.emit("    popq %rsi"); // ptr
    gen.emit("    movq $0xFFFFFFFF, %rax");

    let loop_label = gen.fresh_label(".Lcrc32_loop");
    let end_label = gen.fresh_label(".Lcrc32_end");
    gen.emit_label(&loop_label);
    gen.emit("    testq %rcx, %rcx");
    gen.emit(format!("    jz {}", end_label));
    gen.emit("    movzbl (%rsi), %edx");
    gen.emit("    xorl %eax, %edx");
    gen.emit("    andl $0xFF, %edx");
    gen.emit(format!("    leaq {}(%rip), %r8", CRC32_TABLE_LABEL));
    gen.emit("    movl (%r8,%rdx,4), %edx");
    gen.emit("    shrl $8, %eax");
    gen.emit("    xorl %edx, %eax");
    gen.emit("    incq %rsi");
    gen.emit("    decq %rcx");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    gen.emit("    xorl $0xFFFFFFFF, %eax");
    Ok(())
}

/// 64-bit FNV-1a over `(ptr, len)` with the standard offset basis and prime.
fn fnv1a(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax");
    generate_expression(gen, &args[1])?;
    gen.emit("    movq %rax, %rcx");
    gen.emit("    popq %rsi");
    gen.emit("    movq $0xcbf29ce484222325, %rax"); // offset basis

    let loop_label = gen.fresh_label(".Lfnv1a_loop");
    let end_label = gen.fresh_label(".Lfnv1a_end");
    gen.emit_label(&loop_label);
    gen.emit("    testq %rcx, %rcx");
    gen.emit(format!("    jz {}", end_label));
    gen.emit("    movzbq (%rsi), %rdx");
    gen.emit("    xorq %rdx, %rax");
    gen.emit("    movq $0x100000001b3, %rdx"); // FNV prime
    gen.emit("    imulq %rdx, %rax");
    gen.emit("    incq %rsi");
    gen.emit("    decq %rcx");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    Ok(())
}

/// `djb2(str)`: `hash = hash * 33 + c` over a NUL-terminated string,
/// starting from `5381` (spec.md §8.4 KAT: `djb2("hello") == 210714636441`).
fn djb2(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    movq %rax, %rsi");
    gen.emit("    movq $5381, %rax");

    let loop_label = gen.fresh_label(".Ldjb2_loop");
    let end_label = gen.fresh_label(".Ldjb2_end");
    gen.emit_label(&loop_label);
    gen.emit("    movzbq (%rsi), %rdx");
    gen.emit("    testq %rdx, %rdx");
    gen.emit(format!("    jz {}", end_label));
    gen.emit("    movq %rax, %rcx");
    gen.emit("    shlq $5, %rcx"); // hash * 32
    gen.emit("    addq %rcx, %rax"); // hash * 33
    gen.emit("    addq %rdx, %rax");
    gen.emit("    incq %rsi");
    gen.emit(format!("    jmp {}", loop_label));
    gen.emit_label(&end_label);
    Ok(())
}

/// 32-bit MurmurHash3 over `(ptr, len, seed)` with the canonical constants.
fn murmur(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    pushq %rax"); // ptr
    generate_expression(gen, &args[1])?;
    gen.emit("    pushq %rax"); // len
    generate_expression(gen, &args[2])?;
    gen.emit("    movl %eax, %r9d"); // seed / running hash
    gen.emit("    popq %rcx"); // len
    gen.emit("    popq %rsi"); // ptr
    gen.emit("    movq %rcx, %r8"); // len kept for the tail

    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let body_loop = gen.fresh_label(".Lmurmur_body");
    let body_end = gen.fresh_label(".Lmurmur_body_end");
    gen.emit_label(&body_loop);
    gen.emit("    cmpq $4, %rcx");
    gen.emit(format!("    jl {}", body_end));
    gen.emit("    movl (%rsi), %eax");
    gen.emit(format!("    imull ${}, %eax, %eax", C1 as i32));
    gen.emit("    roll $15, %eax");
    gen.emit(format!("    imull ${}, %eax, %eax", C2 as i32));
    gen.emit("    xorl %eax, %r9d");
    gen.emit("    roll $13, %r9d");
    gen.emit("    leal (%r9,%r9,4), %eax"); // h*5
    gen.emit("    addl $0xe6546b64, %eax");
    gen.emit("    movl %eax, %r9d");
    gen.emit("    addq $4, %rsi");
    gen.emit("    subq $4, %rcx");
    gen.emit(format!("    jmp {}", body_loop));
    gen.emit_label(&body_end);

    // Tail: remaining 1-3 bytes, little-endian packed, no final `h ^= k1`
    // before the block mix (MurmurHash3's tail handling).
    gen.emit("    xorl %r10d, %r10d"); // k1 accumulator
    gen.emit("    movq %rcx, %r11");
    let tail_3 = gen.fresh_label(".Lmurmur_tail3");
    let tail_2 = gen.fresh_label(".Lmurmur_tail2");
    let tail_1 = gen.fresh_label(".Lmurmur_tail1");
    let tail_done = gen.fresh_label(".Lmurmur_tail_done");
    gen.emit("    cmpq $3, %r11");
    gen.emit(format!("    jl {}", tail_2));
    gen.emit_label(&tail_3);
    gen.emit("    movzbl 2(%rsi), %eax");
    gen.emit("    shll $16, %eax");
    gen.emit("    orl %eax, %r10d");
    gen.emit_label(&tail_2);
    gen.emit("    cmpq $2, %r11");
    gen.emit(format!("    jl {}", tail_1));
    gen.emit("    movzbl 1(%rsi), %eax");
    gen.emit("    shll $8, %eax");
    gen.emit("    orl %eax, %r10d");
    gen.emit_label(&tail_1);
    gen.emit("    cmpq $1, %r11");
    gen.emit(format!("    jl {}", tail_done));
    gen.emit("    movzbl (%rsi), %eax");
    gen.emit("    orl %eax, %r10d");
    gen.emit_label(&tail_done);
    gen.emit("    testq %r11, %r11");
    let finalize_label = gen.fresh_label(".Lmurmur_finalize");
    gen.emit(format!("    jz {}", finalize_label));
    gen.emit(format!("    imull ${}, %r10d, %r10d", C1 as i32));
    gen.emit("    roll $15, %r10d");
    gen.emit(format!("    imull ${}, %r10d, %r10d", C2 as i32));
    gen.emit("    xorl %r10d, %r9d");
    gen.emit_label(&finalize_label);

    // Finalization mix.
    gen.emit("    xorl %r8d, %r9d"); // h ^= len
    gen.emit("    movl %r9d, %eax");
    gen.emit("    shrl $16, %eax");
    gen.emit("    xorl %eax, %r9d");
    gen.emit("    imull $0x85ebca6b, %r9d, %r9d");
    gen.emit("    movl %r9d, %eax");
    gen.emit("    shrl $13, %eax");
    gen.emit("    xorl %eax, %r9d");
    gen.emit("    imull $0xc2b2ae35, %r9d, %r9d");
    gen.emit("    movl %r9d, %eax");
    gen.emit("    shrl $16, %eax");
    gen.emit("    xorl %eax, %r9d");
    gen.emit("    movl %r9d, %eax");
    Ok(())
}
