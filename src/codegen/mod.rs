//! # Code Generator
//!
//! Top-level orchestration (spec.md §4.5, §6): walk the program's top-level
//! `FunctionDefinition` statements, emit one prologue/body/epilogue per
//! function, and emit the `_start` trampoline that calls `main` and exits
//! with its return value in `rax`.

pub mod dispatch;
pub mod expressions;
pub mod intrinsics;
pub mod print;
pub mod registry;
pub mod state;
pub mod statements;

use crate::ast::nodes::{Param, Program, Statement};
use crate::compiler::error::CompileError;
use crate::compiler::resolver::ImportContext;
use state::Generator;
use statements::generate_block;

const SYS_EXIT: i64 = 60;
const ARG_REGISTERS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Generates the full GNU-assembler text for one translation unit.
pub fn generate(program: &Program, imports: &ImportContext) -> Result<String, CompileError> {
    let mut gen = Generator::new(imports.clone());

    gen.emit("_start:");
    gen.emit("    call main");
    gen.emit("    movq %rax, %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_EXIT));
    gen.emit("    syscall");

    for statement in &program.statements {
        if let Statement::FunctionDefinition {
            name, params, body, ..
        } = statement
        {
            generate_function(&mut gen, name, params, body)?;
        }
    }

    let mut output = String::new();
    output.push_str(".section .data\n");
    output.push_str(&gen.data);
    output.push_str(".section .text\n");
    output.push_str(".globl _start\n");
    output.push_str(&gen.text);
    Ok(output)
}

/// Emits one function's prologue, body, and epilogue. The frame size needed
/// for `subq $N, %rsp` isn't known until the whole body has been walked (it
/// grows with every `VariableDeclaration`), so the body is generated first
/// and the prologue is spliced in at `mark` once `aligned_frame_size` is
/// final (spec.md §4.5.1).
fn generate_function(
    gen: &mut Generator,
    name: &str,
    params: &[Param],
    body: &[Statement],
) -> Result<(), CompileError> {
    gen.enter_function_frame();
    gen.emit_label(name);
    let mark = gen.text.len();

    for (i, param) in params.iter().enumerate() {
        let offset = gen.declare_variable(&param.name, param.ty);
        if i < ARG_REGISTERS.len() {
            gen.emit(format!("    movq {}, -{}(%rbp)", ARG_REGISTERS[i], offset));
        } else {
            let stack_offset = 16 + (i - ARG_REGISTERS.len()) * 8;
            gen.emit(format!("    movq {}(%rbp), %rax", stack_offset));
            gen.emit(format!("    movq %rax, -{}(%rbp)", offset));
        }
    }

    generate_block(gen, body)?;

    // Fallthrough epilogue for a body that doesn't end in an explicit
    // `return` (spec.md §4.5.3 only specifies what `Return` lowers to).
    gen.emit("    xorq %rax, %rax");
    gen.emit("    leave");
    gen.emit("    ret");

    let prologue = format!(
        "    pushq %rbp\n    movq %rsp, %rbp\n    subq ${}, %rsp\n",
        gen.aligned_frame_size()
    );
    gen.text.insert_str(mark, &prologue);
    Ok(())
}
