//! # Intrinsic Call Dispatch
//!
//! `FunctionCall(name, args)` is resolved through the translation unit's
//! import context first; a hit dispatches straight to the intrinsic's
//! expander with no `call` instruction emitted (spec.md §4.5.4). A miss
//! falls back to an ordinary SysV call to a user-defined function.

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry;
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const ARG_REGISTERS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

pub fn generate_call(
    gen: &mut Generator,
    name: &str,
    args: &[Expression],
    location: SourceLocation,
) -> Result<(), CompileError> {
    if let Some((module_name, item_name)) = gen.imports.resolve_call(name) {
        let descriptor = registry::lookup(module_name, item_name).expect(
            "import resolution only binds names the registry already validated",
        );

        if descriptor.arity >= 0 && descriptor.arity as usize != args.len() {
            log::warn!(
                "`{}.{}` called with {} argument(s), expected {} — expanding to zero",
                module_name,
                item_name,
                args.len(),
                descriptor.arity
            );
            gen.emit("    xorq %rax, %rax");
            return Ok(());
        }

        return (descriptor.expander)(gen, args, location);
    }

    generate_user_call(gen, name, args)
}

/// An ordinary SysV call. Arguments are evaluated right-to-left onto the
/// stack so that after all pushes the stack reads `arg0` on top, `argN-1` at
/// the bottom — popping the first six in that order fills the argument
/// registers correctly, and anything left over (beyond six) stays on the
/// stack in the order the callee's own prologue expects.
fn generate_user_call(
    gen: &mut Generator,
    name: &str,
    args: &[Expression],
) -> Result<(), CompileError> {
    // An odd number of stack args leaves %rsp 8 bytes short of the 16-byte
    // alignment `call` requires (spec.md §6/§4.5.1); pad below the stack
    // args (pushed before any of them) so it doesn't shift their offsets
    // from the callee's `%rbp`.
    let stack_args = args.len().saturating_sub(ARG_REGISTERS.len());
    let needs_padding = stack_args % 2 == 1;
    if needs_padding {
        gen.emit("    subq $8, %rsp");
    }

    for arg in args.iter().rev() {
        generate_expression(gen, arg)?;
        gen.emit("    pushq %rax");
    }

    let register_args = args.len().min(ARG_REGISTERS.len());
    for register in ARG_REGISTERS.iter().take(register_args) {
        gen.emit(format!("    popq {}", register));
    }

    gen.emit(format!("    call {}", name));

    if args.len() > ARG_REGISTERS.len() {
        let mut extra = stack_args as u64 * 8;
        if needs_padding {
            extra += 8;
        }
        gen.emit(format!("    addq ${}, %rsp", extra));
    }

    Ok(())
}
