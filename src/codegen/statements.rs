//! # Statement Code Generation
//!
//! Lowers each [`Statement`] variant per spec.md §4.5.3.

use crate::ast::nodes::{CompoundOperator, Expression, Statement};
use crate::codegen::expressions::generate_expression;
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

pub fn generate_statement(gen: &mut Generator, statement: &Statement) -> Result<(), CompileError> {
    match statement {
        Statement::VariableDeclaration {
            name, ty, value, ..
        }
        | Statement::ConstantDeclaration {
            name, ty, value, ..
        } => {
            generate_expression(gen, value)?;
            let offset = gen.declare_variable(name, *ty);
            gen.emit(format!("    movq %rax, -{}(%rbp)", offset));
            if let Expression::Str(s, _) = value.as_ref() {
                gen.record_string_length(name, s.len() as u64);
            }
            Ok(())
        }
        Statement::Assignment { target, value, .. } => generate_assignment(gen, target, value),
        Statement::CompoundAssignment {
            target,
            operator,
            value,
            ..
        } => generate_compound_assignment(gen, target, *operator, value),
        Statement::ExpressionStatement { expression, .. } => {
            generate_expression(gen, expression)?;
            Ok(())
        }
        Statement::ReturnStatement { value, .. } => {
            match value {
                Some(v) => {
                    generate_expression(gen, v)?;
                }
                None => gen.emit("    xorq %rax, %rax"),
            }
            gen.emit("    leave");
            gen.emit("    ret");
            Ok(())
        }
        Statement::IfStatement {
            condition,
            then_body,
            else_body,
            ..
        } => generate_if(gen, condition, then_body, else_body.as_deref()),
        Statement::WhileLoop {
            condition, body, ..
        } => generate_while(gen, condition, body),
        Statement::ForLoop {
            init,
            condition,
            update,
            body,
            ..
        } => generate_for(gen, init.as_deref(), condition.as_deref(), update.as_deref(), body),
        Statement::FunctionDefinition { .. } => {
            // Top-level function bodies are generated by `codegen::program`
            // in a separate pass; nested function definitions are not part
            // of the language.
            Ok(())
        }
        Statement::TryStatement {
            try_block,
            catch_clauses,
            finally_block,
            ..
        } => generate_try(gen, try_block, catch_clauses, finally_block.as_deref()),
        Statement::ImportStatement { .. } => Ok(()),
    }
}

pub fn generate_block(gen: &mut Generator, body: &[Statement]) -> Result<(), CompileError> {
    gen.push_scope();
    for statement in body {
        generate_statement(gen, statement)?;
    }
    gen.pop_scope();
    Ok(())
}

/// Computes the store target's address into `%r11` for an `ArrayAccess`, or
/// returns the variable's frame offset for an `Identifier`.
enum Target {
    Variable(i64),
    /// Address already materialized in `%r11`.
    Memory,
}

fn resolve_target(gen: &mut Generator, target: &Expression) -> Result<Target, CompileError> {
    match target {
        Expression::Identifier(name, location) => match gen.lookup_variable(name) {
            Some(slot) => Ok(Target::Variable(slot.offset)),
            None => Err(CompileError::syntax(
                *location,
                format!("assignment to undeclared identifier `{}`", name),
            )),
        },
        Expression::ArrayAccess { array, index, .. } => {
            generate_expression(gen, array)?;
            gen.emit("    pushq %rax");
            generate_expression(gen, index)?;
            gen.emit("    movq %rax, %rcx");
            gen.emit("    popq %rax");
            gen.emit("    leaq (%rax,%rcx,8), %r11");
            Ok(Target::Memory)
        }
        other => Err(CompileError::syntax(
            other.location(),
            "invalid assignment target",
        )),
    }
}

fn store_rax(gen: &mut Generator, target: &Target) {
    match target {
        Target::Variable(offset) => gen.emit(format!("    movq %rax, -{}(%rbp)", offset)),
        Target::Memory => gen.emit("    movq %rax, (%r11)"),
    }
}

fn load_into_rax(gen: &mut Generator, target: &Target) {
    match target {
        Target::Variable(offset) => gen.emit(format!("    movq -{}(%rbp), %rax", offset)),
        Target::Memory => gen.emit("    movq (%r11), %rax"),
    }
}

fn generate_assignment(
    gen: &mut Generator,
    target_expr: &Expression,
    value: &Expression,
) -> Result<(), CompileError> {
    // Array targets must compute their address before the RHS is evaluated
    // into %rax, else the RHS evaluation would clobber the base/index
    // registers used to form the address.
    if matches!(target_expr, Expression::ArrayAccess { .. }) {
        let target = resolve_target(gen, target_expr)?;
        gen.emit("    pushq %r11");
        generate_expression(gen, value)?;
        gen.emit("    popq %r11");
        store_rax(gen, &target);
        return Ok(());
    }

    generate_expression(gen, value)?;
    let target = resolve_target(gen, target_expr)?;
    store_rax(gen, &target);
    Ok(())
}

fn generate_compound_assignment(
    gen: &mut Generator,
    target_expr: &Expression,
    operator: CompoundOperator,
    value: &Expression,
) -> Result<(), CompileError> {
    let target = if matches!(target_expr, Expression::ArrayAccess { .. }) {
        let t = resolve_target(gen, target_expr)?;
        gen.emit("    pushq %r11");
        t
    } else {
        resolve_target(gen, target_expr)?
    };

    load_into_rax(gen, &target);
    gen.emit("    pushq %rax");
    generate_expression(gen, value)?;
    gen.emit("    movq %rax, %rcx");
    gen.emit("    popq %rax");

    if matches!(target, Target::Memory) {
        gen.emit("    popq %r11");
    }

    match operator {
        CompoundOperator::AddAssign => gen.emit("    addq %rcx, %rax"),
        CompoundOperator::SubAssign => gen.emit("    subq %rcx, %rax"),
        CompoundOperator::MulAssign => gen.emit("    imulq %rcx, %rax"),
        CompoundOperator::DivAssign => {
            gen.emit("    cqto");
            gen.emit("    idivq %rcx");
        }
        CompoundOperator::ModAssign => {
            gen.emit("    cqto");
            gen.emit("    idivq %rcx");
            gen.emit("    movq %rdx, %rax");
        }
    }

    store_rax(gen, &target);
    Ok(())
}

fn generate_if(
    gen: &mut Generator,
    condition: &Expression,
    then_body: &[Statement],
    else_body: Option<&[Statement]>,
) -> Result<(), CompileError> {
    let else_label = gen.fresh_label(".Lelse");
    let end_label = gen.fresh_label(".Lend");

    generate_expression(gen, condition)?;
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!(
        "    je {}",
        if else_body.is_some() { &else_label } else { &end_label }
    ));

    generate_block(gen, then_body)?;

    if let Some(else_body) = else_body {
        gen.emit(format!("    jmp {}", end_label));
        gen.emit_label(&else_label);
        generate_block(gen, else_body)?;
    }

    gen.emit_label(&end_label);
    Ok(())
}

fn generate_while(
    gen: &mut Generator,
    condition: &Expression,
    body: &[Statement],
) -> Result<(), CompileError> {
    let top_label = gen.fresh_label(".Lwhile_top");
    let end_label = gen.fresh_label(".Lwhile_end");

    gen.emit_label(&top_label);
    generate_expression(gen, condition)?;
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!("    je {}", end_label));

    generate_block(gen, body)?;
    gen.emit(format!("    jmp {}", top_label));
    gen.emit_label(&end_label);
    Ok(())
}

fn generate_for(
    gen: &mut Generator,
    init: Option<&Statement>,
    condition: Option<&Expression>,
    update: Option<&Statement>,
    body: &[Statement],
) -> Result<(), CompileError> {
    gen.push_scope();

    if let Some(init) = init {
        generate_statement(gen, init)?;
    }

    let top_label = gen.fresh_label(".Lfor_top");
    let end_label = gen.fresh_label(".Lfor_end");

    gen.emit_label(&top_label);
    if let Some(condition) = condition {
        generate_expression(gen, condition)?;
        gen.emit("    cmpq $0, %rax");
        gen.emit(format!("    je {}", end_label));
    }

    for statement in body {
        generate_statement(gen, statement)?;
    }

    if let Some(update) = update {
        generate_statement(gen, update)?;
    }
    gen.emit(format!("    jmp {}", top_label));
    gen.emit_label(&end_label);

    gen.pop_scope();
    Ok(())
}

/// `try`/`catch`/`finally` lowers to labels with no real stack unwinding
/// (spec.md §4.5.3): the try block runs straight through, any `catch`
/// clauses are emitted as unreachable-by-construction blocks reachable only
/// via an intrinsic-raised jump to the innermost catch label, and the
/// finally block always runs after either path.
fn generate_try(
    gen: &mut Generator,
    try_block: &[Statement],
    catch_clauses: &[crate::ast::nodes::CatchClause],
    finally_block: Option<&[Statement]>,
) -> Result<(), CompileError> {
    let finally_label = gen.fresh_label(".Lfinally");

    generate_block(gen, try_block)?;
    gen.emit(format!("    jmp {}", finally_label));

    for clause in catch_clauses {
        let catch_label = gen.fresh_label(".Lcatch");
        gen.emit_label(&catch_label);
        gen.push_scope();
        // The raising intrinsic leaves an error code in %rax; bind it.
        let offset = gen.declare_variable(&clause.error_binding, crate::ast::types::Type::Int64);
        gen.emit(format!("    movq %rax, -{}(%rbp)", offset));
        for statement in &clause.body {
            generate_statement(gen, statement)?;
        }
        gen.pop_scope();
        gen.emit(format!("    jmp {}", finally_label));
    }

    gen.emit_label(&finally_label);
    if let Some(finally_block) = finally_block {
        generate_block(gen, finally_block)?;
    }
    Ok(())
}
