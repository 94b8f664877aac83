//! Assembly-level checks that don't need `as`/`ld`: constant folding,
//! strength reduction, string interning, optimizer idempotence, and the
//! exact HTTP request byte stream. Anything that needs to observe a runtime
//! value lives in `end_to_end.rs` instead.

use anvilc::compiler::{optimize, parse, resolve, tokenize};

fn compile(source: &str) -> String {
    let tokens = tokenize(source).expect("tokenize");
    let program = parse(tokens).expect("parse");
    let imports = resolve(&program).expect("resolve");
    let optimized = optimize(program);
    anvilc::codegen::generate(&optimized, &imports).expect("codegen")
}

#[test]
fn constant_arithmetic_folds_before_codegen() {
    let asm = compile(
        r#"
        fn main() -> Int64 {
            let x: Int64 = 2 * 3 + 4 * 5;
            return x;
        }
        "#,
    );
    assert!(asm.contains("movq $26, %rax"), "expected the folded constant:\n{asm}");
    assert!(!asm.contains("imulq"), "multiplication should have folded away:\n{asm}");
    assert!(!asm.contains("addq $"), "addition should have folded away:\n{asm}");
}

#[test]
fn multiply_by_power_of_two_becomes_a_shift() {
    let asm = compile(
        r#"
        fn main() -> Int64 {
            let x: Int64 = 5;
            let y: Int64 = x * 8;
            return y;
        }
        "#,
    );
    assert!(asm.contains("shlq %cl, %rax"), "expected strength-reduced shift:\n{asm}");
    assert!(!asm.contains("imulq"), "multiplication should have been reduced to a shift:\n{asm}");
}

#[test]
fn optimizer_pass_is_idempotent() {
    let source = r#"
        fn main() -> Int64 {
            let x: Int64 = (1 + 1) * 4 + 0;
            let y: Int64 = x * 1;
            return y - 0;
        }
        "#;
    let tokens = tokenize(source).unwrap();
    let program = parse(tokens).unwrap();
    let imports = resolve(&program).unwrap();

    let once = optimize(program.clone());
    let twice = optimize(optimize(program));

    let asm_once = anvilc::codegen::generate(&once, &imports).unwrap();
    let asm_twice = anvilc::codegen::generate(&twice, &imports).unwrap();
    assert_eq!(asm_once, asm_twice, "a second optimizer pass must not change the output");
}

#[test]
fn identical_string_literals_are_interned_once() {
    let asm = compile(
        r#"
        import io;
        fn main() -> Int64 {
            io.print("same");
            io.print("same");
            io.print("different");
            return 0;
        }
        "#,
    );
    let occurrences = asm.matches(".asciz \"same\"").count();
    assert_eq!(occurrences, 1, "a repeated literal must produce exactly one data label:\n{asm}");
    assert!(asm.contains(".asciz \"different\""));
}

#[test]
fn multi_catch_try_emits_distinct_labels_per_clause() {
    let asm = compile(
        r#"
        fn main() -> Int64 {
            try {
                let x: Int64 = 1;
            } catch (e) {
                let a: Int64 = e;
            } catch (f) {
                let b: Int64 = f;
            }
            return 0;
        }
        "#,
    );
    let catch_labels: std::collections::HashSet<&str> = asm
        .lines()
        .filter(|line| line.trim_start().starts_with(".Lcatch_") && line.trim_end().ends_with(':'))
        .collect();
    assert_eq!(catch_labels.len(), 2, "each catch clause needs its own label:\n{asm}");
}

#[test]
fn odd_overflow_user_call_pads_the_stack_to_sixteen_bytes() {
    let asm = compile(
        r#"
        fn seven(a: Int64, b: Int64, c: Int64, d: Int64, e: Int64, f: Int64, g: Int64) -> Int64 {
            return g;
        }
        fn main() -> Int64 {
            return seven(1, 2, 3, 4, 5, 6, 7);
        }
        "#,
    );
    let call_site = asm
        .find("call seven")
        .expect("call to seven should be emitted");
    let before = &asm[..call_site];
    assert!(before.contains("subq $8, %rsp"), "expected alignment padding before the call:\n{asm}");
    assert!(asm.contains("addq $16, %rsp"), "cleanup must also remove the 8 bytes of padding:\n{asm}");
}

#[test]
fn http_get_emits_the_expected_request_line_fragments() {
    let asm = compile(
        r#"
        import http;
        import mem;
        fn main() -> Int64 {
            let buf: Int64 = mem.malloc(1024);
            return http.get(3, "example.com", 11, "/", 1, buf, 1024);
        }
        "#,
    );
    assert!(asm.contains("GET "));
    assert!(asm.contains("HTTP/1.0\\r\\nHost: "));
    assert!(asm.contains("\\r\\nConnection: close\\r\\n\\r\\n"));
}
