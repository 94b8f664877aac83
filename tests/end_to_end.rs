//! Integration tests that actually assemble and link generated code, then
//! run the resulting binary and inspect its exit status / stdout. These
//! need a real `as` and `ld` (or `cc`) on `PATH`.

use anvilc::compiler::Compiler;
use std::process::Output;

fn build_and_run(source: &str) -> Output {
    let dir = tempfile::tempdir().expect("tempdir");
    let source_path = dir.path().join("main.anv");
    std::fs::write(&source_path, source).expect("write fixture");

    let mut compiler = Compiler::new(source_path);
    compiler.build_path = dir.path().join("build");
    compiler.build("out").expect("build should succeed");

    let binary_path = compiler.build_path.join("out");
    let output = std::process::Command::new(&binary_path)
        .output()
        .expect("binary should run");

    // Keep the tempdir alive until after the process has run.
    drop(dir);
    output
}

#[test]
fn hashmap_put_overwrites_existing_key() {
    let output = build_and_run(
        r#"
        import collections;
        fn main() -> Int64 {
            let map: Int64 = collections.hashmap_int_new(16);
            collections.hashmap_int_put(map, 42, 7);
            collections.hashmap_int_put(map, 42, 9);
            return collections.hashmap_int_get(map, 42);
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(9));
}

#[test]
fn djb2_matches_the_known_reference_hash() {
    let output = build_and_run(
        r#"
        import hash;
        import io;
        fn main() -> Int64 {
            io.printlnInt(hash.djb2("hello"));
            return 0;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "210714636441");
}

#[test]
fn crc32_matches_the_ieee_reference_vector() {
    let output = build_and_run(
        r#"
        import hash;
        import io;
        fn main() -> Int64 {
            io.printlnInt(hash.crc32("123456789", 9));
            return 0;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim().parse::<u32>().unwrap(),
        0xCBF4_3926
    );
}

#[test]
fn sha256_of_empty_string_matches_fips_vector() {
    let output = build_and_run(
        r#"
        import sha256;
        import mem;
        import file;
        fn main() -> Int64 {
            let out: Int64 = mem.malloc(32);
            sha256.sha256("", 0, out);
            file.write(1, out, 32);
            return 0;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(0));
    let expected: [u8; 32] = [
        0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9,
        0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52,
        0xb8, 0x55,
    ];
    assert_eq!(output.stdout, expected);
}

#[test]
fn sha256_of_abc_matches_fips_vector() {
    let output = build_and_run(
        r#"
        import sha256;
        import mem;
        import file;
        fn main() -> Int64 {
            let out: Int64 = mem.malloc(32);
            sha256.sha256("abc", 3, out);
            file.write(1, out, 32);
            return 0;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(0));
    let expected: [u8; 32] = [
        0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae, 0x22,
        0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61, 0xf2, 0x00,
        0x15, 0xad,
    ];
    assert_eq!(output.stdout, expected);
}

#[test]
fn md5_of_empty_string_matches_rfc_vector() {
    let output = build_and_run(
        r#"
        import md5;
        import mem;
        import file;
        fn main() -> Int64 {
            let out: Int64 = mem.malloc(16);
            md5.md5("", 0, out);
            file.write(1, out, 16);
            return 0;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(0));
    let expected: [u8; 16] = [
        0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec, 0xf8, 0x42,
        0x7e,
    ];
    assert_eq!(output.stdout, expected);
}

#[test]
fn md5_of_abc_matches_rfc_vector() {
    let output = build_and_run(
        r#"
        import md5;
        import mem;
        import file;
        fn main() -> Int64 {
            let out: Int64 = mem.malloc(16);
            md5.md5("abc", 3, out);
            file.write(1, out, 16);
            return 0;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(0));
    let expected: [u8; 16] = [
        0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1, 0x7f,
        0x72,
    ];
    assert_eq!(output.stdout, expected);
}

#[test]
fn multi_catch_try_builds_and_runs() {
    let output = build_and_run(
        r#"
        fn main() -> Int64 {
            try {
                let x: Int64 = 1;
            } catch (e) {
                let a: Int64 = e;
            } catch (f) {
                let b: Int64 = f;
            }
            return 5;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn to_lower_and_to_upper_actually_convert_case() {
    let output = build_and_run(
        r#"
        import str;
        import io;
        fn main() -> Int64 {
            io.println(str.toLower("HeLLo, World!"));
            io.println(str.toUpper("HeLLo, World!"));
            return 0;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "hello, world!\nHELLO, WORLD!\n"
    );
}

#[test]
fn sortedset_min_and_max_use_the_set_node_layout() {
    let output = build_and_run(
        r#"
        import collections;
        fn main() -> Int64 {
            let s: Int64 = collections.sortedset_int_new();
            collections.sortedset_int_add(s, 30);
            collections.sortedset_int_add(s, 10);
            collections.sortedset_int_add(s, 20);
            return collections.sortedset_int_min(s) + collections.sortedset_int_max(s);
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(40));
}

#[test]
fn seven_argument_call_passes_every_stack_argument() {
    let output = build_and_run(
        r#"
        fn seven(a: Int64, b: Int64, c: Int64, d: Int64, e: Int64, f: Int64, g: Int64) -> Int64 {
            return a + b + c + d + e + f + g;
        }
        fn main() -> Int64 {
            return seven(1, 2, 3, 4, 5, 6, 7);
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(28));
}

#[test]
fn resolve_reads_localhost_from_etc_hosts() {
    let output = build_and_run(
        r#"
        import net;
        import mem;
        import file;
        fn main() -> Int64 {
            let out: Int64 = mem.malloc(4);
            let found: Int64 = net.resolve("localhost", out);
            file.write(1, out, 4);
            return found;
        }
        "#,
    );
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(output.stdout, vec![127u8, 0, 0, 1]);
}
