//! # Time Intrinsics (`time`)
//!
//! Wall clock, monotonic clock, sleeping, and broken-down-time conversion
//! (spec.md §4.5.5). `gmtime` computes the proleptic-Gregorian calendar
//! breakdown with Howard Hinnant's `civil_from_days` algorithm rather than a
//! day-by-day loop; it assumes a non-negative timestamp, which holds for
//! every value `now()` can produce. `localtime` has no timezone database to
//! consult and is aliased straight to `gmtime` (see DESIGN.md open question
//! 5).

use crate::ast::nodes::Expression;
use crate::ast::token::SourceLocation;
use crate::codegen::expressions::generate_expression;
use crate::codegen::registry::{intrinsic, module as make_module, ModuleDescriptor};
use crate::codegen::state::Generator;
use crate::compiler::error::CompileError;

const SYS_NANOSLEEP: i64 = 35;
const SYS_TIME: i64 = 201;
const SYS_CLOCK_GETTIME: i64 = 228;
const CLOCK_REALTIME: i64 = 0;
const CLOCK_MONOTONIC: i64 = 1;

/// Non-leap cumulative day count before each month (index `m - 1`).
const CUMULATIVE_DAYS_LABEL: &str = "gmtime_cumdays";
const CUMULATIVE_DAYS: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

pub fn module() -> ModuleDescriptor {
    make_module(
        "time",
        vec![
            intrinsic("now", "time", 0, now),
            intrinsic("sleep", "time", 1, sleep),
            intrinsic("millis", "time", 0, millis),
            intrinsic("nanos", "time", 0, nanos),
            intrinsic("clock", "time", 0, clock),
            intrinsic("gmtime", "time", 2, gmtime),
            intrinsic("localtime", "time", 2, gmtime),
        ],
    )
}

fn emit_clamp_negative_to_minus_one(gen: &mut Generator) {
    let ok_label = gen.fresh_label(".Ltime_ok");
    gen.emit("    cmpq $0, %rax");
    gen.emit(format!("    jge {}", ok_label));
    gen.emit("    movq $-1, %rax");
    gen.emit_label(&ok_label);
}

/// `now()`: `time(NULL)`.
fn now(gen: &mut Generator, _args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    gen.emit("    xorq %rdi, %rdi");
    gen.emit(format!("    movq ${}, %rax", SYS_TIME));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    Ok(())
}

/// `sleep(sec)`: `nanosleep({sec, 0}, NULL)`.
fn sleep(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    generate_expression(gen, &args[0])?;
    gen.emit("    subq $16, %rsp");
    gen.emit("    movq %rax, 0(%rsp)"); // tv_sec
    gen.emit("    movq $0, 8(%rsp)"); // tv_nsec
    gen.emit("    movq %rsp, %rdi"); // req
    gen.emit("    xorq %rsi, %rsi"); // rem = NULL
    gen.emit(format!("    movq ${}, %rax", SYS_NANOSLEEP));
    gen.emit("    syscall");
    emit_clamp_negative_to_minus_one(gen);
    gen.emit("    addq $16, %rsp");
    Ok(())
}

/// `millis()`: `clock_gettime(CLOCK_REALTIME)` scaled to milliseconds.
fn millis(gen: &mut Generator, _args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    gen.emit("    subq $16, %rsp");
    gen.emit(format!("    movq ${}, %rdi", CLOCK_REALTIME));
    gen.emit("    movq %rsp, %rsi");
    gen.emit(format!("    movq ${}, %rax", SYS_CLOCK_GETTIME));
    gen.emit("    syscall");
    gen.emit("    movq 0(%rsp), %rax"); // tv_sec
    gen.emit("    imulq $1000, %rax, %rax");
    gen.emit("    movq 8(%rsp), %rcx"); // tv_nsec
    gen.emit("    movq %rax, %r8");
    gen.emit("    movq %rcx, %rax");
    gen.emit("    cqto");
    gen.emit("    movq $1000000, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    addq %r8, %rax");
    gen.emit("    addq $16, %rsp");
    Ok(())
}

/// `nanos()`: `clock_gettime(CLOCK_MONOTONIC)` scaled to nanoseconds.
fn nanos(gen: &mut Generator, _args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    gen.emit("    subq $16, %rsp");
    gen.emit(format!("    movq ${}, %rdi", CLOCK_MONOTONIC));
    gen.emit("    movq %rsp, %rsi");
    gen.emit(format!("    movq ${}, %rax", SYS_CLOCK_GETTIME));
    gen.emit("    syscall");
    gen.emit("    movq 0(%rsp), %rax"); // tv_sec
    gen.emit("    imulq $1000000000, %rax, %rax");
    gen.emit("    addq 8(%rsp), %rax"); // + tv_nsec
    gen.emit("    addq $16, %rsp");
    Ok(())
}

/// `clock()`: `rdtsc` combined into a single 64-bit counter.
fn clock(gen: &mut Generator, _args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    gen.emit("    rdtsc"); // %eax = low32, %edx = high32, both zero-extended
    gen.emit("    shlq $32, %rdx");
    gen.emit("    orq %rdx, %rax");
    Ok(())
}

fn emit_cumulative_days_table(gen: &mut Generator) {
    if !gen.mark_emitted_once(CUMULATIVE_DAYS_LABEL) {
        return;
    }
    gen.emit_data(format!("{}:", CUMULATIVE_DAYS_LABEL));
    let values: Vec<String> = CUMULATIVE_DAYS.iter().map(|v| format!("{}", v)).collect();
    gen.emit_data(format!("    .quad {}", values.join(", ")));
}

/// `gmtime(ts, buf)`: writes the 72-byte broken-down time (nine `i64`
/// fields: sec, min, hour, mday, mon, year-1900, wday, yday, isdst) using
/// Hinnant's `civil_from_days` decomposition of `ts`'s day count. Returns
/// `buf`.
fn gmtime(gen: &mut Generator, args: &[Expression], _location: SourceLocation) -> Result<(), CompileError> {
    emit_cumulative_days_table(gen);

    // Scratch frame, all offsets relative to %rsp for the remainder of the
    // function (no further stack movement until the final `addq`).
    const TS: i64 = 0;
    const BUF: i64 = 8;
    const DAYS: i64 = 16;
    const SEC_IN_DAY: i64 = 24;
    const Z: i64 = 32;
    const ERA: i64 = 40;
    const DOE: i64 = 48;
    const YOE: i64 = 56;
    const YEAR: i64 = 64;
    const DOY: i64 = 72;
    const MP: i64 = 80;
    const MDAY: i64 = 88;
    const MONTH: i64 = 96;
    const LEAP: i64 = 104;
    const HOUR: i64 = 112;
    const MIN: i64 = 120;
    const SEC: i64 = 128;
    const WDAY: i64 = 136;
    const YDAY: i64 = 144;
    const FRAME: i64 = 160;

    gen.emit(format!("    subq ${}, %rsp", FRAME));
    generate_expression(gen, &args[0])?;
    gen.emit(format!("    movq %rax, {}(%rsp)", TS));
    generate_expression(gen, &args[1])?;
    gen.emit(format!("    movq %rax, {}(%rsp)", BUF));

    // days = ts / 86400; sec_in_day = ts % 86400.
    gen.emit(format!("    movq {}(%rsp), %rax", TS));
    gen.emit("    cqto");
    gen.emit("    movq $86400, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit(format!("    movq %rax, {}(%rsp)", DAYS));
    gen.emit(format!("    movq %rdx, {}(%rsp)", SEC_IN_DAY));

    // hour = sec_in_day / 3600; rem = sec_in_day % 3600.
    gen.emit(format!("    movq {}(%rsp), %rax", SEC_IN_DAY));
    gen.emit("    cqto");
    gen.emit("    movq $3600, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit(format!("    movq %rax, {}(%rsp)", HOUR));
    // min = rem / 60; sec = rem % 60.
    gen.emit("    movq %rdx, %rax");
    gen.emit("    cqto");
    gen.emit("    movq $60, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit(format!("    movq %rax, {}(%rsp)", MIN));
    gen.emit(format!("    movq %rdx, {}(%rsp)", SEC));

    // wday = (days + 4) % 7 (1970-01-01 was a Thursday).
    gen.emit(format!("    movq {}(%rsp), %rax", DAYS));
    gen.emit("    addq $4, %rax");
    gen.emit("    cqto");
    gen.emit("    movq $7, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit(format!("    movq %rdx, {}(%rsp)", WDAY));

    // z = days + 719468 (days since 0000-03-01, the Hinnant epoch shift).
    gen.emit(format!("    movq {}(%rsp), %rax", DAYS));
    gen.emit("    addq $719468, %rax");
    gen.emit(format!("    movq %rax, {}(%rsp)", Z));

    // era = z / 146097; doe = z % 146097.
    gen.emit(format!("    movq {}(%rsp), %rax", Z));
    gen.emit("    cqto");
    gen.emit("    movq $146097, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit(format!("    movq %rax, {}(%rsp)", ERA));
    gen.emit(format!("    movq %rdx, {}(%rsp)", DOE));

    // yoe = (doe - doe/1460 + doe/36524 - doe/146096) / 365.
    gen.emit(format!("    movq {}(%rsp), %rax", DOE));
    gen.emit("    cqto");
    gen.emit("    movq $1460, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    movq %rax, %r8"); // doe/1460

    gen.emit(format!("    movq {}(%rsp), %rax", DOE));
    gen.emit("    cqto");
    gen.emit("    movq $36524, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    movq %rax, %r9"); // doe/36524

    gen.emit(format!("    movq {}(%rsp), %rax", DOE));
    gen.emit("    cqto");
    gen.emit("    movq $146096, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    movq %rax, %r10"); // doe/146096

    gen.emit(format!("    movq {}(%rsp), %rax", DOE));
    gen.emit("    subq %r8, %rax");
    gen.emit("    addq %r9, %rax");
    gen.emit("    subq %r10, %rax");
    gen.emit("    cqto");
    gen.emit("    movq $365, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit(format!("    movq %rax, {}(%rsp)", YOE));

    // year = yoe + era * 400 (still needs the +1 month-overflow adjustment
    // below before it is the calendar year).
    gen.emit(format!("    movq {}(%rsp), %rax", ERA));
    gen.emit("    imulq $400, %rax, %rax");
    gen.emit(format!("    addq {}(%rsp), %rax", YOE));
    gen.emit(format!("    movq %rax, {}(%rsp)", YEAR));

    // doy = doe - (365*yoe + yoe/4 - yoe/100).
    gen.emit(format!("    movq {}(%rsp), %rax", YOE));
    gen.emit("    cqto");
    gen.emit("    movq $4, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    movq %rax, %r8"); // yoe/4

    gen.emit(format!("    movq {}(%rsp), %rax", YOE));
    gen.emit("    cqto");
    gen.emit("    movq $100, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    movq %rax, %r9"); // yoe/100

    gen.emit(format!("    movq {}(%rsp), %rax", YOE));
    gen.emit("    imulq $365, %rax, %rax");
    gen.emit("    addq %r8, %rax");
    gen.emit("    subq %r9, %rax");
    gen.emit("    movq %rax, %r10"); // 365*yoe + yoe/4 - yoe/100

    gen.emit(format!("    movq {}(%rsp), %rax", DOE));
    gen.emit("    subq %r10, %rax");
    gen.emit(format!("    movq %rax, {}(%rsp)", DOY));

    // mp = (5*doy + 2) / 153.
    gen.emit(format!("    movq {}(%rsp), %rax", DOY));
    gen.emit("    imulq $5, %rax, %rax");
    gen.emit("    addq $2, %rax");
    gen.emit("    cqto");
    gen.emit("    movq $153, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit(format!("    movq %rax, {}(%rsp)", MP));

    // mday = doy - (153*mp + 2)/5 + 1.
    gen.emit(format!("    movq {}(%rsp), %rax", MP));
    gen.emit("    imulq $153, %rax, %rax");
    gen.emit("    addq $2, %rax");
    gen.emit("    cqto");
    gen.emit("    movq $5, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    movq %rax, %r8"); // (153*mp+2)/5

    gen.emit(format!("    movq {}(%rsp), %rax", DOY));
    gen.emit("    subq %r8, %rax");
    gen.emit("    addq $1, %rax");
    gen.emit(format!("    movq %rax, {}(%rsp)", MDAY));

    // month = mp + (mp < 10 ? 3 : -9), mapping [0,11] (Mar..Feb) to [1,12].
    let mp_lt10 = gen.fresh_label(".Lgmtime_mp_lt10");
    let month_done = gen.fresh_label(".Lgmtime_month_done");
    gen.emit(format!("    movq {}(%rsp), %rax", MP));
    gen.emit("    cmpq $10, %rax");
    gen.emit(format!("    jl {}", mp_lt10));
    gen.emit("    subq $9, %rax");
    gen.emit(format!("    jmp {}", month_done));
    gen.emit_label(&mp_lt10);
    gen.emit("    addq $3, %rax");
    gen.emit_label(&month_done);
    gen.emit(format!("    movq %rax, {}(%rsp)", MONTH));

    // year += (month <= 2 ? 1 : 0): Jan/Feb belong to the following
    // calendar year under the March-based era split above.
    let year_noadj = gen.fresh_label(".Lgmtime_year_noadj");
    gen.emit(format!("    movq {}(%rsp), %rax", MONTH));
    gen.emit("    cmpq $2, %rax");
    gen.emit(format!("    jg {}", year_noadj));
    gen.emit(format!("    incq {}(%rsp)", YEAR));
    gen.emit_label(&year_noadj);

    // leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0.
    let check_400 = gen.fresh_label(".Lgmtime_check400");
    let leap_true = gen.fresh_label(".Lgmtime_leap_true");
    let leap_false = gen.fresh_label(".Lgmtime_leap_false");
    let leap_done = gen.fresh_label(".Lgmtime_leap_done");
    gen.emit(format!("    movq {}(%rsp), %rax", YEAR));
    gen.emit("    cqto");
    gen.emit("    movq $4, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    testq %rdx, %rdx");
    gen.emit(format!("    jnz {}", leap_false));
    gen.emit(format!("    movq {}(%rsp), %rax", YEAR));
    gen.emit("    cqto");
    gen.emit("    movq $100, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    testq %rdx, %rdx");
    gen.emit(format!("    jz {}", check_400));
    gen.emit(format!("    jmp {}", leap_true));
    gen.emit_label(&check_400);
    gen.emit(format!("    movq {}(%rsp), %rax", YEAR));
    gen.emit("    cqto");
    gen.emit("    movq $400, %rcx");
    gen.emit("    idivq %rcx");
    gen.emit("    testq %rdx, %rdx");
    gen.emit(format!("    jnz {}", leap_false));
    gen.emit_label(&leap_true);
    gen.emit(format!("    movq $1, {}(%rsp)", LEAP));
    gen.emit(format!("    jmp {}", leap_done));
    gen.emit_label(&leap_false);
    gen.emit(format!("    movq $0, {}(%rsp)", LEAP));
    gen.emit_label(&leap_done);

    // yday = cumulative[month - 1] + (mday - 1) + (leap && month > 2 ? 1 : 0).
    let yday_store = gen.fresh_label(".Lgmtime_yday_store");
    gen.emit(format!("    leaq {}(%rip), %r8", CUMULATIVE_DAYS_LABEL));
    gen.emit(format!("    movq {}(%rsp), %rax", MONTH));
    gen.emit("    decq %rax");
    gen.emit("    movq (%r8,%rax,8), %r9");
    gen.emit(format!("    movq {}(%rsp), %rax", MDAY));
    gen.emit("    decq %rax");
    gen.emit("    addq %r9, %rax");
    gen.emit(format!("    movq {}(%rsp), %rcx", LEAP));
    gen.emit("    testq %rcx, %rcx");
    gen.emit(format!("    jz {}", yday_store));
    gen.emit(format!("    movq {}(%rsp), %rdx", MONTH));
    gen.emit("    cmpq $2, %rdx");
    gen.emit(format!("    jle {}", yday_store));
    gen.emit("    incq %rax");
    gen.emit_label(&yday_store);
    gen.emit(format!("    movq %rax, {}(%rsp)", YDAY));

    // Write the 72-byte struct.
    gen.emit(format!("    movq {}(%rsp), %r8", BUF));
    gen.emit(format!("    movq {}(%rsp), %rax", SEC));
    gen.emit("    movq %rax, 0(%r8)");
    gen.emit(format!("    movq {}(%rsp), %rax", MIN));
    gen.emit("    movq %rax, 8(%r8)");
    gen.emit(format!("    movq {}(%rsp), %rax", HOUR));
    gen.emit("    movq %rax, 16(%r8)");
    gen.emit(format!("    movq {}(%rsp), %rax", MDAY));
    gen.emit("    movq %rax, 24(%r8)");
    gen.emit(format!("    movq {}(%rsp), %rax", MONTH));
    gen.emit("    decq %rax"); // struct tm convention: 0-11
    gen.emit("    movq %rax, 32(%r8)");
    gen.emit(format!("    movq {}(%rsp), %rax", YEAR));
    gen.emit("    subq $1900, %rax");
    gen.emit("    movq %rax, 40(%r8)");
    gen.emit(format!("    movq {}(%rsp), %rax", WDAY));
    gen.emit("    movq %rax, 48(%r8)");
    gen.emit(format!("    movq {}(%rsp), %rax", YDAY));
    gen.emit("    movq %rax, 56(%r8)");
    gen.emit("    movq $0, 64(%r8)"); // isdst

    gen.emit("    movq %r8, %rax"); // return buf
    gen.emit(format!("    addq ${}, %rsp", FRAME));
    Ok(())
}
