//! # anvilc CLI
//!
//! Command-line front end: parses arguments, drives a [`Compiler`], and
//! maps any pipeline error to a non-zero exit code (SPEC_FULL §2.1, §2.3).
//! The CLI itself — argument parsing, `as`/`ld` invocation — is an external
//! collaborator around the core pipeline, not part of it.

use anvilc::compiler::{Compiler, Manifest};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "anvilc", version, about = "Ahead-of-time compiler for Anvil")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show step-by-step compilation progress.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an Anvil source file into a native executable.
    Build {
        file: PathBuf,

        /// Print generated assembly instead of assembling it.
        #[arg(long)]
        show_asm: bool,

        /// Skip the AST optimizer pass.
        #[arg(long)]
        no_optimize: bool,

        /// Output binary name.
        #[arg(long)]
        output: Option<String>,
    },
    /// Build and immediately run an Anvil source file.
    Run { file: PathBuf },
    /// Run the `.anv` test fixtures in a file or directory.
    Test { file: Option<PathBuf> },
}

/// `--verbose` raises the log level filter rather than toggling a bespoke
/// boolean (SPEC_FULL §2.2); `RUST_LOG`, if the caller already set it, wins.
fn init_logging(verbose: bool) {
    if std::env::var("RUST_LOG").is_err() {
        let level = if verbose { "trace" } else { "info" };
        // SAFETY: single-threaded at this point, before any other code runs.
        unsafe { std::env::set_var("RUST_LOG", level) };
    }
    colog::init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            file,
            show_asm,
            no_optimize,
            output,
        } => build(file, show_asm, no_optimize, output, cli.verbose),
        Commands::Run { file } => run(file, cli.verbose),
        Commands::Test { file } => test(file, cli.verbose),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn make_compiler(
    file: PathBuf,
    show_asm: bool,
    no_optimize: bool,
    verbose: bool,
) -> Result<(Compiler, String), anvilc::compiler::CompileError> {
    let mut compiler = Compiler::new(file.clone());
    compiler.show_asm = show_asm;
    compiler.no_optimize = no_optimize;
    compiler.verbose = verbose;

    let mut output_override = None;
    let project_dir = file.parent().unwrap_or_else(|| std::path::Path::new("."));
    if let Some(manifest) = Manifest::load_from_dir(project_dir)? {
        compiler.apply_manifest(&manifest, &mut output_override);
    }

    let output_name = output_override.unwrap_or_else(|| "out".to_string());
    Ok((compiler, output_name))
}

fn build(
    file: PathBuf,
    show_asm: bool,
    no_optimize: bool,
    output: Option<String>,
    verbose: bool,
) -> Result<(), anvilc::compiler::CompileError> {
    let (mut compiler, manifest_output) = make_compiler(file, show_asm, no_optimize, verbose)?;
    compiler.build(&output.unwrap_or(manifest_output))
}

fn run(file: PathBuf, verbose: bool) -> Result<(), anvilc::compiler::CompileError> {
    let (mut compiler, output_name) = make_compiler(file, false, false, verbose)?;
    compiler.run(&output_name)
}

fn test(file: Option<PathBuf>, verbose: bool) -> Result<(), anvilc::compiler::CompileError> {
    let target = file.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut compiler = Compiler::new(target);
    compiler.verbose = verbose;
    compiler.test(file)
}
