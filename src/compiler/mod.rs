//! # Compiler Module
//!
//! The core entry point and orchestrator for the Anvil compiler. Aggregates
//! every pipeline stage (lexer, parser, resolver, optimizer, codegen) and
//! defines the [`Compiler`] struct that drives the build/run/test lifecycles
//! for a `.anv` source file.

pub mod error;
pub mod optimizer;
pub mod parser;
pub mod resolver;

pub use crate::lexer::tokenize;
pub use error::CompileError;
pub use optimizer::optimize;
pub use parser::parse;
pub use resolver::resolve;

use crate::ast::nodes::Program;
use resolver::ImportContext;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Project build settings, loadable from an optional `Anvil.toml` manifest
/// and overridable by CLI flags (SPEC_FULL §2.4).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub build: BuildTable,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BuildTable {
    pub entry: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub optimize: Option<bool>,
}

impl Manifest {
    /// Loads `Anvil.toml` from `dir` if present. Absence is not an error —
    /// the manifest is entirely optional ambient configuration.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, CompileError> {
        let path = dir.join("Anvil.toml");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let manifest: Manifest =
            toml::from_str(&text).map_err(|e| CompileError::Manifest(e.to_string()))?;
        Ok(Some(manifest))
    }
}

/// The central structure managing compilation, assembly, linking and
/// execution of an Anvil program.
pub struct Compiler {
    pub source_path: PathBuf,
    pub build_path: PathBuf,
    pub show_asm: bool,
    pub no_optimize: bool,
    pub verbose: bool,
}

impl Compiler {
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            source_path,
            build_path: PathBuf::from("./build"),
            show_asm: false,
            no_optimize: false,
            verbose: false,
        }
    }

    /// Applies manifest values for anything the CLI didn't already set
    /// explicitly. CLI flags always win over the manifest (SPEC_FULL §2.4).
    pub fn apply_manifest(&mut self, manifest: &Manifest, output_override: &mut Option<String>) {
        if output_override.is_none() {
            if let Some(output) = &manifest.build.output {
                *output_override = Some(output.clone());
            }
        }
        if let Some(optimize) = manifest.build.optimize {
            self.no_optimize = !optimize;
        }
    }

    fn log_verbose(&self, message: &str) {
        if self.verbose {
            log::debug!("{}", message);
        }
    }

    /// Runs the full pipeline up through optimization, producing an AST and
    /// import context ready for code generation. Shared by `build`, `run`,
    /// and `test`.
    fn compile_to_ast(&self, source: &str) -> Result<(Program, ImportContext), CompileError> {
        log::trace!("tokenizing {:?}", self.source_path);
        let tokens = tokenize(source)?;

        log::trace!("parsing {:?}", self.source_path);
        let mut program = parse(tokens)?;

        log::trace!("resolving imports for {:?}", self.source_path);
        let imports = resolve(&program)?;

        if !self.no_optimize {
            log::trace!("optimizing {:?}", self.source_path);
            program = optimize(program);
        }

        Ok((program, imports))
    }

    /// Runs the full build pipeline for a single `.anv` file: lex, parse,
    /// resolve imports, optimize, generate assembly, assemble and link.
    pub fn build(&mut self, output_name: &str) -> Result<(), CompileError> {
        if !self.source_path.exists() || !self.is_anv_file(&self.source_path) {
            return Err(CompileError::NoSourceFile);
        }

        self.log_verbose(&format!("processing {:?}", self.source_path));

        let content = std::fs::read_to_string(&self.source_path)?;
        let (program, imports) = self.compile_to_ast(&content)?;

        log::trace!("generating assembly for {:?}", self.source_path);
        let asm_code = crate::codegen::generate(&program, &imports)?;

        if self.show_asm {
            println!("{}", asm_code);
            return Ok(());
        }

        std::fs::create_dir_all(&self.build_path)?;
        let asm_file_path = self.build_path.join("out.s");
        std::fs::write(&asm_file_path, &asm_code)?;

        self.log_verbose(&format!(
            "generated assembly: {} lines",
            asm_code.lines().count()
        ));

        let output_path = self.build_path.join(output_name);
        self.assemble_and_link(&asm_file_path, &output_path)?;

        log::info!("binary written to {:?}", output_path);
        Ok(())
    }

    /// Compiles, then executes, a single Anvil file.
    pub fn run(&mut self, output_name: &str) -> Result<(), CompileError> {
        self.build(output_name)?;
        self.execute_binary(output_name)
    }

    /// Discovers and runs `.anv` test fixtures. A fixture "passes" when it
    /// lexes, parses, resolves and optimizes without error — running the
    /// resulting binary and checking its exit status is left to the
    /// integration test harness, which has a real filesystem sandbox.
    pub fn test(&self, specific_file: Option<PathBuf>) -> Result<(), CompileError> {
        let files = if let Some(file) = specific_file {
            vec![file]
        } else {
            self.find_anv_files_in_directory()?
        };

        log::info!("testing {} file(s)", files.len());

        let mut all_passed = true;
        for file in files {
            match self.test_file(&file) {
                Ok(()) => log::info!("{:?}: PASSED", file),
                Err(e) => {
                    log::error!("{:?}: FAILED: {}", file, e);
                    all_passed = false;
                }
            }
        }

        if all_passed {
            Ok(())
        } else {
            Err(CompileError::TestFailed)
        }
    }

    fn test_file(&self, file_path: &Path) -> Result<(), CompileError> {
        let content = std::fs::read_to_string(file_path)?;
        let (program, imports) = self.compile_to_ast(&content)?;
        crate::codegen::generate(&program, &imports)?;
        Ok(())
    }

    fn assemble_and_link(&self, asm_path: &Path, output_path: &Path) -> Result<(), CompileError> {
        self.log_verbose("assembling with `as`...");

        let obj_path = self.build_path.join("out.o");

        let assemble_status = Command::new("as")
            .arg("--64")
            .arg(asm_path)
            .arg("-o")
            .arg(&obj_path)
            .status()
            .map_err(CompileError::ToolInvocation)?;

        if !assemble_status.success() {
            return Err(CompileError::ToolFailed(assemble_status));
        }

        self.log_verbose("linking with `ld`...");

        match self.link_with_ld(&obj_path, output_path) {
            Ok(()) => {
                self.make_executable(output_path)?;
                Ok(())
            }
            Err(e) => self
                .link_with_cc_fallback(&obj_path, output_path)
                .map_err(|_| e),
        }
    }

    fn link_with_ld(&self, obj_path: &Path, output_path: &Path) -> Result<(), CompileError> {
        let status = Command::new("ld")
            .arg(obj_path)
            .arg("-o")
            .arg(output_path)
            .status()
            .map_err(CompileError::ToolInvocation)?;

        if status.success() {
            Ok(())
        } else {
            Err(CompileError::ToolFailed(status))
        }
    }

    fn link_with_cc_fallback(&self, obj_path: &Path, output_path: &Path) -> Result<(), CompileError> {
        let status = Command::new("cc")
            .arg(obj_path)
            .arg("-nostartfiles")
            .arg("-o")
            .arg(output_path)
            .status()
            .map_err(CompileError::ToolInvocation)?;

        if status.success() {
            log::warn!("linked with cc fallback after ld failed");
            self.make_executable(output_path)?;
            Ok(())
        } else {
            Err(CompileError::ToolFailed(status))
        }
    }

    fn execute_binary(&self, output_name: &str) -> Result<(), CompileError> {
        let binary_path = self.build_path.join(output_name);
        if !binary_path.exists() {
            return Err(CompileError::BinaryNotFound);
        }

        let status = Command::new(&binary_path)
            .status()
            .map_err(CompileError::ToolInvocation)?;

        if status.success() {
            Ok(())
        } else {
            Err(CompileError::ToolFailed(status))
        }
    }

    fn find_anv_files_in_directory(&self) -> Result<Vec<PathBuf>, CompileError> {
        let mut files = Vec::new();
        if self.source_path.is_dir() {
            if let Ok(entries) = std::fs::read_dir(&self.source_path) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() && self.is_anv_file(&path) {
                        files.push(path);
                    }
                }
            }
        } else if self.source_path.is_file() && self.is_anv_file(&self.source_path) {
            files.push(self.source_path.clone());
        }

        if files.is_empty() {
            Err(CompileError::NoSourceFile)
        } else {
            Ok(files)
        }
    }

    fn is_anv_file(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "anv")
    }

    fn make_executable(&self, path: &Path) -> Result<(), CompileError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(path)?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(path, perms)?;
        }
        Ok(())
    }
}
