//! # Compiler Error Definitions
//!
//! Centralizes every error the pipeline can raise, from lexing through
//! linking. Every compile-time variant carries a [`SourceLocation`] so the
//! CLI can print `file:line:column: message` (spec.md §7).

use crate::ast::token::SourceLocation;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no .anv source file given")]
    NoSourceFile,

    #[error("{location}: lexical error: {message}")]
    Lexical {
        location: SourceLocation,
        message: String,
    },

    #[error("{location}: syntax error: {message}")]
    Syntax {
        location: SourceLocation,
        message: String,
    },

    #[error("{location}: unknown module `{module}`")]
    UnknownModule {
        location: SourceLocation,
        module: String,
    },

    #[error("{location}: unknown import item `{item}` in module `{module}`")]
    UnknownImportItem {
        location: SourceLocation,
        module: String,
        item: String,
    },

    #[error("binary not found after compilation")]
    BinaryNotFound,

    #[error("failed to invoke external tool: {0}")]
    ToolInvocation(#[source] std::io::Error),

    #[error("external tool exited with status: {0}")]
    ToolFailed(ExitStatus),

    #[error("one or more tests failed")]
    TestFailed,

    #[error("invalid project manifest: {0}")]
    Manifest(String),
}

impl CompileError {
    pub fn lexical(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Lexical {
            location,
            message: message.into(),
        }
    }

    pub fn syntax(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Syntax {
            location,
            message: message.into(),
        }
    }

    pub fn unknown_module(location: SourceLocation, module: impl Into<String>) -> Self {
        Self::UnknownModule {
            location,
            module: module.into(),
        }
    }

    pub fn unknown_import_item(
        location: SourceLocation,
        module: impl Into<String>,
        item: impl Into<String>,
    ) -> Self {
        Self::UnknownImportItem {
            location,
            module: module.into(),
            item: item.into(),
        }
    }
}
