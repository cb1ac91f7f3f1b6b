//! Error types for parsing, running and compiling programs.

use crate::diagnostics::Position;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A program whose brackets cannot be matched.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SyntaxError {
    #[error("This ] has no matching [")]
    UnmatchedClose { position: Position },

    #[error("This [ has no matching ]")]
    UnmatchedOpen { position: Position },

    #[error("Loops may not be nested {max_depth} or more levels deep")]
    TooDeep { position: Position, max_depth: usize },
}

impl SyntaxError {
    pub fn position(&self) -> Position {
        match *self {
            SyntaxError::UnmatchedClose { position }
            | SyntaxError::UnmatchedOpen { position }
            | SyntaxError::TooDeep { position, .. } => position,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Input is not enough to feed the program (read at {})", describe(.position))]
    InputExhausted { position: Option<Position> },

    #[error("Tape has {actual} cells but the program was built for {expected}")]
    TapeMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn describe(position: &Option<Position>) -> String {
    match position {
        Some(position) => position.to_string(),
        None => "unknown position".to_owned(),
    }
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("Refusing to overwrite existing artifact {}", .path.display())]
    ArtifactExists { path: PathBuf },

    #[error("Loop brackets are unbalanced at instruction {index}")]
    UnbalancedLoops { index: usize },

    #[error("Branch to a label that was never bound")]
    UnboundLabel,

    #[error("Tape length {length} does not fit in a 32-bit immediate")]
    TapeTooLarge { length: usize },

    #[error("Program has too many instructions to address ({count})")]
    ProgramTooLarge { count: usize },

    #[error("Native code generation is not supported on {arch}")]
    UnsupportedTarget { arch: &'static str },

    #[error("Could not map executable memory: {0}")]
    Map(#[source] io::Error),

    #[error("Could not write artifact: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    #[error("Tape length must be at least 1")]
    ZeroTapeLength,

    #[error("Maximum loop depth must be at least 1")]
    ZeroLoopDepth,
}

/// Any failure from the parse/run/compile pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}
