#![warn(trivial_numeric_casts)]

//! bfc-jit parses BF programs into a compact instruction stream, then
//! interprets them, compiles them to native code in memory, or writes
//! them out as standalone executables.
//! The intermediate representation and peephole passes grew out of
//! [bfc](https://github.com/Wilfred/bfc).

pub use bfir::{decompile, parse, Instruction, Op, Program, CELL_MODULUS};
pub use config::{Config, ExecutionMode, DEFAULT_MAX_LOOP_DEPTH, DEFAULT_TAPE_LENGTH};
pub use diagnostics::{Diagnostic, Position};
pub use error::{CodegenError, ConfigError, Error, RunError, SyntaxError};
pub use execution::{execute, execute_with_tape};
pub use peephole::OptimisationFlags;
pub use runner::{run, run_program};
pub use tape::Tape;

pub mod aot;
mod bfir;
pub mod codegen;
mod config;
mod diagnostics;
mod elf;
mod error;
mod execution;
pub mod io;
pub mod jit;
mod peephole;
mod runner;
mod tape;

#[cfg(test)]
mod peephole_tests;
