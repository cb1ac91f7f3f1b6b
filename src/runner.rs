//! Parse-and-run in one call.

use crate::bfir::{parse, Program};
use crate::config::{Config, ExecutionMode};
use crate::error::{CodegenError, Error};
use crate::execution::execute;
use crate::io::ByteSource;
use crate::jit;
use std::io::Write;
use tracing::{debug, warn};

/// Parse `source` and run it with `mode`, reading from `input` and writing
/// to `output`.
///
/// Empty source does nothing. If the JIT is not available on this host,
/// falls back to the interpreter.
pub fn run(
    source: &str,
    input: &mut dyn ByteSource,
    output: &mut dyn Write,
    config: &Config,
    mode: ExecutionMode,
) -> Result<(), Error> {
    if source.is_empty() {
        debug!("empty source, nothing to run");
        return Ok(());
    }

    let program = parse(source, config)?;
    run_program(&program, input, output, mode)
}

/// Run an already parsed program with `mode`.
pub fn run_program(
    program: &Program,
    input: &mut dyn ByteSource,
    output: &mut dyn Write,
    mode: ExecutionMode,
) -> Result<(), Error> {
    match mode {
        ExecutionMode::Interpret => {
            execute(program, input, output)?;
        }
        ExecutionMode::Jit => match jit::compile(program) {
            Ok(routine) => {
                routine.run(input, output)?;
            }
            Err(CodegenError::UnsupportedTarget { arch }) => {
                warn!(arch, "no JIT for this host, interpreting instead");
                execute(program, input, output)?;
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}
