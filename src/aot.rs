//! Ahead-of-time compilation to a standalone Linux x86-64 executable.
//!
//! The executable starts in a small entry stub that maps a zeroed tape,
//! calls the compiled routine with the process's standard input and
//! output, and exits with the routine's status:
//!
//! | status | meaning                                  |
//! |--------|------------------------------------------|
//! | 0      | the program finished                     |
//! | 1      | input ran out, or a read or write failed |
//! | 2      | the tape could not be allocated          |

use crate::bfir::Program;
use crate::codegen::lower_program;
use crate::codegen::x86_64::{Assembler, IoMode};
use crate::codegen::Emitter;
use crate::elf::Image;
use crate::error::CodegenError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AotOptions {
    /// Stored as a NUL-terminated string after the code.
    pub module_name: String,
}

impl Default for AotOptions {
    fn default() -> Self {
        AotOptions {
            module_name: "bf_program".to_owned(),
        }
    }
}

/// Build the complete executable image for `program`.
pub fn build_executable(program: &Program, options: &AotOptions) -> Result<Vec<u8>, CodegenError> {
    let tape_length = i32::try_from(program.tape_length()).map_err(|_| CodegenError::TapeTooLarge {
        length: program.tape_length(),
    })? as u32;

    let mut asm = Assembler::new(IoMode::Freestanding);
    let routine = asm.new_label();
    asm.entry_point(routine, tape_length);
    asm.bind(routine);
    lower_program(program, &mut asm)?;
    let code = asm.finish()?;

    let mut trailer = options.module_name.clone().into_bytes();
    trailer.push(0);

    debug!(
        code = code.len(),
        module = %options.module_name,
        "assembled executable"
    );
    Ok(Image {
        code: &code,
        entry: 0,
        trailer: &trailer,
    }
    .to_bytes())
}

/// Compile `program` into an executable at `path`.
///
/// Refuses to replace anything already at `path`: that fails with
/// `ArtifactExists` and leaves the existing file alone.
pub fn compile_to_file<P: AsRef<Path>>(
    program: &Program,
    path: P,
    options: &AotOptions,
) -> Result<(), CodegenError> {
    let path = path.as_ref();
    let image = build_executable(program, options)?;

    let mut open = OpenOptions::new();
    open.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        open.mode(0o755);
    }
    let mut file = open.open(path).map_err(|error| match error.kind() {
        ErrorKind::AlreadyExists => CodegenError::ArtifactExists {
            path: path.to_path_buf(),
        },
        _ => CodegenError::Io(error),
    })?;

    if let Err(error) = file.write_all(&image).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(error.into());
    }

    info!(path = %path.display(), bytes = image.len(), "wrote executable");
    Ok(())
}
