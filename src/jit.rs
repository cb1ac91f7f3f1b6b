//! Just-in-time compilation: lower a program to machine code, map it
//! executable in this process and call it directly.
//!
//! Reads and writes go back through [`crate::io`] via two small hook
//! functions, so a compiled routine sees exactly the same streams, polling
//! behaviour and errors as the interpreter.

use crate::bfir::Program;
use crate::diagnostics::Position;
use crate::error::{CodegenError, RunError};
use crate::io::ByteSource;
use crate::tape::Tape;
use std::fmt;
use std::io::Write;

/// Native code for one program. Immutable once built; every call gets its
/// own tape and streams.
pub struct CompiledRoutine {
    code: native::Code,
    code_len: usize,
    tape_length: usize,
    positions: Vec<Option<Position>>,
}

impl fmt::Debug for CompiledRoutine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompiledRoutine")
            .field("code_len", &self.code_len)
            .field("tape_length", &self.tape_length)
            .finish()
    }
}

/// Compile `program` for the host. Fails with `UnsupportedTarget` unless
/// the host is x86-64 Unix.
pub fn compile(program: &Program) -> Result<CompiledRoutine, CodegenError> {
    let (code, code_len) = native::compile(program)?;
    Ok(CompiledRoutine {
        code,
        code_len,
        tape_length: program.tape_length(),
        positions: program
            .instructions()
            .iter()
            .map(|instr| instr.position)
            .collect(),
    })
}

impl CompiledRoutine {
    /// Size of the generated machine code in bytes.
    pub fn code_len(&self) -> usize {
        self.code_len
    }

    pub fn tape_length(&self) -> usize {
        self.tape_length
    }

    /// Run against a fresh tape, returning the tape in its final state.
    pub fn run(
        &self,
        input: &mut dyn ByteSource,
        output: &mut dyn Write,
    ) -> Result<Tape, RunError> {
        let mut tape = Tape::new(self.tape_length);
        self.run_with_tape(&mut tape, input, output)?;
        Ok(tape)
    }

    /// Run against an existing tape, starting at its current pointer.
    pub fn run_with_tape(
        &self,
        tape: &mut Tape,
        input: &mut dyn ByteSource,
        output: &mut dyn Write,
    ) -> Result<(), RunError> {
        if tape.len() != self.tape_length {
            return Err(RunError::TapeMismatch {
                expected: self.tape_length,
                actual: tape.len(),
            });
        }
        native::invoke(&self.code, &self.positions, tape, input, output)?;
        output.flush()?;
        Ok(())
    }
}

#[cfg(all(target_arch = "x86_64", unix))]
mod native {
    use crate::bfir::Program;
    use crate::codegen::lower_program;
    use crate::codegen::x86_64::{Assembler, IoMode};
    use crate::diagnostics::Position;
    use crate::error::{CodegenError, RunError};
    use crate::io::{read_byte, write_byte, ByteSource};
    use crate::tape::Tape;
    use std::ffi::c_void;
    use std::io::{self, Write};
    use std::ptr;
    use tracing::debug;

    type Entry = unsafe extern "sysv64" fn(*mut u8, *mut usize, *mut c_void) -> u32;

    /// A read-only, executable copy of some machine code.
    pub struct Code {
        ptr: *mut c_void,
        len: usize,
    }

    // The mapping is never written after construction.
    unsafe impl Send for Code {}
    unsafe impl Sync for Code {}

    impl Code {
        fn map(code: &[u8]) -> io::Result<Code> {
            let len = code.len();
            // SAFETY: a fresh private anonymous mapping that nothing else
            // refers to; we copy into it before making it executable.
            unsafe {
                let ptr = libc::mmap(
                    ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                );
                if ptr == libc::MAP_FAILED {
                    return Err(io::Error::last_os_error());
                }
                ptr::copy_nonoverlapping(code.as_ptr(), ptr as *mut u8, len);
                if libc::mprotect(ptr, len, libc::PROT_READ | libc::PROT_EXEC) != 0 {
                    let error = io::Error::last_os_error();
                    libc::munmap(ptr, len);
                    return Err(error);
                }
                Ok(Code { ptr, len })
            }
        }

        fn entry(&self) -> Entry {
            // SAFETY: the mapping starts with a routine following the
            // calling convention in `codegen::x86_64`.
            unsafe { std::mem::transmute::<*mut c_void, Entry>(self.ptr) }
        }
    }

    impl Drop for Code {
        fn drop(&mut self) {
            // SAFETY: we own the mapping and nothing can be executing it.
            unsafe {
                libc::munmap(self.ptr, self.len);
            }
        }
    }

    /// What the hooks need from the caller of a routine.
    struct IoContext<'a> {
        input: &'a mut dyn ByteSource,
        output: &'a mut dyn Write,
        can_seek: bool,
        positions: &'a [Option<Position>],
        error: Option<RunError>,
    }

    extern "sysv64" fn read_hook(context: *mut c_void, index: u32) -> i32 {
        // SAFETY: the routine passes back the context pointer `invoke`
        // gave it, which outlives the call.
        let context = unsafe { &mut *(context as *mut IoContext) };
        let position = context.positions.get(index as usize).copied().flatten();
        if let Err(error) = context.output.flush() {
            context.error = Some(error.into());
            return -1;
        }
        match read_byte(&mut *context.input, context.can_seek, position) {
            Ok(byte) => i32::from(byte),
            Err(error) => {
                context.error = Some(error);
                -1
            }
        }
    }

    extern "sysv64" fn write_hook(context: *mut c_void, byte: u32, _index: u32) -> i32 {
        // SAFETY: as for `read_hook`.
        let context = unsafe { &mut *(context as *mut IoContext) };
        match write_byte(&mut *context.output, byte as u8) {
            Ok(()) => 0,
            Err(error) => {
                context.error = Some(error);
                1
            }
        }
    }

    pub fn compile(program: &Program) -> Result<(Code, usize), CodegenError> {
        let mut asm = Assembler::new(IoMode::Hosted {
            read: read_hook as *const () as usize as u64,
            write: write_hook as *const () as usize as u64,
        });
        lower_program(program, &mut asm)?;
        let bytes = asm.finish()?;
        let code = Code::map(&bytes).map_err(CodegenError::Map)?;
        debug!(bytes = bytes.len(), "mapped compiled routine");
        Ok((code, bytes.len()))
    }

    pub fn invoke(
        code: &Code,
        positions: &[Option<Position>],
        tape: &mut Tape,
        input: &mut dyn ByteSource,
        output: &mut dyn Write,
    ) -> Result<(), RunError> {
        let can_seek = input.can_seek();
        let mut context = IoContext {
            input,
            output,
            can_seek,
            positions,
            error: None,
        };
        let (cells, pointer) = tape.raw_parts();

        // SAFETY: `cells` holds as many bytes as the routine was compiled
        // for (checked by the caller) and the pointer starts in range.
        let status = unsafe {
            (code.entry())(
                cells,
                pointer as *mut usize,
                &mut context as *mut IoContext as *mut c_void,
            )
        };

        match (status, context.error) {
            (0, _) => Ok(()),
            (_, Some(error)) => Err(error),
            (_, None) => Err(RunError::Io(io::Error::new(
                io::ErrorKind::Other,
                "compiled routine failed without reporting an error",
            ))),
        }
    }
}

#[cfg(not(all(target_arch = "x86_64", unix)))]
mod native {
    use crate::bfir::Program;
    use crate::diagnostics::Position;
    use crate::error::{CodegenError, RunError};
    use crate::io::ByteSource;
    use crate::tape::Tape;
    use std::io::Write;

    /// Never constructed: there is no native backend for this host.
    pub enum Code {}

    pub fn compile(_program: &Program) -> Result<(Code, usize), CodegenError> {
        Err(CodegenError::UnsupportedTarget {
            arch: std::env::consts::ARCH,
        })
    }

    pub fn invoke(
        code: &Code,
        _positions: &[Option<Position>],
        _tape: &mut Tape,
        _input: &mut dyn ByteSource,
        _output: &mut dyn Write,
    ) -> Result<(), RunError> {
        match *code {}
    }
}

#[cfg(all(test, target_arch = "x86_64", unix))]
mod tests {
    use super::*;
    use crate::bfir::parse;
    use crate::config::Config;
    use crate::execution::execute;
    use crate::io::ChannelInput;
    use pretty_assertions::assert_eq;
    use std::io::{self, Cursor};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const HELLO: &str =
        "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.";

    fn compile_with(source: &str, config: &Config) -> CompiledRoutine {
        compile(&parse(source, config).unwrap()).unwrap()
    }

    /// A sink that refuses every write.
    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn hello() {
        let routine = compile_with(HELLO, &Config::default());
        let mut output = vec![];
        routine.run(&mut Cursor::new(b""), &mut output).unwrap();
        assert_eq!(output, b"Hello");
    }

    #[test]
    fn matches_interpreter_tape() {
        let config = Config::new(100, 256).unwrap();
        let source = "+++[>++++[>+<-]<-]>>>>--<<<<<<+";
        let program = parse(source, &config).unwrap();

        let expected = execute(&program, &mut Cursor::new(b""), &mut Vec::<u8>::new()).unwrap();
        let actual = compile(&program)
            .unwrap()
            .run(&mut Cursor::new(b""), &mut Vec::<u8>::new())
            .unwrap();
        assert_eq!(actual.cells(), expected.cells());
        assert_eq!(actual.pointer(), expected.pointer());
        assert_eq!(actual.pointer(), 98);
    }

    #[test]
    fn echo_then_exhausted() {
        let routine = compile_with(",.,.", &Config::default());
        let mut output = vec![];
        let error = routine
            .run(&mut Cursor::new(b"a"), &mut output)
            .unwrap_err();
        assert_eq!(output, b"a");
        assert!(matches!(
            error,
            RunError::InputExhausted {
                position: Some(Position { start: 2, end: 2 })
            }
        ));
    }

    #[test]
    fn write_failure_is_reported() {
        let routine = compile_with("+.", &Config::default());
        let error = routine
            .run(&mut Cursor::new(b""), &mut Closed)
            .unwrap_err();
        match error {
            RunError::Io(error) => assert_eq!(error.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn pointer_survives_between_runs() {
        let config = Config::new(5, 256).unwrap();
        let routine = compile_with("+>>", &config);
        let mut tape = Tape::new(5);
        for _ in 0..3 {
            routine
                .run_with_tape(&mut tape, &mut Cursor::new(b""), &mut Vec::<u8>::new())
                .unwrap();
        }
        // Pointer went 0 -> 2 -> 4 -> 1.
        assert_eq!(tape.cells(), [1, 0, 1, 0, 1]);
        assert_eq!(tape.pointer(), 1);
    }

    #[test]
    fn tape_mismatch() {
        let routine = compile_with("+", &Config::default());
        let error = routine
            .run_with_tape(&mut Tape::new(3), &mut Cursor::new(b""), &mut Vec::<u8>::new())
            .unwrap_err();
        assert!(matches!(
            error,
            RunError::TapeMismatch {
                expected: 30000,
                actual: 3
            }
        ));
    }

    #[test]
    fn polls_for_late_input() {
        let routine = compile_with(",+.", &Config::default());
        let (sender, receiver) = mpsc::channel();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(120));
            sender.send(b'a').unwrap();
        });

        let mut output = vec![];
        routine
            .run(&mut ChannelInput::new(receiver), &mut output)
            .unwrap();
        assert_eq!(output, b"b");
        producer.join().unwrap();
    }

    #[test]
    fn routine_is_shareable() {
        let routine = compile_with(",+.", &Config::default());
        thread::scope(|scope| {
            for byte in 0..4u8 {
                let routine = &routine;
                scope.spawn(move || {
                    let mut output = vec![];
                    routine.run(&mut Cursor::new([byte]), &mut output).unwrap();
                    assert_eq!(output, [byte + 1]);
                });
            }
        });
    }

    #[test]
    fn prompt_is_flushed_before_reading() {
        use crate::io::recording::{streams, Event};

        let routine = compile_with("+++.,.", &Config::default());
        let (log, mut output, mut input) = streams(b"x");
        routine.run(&mut input, &mut output).unwrap();
        assert_eq!(
            *log.borrow(),
            [
                Event::Write(3),
                Event::Flush,
                Event::Read(b'x'),
                Event::Write(b'x'),
                Event::Flush
            ]
        );
    }
}
