//! Direct execution of the instruction stream.
//!
//! Loops are handled without a precomputed jump table. We keep a stack of
//! the `LoopStart` indices we are inside, and a single `skip` level: when a
//! loop is entered with a zero cell, `skip` records the stack depth of that
//! loop and every instruction is ignored until its `LoopEnd` pops back to
//! that depth. A non-zero cell at `LoopEnd` jumps back to the top of the
//! stack without popping.

use crate::bfir::{Op, Program};
use crate::error::RunError;
use crate::io::{read_byte, write_byte, ByteSource};
use crate::tape::Tape;
use std::io::Write;
use tracing::debug;

/// Run `program` against a fresh tape, returning the tape in its final
/// state.
pub fn execute<S, W>(program: &Program, input: &mut S, output: &mut W) -> Result<Tape, RunError>
where
    S: ByteSource + ?Sized,
    W: Write + ?Sized,
{
    let mut tape = Tape::new(program.tape_length());
    execute_with_tape(program, &mut tape, input, output)?;
    Ok(tape)
}

/// Run `program` against an existing tape, starting at its current
/// pointer. On error the tape is left as it was when the error happened.
pub fn execute_with_tape<S, W>(
    program: &Program,
    tape: &mut Tape,
    input: &mut S,
    output: &mut W,
) -> Result<(), RunError>
where
    S: ByteSource + ?Sized,
    W: Write + ?Sized,
{
    if tape.len() != program.tape_length() {
        return Err(RunError::TapeMismatch {
            expected: program.tape_length(),
            actual: tape.len(),
        });
    }

    let can_seek = input.can_seek();
    let instructions = program.instructions();
    let mut loop_starts: Vec<usize> = Vec::with_capacity(program.max_loop_depth());
    let mut skip = 0;
    let mut cursor = 0;

    debug!(
        instructions = instructions.len(),
        can_seek, "interpreting program"
    );

    while cursor < instructions.len() {
        let instr = &instructions[cursor];
        match instr.op {
            Op::Move => {
                if skip == 0 {
                    tape.advance(instr.count);
                }
            }
            Op::Add => {
                if skip == 0 {
                    tape.add(instr.count as u8);
                }
            }
            Op::Reset => {
                if skip == 0 {
                    tape.set(0);
                }
            }
            Op::LoopStart => {
                loop_starts.push(cursor);
                if skip == 0 && tape.get() == 0 {
                    skip = loop_starts.len();
                }
            }
            Op::LoopEnd => {
                if skip == 0 && tape.get() != 0 {
                    if let Some(&start) = loop_starts.last() {
                        cursor = start;
                    }
                } else {
                    if skip == loop_starts.len() {
                        skip = 0;
                    }
                    loop_starts.pop();
                }
            }
            Op::Read => {
                if skip == 0 {
                    // A prompt written before this read has to be visible
                    // while we wait.
                    output.flush()?;
                    let byte = read_byte(input, can_seek, instr.position)?;
                    tape.set(byte);
                }
            }
            Op::Write => {
                if skip == 0 {
                    write_byte(output, tape.get())?;
                }
            }
        }
        cursor += 1;
    }

    output.flush()?;
    debug!(pointer = tape.pointer(), "interpreter finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfir::parse;
    use crate::config::Config;
    use crate::diagnostics::Position;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const HELLO: &str =
        "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.";

    fn run(source: &str, input: &[u8]) -> Result<(Vec<u8>, Tape), RunError> {
        run_with(source, input, &Config::default())
    }

    fn run_with(source: &str, input: &[u8], config: &Config) -> Result<(Vec<u8>, Tape), RunError> {
        let program = parse(source, config).unwrap();
        let mut output = vec![];
        let tape = execute(&program, &mut Cursor::new(input), &mut output)?;
        Ok((output, tape))
    }

    #[test]
    fn hello() {
        let (output, _) = run(HELLO, b"").unwrap();
        assert_eq!(output, b"Hello");
    }

    #[test]
    fn echo_then_exhausted() {
        let (output, tape) = run(",.", &[0x41]).unwrap();
        assert_eq!(output, [0x41]);
        assert_eq!(tape.get(), 0x41);

        let error = run(",.", &[]).unwrap_err();
        assert!(matches!(
            error,
            RunError::InputExhausted {
                position: Some(Position { start: 0, end: 0 })
            }
        ));
    }

    #[test]
    fn reset_outputs_zero() {
        let (output, _) = run("+++[-].", b"").unwrap();
        assert_eq!(output, [0]);
        let (output, _) = run("+++[+].", b"").unwrap();
        assert_eq!(output, [0]);
    }

    #[test]
    fn move_wraps_both_ways() {
        let config = Config::new(4, 256).unwrap();
        let (_, tape) = run_with("<", b"", &config).unwrap();
        assert_eq!(tape.pointer(), 3);
        let (_, tape) = run_with(">>>>>", b"", &config).unwrap();
        assert_eq!(tape.pointer(), 1);
        let (_, tape) = run_with("<+>>>>+", b"", &config).unwrap();
        assert_eq!(tape.cells(), [0, 0, 0, 2]);
    }

    #[test]
    fn add_wraps() {
        let (output, _) = run(&format!("{}.", "+".repeat(257)), b"").unwrap();
        assert_eq!(output, [1]);
        let (output, _) = run("-.", b"").unwrap();
        assert_eq!(output, [255]);
    }

    #[test]
    fn skipped_loops_ignore_their_body() {
        // The cell is zero, so neither the loop nor the nested one runs,
        // and the read inside is never attempted.
        let (output, tape) = run("[,[.]>+<].", b"").unwrap();
        assert_eq!(output, [0]);
        assert_eq!(tape.cells()[1], 0);
    }

    #[test]
    fn nested_loops_multiply() {
        // 3 * 4 = 12 into the third cell.
        let (_, tape) = run("+++[>++++[>+<-]<-]", b"").unwrap();
        assert_eq!(&tape.cells()[..3], [0, 0, 12]);
        assert_eq!(tape.pointer(), 0);
    }

    #[test]
    fn skip_inside_running_loop() {
        // The inner loop is skipped on every pass of the outer one.
        let (output, _) = run("++[>[.]<-.]", b"").unwrap();
        assert_eq!(output, [1, 0]);
    }

    #[test]
    fn tape_mismatch() {
        let program = parse("+", &Config::default()).unwrap();
        let mut tape = Tape::new(10);
        let mut output = Vec::<u8>::new();
        let error =
            execute_with_tape(&program, &mut tape, &mut Cursor::new(b""), &mut output).unwrap_err();
        assert!(matches!(
            error,
            RunError::TapeMismatch {
                expected: 30000,
                actual: 10
            }
        ));
    }

    #[test]
    fn reuses_tape_between_runs() {
        let config = Config::new(8, 256).unwrap();
        let program = parse("+>", &config).unwrap();
        let mut tape = Tape::new(8);
        for _ in 0..3 {
            let mut output = Vec::<u8>::new();
            execute_with_tape(&program, &mut tape, &mut Cursor::new(b""), &mut output).unwrap();
        }
        assert_eq!(tape.cells(), [1, 1, 1, 0, 0, 0, 0, 0]);
        assert_eq!(tape.pointer(), 3);
    }

    #[test]
    fn prompt_is_flushed_before_reading() {
        use crate::io::recording::{streams, Event};

        let program = parse("+++.,.", &Config::default()).unwrap();
        let (log, mut output, mut input) = streams(b"x");
        execute(&program, &mut input, &mut output).unwrap();
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
