//! bfir defines the instruction stream that every backend consumes. The
//! stream is flat: loops are bracketed by `LoopStart`/`LoopEnd` markers
//! rather than nested, and each instruction remembers the stretch of
//! source it came from so we can point back at it in error messages.
//!
//! It also provides functions for generating programs from source code,
//! producing good error messages on malformed inputs, and for turning a
//! program back into source.

use crate::config::Config;
use crate::diagnostics::Position;
use crate::error::SyntaxError;
use crate::peephole::{is_zero_loop, Fuser};
use itertools::Itertools;
use std::fmt;
use tracing::debug;

#[cfg(test)]
use crate::peephole::OptimisationFlags;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// Cells are single bytes, so cell arithmetic wraps at 256.
pub const CELL_MODULUS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Move,
    Add,
    /// Set the current cell to zero. This has no direct equivalent in BF,
    /// we generate it from `[-]` and `[+]` during parsing.
    Reset,
    LoopStart,
    LoopEnd,
    Read,
    Write,
}

/// A single operation plus its repeat count. Only `Move` and `Add` use
/// the count; every other operation carries 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub count: usize,
    pub position: Option<Position>,
}

impl Instruction {
    pub fn new(op: Op, count: usize) -> Self {
        Instruction {
            op,
            count,
            position: None,
        }
    }

    pub fn at(op: Op, count: usize, position: Option<Position>) -> Self {
        Instruction {
            op,
            count,
            position,
        }
    }

    pub fn eq_ignore_position(&self, other: &Instruction) -> bool {
        self.op == other.op && self.count == other.count
    }
}

/// A parsed, validated program. Brackets are balanced and never nested
/// as deep as `max_loop_depth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
    tape_length: usize,
    max_loop_depth: usize,
}

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn tape_length(&self) -> usize {
        self.tape_length
    }

    pub fn max_loop_depth(&self) -> usize {
        self.max_loop_depth
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The source position of the instruction at `index`, if known.
    pub fn position_of(&self, index: usize) -> Option<Position> {
        self.instructions.get(index).and_then(|instr| instr.position)
    }
}

/// Given a string of BF source code, parse and return our BF IR
/// representation. If parsing fails, return a `SyntaxError` describing
/// what went wrong.
pub fn parse(source: &str, config: &Config) -> Result<Program, SyntaxError> {
    let tape_length = config.tape_length();
    let max_loop_depth = config.max_loop_depth();

    let mut fuser = Fuser::new(tape_length, config.optimisations(), source.len());
    // Only the nesting depth matters for validation; the positions are
    // kept so an unclosed `[` can be reported.
    let mut open_loops: Vec<usize> = vec![];

    for (index, c) in source.chars().enumerate() {
        let position = Some(Position::at(index));
        match c {
            '>' => fuser.push_counted(Op::Move, 1, position),
            '<' => fuser.push_counted(Op::Move, tape_length - 1, position),
            '+' => fuser.push_counted(Op::Add, 1, position),
            '-' => fuser.push_counted(Op::Add, CELL_MODULUS - 1, position),
            ',' => fuser.push(Op::Read, position),
            '.' => fuser.push(Op::Write, position),
            '[' => {
                if open_loops.len() + 1 >= max_loop_depth {
                    return Err(SyntaxError::TooDeep {
                        position: Position::at(index),
                        max_depth: max_loop_depth,
                    });
                }
                open_loops.push(index);
                fuser.push(Op::LoopStart, position);
            }
            ']' => {
                if open_loops.pop().is_none() {
                    return Err(SyntaxError::UnmatchedClose {
                        position: Position::at(index),
                    });
                }
                fuser.push_loop_end(position);
            }
            _ => (),
        }
    }

    if let Some(&index) = open_loops.last() {
        return Err(SyntaxError::UnmatchedOpen {
            position: Position::at(index),
        });
    }

    debug!(
        fusions = fuser.fusions(),
        "parsed {} characters of source",
        source.len()
    );
    let instructions = fuser.finish();
    debug!(instructions = instructions.len(), tape_length, "built program");

    Ok(Program {
        instructions,
        tape_length,
        max_loop_depth,
    })
}

/// Render `count` steps in whichever direction takes fewer characters.
fn shortest_run(count: usize, modulus: usize, up: char, down: char) -> String {
    let back = modulus - count;
    if count <= back {
        up.to_string().repeat(count)
    } else {
        down.to_string().repeat(back)
    }
}

/// A cancelled pair that parses to nothing but stops the instructions on
/// either side of it from fusing. It must not use `previous`'s operation.
fn fusion_barrier(previous: Op) -> &'static str {
    if previous == Op::Move {
        "+-"
    } else {
        "><"
    }
}

/// Given a program, decompile it back into BF source code. Parsing the
/// result with the same tape length gives back the same instructions.
///
/// Neighbours that parsing kept apart, such as two `Move`s either side of
/// a cancelled `+-`, are separated again the same way.
pub fn decompile(program: &Program) -> String {
    let instructions = &program.instructions;
    instructions
        .iter()
        .enumerate()
        .map(|(index, instr)| {
            let previous = index.checked_sub(1).map(|i| &instructions[i]);
            let separate = match instr.op {
                Op::Move | Op::Add => previous.map_or(false, |prev| prev.op == instr.op),
                Op::LoopEnd => match index.checked_sub(2).map(|i| &instructions[i..index]) {
                    Some([start, body]) => is_zero_loop(start, body),
                    _ => false,
                },
                _ => false,
            };
            let barrier = match previous {
                Some(prev) if separate => fusion_barrier(prev.op),
                _ => "",
            };

            let body = match instr.op {
                Op::Move => shortest_run(instr.count, program.tape_length, '>', '<'),
                Op::Add => shortest_run(instr.count, CELL_MODULUS, '+', '-'),
                Op::Reset => "[-]".to_owned(),
                Op::LoopStart => "[".to_owned(),
                Op::LoopEnd => "]".to_owned(),
                Op::Read => ",".to_owned(),
                Op::Write => ".".to_owned(),
            };
            format!("{}{}", barrier, body)
        })
        .join("")
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", decompile(self))
    }
}

#[cfg(test)]
fn ops(program: &Program) -> Vec<(Op, usize)> {
    program
        .instructions()
        .iter()
        .map(|instr| (instr.op, instr.count))
        .collect()
}

#[cfg(test)]
fn parse_default(source: &str) -> Result<Program, SyntaxError> {
    parse(source, &Config::default())
}

#[test]
fn parse_increment() {
    let program = parse_default("+").unwrap();
    assert_eq!(
        program.instructions(),
        [Instruction::at(Op::Add, 1, Some(Position::at(0)))]
    );
    assert_eq!(
        parse_default("++").unwrap().instructions(),
        [Instruction::at(
            Op::Add,
            2,
            Some(Position { start: 0, end: 1 })
        )]
    );
}

#[test]
fn parse_decrement() {
    assert_eq!(ops(&parse_default("-").unwrap()), [(Op::Add, 255)]);
    assert_eq!(ops(&parse_default("---").unwrap()), [(Op::Add, 253)]);
}

#[test]
fn parse_pointer_moves() {
    assert_eq!(ops(&parse_default(">").unwrap()), [(Op::Move, 1)]);
    assert_eq!(ops(&parse_default("<").unwrap()), [(Op::Move, 29999)]);
    assert_eq!(ops(&parse_default("<<").unwrap()), [(Op::Move, 29998)]);
}

#[test]
fn parse_read_write() {
    assert_eq!(
        ops(&parse_default(",.").unwrap()),
        [(Op::Read, 1), (Op::Write, 1)]
    );
}

#[test]
fn parse_empty_loop() {
    assert_eq!(
        ops(&parse_default("[]").unwrap()),
        [(Op::LoopStart, 1), (Op::LoopEnd, 1)]
    );
}

#[test]
fn parse_complex_loop() {
    assert_eq!(
        ops(&parse_default(".[,+]-").unwrap()),
        [
            (Op::Write, 1),
            (Op::LoopStart, 1),
            (Op::Read, 1),
            (Op::Add, 1),
            (Op::LoopEnd, 1),
            (Op::Add, 255),
        ]
    );
}

#[test]
fn parse_comment() {
    assert!(parse_default("foo! ").unwrap().is_empty());
}

#[test]
fn parse_keeps_parameters() {
    let config = Config::new(64, 8).unwrap();
    let program = parse("<", &config).unwrap();
    assert_eq!(program.tape_length(), 64);
    assert_eq!(program.max_loop_depth(), 8);
    assert_eq!(ops(&program), [(Op::Move, 63)]);
}

#[test]
fn parse_unbalanced_loop() {
    assert_eq!(
        parse_default("]"),
        Err(SyntaxError::UnmatchedClose {
            position: Position::at(0)
        })
    );
    assert_eq!(
        parse_default("["),
        Err(SyntaxError::UnmatchedOpen {
            position: Position::at(0)
        })
    );
    assert!(parse_default("][").is_err());
    assert_eq!(
        parse_default("[][").unwrap_err().position(),
        Position::at(2)
    );
    assert_eq!(
        parse_default("[[]").unwrap_err().position(),
        Position::at(0)
    );
}

#[test]
fn parse_too_deep() {
    let source = "[".repeat(300);
    assert_eq!(
        parse_default(&source),
        Err(SyntaxError::TooDeep {
            position: Position::at(255),
            max_depth: 256,
        })
    );

    // One level shallower than the limit is fine.
    let source = format!("{}{}", "[".repeat(255), "]".repeat(255));
    assert!(parse_default(&source).is_ok());
}

#[test]
fn parse_too_deep_small_limit() {
    let config = Config::new(100, 2).unwrap();
    assert!(parse("[]", &config).is_ok());
    assert!(parse("[[]]", &config).is_err());
    assert!(parse("[][]", &config).is_ok());
}

#[test]
fn parse_without_optimisations() {
    let config = Config::default().with_optimisations(OptimisationFlags::empty());
    assert_eq!(
        ops(&parse("++[-]", &config).unwrap()),
        [
            (Op::Add, 1),
            (Op::Add, 1),
            (Op::LoopStart, 1),
            (Op::Add, 255),
            (Op::LoopEnd, 1),
        ]
    );
}

#[test]
fn decompile_simple() {
    let program = parse_default("+++[->+<]<<.,").unwrap();
    assert_eq!(decompile(&program), "+++[->+<]<<.,");
}

#[test]
fn decompile_chooses_shorter_direction() {
    let config = Config::new(10, 256).unwrap();
    let program = parse(">>>>>>>>", &config).unwrap();
    assert_eq!(program.to_string(), "<<");

    let program = parse_default(&"+".repeat(250)).unwrap();
    assert_eq!(program.to_string(), "------");
}

#[test]
fn decompile_keeps_cancelled_runs_apart() {
    let program = parse_default("+>+-<+").unwrap();
    assert_eq!(
        ops(&program),
        [(Op::Add, 1), (Op::Move, 1), (Op::Move, 29999), (Op::Add, 1)]
    );
    assert_eq!(program.to_string(), "+>+-<+");

    let program = parse_default("[+><]").unwrap();
    assert_eq!(
        ops(&program),
        [(Op::LoopStart, 1), (Op::Add, 1), (Op::LoopEnd, 1)]
    );
    assert_eq!(program.to_string(), "[+><]");
    assert_eq!(ops(&parse_default(&program.to_string()).unwrap()), ops(&program));
}

#[test]
fn decompile_reset() {
    let program = parse_default("+[+]").unwrap();
    assert_eq!(program.to_string(), "+[-]");
}

#[test]
fn position_of_fused_instruction() {
    let program = parse_default("+ +\n,").unwrap();
    assert_eq!(program.position_of(0), Some(Position { start: 0, end: 2 }));
    assert_eq!(program.position_of(1), Some(Position::at(4)));
    assert_eq!(program.position_of(2), None);
}
