//! Local fusion of adjacent instructions, applied while parsing.
//!
//! Two rewrites are performed:
//!
//! * run-length fusion: consecutive `Move`s (or `Add`s) become one
//!   instruction whose count is their modular sum. A run that sums to zero
//!   stays in place while more of the same operation follows, and is
//!   removed once a different one arrives; the instruction before it is
//!   never merged into;
//! * zero-loop fusion: `[-]` and `[+]` become a single `Reset`.
//!
//! Both only ever look at the tail of the instructions emitted so far, so
//! the parser can apply them in a single left-to-right scan.

use crate::bfir::{Instruction, Op, CELL_MODULUS};
use crate::diagnostics::{Combine, Position};
use bitflags::bitflags;

bitflags! {
    pub struct OptimisationFlags: u8 {
        const RUN_LENGTH = 0b0000_0001;
        const ZERO_LOOP = 0b0000_0010;
    }
}

/// Accumulates instructions, fusing each one into its predecessors where
/// the enabled optimisations allow.
#[derive(Debug)]
pub(crate) struct Fuser {
    instructions: Vec<Instruction>,
    tape_length: usize,
    flags: OptimisationFlags,
    fusions: usize,
}

/// Add two counts that are already reduced modulo `modulus`.
pub(crate) fn add_mod(a: usize, b: usize, modulus: usize) -> usize {
    debug_assert!(a < modulus && b < modulus);
    if a >= modulus - b {
        a - (modulus - b)
    } else {
        a + b
    }
}

impl Fuser {
    pub fn new(tape_length: usize, flags: OptimisationFlags, capacity: usize) -> Self {
        Fuser {
            instructions: Vec::with_capacity(capacity),
            tape_length,
            flags,
            fusions: 0,
        }
    }

    fn modulus(&self, op: Op) -> usize {
        match op {
            Op::Move => self.tape_length,
            _ => CELL_MODULUS,
        }
    }

    /// Append a `Move` or `Add` of `count`, taken modulo the operation's
    /// wraparound.
    pub fn push_counted(&mut self, op: Op, count: usize, position: Option<Position>) {
        debug_assert!(op == Op::Move || op == Op::Add);
        let modulus = self.modulus(op);
        let count = count % modulus;

        if self.flags.contains(OptimisationFlags::RUN_LENGTH) {
            if let Some(last) = self.instructions.last_mut() {
                if last.op == op {
                    last.count = add_mod(last.count, count, modulus);
                    last.position = last.position.combine(position);
                    self.fusions += 1;
                    return;
                }
            }
        }

        self.drop_cancelled();
        self.instructions.push(Instruction::at(op, count, position));
    }

    /// Append an instruction that never fuses with its predecessor.
    pub fn push(&mut self, op: Op, position: Option<Position>) {
        debug_assert!(op != Op::Move && op != Op::Add && op != Op::LoopEnd);
        self.drop_cancelled();
        self.instructions.push(Instruction::at(op, 1, position));
    }

    /// Close the innermost loop, replacing it with `Reset` when its whole
    /// body is a single `+` or `-`.
    pub fn push_loop_end(&mut self, position: Option<Position>) {
        if self.flags.contains(OptimisationFlags::ZERO_LOOP) {
            if let [.., start, body] = self.instructions.as_slice() {
                if is_zero_loop(start, body) {
                    let start_position = start.position;
                    self.instructions.truncate(self.instructions.len() - 2);
                    self.instructions.push(Instruction::at(
                        Op::Reset,
                        1,
                        start_position.combine(position),
                    ));
                    self.fusions += 1;
                    return;
                }
            }
        }

        self.drop_cancelled();
        self.instructions.push(Instruction::at(Op::LoopEnd, 1, position));
    }

    /// Remove a trailing `Move`/`Add` whose run summed to zero.
    fn drop_cancelled(&mut self) {
        if let Some(last) = self.instructions.last() {
            if last.count == 0 && (last.op == Op::Move || last.op == Op::Add) {
                self.instructions.pop();
            }
        }
    }

    /// How many instructions were folded away so far.
    pub fn fusions(&self) -> usize {
        self.fusions
    }

    pub fn finish(mut self) -> Vec<Instruction> {
        self.drop_cancelled();
        self.instructions
    }
}

/// The loop `[` followed by exactly one `+` or `-` always leaves the cell at
/// zero: it steps the cell by one until it gets there.
pub(crate) fn is_zero_loop(start: &Instruction, body: &Instruction) -> bool {
    start.op == Op::LoopStart
        && body.op == Op::Add
        && (body.count == 1 || body.count == CELL_MODULUS - 1)
}
