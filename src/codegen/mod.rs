//! Lowering of the instruction stream to native code.
//!
//! [`lower`] walks a program once and drives an [`Emitter`], which knows
//! how to encode a handful of operations for some target. The same walk
//! feeds the in-process JIT, the ahead-of-time compiler and the textual
//! listing; only the emitter changes.
//!
//! A loop becomes a label at its top, a test that branches to a label
//! after its bottom when the cell is zero, and an unconditional jump back
//! to the top:
//!
//! ```text
//! start:  if tape[pointer] == 0 goto end
//!         ...body...
//!         goto start
//! end:
//! ```

use crate::bfir::{Instruction, Op, Program};
use crate::error::CodegenError;
use tracing::trace;

pub mod listing;
pub mod x86_64;

pub use self::listing::Listing;

/// How the pointer is brought back into range after a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    /// The tape length is a power of two; AND with this mask.
    Mask(u32),
    /// Subtract the tape length once if the pointer reached it.
    Length(u32),
}

impl Wrap {
    pub fn for_tape_length(tape_length: usize) -> Result<Wrap, CodegenError> {
        // Pointer arithmetic uses 32-bit signed immediates.
        let length = i32::try_from(tape_length)
            .map_err(|_| CodegenError::TapeTooLarge {
                length: tape_length,
            })? as u32;

        if length.is_power_of_two() {
            Ok(Wrap::Mask(length - 1))
        } else {
            Ok(Wrap::Length(length))
        }
    }
}

/// A target that lowered instructions are appended to.
pub trait Emitter {
    type Label: Copy;

    fn new_label(&mut self) -> Self::Label;

    /// Place `label` at the current end of the code.
    fn bind(&mut self, label: Self::Label);

    fn prologue(&mut self);

    fn epilogue(&mut self);

    /// `pointer = (pointer + count) mod tape_length`, with `count` below the
    /// tape length.
    fn move_pointer(&mut self, count: u32, wrap: Wrap);

    /// `tape[pointer] += amount`, truncated to a byte.
    fn add(&mut self, amount: u8);

    fn reset(&mut self);

    fn branch_if_zero(&mut self, target: Self::Label);

    fn jump(&mut self, target: Self::Label);

    /// Read a byte into the cell for the instruction at `index`.
    fn read(&mut self, index: u32);

    /// Write the cell for the instruction at `index`.
    fn write(&mut self, index: u32);
}

/// Lower a whole program into `emitter`.
pub fn lower_program<E: Emitter>(program: &Program, emitter: &mut E) -> Result<(), CodegenError> {
    lower(program.instructions(), program.tape_length(), emitter)
}

/// Lower `instructions` for a tape of `tape_length` cells.
///
/// Parsed programs always have balanced brackets, so the label stack is
/// non-empty at each `LoopEnd` and empty at the end; we still check, as
/// this also accepts hand-built instruction lists.
pub fn lower<E: Emitter>(
    instructions: &[Instruction],
    tape_length: usize,
    emitter: &mut E,
) -> Result<(), CodegenError> {
    let wrap = Wrap::for_tape_length(tape_length)?;
    if u32::try_from(instructions.len()).is_err() {
        return Err(CodegenError::ProgramTooLarge {
            count: instructions.len(),
        });
    }

    let mut loops: Vec<(E::Label, E::Label)> = vec![];

    emitter.prologue();
    for (index, instr) in instructions.iter().enumerate() {
        match instr.op {
            Op::Move => emitter.move_pointer(instr.count as u32, wrap),
            Op::Add => emitter.add(instr.count as u8),
            Op::Reset => emitter.reset(),
            Op::Read => emitter.read(index as u32),
            Op::Write => emitter.write(index as u32),
            Op::LoopStart => {
                let start = emitter.new_label();
                let end = emitter.new_label();
                emitter.bind(start);
                emitter.branch_if_zero(end);
                loops.push((start, end));
            }
            Op::LoopEnd => {
                let (start, end) = loops
                    .pop()
                    .ok_or(CodegenError::UnbalancedLoops { index })?;
                emitter.jump(start);
                emitter.bind(end);
            }
        }
    }

    if !loops.is_empty() {
        return Err(CodegenError::UnbalancedLoops {
            index: instructions.len(),
        });
    }
    emitter.epilogue();

    trace!(instructions = instructions.len(), ?wrap, "lowered program");
    Ok(())
}
