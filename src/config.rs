//! Parameters fixed when a program is parsed.

use crate::error::ConfigError;
use crate::peephole::OptimisationFlags;

pub const DEFAULT_TAPE_LENGTH: usize = 30000;
pub const DEFAULT_MAX_LOOP_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    tape_length: usize,
    max_loop_depth: usize,
    optimisations: OptimisationFlags,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tape_length: DEFAULT_TAPE_LENGTH,
            max_loop_depth: DEFAULT_MAX_LOOP_DEPTH,
            optimisations: OptimisationFlags::all(),
        }
    }
}

impl Config {
    pub fn new(tape_length: usize, max_loop_depth: usize) -> Result<Self, ConfigError> {
        Config::default()
            .with_tape_length(tape_length)?
            .with_max_loop_depth(max_loop_depth)
    }

    pub fn with_tape_length(mut self, tape_length: usize) -> Result<Self, ConfigError> {
        if tape_length == 0 {
            return Err(ConfigError::ZeroTapeLength);
        }
        self.tape_length = tape_length;
        Ok(self)
    }

    pub fn with_max_loop_depth(mut self, max_loop_depth: usize) -> Result<Self, ConfigError> {
        if max_loop_depth == 0 {
            return Err(ConfigError::ZeroLoopDepth);
        }
        self.max_loop_depth = max_loop_depth;
        Ok(self)
    }

    pub fn with_optimisations(mut self, optimisations: OptimisationFlags) -> Self {
        self.optimisations = optimisations;
        self
    }

    pub fn tape_length(&self) -> usize {
        self.tape_length
    }

    pub fn max_loop_depth(&self) -> usize {
        self.max_loop_depth
    }

    pub fn optimisations(&self) -> OptimisationFlags {
        self.optimisations
    }
}

/// How a parsed program is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Walk the instruction stream directly.
    Interpret,
    /// Lower to native code in-process, then run it.
    Jit,
}
