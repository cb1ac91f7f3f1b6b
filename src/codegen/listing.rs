//! A readable rendering of lowered code, one operation per line.

use super::{Emitter, Wrap};
use itertools::Itertools;
use std::fmt;

#[derive(Debug, Default, Clone)]
pub struct Listing {
    lines: Vec<String>,
    labels: usize,
}

impl Listing {
    pub fn new() -> Self {
        Listing::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn push(&mut self, line: String) {
        self.lines.push(line);
    }
}

impl Emitter for Listing {
    type Label = usize;

    fn new_label(&mut self) -> usize {
        self.labels += 1;
        self.labels - 1
    }

    fn bind(&mut self, label: usize) {
        self.push(format!("L{}:", label));
    }

    fn prologue(&mut self) {
        self.push("prologue".to_owned());
    }

    fn epilogue(&mut self) {
        self.push("epilogue".to_owned());
    }

    fn move_pointer(&mut self, count: u32, wrap: Wrap) {
        let line = match wrap {
            Wrap::Mask(mask) => format!("move {} (mask {})", count, mask),
            Wrap::Length(length) => format!("move {} (wrap {})", count, length),
        };
        self.push(line);
    }

    fn add(&mut self, amount: u8) {
        self.push(format!("add {}", amount));
    }

    fn reset(&mut self) {
        self.push("reset".to_owned());
    }

    fn branch_if_zero(&mut self, target: usize) {
        self.push(format!("jz L{}", target));
    }

    fn jump(&mut self, target: usize) {
        self.push(format!("jmp L{}", target));
    }

    fn read(&mut self, index: u32) {
        self.push(format!("read #{}", index));
    }

    fn write(&mut self, index: u32) {
        self.push(format!("write #{}", index));
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.lines.iter().join("\n"))
    }
}
