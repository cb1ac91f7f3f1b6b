//! Human-readable warnings and errors for the CLI.

use colored::Colorize;
use std::fmt;

/// An inclusive range of character indices in the program source.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

impl Position {
    pub fn at(index: usize) -> Self {
        Position {
            start: index,
            end: index,
        }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub trait Combine<T> {
    fn combine(&self, _: T) -> T;
}

impl Combine<Option<Position>> for Option<Position> {
    fn combine(&self, other: Self) -> Self {
        match (*self, other) {
            (Some(pos1), Some(pos2)) => {
                let (first_pos, second_pos) = if pos1.start <= pos2.start {
                    (pos1, pos2)
                } else {
                    (pos2, pos1)
                };

                // Fused instructions always come from a contiguous stretch
                // of source, possibly with comments in between.
                Some(Position {
                    start: first_pos.start,
                    end: second_pos.end.max(first_pos.end),
                })
            }
            (Some(pos), None) | (None, Some(pos)) => Some(pos),
            _ => None,
        }
    }
}

/// An error about a program, rendered against its source text.
#[derive(Debug)]
pub struct Diagnostic<'a> {
    pub filename: &'a str,
    pub message: String,
    pub position: Option<Position>,
    pub source: &'a str,
}

/// Convert a character index into a zero-based (line, column) pair.
fn line_and_column(source: &str, index: usize) -> (usize, usize) {
    let mut line = 0;
    let mut column = 0;
    for c in source.chars().take(index) {
        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }
    }
    (line, column)
}

impl<'a> fmt::Display for Diagnostic<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = "error:".red().bold();

        let position = match self.position {
            Some(position) => position,
            None => return write!(f, "{}: {} {}", self.filename.bold(), label, self.message),
        };

        let (line_idx, column_idx) = line_and_column(self.source, position.start);
        writeln!(
            f,
            "{} {} {}",
            format!("{}:{}:{}:", self.filename, line_idx + 1, column_idx + 1).bold(),
            label,
            self.message
        )?;

        let context_line = self.source.lines().nth(line_idx).unwrap_or("");
        let width = if position.end > position.start {
            let (end_line, end_column) = line_and_column(self.source, position.end);
            if end_line == line_idx {
                end_column - column_idx + 1
            } else {
                1
            }
        } else {
            1
        };

        writeln!(f, "{}", context_line)?;
        write!(
            f,
            "{}{}",
            " ".repeat(column_idx),
            "^".repeat(width).green().bold()
        )
    }
}
