//! The memory a program runs against.

use std::fmt;

/// A zero-initialised row of byte cells and a pointer into it. The
/// pointer is always a valid index; moves wrap around at either end.
#[derive(Clone, PartialEq, Eq)]
pub struct Tape {
    cells: Box<[u8]>,
    pointer: usize,
}

impl Tape {
    /// # Panics
    ///
    /// Panics if `length` is zero.
    pub fn new(length: usize) -> Self {
        assert!(length > 0, "a tape needs at least one cell");
        Tape {
            cells: vec![0; length].into_boxed_slice(),
            pointer: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Move the pointer forward `count` cells, wrapping past the end.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        // `count` is already reduced modulo the length, so one subtraction
        // is enough to wrap.
        let room = self.cells.len() - self.pointer;
        if count >= room {
            self.pointer = count - room;
        } else {
            self.pointer += count;
        }
    }

    #[inline]
    pub fn get(&self) -> u8 {
        self.cells[self.pointer]
    }

    #[inline]
    pub fn set(&mut self, value: u8) {
        self.cells[self.pointer] = value;
    }

    #[inline]
    pub fn add(&mut self, amount: u8) {
        let cell = &mut self.cells[self.pointer];
        *cell = cell.wrapping_add(amount);
    }

    /// Raw parts for native code, which indexes the cells itself.
    #[cfg_attr(not(all(target_arch = "x86_64", unix)), allow(dead_code))]
    pub(crate) fn raw_parts(&mut self) -> (*mut u8, &mut usize) {
        (self.cells.as_mut_ptr(), &mut self.pointer)
    }
}

impl fmt::Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Printing 30000 zeroes helps nobody; show up to the last used cell.
        let used = self
            .cells
            .iter()
            .rposition(|&cell| cell != 0)
            .map_or(0, |last| last + 1)
            .max(self.pointer + 1);
        f.debug_struct("Tape")
            .field("len", &self.cells.len())
            .field("pointer", &self.pointer)
            .field("cells", &&self.cells[..used])
            .finish()
    }
}
