//! x86-64 machine code.
//!
//! The generated routine follows the System V calling convention:
//!
//! ```text
//! fn(tape: *mut u8, pointer: *mut usize, context: *mut c_void) -> u32
//! ```
//!
//! It returns 0 on success and 1 if an I/O operation failed. `*pointer` is
//! read on entry and written back on every exit. While running, registers
//! hold:
//!
//! | register | contents                |
//! |----------|-------------------------|
//! | `rbx`    | tape base               |
//! | `r12`    | pointer                 |
//! | `r13`    | I/O context             |
//! | `r14`    | address of the pointer  |
//!
//! All four are callee-saved, so calls out to I/O hooks leave them intact.

use super::{Emitter, Wrap};
use crate::error::CodegenError;

/// How reads and writes reach the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Call host functions with the System V ABI:
    /// `read(context, index) -> i32` returns the byte, or a negative
    /// value on failure; `write(context, byte, index) -> i32` returns
    /// non-zero on failure.
    Hosted { read: u64, write: u64 },
    /// Linux `read(0, ..)` and `write(1, ..)` system calls, for code that
    /// runs as its own process.
    Freestanding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
pub struct Assembler {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    /// Offsets of rel32 fields and the label each one points at.
    fixups: Vec<(usize, Label)>,
    io: IoMode,
    fail: Label,
}

// ModRM/SIB for `[rbx + r12]`, used with a REX.X prefix.
const CELL_MODRM_SIB: u8 = 0x23;

impl Assembler {
    pub fn new(io: IoMode) -> Self {
        let mut asm = Assembler {
            code: Vec::with_capacity(4096),
            labels: vec![],
            fixups: vec![],
            io,
            fail: Label(0),
        };
        asm.fail = asm.new_label();
        asm
    }

    /// Current length of the code, in bytes.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    fn imm32(&mut self, value: i32) {
        self.emit(&value.to_le_bytes());
    }

    fn rel32(&mut self, target: Label) {
        self.fixups.push((self.code.len(), target));
        self.emit(&[0; 4]);
    }

    /// Patch every branch and return the finished code.
    pub fn finish(mut self) -> Result<Vec<u8>, CodegenError> {
        for &(at, Label(label)) in &self.fixups {
            let target = self.labels[label].ok_or(CodegenError::UnboundLabel)?;
            let relative = target as i64 - (at as i64 + 4);
            let relative = i32::try_from(relative).map_err(|_| CodegenError::ProgramTooLarge {
                count: self.code.len(),
            })?;
            self.code[at..at + 4].copy_from_slice(&relative.to_le_bytes());
        }
        Ok(self.code)
    }

    /// `call label`
    pub fn call(&mut self, target: Label) {
        self.emit(&[0xE8]);
        self.rel32(target);
    }

    /// Process entry point for a freestanding executable: map a zeroed
    /// tape of `tape_length` bytes, call the routine at `routine` with the
    /// pointer at 0, and exit with the routine's status. Exits with 2 if
    /// the tape cannot be mapped.
    pub fn entry_point(&mut self, routine: Label, tape_length: u32) {
        let exit = self.new_label();
        let no_memory = self.new_label();

        // Keep the stack 16-byte aligned at the call below.
        self.emit(&[0x48, 0x83, 0xEC, 0x08]); // sub rsp, 8

        // mmap(NULL, tape_length, PROT_READ | PROT_WRITE,
        //      MAP_PRIVATE | MAP_ANONYMOUS, -1, 0)
        self.emit(&[0xB8]); // mov eax, 9
        self.imm32(9);
        self.emit(&[0x31, 0xFF]); // xor edi, edi
        self.emit(&[0x48, 0xC7, 0xC6]); // mov rsi, tape_length
        self.imm32(tape_length as i32);
        self.emit(&[0xBA]); // mov edx, 3
        self.imm32(0x3);
        self.emit(&[0x41, 0xBA]); // mov r10d, 0x22
        self.imm32(0x22);
        self.emit(&[0x49, 0xC7, 0xC0]); // mov r8, -1
        self.imm32(-1);
        self.emit(&[0x45, 0x31, 0xC9]); // xor r9d, r9d
        self.emit(&[0x0F, 0x05]); // syscall
        self.emit(&[0x48, 0x85, 0xC0]); // test rax, rax
        self.emit(&[0x0F, 0x88]); // js no_memory
        self.rel32(no_memory);

        self.emit(&[0x48, 0x89, 0xC7]); // mov rdi, rax
        self.emit(&[0x6A, 0x00]); // push 0
        self.emit(&[0x48, 0x89, 0xE6]); // mov rsi, rsp
        self.emit(&[0x31, 0xD2]); // xor edx, edx
        self.call(routine);
        self.emit(&[0x89, 0xC7]); // mov edi, eax

        self.bind(exit);
        self.emit(&[0xB8]); // mov eax, 60
        self.imm32(60);
        self.emit(&[0x0F, 0x05]); // syscall

        self.bind(no_memory);
        self.emit(&[0xBF]); // mov edi, 2
        self.imm32(2);
        self.emit(&[0xE9]); // jmp exit
        self.rel32(exit);
    }

    /// `mov rax, address; call rax`
    fn call_absolute(&mut self, address: u64) {
        self.emit(&[0x48, 0xB8]);
        self.emit(&address.to_le_bytes());
        self.emit(&[0xFF, 0xD0]);
    }

    /// Set up `rsi = &tape[pointer]`, `edx = 1` and perform system call
    /// `number` on file descriptor `fd`, failing unless a byte moved.
    fn syscall_one_byte(&mut self, number: i32, fd: i32) {
        self.emit(&[0xB8]); // mov eax, number
        self.imm32(number);
        self.emit(&[0xBF]); // mov edi, fd
        self.imm32(fd);
        self.emit(&[0x4A, 0x8D, 0x34, CELL_MODRM_SIB]); // lea rsi, [rbx + r12]
        self.emit(&[0xBA]); // mov edx, 1
        self.imm32(1);
        self.emit(&[0x0F, 0x05]); // syscall
        self.emit(&[0x48, 0x85, 0xC0]); // test rax, rax
        self.emit(&[0x0F, 0x8E]); // jle fail
        let fail = self.fail;
        self.rel32(fail);
    }
}

impl Emitter for Assembler {
    type Label = Label;

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len());
    }

    fn prologue(&mut self) {
        self.emit(&[0x53]); // push rbx
        self.emit(&[0x41, 0x54]); // push r12
        self.emit(&[0x41, 0x55]); // push r13
        self.emit(&[0x41, 0x56]); // push r14
        self.emit(&[0x41, 0x57]); // push r15, for alignment

        self.emit(&[0x48, 0x89, 0xFB]); // mov rbx, rdi
        self.emit(&[0x49, 0x89, 0xF6]); // mov r14, rsi
        self.emit(&[0x4C, 0x8B, 0x26]); // mov r12, [rsi]
        self.emit(&[0x49, 0x89, 0xD5]); // mov r13, rdx
    }

    fn epilogue(&mut self) {
        let exit = self.new_label();

        self.emit(&[0x31, 0xC0]); // xor eax, eax
        self.bind(exit);
        self.emit(&[0x4D, 0x89, 0x26]); // mov [r14], r12
        self.emit(&[0x41, 0x5F]); // pop r15
        self.emit(&[0x41, 0x5E]); // pop r14
        self.emit(&[0x41, 0x5D]); // pop r13
        self.emit(&[0x41, 0x5C]); // pop r12
        self.emit(&[0x5B]); // pop rbx
        self.emit(&[0xC3]); // ret

        let fail = self.fail;
        self.bind(fail);
        self.emit(&[0xB8]); // mov eax, 1
        self.imm32(1);
        self.emit(&[0xE9]); // jmp exit
        self.rel32(exit);
    }

    fn move_pointer(&mut self, count: u32, wrap: Wrap) {
        self.emit(&[0x49, 0x81, 0xC4]); // add r12, count
        self.imm32(count as i32);
        match wrap {
            Wrap::Mask(mask) => {
                self.emit(&[0x49, 0x81, 0xE4]); // and r12, mask
                self.imm32(mask as i32);
            }
            Wrap::Length(length) => {
                self.emit(&[0x49, 0x81, 0xFC]); // cmp r12, length
                self.imm32(length as i32);
                self.emit(&[0x72, 0x07]); // jb over the sub
                self.emit(&[0x49, 0x81, 0xEC]); // sub r12, length
                self.imm32(length as i32);
            }
        }
    }

    fn add(&mut self, amount: u8) {
        // add byte [rbx + r12], amount
        self.emit(&[0x42, 0x80, 0x04, CELL_MODRM_SIB, amount]);
    }

    fn reset(&mut self) {
        // mov byte [rbx + r12], 0
        self.emit(&[0x42, 0xC6, 0x04, CELL_MODRM_SIB, 0x00]);
    }

    fn branch_if_zero(&mut self, target: Label) {
        self.emit(&[0x42, 0x80, 0x3C, CELL_MODRM_SIB, 0x00]); // cmp byte [rbx + r12], 0
        self.emit(&[0x0F, 0x84]); // je target
        self.rel32(target);
    }

    fn jump(&mut self, target: Label) {
        self.emit(&[0xE9]); // jmp target
        self.rel32(target);
    }

    fn read(&mut self, index: u32) {
        match self.io {
            IoMode::Hosted { read, .. } => {
                self.emit(&[0x4C, 0x89, 0xEF]); // mov rdi, r13
                self.emit(&[0xBE]); // mov esi, index
                self.imm32(index as i32);
                self.call_absolute(read);
                self.emit(&[0x85, 0xC0]); // test eax, eax
                self.emit(&[0x0F, 0x88]); // js fail
                let fail = self.fail;
                self.rel32(fail);
                self.emit(&[0x42, 0x88, 0x04, CELL_MODRM_SIB]); // mov [rbx + r12], al
            }
            IoMode::Freestanding => self.syscall_one_byte(0, 0),
        }
    }

    fn write(&mut self, index: u32) {
        match self.io {
            IoMode::Hosted { write, .. } => {
                self.emit(&[0x4C, 0x89, 0xEF]); // mov rdi, r13
                self.emit(&[0x42, 0x0F, 0xB6, 0x34, CELL_MODRM_SIB]); // movzx esi, byte [rbx + r12]
                self.emit(&[0xBA]); // mov edx, index
                self.imm32(index as i32);
                self.call_absolute(write);
                self.emit(&[0x85, 0xC0]); // test eax, eax
                self.emit(&[0x0F, 0x85]); // jnz fail
                let fail = self.fail;
                self.rel32(fail);
            }
            IoMode::Freestanding => self.syscall_one_byte(1, 1),
        }
    }
}
