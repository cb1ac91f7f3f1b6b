//! Just enough ELF64 to make a static x86-64 Linux executable out of one
//! blob of position-dependent code.
//!
//! The file is a 64-byte header, a single program header, and the code.
//! The whole file is loaded read+execute at [`BASE_ADDRESS`]; there are no
//! sections.

use std::io::{self, Write};

pub const BASE_ADDRESS: u64 = 0x40_0000;

const HEADER_SIZE: u16 = 64;
const PROGRAM_HEADER_SIZE: u16 = 56;

/// File offset (and offset from [`BASE_ADDRESS`]) of the first code byte.
pub const CODE_OFFSET: u64 = HEADER_SIZE as u64 + PROGRAM_HEADER_SIZE as u64;

const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 0x3E;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_R: u32 = 4;
const PAGE_SIZE: u64 = 0x1000;

/// An executable image: code, where to start in it, and trailing bytes
/// that are loaded but never run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image<'a> {
    pub code: &'a [u8],
    pub entry: usize,
    pub trailer: &'a [u8],
}

fn wr_u16le<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn wr_u32le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn wr_u64le<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

impl<'a> Image<'a> {
    pub fn file_size(&self) -> u64 {
        CODE_OFFSET + self.code.len() as u64 + self.trailer.len() as u64
    }

    pub fn entry_address(&self) -> u64 {
        BASE_ADDRESS + CODE_OFFSET + self.entry as u64
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        // e_ident: magic, 64-bit, little endian, version 1, System V ABI.
        w.write_all(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0])?;
        w.write_all(&[0; 8])?;
        wr_u16le(w, ET_EXEC)?;
        wr_u16le(w, EM_X86_64)?;
        wr_u32le(w, 1)?; // e_version
        wr_u64le(w, self.entry_address())?;
        wr_u64le(w, u64::from(HEADER_SIZE))?; // e_phoff
        wr_u64le(w, 0)?; // e_shoff
        wr_u32le(w, 0)?; // e_flags
        wr_u16le(w, HEADER_SIZE)?;
        wr_u16le(w, PROGRAM_HEADER_SIZE)?;
        wr_u16le(w, 1)?; // e_phnum
        wr_u16le(w, 64)?; // e_shentsize
        wr_u16le(w, 0)?; // e_shnum
        wr_u16le(w, 0)?; // e_shstrndx

        wr_u32le(w, PT_LOAD)?;
        wr_u32le(w, PF_R | PF_X)?;
        wr_u64le(w, 0)?; // p_offset
        wr_u64le(w, BASE_ADDRESS)?; // p_vaddr
        wr_u64le(w, BASE_ADDRESS)?; // p_paddr
        wr_u64le(w, self.file_size())?; // p_filesz
        wr_u64le(w, self.file_size())?; // p_memsz
        wr_u64le(w, PAGE_SIZE)?;

        w.write_all(self.code)?;
        w.write_all(self.trailer)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.file_size() as usize);
        // Writing to a Vec cannot fail.
        let _ = self.write_to(&mut bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn u64_at(bytes: &[u8], at: usize) -> u64 {
        let mut raw = [0; 8];
        raw.copy_from_slice(&bytes[at..at + 8]);
        u64::from_le_bytes(raw)
    }

    #[test]
    fn header_layout() {
        let code = [0x90, 0x90, 0xC3];
        let image = Image {
            code: &code,
            entry: 1,
            trailer: b"name\0",
        };
        let bytes = image.to_bytes();

        assert_eq!(bytes.len() as u64, image.file_size());
        assert_eq!(bytes.len(), 120 + 3 + 5);
        assert_eq!(&bytes[..4], b"\x7fELF");
        assert_eq!(bytes[4], 2);
        assert_eq!(&bytes[16..20], [2, 0, 0x3E, 0]);
        assert_eq!(u64_at(&bytes, 24), 0x40_0000 + 120 + 1);
        assert_eq!(u64_at(&bytes, 32), 64);

        // Program header.
        assert_eq!(&bytes[64..72], [1, 0, 0, 0, 5, 0, 0, 0]);
        assert_eq!(u64_at(&bytes, 64 + 32), bytes.len() as u64);
        assert_eq!(&bytes[120..123], code);
        assert_eq!(&bytes[123..], b"name\0");
    }
}
