//! ELF64 header and program-header parsing.

extern crate alloc;

use crate::ImageError;
use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr::read_unaligned;

// Minimal ELF64 definitions; consumed read-only.
#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64Ehdr {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64Phdr {
    p_type: u32,
    p_flags: SegmentFlags,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

const PT_LOAD: u32 = 1;
const EM_X86_64: u16 = 62;

/// Byte length of the fixed-size ELF64 file header.
pub(crate) const EHDR_LEN: usize = size_of::<Elf64Ehdr>();

/// `Elf64_Phdr.p_flags` bit layout.
#[bitfield_struct::bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct SegmentFlags {
    pub execute: bool,
    pub write: bool,
    pub read: bool,
    #[bits(29)]
    __: u32,
}

/// One `PT_LOAD` entry, reduced to what loading needs.
#[derive(Debug, Clone, Copy)]
pub struct LoadSegment {
    /// Link-time virtual address of the segment start.
    pub vaddr: u64,
    /// Byte offset of the segment payload in the file.
    pub offset: u64,
    /// Payload bytes present in the file.
    pub filesz: u64,
    /// Bytes the segment occupies in memory; the `[filesz, memsz)` tail is
    /// zero-fill (.bss convention).
    pub memsz: u64,
    /// Required alignment, a power of two. Segments in one image may carry
    /// different alignments.
    pub align: u64,
    pub flags: SegmentFlags,
}

/// Fields of the file header the loader acts on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderInfo {
    pub entry: u64,
    pub phoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
}

/// Parse and validate the fixed-size file header.
///
/// The magic is checked first and alone decides [`ImageError::BadMagic`];
/// class, endianness, version, and machine gate the rest.
pub(crate) fn parse_header<E>(bytes: &[u8]) -> Result<HeaderInfo, ImageError<E>> {
    const MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

    if bytes.len() < EHDR_LEN {
        return Err(ImageError::BadMagic);
    }

    // SAFETY: bounds just checked; read_unaligned avoids any alignment
    // assumption about the caller's buffer.
    let ehdr = unsafe { read_unaligned(bytes.as_ptr().cast::<Elf64Ehdr>()) };

    if ehdr.e_ident[0..4] != MAGIC {
        return Err(ImageError::BadMagic);
    }
    // Class = 2 (ELF64), Data = 1 (little-endian), Version = 1.
    if ehdr.e_ident[4] != 2 || ehdr.e_ident[5] != 1 || ehdr.e_ident[6] != 1 {
        return Err(ImageError::NotElf64);
    }
    if ehdr.e_machine != EM_X86_64 {
        return Err(ImageError::NotElf64);
    }
    if ehdr.e_phentsize as usize != size_of::<Elf64Phdr>() {
        return Err(ImageError::MalformedProgramHeaders);
    }

    Ok(HeaderInfo {
        entry: ehdr.e_entry,
        phoff: ehdr.e_phoff,
        phentsize: ehdr.e_phentsize,
        phnum: ehdr.e_phnum,
    })
}

/// Collect the `PT_LOAD` entries from a program-header table read at the
/// header's declared offset. `table` must hold `phnum * phentsize` bytes.
pub(crate) fn parse_load_segments<E>(
    info: &HeaderInfo,
    table: &[u8],
) -> Result<Vec<LoadSegment>, ImageError<E>> {
    let phentsize = info.phentsize as usize;
    let phnum = info.phnum as usize;
    let table_len = phentsize
        .checked_mul(phnum)
        .ok_or(ImageError::MalformedProgramHeaders)?;
    if table.len() < table_len {
        return Err(ImageError::MalformedProgramHeaders);
    }

    let mut segments = Vec::new();
    for i in 0..phnum {
        // SAFETY: i * phentsize + sizeof(Phdr) <= table_len, checked above.
        let ph = unsafe { read_unaligned(table.as_ptr().add(i * phentsize).cast::<Elf64Phdr>()) };
        if ph.p_type != PT_LOAD || ph.p_memsz == 0 {
            continue;
        }
        segments.push(LoadSegment {
            vaddr: ph.p_vaddr,
            offset: ph.p_offset,
            filesz: ph.p_filesz,
            memsz: ph.p_memsz,
            align: ph.p_align,
            flags: ph.p_flags,
        });
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_too_short_is_bad_magic() {
        let result = parse_header::<()>(&[0x7F, b'E', b'L']);
        assert!(matches!(result, Err(ImageError::BadMagic)));
    }

    #[test]
    fn wrong_class_is_not_elf64() {
        let mut bytes = [0u8; EHDR_LEN];
        bytes[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        bytes[4] = 1; // ELF32
        bytes[5] = 1;
        bytes[6] = 1;
        let result = parse_header::<()>(&bytes);
        assert!(matches!(result, Err(ImageError::NotElf64)));
    }
}
