//! 8-byte code/data segment descriptor encodings.
//!
//! Long mode ignores base and limit for code/data segments (paging does
//! the protection), but the type, DPL, present and L bits still gate
//! privilege transitions. The builders below pin the invariants so no
//! caller ever twiddles descriptor bits by hand:
//!
//! - code: `typ = 0b1010` (execute + read), `S = 1`, `L = 1`, `DB = 0`;
//! - data: `typ = 0b0010` (read + write), `S = 1`, `L = 0`.

use bitfield_struct::bitfield;

/// Bit view of a 64-bit code segment descriptor.
#[bitfield(u64)]
pub struct CodeSegmentBits {
    pub limit_lo: u16, // [15:0]  ignored in long mode
    pub base_lo: u16,  // [31:16] ignored in long mode
    pub base_mid: u8,  // [39:32]
    #[bits(4)]
    pub typ: u8, // [43:40]
    pub s: bool,       // [44] code/data class
    #[bits(2)]
    pub dpl: u8, // [46:45]
    pub p: bool,       // [47]
    #[bits(4)]
    pub limit_hi: u8, // [51:48]
    pub avl: bool,     // [52]
    pub l: bool,       // [53] 64-bit code
    pub db: bool,      // [54] must be 0 when L = 1
    pub g: bool,       // [55]
    pub base_hi: u8,   // [63:56]
}

/// Bit view of a data/stack segment descriptor.
#[bitfield(u64)]
pub struct DataSegmentBits {
    pub limit_lo: u16,
    pub base_lo: u16,
    pub base_mid: u8,
    #[bits(4)]
    pub typ: u8,
    pub s: bool,
    #[bits(2)]
    pub dpl: u8,
    pub p: bool,
    #[bits(4)]
    pub limit_hi: u8,
    pub avl: bool,
    pub l: bool,
    pub db: bool,
    pub g: bool,
    pub base_hi: u8,
}

/// One 8-byte GDT slot.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Descriptor(u64);

impl Descriptor {
    /// The mandatory all-zero descriptor (index 0, and the user-base
    /// anchor slot).
    #[must_use]
    pub const fn null() -> Self {
        Self(0)
    }

    /// 64-bit code segment at the given privilege level.
    #[must_use]
    pub const fn code(dpl: u8) -> Self {
        let bits = CodeSegmentBits::new()
            .with_typ(0b1010) // execute + read
            .with_s(true)
            .with_dpl(dpl & 0b11)
            .with_p(true)
            .with_l(true)
            .with_db(false);
        Self(bits.into_bits())
    }

    /// Data/stack segment at the given privilege level.
    #[must_use]
    pub const fn data(dpl: u8) -> Self {
        let bits = DataSegmentBits::new()
            .with_typ(0b0010) // read + write
            .with_s(true)
            .with_dpl(dpl & 0b11)
            .with_p(true)
            .with_l(false);
        Self(bits.into_bits())
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

const _: () = {
    assert!(size_of::<Descriptor>() == 8);
    assert!(size_of::<CodeSegmentBits>() == 8);
    assert!(size_of::<DataSegmentBits>() == 8);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_long_mode_encodings() {
        // Access byte 0x9A (P, DPL=0, S, exec+read) + L in the flags
        // nibble; the textbook kernel-code descriptor.
        assert_eq!(Descriptor::code(0).raw(), 0x0020_9A00_0000_0000);
        // Access byte 0x92 (P, DPL=0, S, read/write).
        assert_eq!(Descriptor::data(0).raw(), 0x0000_9200_0000_0000);
        // DPL=3 variants set bits 45/46: 0xFA / 0xF2.
        assert_eq!(Descriptor::code(3).raw(), 0x0020_FA00_0000_0000);
        assert_eq!(Descriptor::data(3).raw(), 0x0000_F200_0000_0000);
        assert_eq!(Descriptor::null().raw(), 0);
    }
}
