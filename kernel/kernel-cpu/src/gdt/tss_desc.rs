//! The 16-byte TSS system descriptor.
//!
//! Unlike code/data descriptors, the TSS descriptor carries a live 64-bit
//! base address, split across two adjacent GDT slots: the low slot holds
//! the limit and base bits 0–31, the high slot base bits 32–63. Both
//! slots must be written before the table is loaded.

use bitfield_struct::bitfield;

/// Low 8 bytes: limit, base[31:0], and the system-descriptor type 0x9
/// ("available 64-bit TSS", `S = 0`).
#[bitfield(u64)]
pub struct TssDescLowBits {
    pub limit_lo: u16, // [15:0]
    pub base_lo: u16,  // [31:16]
    pub base_mid: u8,  // [39:32]
    #[bits(4)]
    pub typ: u8, // [43:40] = 0x9
    pub s: bool,       // [44] = 0 (system)
    #[bits(2)]
    pub dpl: u8, // [46:45]
    pub p: bool,       // [47]
    #[bits(4)]
    pub limit_hi: u8, // [51:48]
    pub avl: bool,     // [52]
    pub zero1: bool,   // [53] must be 0 for system types
    pub zero2: bool,   // [54] must be 0 for system types
    pub g: bool,       // [55]
    pub base_hi: u8,   // [63:56]
}

/// High 8 bytes: base[63:32], rest reserved zero.
#[bitfield(u64)]
pub struct TssDescHighBits {
    pub base_upper: u32, // [31:0]
    __: u32,             // [63:32] reserved
}

/// The two-slot descriptor as it sits in the GDT.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct TssDescriptor {
    pub low: TssDescLowBits,
    pub high: TssDescHighBits,
}

impl TssDescriptor {
    /// Placeholder before the TSS address is known.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            low: TssDescLowBits::new(),
            high: TssDescHighBits::new(),
        }
    }

    /// Describe the TSS at `base` with the given byte `limit`
    /// (`size_of::<Tss64>() - 1`).
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn new(base: u64, limit: u32) -> Self {
        let low = TssDescLowBits::new()
            .with_limit_lo(limit as u16)
            .with_limit_hi(((limit >> 16) & 0xF) as u8)
            .with_base_lo(base as u16)
            .with_base_mid((base >> 16) as u8)
            .with_base_hi((base >> 24) as u8)
            .with_typ(0x9) // available 64-bit TSS
            .with_s(false)
            .with_dpl(0)
            .with_p(true);
        let high = TssDescHighBits::new().with_base_upper((base >> 32) as u32);
        Self { low, high }
    }

    /// Reassemble the base address from both slots.
    #[must_use]
    pub const fn base(&self) -> u64 {
        (self.low.base_lo() as u64)
            | ((self.low.base_mid() as u64) << 16)
            | ((self.low.base_hi() as u64) << 24)
            | ((self.high.base_upper() as u64) << 32)
    }

    /// Reassemble the 20-bit limit.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        (self.low.limit_lo() as u32) | ((self.low.limit_hi() as u32) << 16)
    }
}

const _: () = {
    assert!(size_of::<TssDescriptor>() == 16);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_splits_across_both_slots() {
        let base = 0xFEDC_BA98_7654_3210u64;
        let d = TssDescriptor::new(base, 103);
        assert_eq!(d.base(), base);
        assert_eq!(d.limit(), 103);
        // The pieces land in the architected fields.
        assert_eq!(d.low.base_lo(), 0x3210);
        assert_eq!(d.low.base_mid(), 0x54);
        assert_eq!(d.low.base_hi(), 0x76);
        assert_eq!(d.high.base_upper(), 0xFEDC_BA98);
    }

    #[test]
    fn system_type_bits() {
        let d = TssDescriptor::new(0x1000, 103);
        assert_eq!(d.low.typ(), 0x9);
        assert!(!d.low.s());
        assert!(d.low.p());
        assert_eq!(d.low.dpl(), 0);
        // Reserved half of the high slot stays zero.
        assert_eq!(d.high.into_bits() >> 32, 0);
    }
}
