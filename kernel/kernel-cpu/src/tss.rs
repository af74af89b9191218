//! 64-bit Task State Segment.
//!
//! Long mode does no hardware task switching, but the CPU still reads the
//! TSS for the privilege-transition stack (`rsp0`) and the interrupt
//! stacks (`ist1..7`). At this stage of boot nothing switches rings and
//! no interrupt fires, so every stack pointer stays a zero placeholder;
//! the record exists so the descriptor tables are complete and later
//! bring-up stages only have to fill in the pointers.

/// The architectural 104-byte TSS layout.
#[repr(C, packed)]
pub struct Tss64 {
    _reserved0: u32,
    /// Ring-0 stack loaded on a privilege transition to CPL 0.
    pub rsp0: u64,
    pub rsp1: u64,
    pub rsp2: u64,
    _reserved1: u64,
    /// Interrupt Stack Table slots, selected per IDT entry.
    pub ist1: u64,
    pub ist2: u64,
    pub ist3: u64,
    pub ist4: u64,
    pub ist5: u64,
    pub ist6: u64,
    pub ist7: u64,
    _reserved2: u64,
    _reserved3: u16,
    /// Offset of the I/O permission bitmap; placing it at the end of the
    /// structure means "no bitmap".
    pub iopb_offset: u16,
}

impl Tss64 {
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _reserved0: 0,
            rsp0: 0,
            rsp1: 0,
            rsp2: 0,
            _reserved1: 0,
            ist1: 0,
            ist2: 0,
            ist3: 0,
            ist4: 0,
            ist5: 0,
            ist6: 0,
            ist7: 0,
            _reserved2: 0,
            _reserved3: 0,
            iopb_offset: size_of::<Self>() as u16,
        }
    }
}

impl Default for Tss64 {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = {
    assert!(size_of::<Tss64>() == 104);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tss_disables_the_io_bitmap() {
        let tss = Tss64::new();
        let iopb = tss.iopb_offset;
        assert_eq!(iopb as usize, size_of::<Tss64>());
        let rsp0 = tss.rsp0;
        assert_eq!(rsp0, 0);
    }
}
