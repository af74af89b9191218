//! Global Descriptor Table construction and loading.
//!
//! Segmentation is mostly vestigial in long mode, but the selectors still
//! carry privilege levels and locate the TSS, and the firmware's own
//! descriptors cannot be trusted once boot services are gone. The kernel
//! therefore installs its own table before touching the address space.
//!
//! ## Layout
//!
//! Index | Selector | Slot
//! ------|----------|---------------------------------
//! 0     | 0x00     | null
//! 1     | 0x08     | kernel code
//! 2     | 0x10     | kernel data
//! 3     | 0x18     | null (user base selector anchor)
//! 4     | 0x20     | user data (0x23 with RPL=3)
//! 5     | 0x28     | user code (0x2B with RPL=3)
//! 6     | 0x30     | firmware-compatibility data
//! 7     | 0x38     | firmware-compatibility code
//! 8/9   | 0x40     | TSS (two-slot system descriptor)
//!
//! The two firmware-compatibility slots mirror the data/code descriptors
//! OVMF-style firmware leaves its selectors pointing at, so stale selector
//! values stay valid across the `lgdt`.

pub mod descriptors;
pub mod tss_desc;

use crate::gdt::descriptors::Descriptor;
use crate::gdt::tss_desc::TssDescriptor;
use crate::tss::Tss64;

/// Kernel code selector (index 1, RPL 0).
pub const KERNEL_CS: u16 = sel(1, 0);
/// Kernel data selector (index 2, RPL 0).
pub const KERNEL_DS: u16 = sel(2, 0);
/// User data selector (index 4, RPL 3).
pub const USER_DS: u16 = sel(4, 3);
/// User code selector (index 5, RPL 3).
pub const USER_CS: u16 = sel(5, 3);
/// TSS selector (low slot index 8).
pub const TSS_SEL: u16 = sel(8, 0);

/// Selector encoding: `(index << 3) | TI=0 | RPL`.
const fn sel(index: u16, rpl: u16) -> u16 {
    (index << 3) | rpl
}

const _: () = {
    assert!(KERNEL_CS == 0x08);
    assert!(KERNEL_DS == 0x10);
    assert!(USER_DS == 0x23);
    assert!(USER_CS == 0x2B);
    assert!(TSS_SEL == 0x40);
};

/// The complete descriptor table for the bootstrap CPU.
#[repr(C, align(16))]
pub struct Gdt {
    null: Descriptor,
    kernel_code: Descriptor,
    kernel_data: Descriptor,
    user_base: Descriptor,
    user_data: Descriptor,
    user_code: Descriptor,
    firmware_data: Descriptor,
    firmware_code: Descriptor,
    tss: TssDescriptor,
}

impl Gdt {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            null: Descriptor::null(),
            kernel_code: Descriptor::code(0),
            kernel_data: Descriptor::data(0),
            user_base: Descriptor::null(),
            user_data: Descriptor::data(3),
            user_code: Descriptor::code(3),
            firmware_data: Descriptor::data(0),
            firmware_code: Descriptor::code(0),
            tss: TssDescriptor::empty(),
        }
    }
}

impl Default for Gdt {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = {
    // Eight 8-byte slots plus the 16-byte TSS descriptor.
    assert!(size_of::<Gdt>() == 80);
};

/// Pointer record for `lgdt`: byte limit (size minus one) and the
/// table's linear base address.
#[repr(C, packed)]
struct DescTablePtr {
    limit: u16,
    base: u64,
}

/// The privilege-segment state owned by one CPU: the TSS record and the
/// GDT describing it.
///
/// An explicitly owned value, not a hidden global: the kernel entry path
/// keeps one static instance, and tests construct fresh ones freely since
/// nothing here touches hardware until [`CpuTables::install`].
pub struct CpuTables {
    pub tss: Tss64,
    pub gdt: Gdt,
}

impl CpuTables {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tss: Tss64::new(),
            gdt: Gdt::new(),
        }
    }

    /// Point the two-slot TSS descriptor at this instance's TSS record.
    ///
    /// Must run at the tables' final resting address; the descriptor
    /// captures the address of the `tss` field.
    pub fn wire_tss(&mut self) {
        let base = core::ptr::addr_of!(self.tss) as u64;
        #[allow(clippy::cast_possible_truncation)]
        let limit = (size_of::<Tss64>() - 1) as u32;
        self.gdt.tss = TssDescriptor::new(base, limit);
    }

    /// Wire the TSS, load the GDT, refresh the segment registers, and
    /// load the task register. The final, irreversible step of segment
    /// setup.
    ///
    /// # Safety
    /// - `self` must live (and stay mapped) for the rest of the CPU's
    ///   life; the CPU keeps reading both tables.
    /// - Interrupts must be disabled; no fault may observe the transition.
    #[cfg(target_arch = "x86_64")]
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn install(&mut self) {
        self.wire_tss();

        let ptr = DescTablePtr {
            limit: (size_of::<Gdt>() - 1) as u16,
            base: core::ptr::addr_of!(self.gdt) as u64,
        };

        unsafe {
            core::arch::asm!(
                "lgdt [{}]",
                in(reg) core::ptr::addr_of!(ptr),
                options(readonly, nostack, preserves_flags)
            );

            // Data segments take effect on the next load.
            core::arch::asm!(
                "mov ds, {0:x}",
                "mov es, {0:x}",
                "mov ss, {0:x}",
                in(reg) KERNEL_DS,
                options(nostack, preserves_flags)
            );

            // CS needs a far return to reload in long mode.
            core::arch::asm!(
                "push {cs}",
                "lea rax, [rip + 2f]",
                "push rax",
                "retfq",
                "2:",
                cs = in(reg) u64::from(KERNEL_CS),
                out("rax") _,
                options(nostack)
            );

            core::arch::asm!(
                "ltr {0:x}",
                in(reg) TSS_SEL,
                options(nostack, preserves_flags)
            );
        }
    }
}

impl Default for CpuTables {
    fn default() -> Self {
        Self::new()
    }
}
