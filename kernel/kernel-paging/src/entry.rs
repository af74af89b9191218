//! Page-table entry bit layout.

use bitfield_struct::bitfield;
use kernel_addresses::{PAGE_SHIFT, PhysicalAddress};

/// Page-aligned 52-bit physical address field of an entry.
pub const PAGE_ADDRESS_MASK: u64 = 0x000f_ffff_ffff_f000;

/// One 64-bit x86-64 paging entry, identical at all four levels.
///
/// Non-leaf entries point at the next table; level-1 entries map a 4 KiB
/// page. Bring-up never uses large pages, so `page_size` stays clear
/// everywhere.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Entry is valid; clear means a walk terminates here.
    pub present: bool, // [0]
    pub writable: bool,      // [1]
    pub user: bool,          // [2]
    pub write_through: bool, // [3]
    pub cache_disable: bool, // [4]
    pub accessed: bool,      // [5]
    pub dirty: bool,         // [6]
    /// PS: large-page leaf in PD/PDPT entries. Unused here.
    pub page_size: bool, // [7]
    pub global: bool,        // [8]
    #[bits(3)]
    pub avl: u8, // [11:9]
    /// Physical frame number (bits 12..52 of the target address).
    #[bits(40)]
    pub frame: u64, // [51:12]
    #[bits(11)]
    pub avl_high: u16, // [62:52]
    pub no_execute: bool, // [63]
}

impl PageEntryBits {
    /// The permissive present + writable + user flags the identity map
    /// installs at every level during bring-up.
    #[must_use]
    pub const fn present_rw_user() -> Self {
        Self::new().with_present(true).with_writable(true).with_user(true)
    }

    /// Physical address stored in the entry (page-aligned).
    #[must_use]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame() << PAGE_SHIFT)
    }

    /// Store a page-aligned physical address. Bits outside the
    /// architectural 52-bit window are masked off.
    #[must_use]
    pub const fn with_address(self, pa: PhysicalAddress) -> Self {
        self.with_frame((pa.as_u64() & PAGE_ADDRESS_MASK) >> PAGE_SHIFT)
    }
}

const _: () = {
    assert!(size_of::<PageEntryBits>() == 8);
};
