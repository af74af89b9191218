//! Read-only view over the raw firmware memory map.
//!
//! The map is a byte buffer of `EFI_MEMORY_DESCRIPTOR` records laid out at
//! a firmware-chosen stride. The stride commonly exceeds
//! `size_of::<MemoryDescriptor>()`, so descriptors are located by byte
//! offset and read unaligned, never indexed as a slice of structs.

use core::mem::size_of;
use core::ptr::read_unaligned;
use kernel_addresses::{PAGE_SIZE, PhysicalAddress};

/// `EfiConventionalMemory`: ordinary free RAM, the only kind eligible for
/// frame allocation.
pub const CONVENTIONAL: u32 = 7;

/// One firmware memory-map record, in `EFI_MEMORY_DESCRIPTOR` layout.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct MemoryDescriptor {
    /// Memory type tag (`EfiConventionalMemory`, loader data, …).
    pub kind: u32,
    _padding: u32,
    /// First byte of the region; always 4 KiB aligned.
    pub phys_start: u64,
    /// Firmware-set virtual address; unused before runtime services are
    /// remapped.
    pub virt_start: u64,
    /// Region length in 4 KiB pages.
    pub page_count: u64,
    /// Capability attribute bits.
    pub attribute: u64,
}

impl MemoryDescriptor {
    #[must_use]
    pub const fn new(kind: u32, phys_start: u64, page_count: u64) -> Self {
        Self {
            kind,
            _padding: 0,
            phys_start,
            virt_start: 0,
            page_count,
            attribute: 0,
        }
    }
}

/// A contiguous physical region derived from one descriptor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRegion {
    pub start: PhysicalAddress,
    pub page_count: u64,
}

impl MemoryRegion {
    #[must_use]
    pub const fn byte_len(&self) -> u64 {
        self.page_count * PAGE_SIZE
    }

    /// Exclusive end address of the region.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.start.as_u64() + self.byte_len())
    }
}

/// Stride-honoring view over a raw memory-map buffer.
#[derive(Copy, Clone)]
pub struct MemoryMapView<'a> {
    bytes: &'a [u8],
    desc_size: usize,
}

impl<'a> MemoryMapView<'a> {
    /// # Panics
    /// If `desc_size` is smaller than the descriptor structure; the buffer
    /// could not contain valid records then.
    #[must_use]
    pub fn new(bytes: &'a [u8], desc_size: usize) -> Self {
        assert!(desc_size >= size_of::<MemoryDescriptor>());
        Self { bytes, desc_size }
    }

    /// Number of whole descriptors in the buffer.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len() / self.desc_size
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the descriptors at the firmware stride. A trailing partial
    /// record, if any, is ignored.
    pub fn iter(&self) -> impl Iterator<Item = MemoryDescriptor> + 'a {
        let bytes = self.bytes;
        let desc_size = self.desc_size;
        (0..self.len()).map(move |i| {
            let off = i * desc_size;
            // Within bounds by construction of `len`; alignment of the
            // buffer is firmware-defined, so read unaligned.
            unsafe { read_unaligned(bytes.as_ptr().add(off).cast::<MemoryDescriptor>()) }
        })
    }

    /// The single largest region (by page count) of the given memory kind.
    #[must_use]
    pub fn largest_region_of(&self, kind: u32) -> Option<MemoryRegion> {
        self.iter()
            .filter(|d| d.kind == kind)
            .max_by_key(|d| d.page_count)
            .map(|d| MemoryRegion {
                start: PhysicalAddress::new(d.phys_start),
                page_count: d.page_count,
            })
    }
}
