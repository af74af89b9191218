//! # Frame Allocation and Identity Paging
//!
//! The kernel-side memory bring-up: a bump frame allocator over the
//! largest usable region of the firmware memory map, and a 4-level
//! identity-mapped page-table builder that replaces the firmware's address
//! space.
//!
//! ## Address walk
//!
//! Each 48-bit virtual address splits into four 9-bit table indices plus a
//! 12-bit page offset:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L4   |  L3   |  L2   |  L1   | offset |
//! ```
//!
//! Every level is a [`PageTable`] of 512 [`PageEntryBits`] occupying
//! exactly one physical frame. Bring-up maps 4 KiB pages only and uses
//! identity translations exclusively (virtual == physical).
//!
//! ## Hardware-free construction
//!
//! Construction logic is generic over two seams so it runs in host tests:
//!
//! - [`FrameSource`] hands out physical frames (the real one is
//!   [`BumpAllocator`]; tests use the same allocator over a fake arena).
//! - [`PhysFrames`] converts a frame address into a usable table
//!   reference (identity in the kernel, array indexing in tests).
//!
//! The only privileged operation, [`IdentitySpace::activate`], is isolated
//! so everything up to the CR3 write is observable and testable.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod bump;
mod entry;
mod identity;
mod manager;
mod table;

pub use bump::{BumpAllocator, FrameAllocatorError};
pub use entry::{PAGE_ADDRESS_MASK, PageEntryBits};
pub use identity::{IdentitySpace, build_identity_map};
pub use manager::MemoryManager;
pub use table::{ENTRY_COUNT, PageTable, split_indices};

use kernel_addresses::PhysicalAddress;

/// Provider of physical frames for page-table storage.
///
/// Infallible by contract: capacity is validated when the backing region
/// is chosen, and bring-up allocates nothing but page tables. Not
/// reentrant-safe; there is exactly one execution context at this stage.
pub trait FrameSource {
    /// Hand out the next free 4 KiB frame. Never returns the same frame
    /// twice within one boot session.
    fn allocate_frame(&mut self) -> PhysicalAddress;
}

/// Access to physical table frames from the current execution context.
///
/// The kernel implementation is the identity conversion: construction
/// runs while physical memory is still reachable one-to-one. Tests back
/// frames with an in-memory arena instead, which is what keeps the
/// self-mapping bootstrap observable without hardware.
pub trait PhysFrames {
    /// Borrow the table stored in `frame`.
    ///
    /// # Safety
    /// `frame` must point at a 4 KiB frame that is owned by the paging
    /// layer and reachable (and writable) in the current address space.
    /// The caller must not let returned borrows of the same frame overlap.
    unsafe fn table_mut<'a>(&self, frame: PhysicalAddress) -> &'a mut PageTable;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::UnsafeCell;
    use kernel_addresses::{PAGE_SIZE, VirtualAddress};
    use kernel_handoff::mmap::{CONVENTIONAL, MemoryDescriptor, MemoryMapView, MemoryRegion};

    /// A 4 KiB-aligned frame standing in for physical RAM.
    #[repr(align(4096))]
    struct Frame(UnsafeCell<[u8; 4096]>);

    /// Fake physical memory: `n` frames starting at `base`.
    struct TestPhys {
        base: u64,
        frames: Vec<Frame>,
    }

    impl TestPhys {
        fn new(base: u64, n: usize) -> Self {
            assert_eq!(base % PAGE_SIZE, 0);
            let frames = (0..n).map(|_| Frame(UnsafeCell::new([0; 4096]))).collect();
            Self { base, frames }
        }

        fn region(&self) -> MemoryRegion {
            MemoryRegion {
                start: PhysicalAddress::new(self.base),
                page_count: self.frames.len() as u64,
            }
        }
    }

    impl PhysFrames for TestPhys {
        unsafe fn table_mut<'a>(&self, frame: PhysicalAddress) -> &'a mut PageTable {
            assert!(frame.is_page_aligned());
            let idx = usize::try_from((frame.as_u64() - self.base) / PAGE_SIZE).unwrap();
            assert!(idx < self.frames.len(), "table frame outside the arena");
            unsafe { &mut *self.frames[idx].0.get().cast::<PageTable>() }
        }
    }

    /// Bump allocator that remembers every frame it handed out.
    struct RecordingAlloc {
        inner: BumpAllocator,
        handed_out: Vec<PhysicalAddress>,
    }

    impl RecordingAlloc {
        fn over(region: MemoryRegion) -> Self {
            Self {
                inner: BumpAllocator::from_region(region),
                handed_out: Vec::new(),
            }
        }
    }

    impl FrameSource for RecordingAlloc {
        fn allocate_frame(&mut self) -> PhysicalAddress {
            let frame = self.inner.allocate_frame();
            self.handed_out.push(frame);
            frame
        }
    }

    fn raw_map(descs: &[MemoryDescriptor], desc_size: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; descs.len() * desc_size];
        for (i, d) in descs.iter().enumerate() {
            unsafe {
                core::ptr::write_unaligned(
                    bytes
                        .as_mut_ptr()
                        .add(i * desc_size)
                        .cast::<MemoryDescriptor>(),
                    *d,
                );
            }
        }
        bytes
    }

    #[test]
    fn mapped_page_translates_to_itself() {
        let phys = TestPhys::new(0x10_0000, 64);
        let mut alloc = RecordingAlloc::over(phys.region());
        let space = IdentitySpace::new(&phys, &mut alloc);

        let va = VirtualAddress::new(0x7fee_5000);
        assert_eq!(space.translate(va), None);
        space.map_page(&mut alloc, va);
        assert_eq!(space.translate(va), Some(PhysicalAddress::new(0x7fee_5000)));

        // In-page offsets survive translation.
        let inner = VirtualAddress::new(0x7fee_5123);
        assert_eq!(
            space.translate(inner),
            Some(PhysicalAddress::new(0x7fee_5123))
        );
    }

    #[test]
    fn map_page_is_idempotent() {
        let phys = TestPhys::new(0x10_0000, 64);
        let mut alloc = RecordingAlloc::over(phys.region());
        let space = IdentitySpace::new(&phys, &mut alloc);

        let va = VirtualAddress::new(0x0000_0048_8123_4000);
        space.map_page(&mut alloc, va);
        let first = space.translate(va).unwrap();
        let frames_after_first = alloc.handed_out.len();

        space.map_page(&mut alloc, va);
        assert_eq!(space.translate(va), Some(first));
        assert_eq!(
            alloc.handed_out.len(),
            frames_after_first,
            "remapping must not allocate"
        );
    }

    #[test]
    fn every_table_frame_is_reachable_through_its_own_hierarchy() {
        let phys = TestPhys::new(0x10_0000, 256);
        let mut alloc = RecordingAlloc::over(phys.region());
        let space = IdentitySpace::new(&phys, &mut alloc);

        // Spread mappings across distinct L4/L3/L2 windows to force many
        // intermediate tables into existence.
        for va in [
            0x0000_0000_0000_1000,
            0x0000_0000_4020_3000,
            0x0000_0048_8123_4000,
            0x0000_7fff_ffff_e000,
            0x0000_0001_0000_0000,
        ] {
            space.map_page(&mut alloc, VirtualAddress::new(va));
        }

        assert!(alloc.handed_out.len() > 5);
        for frame in &alloc.handed_out {
            assert_eq!(
                space.translate(VirtualAddress::new(frame.as_u64())),
                Some(*frame),
                "orphaned table frame {frame}"
            );
        }
    }

    #[test]
    fn root_frame_is_self_mapped() {
        let phys = TestPhys::new(0x10_0000, 64);
        let mut alloc = RecordingAlloc::over(phys.region());
        let space = IdentitySpace::new(&phys, &mut alloc);
        let root = space.root();
        assert_eq!(space.translate(VirtualAddress::new(root.as_u64())), Some(root));
    }

    #[test]
    fn build_identity_map_covers_all_regions_and_the_framebuffer() {
        let phys = TestPhys::new(0x10_0000, 128);
        let descs = [
            // The arena itself: largest conventional region, allocator home.
            MemoryDescriptor::new(CONVENTIONAL, 0x10_0000, 128),
            // Firmware-occupied memory of another type: still mapped.
            MemoryDescriptor::new(2, 0x40_0000, 8),
            // A smaller conventional region elsewhere.
            MemoryDescriptor::new(CONVENTIONAL, 0x80_0000, 4),
        ];
        let desc_size = size_of::<MemoryDescriptor>() + 8;
        let bytes = raw_map(&descs, desc_size);
        let view = MemoryMapView::new(&bytes, desc_size);

        let mut alloc = RecordingAlloc::over(phys.region());
        let fb = MemoryRegion {
            start: PhysicalAddress::new(0xE000_0000),
            page_count: 2,
        };
        let space = build_identity_map(&phys, &mut alloc, &view, Some(fb));

        for desc in view.iter() {
            let mut page = desc.phys_start;
            let end = desc.phys_start + desc.page_count * PAGE_SIZE;
            while page < end {
                assert_eq!(
                    space.translate(VirtualAddress::new(page)),
                    Some(PhysicalAddress::new(page)),
                    "unmapped page {page:#x} of descriptor kind {}",
                    desc.kind
                );
                page += PAGE_SIZE;
            }
        }

        // Framebuffer pages are mapped even though no descriptor names them.
        for page in [0xE000_0000u64, 0xE000_1000] {
            assert_eq!(
                space.translate(VirtualAddress::new(page)),
                Some(PhysicalAddress::new(page))
            );
        }

        // Unrelated memory stays unmapped.
        assert_eq!(space.translate(VirtualAddress::new(0x9000_0000)), None);

        // The driver preserves the reachability invariant as a whole.
        for frame in &alloc.handed_out {
            assert_eq!(
                space.translate(VirtualAddress::new(frame.as_u64())),
                Some(*frame)
            );
        }
    }
}
