//! Bring-up physical frame allocator.

use crate::FrameSource;
use kernel_addresses::{PAGE_SIZE, PhysicalAddress};
use kernel_handoff::mmap::{CONVENTIONAL, MemoryMapView, MemoryRegion};
use log::debug;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum FrameAllocatorError {
    /// The firmware map contains no conventional memory at all. Nothing
    /// can be built without it.
    #[error("no conventional memory region in the firmware memory map")]
    NoUsableMemory,
}

/// Monotonic cursor over the single largest conventional region.
///
/// A deliberate simplification for bring-up: no free list, no reclamation,
/// no locking. The only caller is the page-table builder, whose appetite is
/// a few dozen frames out of a region that is typically gigabytes. The
/// capacity check happens once, at selection, which is what lets
/// [`FrameSource::allocate_frame`] stay infallible.
#[derive(Debug)]
pub struct BumpAllocator {
    start: PhysicalAddress,
    next: PhysicalAddress,
    end: PhysicalAddress,
}

impl BumpAllocator {
    /// Select the largest conventional region of the firmware map and park
    /// the cursor at its base.
    ///
    /// # Errors
    /// [`FrameAllocatorError::NoUsableMemory`] if the map has no
    /// conventional descriptor.
    pub fn from_memory_map(view: &MemoryMapView<'_>) -> Result<Self, FrameAllocatorError> {
        let region = view
            .largest_region_of(CONVENTIONAL)
            .ok_or(FrameAllocatorError::NoUsableMemory)?;
        debug!(
            "frame allocator over {} pages at {}",
            region.page_count, region.start
        );
        Ok(Self::from_region(region))
    }

    #[must_use]
    pub const fn from_region(region: MemoryRegion) -> Self {
        Self {
            start: region.start,
            next: region.start,
            end: region.end(),
        }
    }

    /// Frames handed out so far.
    #[must_use]
    pub const fn allocated_frames(&self) -> u64 {
        (self.next.as_u64() - self.start.as_u64()) / PAGE_SIZE
    }

    /// Frames still available in the backing region.
    #[must_use]
    pub const fn remaining_frames(&self) -> u64 {
        (self.end.as_u64() - self.next.as_u64()) / PAGE_SIZE
    }
}

impl FrameSource for BumpAllocator {
    fn allocate_frame(&mut self) -> PhysicalAddress {
        // Running dry here means the selection premise was violated; there
        // is no state worth preserving past that point.
        assert!(
            self.next < self.end,
            "bring-up frame allocator exhausted its region"
        );
        let frame = self.next;
        self.next += PAGE_SIZE;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;
    use kernel_handoff::mmap::MemoryDescriptor;

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
    fn selects_largest_conventional_region() {
        let descs = [
            MemoryDescriptor::new(CONVENTIONAL, 0x10_0000, 16),
            MemoryDescriptor::new(4, 0x100_0000, 4096),
            MemoryDescriptor::new(CONVENTIONAL, 0x200_0000, 512),
        ];
        // Firmware-style inflated stride.
        let desc_size = size_of::<MemoryDescriptor>() + 8;
        let bytes = raw_map(&descs, desc_size);
        let view = MemoryMapView::new(&bytes, desc_size);

        let mut alloc = BumpAllocator::from_memory_map(&view).unwrap();
        assert_eq!(alloc.remaining_frames(), 512);
        assert_eq!(alloc.allocate_frame(), PhysicalAddress::new(0x200_0000));
    }

    #[test]
    fn no_conventional_memory_is_an_error() {
        let descs = [MemoryDescriptor::new(4, 0x10_0000, 4096)];
        let desc_size = size_of::<MemoryDescriptor>();
        let bytes = raw_map(&descs, desc_size);
        let view = MemoryMapView::new(&bytes, desc_size);
        assert_eq!(
            BumpAllocator::from_memory_map(&view).unwrap_err(),
            FrameAllocatorError::NoUsableMemory
        );
    }

    #[test]
    fn never_hands_out_the_same_frame_twice() {
        let mut alloc = BumpAllocator::from_region(MemoryRegion {
            start: PhysicalAddress::new(0x40_0000),
            page_count: 128,
        });
        let mut seen = std::collections::HashSet::new();
        for _ in 0..128 {
            let frame = alloc.allocate_frame();
            assert!(frame.is_page_aligned());
            assert!(seen.insert(frame.as_u64()), "frame handed out twice");
        }
        assert_eq!(alloc.allocated_frames(), 128);
        assert_eq!(alloc.remaining_frames(), 0);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exhaustion_is_a_contract_violation() {
        let mut alloc = BumpAllocator::from_region(MemoryRegion {
            start: PhysicalAddress::new(0x40_0000),
            page_count: 1,
        });
        let _ = alloc.allocate_frame();
        let _ = alloc.allocate_frame();
    }
}
