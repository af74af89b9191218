//! Bring-up memory manager: allocator + identity space as one unit.

use crate::{BumpAllocator, FrameAllocatorError, FrameSource, IdentitySpace, PhysFrames, build_identity_map};
use kernel_addresses::{PhysicalAddress, VirtualAddress};
use kernel_handoff::mmap::{MemoryMapView, MemoryRegion};

/// Owns the frame cursor and the identity hierarchy built from it.
///
/// Singleton by construction: the kernel entry path creates exactly one
/// and there is no other execution context to share it with.
pub struct MemoryManager<'m, M: PhysFrames> {
    alloc: BumpAllocator,
    space: IdentitySpace<'m, M>,
}

impl<'m, M: PhysFrames> MemoryManager<'m, M> {
    /// Select the frame region, build the full identity map (every
    /// descriptor of the firmware map plus the framebuffer), and wrap
    /// both for the rest of bring-up.
    ///
    /// # Errors
    /// [`FrameAllocatorError::NoUsableMemory`] if the map offers no
    /// conventional region.
    pub fn bring_up(
        mapper: &'m M,
        view: &MemoryMapView<'_>,
        framebuffer: Option<MemoryRegion>,
    ) -> Result<Self, FrameAllocatorError> {
        let mut alloc = BumpAllocator::from_memory_map(view)?;
        let space = build_identity_map(mapper, &mut alloc, view, framebuffer);
        Ok(Self { alloc, space })
    }

    #[must_use]
    pub const fn space(&self) -> &IdentitySpace<'m, M> {
        &self.space
    }

    /// Hand out one identity-mapped page for later bring-up consumers.
    ///
    /// The frame comes from the bump region, which the identity sweep has
    /// already mapped wall-to-wall, so the page is usable immediately even
    /// after [`IdentitySpace::activate`]; mapping it again here is the
    /// idempotent no-op case.
    pub fn allocate_page(&mut self) -> PhysicalAddress {
        let frame = self.alloc.allocate_frame();
        self.space
            .map_page(&mut self.alloc, VirtualAddress::new(frame.as_u64()));
        frame
    }

    /// Load the new hierarchy into the paging-root register.
    ///
    /// # Safety
    /// See [`IdentitySpace::activate`]; irreversible.
    #[cfg(target_arch = "x86_64")]
    pub unsafe fn activate(&self) {
        unsafe { self.space.activate() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageTable;
    use core::cell::UnsafeCell;
    use kernel_addresses::PAGE_SIZE;
    use kernel_handoff::mmap::{CONVENTIONAL, MemoryDescriptor};

    #[repr(align(4096))]
    struct Frame(UnsafeCell<[u8; 4096]>);

    struct TestPhys {
        base: u64,
        frames: Vec<Frame>,
    }

    impl PhysFrames for TestPhys {
        unsafe fn table_mut<'a>(&self, frame: PhysicalAddress) -> &'a mut PageTable {
            let idx = usize::try_from((frame.as_u64() - self.base) / PAGE_SIZE).unwrap();
            unsafe { &mut *self.frames[idx].0.get().cast::<PageTable>() }
        }
    }

    #[test]
    fn bring_up_then_allocate_pages() {
        let phys = TestPhys {
            base: 0x10_0000,
            frames: (0..128).map(|_| Frame(UnsafeCell::new([0; 4096]))).collect(),
        };
        let descs = [MemoryDescriptor::new(CONVENTIONAL, 0x10_0000, 128)];
        let desc_size = size_of::<MemoryDescriptor>();
        let mut bytes = vec![0u8; desc_size];
        unsafe {
            core::ptr::write_unaligned(bytes.as_mut_ptr().cast::<MemoryDescriptor>(), descs[0]);
        }
        let view = MemoryMapView::new(&bytes, desc_size);

        let mut memory = MemoryManager::bring_up(&phys, &view, None).unwrap();

        let a = memory.allocate_page();
        let b = memory.allocate_page();
        assert_ne!(a, b);
        for page in [a, b] {
            // Already identity-mapped by the region sweep; allocate_page's
            // own map_page call must have been a no-op.
            assert_eq!(
                memory.space().translate(VirtualAddress::new(page.as_u64())),
                Some(page)
            );
        }
    }

    #[test]
    fn bring_up_without_conventional_memory_fails() {
        let phys = TestPhys {
            base: 0,
            frames: Vec::new(),
        };
        let desc = MemoryDescriptor::new(3, 0x10_0000, 8);
        let desc_size = size_of::<MemoryDescriptor>();
        let mut bytes = vec![0u8; desc_size];
        unsafe {
            core::ptr::write_unaligned(bytes.as_mut_ptr().cast::<MemoryDescriptor>(), desc);
        }
        let view = MemoryMapView::new(&bytes, desc_size);

        assert!(matches!(
            MemoryManager::bring_up(&phys, &view, None),
            Err(FrameAllocatorError::NoUsableMemory)
        ));
    }
}
