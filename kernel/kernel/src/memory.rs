//! Kernel-side memory bring-up wiring.

use kernel_addresses::{PhysicalAddress, pages_spanned};
use kernel_handoff::boot::LoaderHandoff;
use kernel_handoff::mmap::{MemoryMapView, MemoryRegion};
use kernel_paging::{FrameAllocatorError, MemoryManager, PageTable, PhysFrames};

/// Frame access for the bring-up window: the loader left physical memory
/// identity-reachable, and the map under construction preserves exactly
/// that property, so a frame's physical address is its pointer.
pub struct DirectFrames;

impl PhysFrames for DirectFrames {
    unsafe fn table_mut<'a>(&self, frame: PhysicalAddress) -> &'a mut PageTable {
        unsafe { &mut *(frame.as_u64() as *mut PageTable) }
    }
}

static DIRECT_FRAMES: DirectFrames = DirectFrames;

/// Build the frame allocator and the full identity map from the handoff.
///
/// Does not activate anything; the CR3 switch stays a visible, separate
/// step in the entry path.
///
/// # Errors
/// Propagates [`FrameAllocatorError`] when the firmware map carries no
/// usable memory.
pub fn bring_up(
    handoff: &LoaderHandoff,
) -> Result<MemoryManager<'static, DirectFrames>, FrameAllocatorError> {
    // SAFETY: the loader copied the map into memory it leaked to us; the
    // pointer and length describe exactly that buffer.
    let bytes = unsafe {
        core::slice::from_raw_parts(handoff.mmap.ptr as *const u8, handoff.mmap.len as usize)
    };
    #[allow(clippy::cast_possible_truncation)]
    let view = MemoryMapView::new(bytes, handoff.mmap.desc_size as usize);

    // The framebuffer never appears in the firmware map; derive its page
    // span from the mode geometry.
    let framebuffer = MemoryRegion {
        start: PhysicalAddress::new(handoff.fb.ptr),
        page_count: pages_spanned(handoff.fb.byte_len()),
    };

    MemoryManager::bring_up(&DIRECT_FRAMES, &view, Some(framebuffer))
}
