//! Pool-backed global allocator for the loader.
//!
//! The `uefi` crate is built without its own global allocator, so the
//! loader provides one on top of Boot Services pool allocations. Valid
//! only while Boot Services are active; afterwards every allocation
//! request reports out-of-memory, which is fine: nothing allocates past
//! the handoff.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull, null_mut};
use uefi::boot::{self, MemoryType};

/// Rust allocator over `AllocatePool`/`FreePool`.
///
/// Pool allocations are only 8-byte aligned, so requests are over-allocated
/// and the original pool pointer is stashed directly below the aligned
/// block for `dealloc` to find.
pub struct PoolAllocator;

#[global_allocator]
static GLOBAL: PoolAllocator = PoolAllocator;

unsafe impl GlobalAlloc for PoolAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let align = layout.align().max(size_of::<usize>());
        let size = layout.size().max(1);
        let Some(total) = size
            .checked_add(align)
            .and_then(|v| v.checked_add(size_of::<usize>()))
        else {
            return null_mut();
        };

        let Ok(raw) = boot::allocate_pool(MemoryType::LOADER_DATA, total) else {
            return null_mut();
        };

        let raw_addr = raw.as_ptr() as usize;
        let aligned = (raw_addr + size_of::<usize>() + align - 1) & !(align - 1);
        let header = (aligned - size_of::<usize>()) as *mut usize;

        unsafe {
            ptr::write(header, raw_addr);
        }
        aligned as *mut u8
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if ptr.is_null() {
            return;
        }

        let header = (ptr as usize - size_of::<usize>()) as *const usize;
        // SAFETY: `alloc` stored the pool pointer right below the block.
        let original = unsafe { ptr::read(header) as *mut u8 };
        let _ = unsafe { boot::free_pool(NonNull::new_unchecked(original)) };
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let p = unsafe { self.alloc(layout) };
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, layout.size()) };
        }
        p
    }
}
