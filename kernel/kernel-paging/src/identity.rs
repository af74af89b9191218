//! Identity-mapped address-space construction.
//!
//! The hierarchy is built while the firmware's own page tables are still
//! active, so every physical frame is reachable for writing. The central
//! hazard is what happens *after* the switch: once this hierarchy is live,
//! a table can only be written through a virtual address it itself maps.
//! [`IdentitySpace::map_page`] therefore identity-maps every frame it turns
//! into a table, before that frame can ever be reached through the new
//! hierarchy: allocate, then map, then use.

use crate::entry::PageEntryBits;
use crate::table::split_indices;
use crate::{FrameSource, PhysFrames};
use kernel_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress, align_up};
use kernel_handoff::mmap::{MemoryMapView, MemoryRegion};
use log::debug;

/// An owned, single-instance 4-level identity mapping rooted at one
/// top-level table frame.
///
/// Entries are written once, from empty to present; nothing is ever
/// downgraded or removed during bring-up.
pub struct IdentitySpace<'m, M: PhysFrames> {
    root: PhysicalAddress,
    mapper: &'m M,
}

impl<'m, M: PhysFrames> IdentitySpace<'m, M> {
    /// Allocate and zero the root table, and identity-map the root frame
    /// itself so it stays writable once the hierarchy is active.
    pub fn new<A: FrameSource>(mapper: &'m M, alloc: &mut A) -> Self {
        let root = alloc.allocate_frame();
        unsafe { mapper.table_mut(root) }.zero();
        let space = Self { root, mapper };
        space.map_page(alloc, VirtualAddress::new(root.as_u64()));
        space
    }

    /// Physical address of the top-level table (the future CR3 value).
    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    /// Identity-map the page containing `va`.
    ///
    /// Missing intermediate tables are allocated, zeroed, linked with
    /// present + writable + user, and immediately identity-mapped
    /// themselves. A present leaf makes the call an idempotent no-op,
    /// never an error and never an overwrite.
    pub fn map_page<A: FrameSource>(&self, alloc: &mut A, va: VirtualAddress) {
        let (i4, i3, i2, i1) = split_indices(va);

        let (pdpt, fresh4) = self.ensure_next(alloc, self.root, i4);
        let (pd, fresh3) = self.ensure_next(alloc, pdpt, i3);
        let (pt, fresh2) = self.ensure_next(alloc, pd, i2);

        {
            let table = unsafe { self.mapper.table_mut(pt) };
            if !table.get(i1).present() {
                let page = PhysicalAddress::new(va.align_down_to_page().as_u64());
                table.set(i1, PageEntryBits::present_rw_user().with_address(page));
            }
        }

        // Any frame that just became a table must be reachable through
        // this hierarchy before it is ever dereferenced through it.
        for frame in [fresh4, fresh3, fresh2].into_iter().flatten() {
            self.map_page(alloc, VirtualAddress::new(frame.as_u64()));
        }
    }

    /// Identity-map every page of `[start, start + bytes)`, rounded
    /// outward to page boundaries.
    pub fn map_range<A: FrameSource>(&self, alloc: &mut A, start: VirtualAddress, bytes: u64) {
        let mut page = start.align_down_to_page().as_u64();
        let end = align_up(start.as_u64() + bytes, PAGE_SIZE);
        while page < end {
            self.map_page(alloc, VirtualAddress::new(page));
            page += PAGE_SIZE;
        }
    }

    /// Walk the hierarchy for `va`. `None` until the page is mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (i4, i3, i2, i1) = split_indices(va);
        let mut table_pa = self.root;
        for index in [i4, i3, i2] {
            let entry = unsafe { self.mapper.table_mut(table_pa) }.get(index);
            if !entry.present() {
                return None;
            }
            table_pa = entry.address();
        }
        let leaf = unsafe { self.mapper.table_mut(table_pa) }.get(i1);
        if !leaf.present() {
            return None;
        }
        Some(leaf.address() + va.page_offset())
    }

    /// Load the root table into the hardware paging-root register.
    ///
    /// This is the irreversible commit: from here on the firmware's
    /// address space is gone and an incomplete hierarchy is a machine
    /// fault, not a reportable error.
    ///
    /// # Safety
    /// Every page the current execution context touches (code, stack, the
    /// handoff record, the framebuffer, and every table frame of this
    /// hierarchy) must already be identity-mapped. Interrupts must be
    /// disabled.
    #[cfg(target_arch = "x86_64")]
    pub unsafe fn activate(&self) {
        unsafe {
            core::arch::asm!(
                "mov cr3, {}",
                in(reg) self.root.as_u64(),
                options(nostack, preserves_flags)
            );
        }
    }

    fn ensure_next<A: FrameSource>(
        &self,
        alloc: &mut A,
        table_pa: PhysicalAddress,
        index: usize,
    ) -> (PhysicalAddress, Option<PhysicalAddress>) {
        let table = unsafe { self.mapper.table_mut(table_pa) };
        let entry = table.get(index);
        if entry.present() {
            return (entry.address(), None);
        }
        let frame = alloc.allocate_frame();
        unsafe { self.mapper.table_mut(frame) }.zero();
        table.set(index, PageEntryBits::present_rw_user().with_address(frame));
        (frame, Some(frame))
    }
}

/// Build the bring-up identity mapping.
///
/// Maps every page of every descriptor in the firmware map regardless of
/// type (the currently executing loader code and data are in there
/// somewhere and cannot be identified precisely), and then the framebuffer
/// range, which firmware does not report in the map at all.
pub fn build_identity_map<'m, M: PhysFrames, A: FrameSource>(
    mapper: &'m M,
    alloc: &mut A,
    map: &MemoryMapView<'_>,
    framebuffer: Option<MemoryRegion>,
) -> IdentitySpace<'m, M> {
    let space = IdentitySpace::new(mapper, alloc);

    for desc in map.iter() {
        let mut page = desc.phys_start;
        let end = desc.phys_start + desc.page_count * PAGE_SIZE;
        while page < end {
            space.map_page(alloc, VirtualAddress::new(page));
            page += PAGE_SIZE;
        }
    }

    if let Some(fb) = framebuffer {
        space.map_range(alloc, VirtualAddress::new(fb.start.as_u64()), fb.byte_len());
    }

    debug!("identity map built, root at {}", space.root());
    space
}
