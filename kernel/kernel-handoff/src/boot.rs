//! Boot handoff record and kernel entry ABI.

/// Kernel entry function pointer.
///
/// # ABI
/// The loader runs under the UEFI (Microsoft x64) calling convention; the
/// kernel image is built for the System V AMD64 convention. Invoking the
/// entry point therefore crosses an ABI boundary, made explicit by this
/// typed pointer: the compiler emits the System V call sequence for it even
/// though the caller itself is `efiapi` code.
pub type KernelEntryFn = unsafe extern "sysv64" fn(*const LoaderHandoff) -> !;

/// UEFI memory type used for the kernel image page allocation.
///
/// Values at and above `0x8000_0000` are reserved for OS use. Tagging the
/// image pages with a private type lets later memory-map scans tell the
/// kernel image apart from ordinary loader allocations.
pub const KERNEL_IMAGE_MEMORY_TYPE: u32 = 0x8000_0000;

/// Everything the kernel needs right after `ExitBootServices`.
///
/// Built once by the loader, read-only from the moment the entry point is
/// invoked, never freed (the loader stops executing at the handoff).
#[repr(C)]
#[derive(Clone)]
pub struct LoaderHandoff {
    /// Framebuffer geometry from the selected GOP mode.
    pub fb: FramebufferInfo,

    /// Raw copy of the firmware memory map.
    pub mmap: MemoryMapInfo,

    /// Physical base address the kernel image was loaded at. Only used for
    /// diagnostics (debugger symbol relocation math).
    pub debug_base: u64,
}

/// Linear framebuffer description, passed from UEFI GOP.
#[repr(C)]
#[derive(Clone)]
pub struct FramebufferInfo {
    /// Physical base address of the linear framebuffer. Stays writable
    /// after `ExitBootServices`.
    pub ptr: u64,

    /// Visible width in pixels.
    pub width: u32,

    /// Visible height in pixels.
    pub height: u32,

    /// Pixels per scanline. May exceed `width` due to padding; all row
    /// arithmetic must use this, not `width`.
    pub stride: u32,

    /// Keeps the struct free of implicit padding.
    pub _reserved: u32,
}

impl FramebufferInfo {
    /// Total byte length of the framebuffer: `stride × height × 4` (GOP
    /// modes used here are 32 bits per pixel).
    #[must_use]
    pub const fn byte_len(&self) -> u64 {
        self.stride as u64 * self.height as u64 * 4
    }
}

/// Location and shape of the raw memory-map copy.
#[repr(C)]
#[derive(Clone)]
pub struct MemoryMapInfo {
    /// Pointer to the buffer holding raw `EFI_MEMORY_DESCRIPTOR` bytes.
    pub ptr: u64,

    /// Length of the buffer in bytes.
    pub len: u64,

    /// Size of a single descriptor in bytes. The firmware chooses this and
    /// it may exceed the nominal structure size; iteration must honor it.
    pub desc_size: u64,
}

const _: () = {
    // The record crosses an ABI boundary; keep its layout free of surprises.
    assert!(size_of::<FramebufferInfo>() == 24);
    assert!(size_of::<MemoryMapInfo>() == 24);
    assert!(size_of::<LoaderHandoff>() == 56);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffer_byte_len_uses_stride() {
        let fb = FramebufferInfo {
            ptr: 0xc000_0000,
            width: 1920,
            height: 1080,
            stride: 2048,
            _reserved: 0,
        };
        assert_eq!(fb.byte_len(), 2048 * 1080 * 4);
    }
}
