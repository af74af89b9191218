//! # UEFI Loader
//!
//! The firmware-hosted half of the boot pipeline. It runs as a PE/COFF
//! application under UEFI Boot Services and carries the machine from
//! "firmware owns everything" to "the kernel's first instruction":
//!
//! 1. open the fixed image path on the boot volume and load the ELF64
//!    kernel into freshly reserved physical pages;
//! 2. switch the display into the mode the kernel expects;
//! 3. capture the firmware memory map and leave Boot Services;
//! 4. hand a [`LoaderHandoff`] record to the kernel entry point across
//!    the calling-convention boundary.
//!
//! There is no return path. Every failure before `ExitBootServices` is
//! reported on the console and aborts back to firmware; after it, the
//! machine either reaches the kernel or hangs.

#![no_std]
#![no_main]
#![allow(unsafe_code)]

extern crate alloc;

mod file_system;
mod graphics;
mod logger;
mod memory;
mod mmap;

use crate::logger::LoaderLogger;
use crate::mmap::{BootServicesMapSource, INITIAL_MMAP_BUFFER_LEN};
use alloc::boxed::Box;
use boot_elf::{ImageArena, ImageError, load_image};
use core::ptr::NonNull;
use kernel_handoff::acquire::acquire_map_buffer;
use kernel_handoff::boot::{
    KERNEL_IMAGE_MEMORY_TYPE, KernelEntryFn, LoaderHandoff, MemoryMapInfo,
};
use log::{LevelFilter, error, info};
use uefi::boot::{self, AllocateType, MemoryType};
use uefi::prelude::*;

/// Page reservation for the kernel image, tagged with the private memory
/// type so the image shows up distinctly in later memory-map scans.
struct KernelImageArena;

impl ImageArena for KernelImageArena {
    type Error = Status;

    fn reserve(&mut self, page_count: u64) -> Result<NonNull<u8>, Status> {
        let pages = usize::try_from(page_count).map_err(|_| Status::BAD_BUFFER_SIZE)?;
        boot::allocate_pages(
            AllocateType::AnyPages,
            MemoryType::custom(KERNEL_IMAGE_MEMORY_TYPE),
            pages,
        )
        .map_err(|e| e.status())
    }
}

/// Collapse image-loading failures onto firmware status codes at the one
/// boundary where they leave Rust.
fn image_status(e: &ImageError<Status>) -> Status {
    match e {
        ImageError::BadMagic
        | ImageError::NotElf64
        | ImageError::MalformedProgramHeaders
        | ImageError::NoLoadableSegments
        | ImageError::BadAlignment => Status::LOAD_ERROR,
        ImageError::AddressArithmetic => Status::BAD_BUFFER_SIZE,
        ImageError::Read(s) | ImageError::Reserve(s) => *s,
    }
}

#[entry]
fn efi_main() -> Status {
    if uefi::helpers::init().is_err() {
        return Status::UNSUPPORTED;
    }

    let logger = match LoaderLogger::new(LevelFilter::Debug).init() {
        Ok(logger) => logger,
        Err(_) => return Status::UNSUPPORTED,
    };

    info!("loader starting, looking for {}", file_system::KERNEL_IMAGE_PATH);

    let mut source = match file_system::open_kernel_image() {
        Ok(source) => source,
        Err(status) => return status,
    };

    let loaded = match load_image(&mut source, &mut KernelImageArena) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("kernel image rejected: {e}");
            return image_status(&e);
        }
    };
    info!(
        "kernel image: {} pages at {}, entry {}",
        loaded.page_count, loaded.base, loaded.entry
    );

    let fb = match graphics::select_framebuffer() {
        Ok(fb) => fb,
        Err(status) => return status,
    };

    // The handoff record outlives the loader; leak it into LOADER_DATA
    // memory that the identity map will cover.
    let handoff = Box::leak(Box::new(LoaderHandoff {
        fb,
        mmap: MemoryMapInfo {
            ptr: 0,
            len: 0,
            desc_size: 0,
        },
        debug_base: loaded.base.as_u64(),
    }));

    // Size the map buffer while allocation still works; the exit call
    // below fills in the final contents.
    let (map_buf, _meta) =
        match acquire_map_buffer(&mut BootServicesMapSource, INITIAL_MMAP_BUFFER_LEN) {
            Ok(acquired) => acquired,
            Err(status) => {
                error!("failed to acquire the memory map: {status:?}");
                return status;
            }
        };

    logger.exit_boot_services();
    handoff.mmap = match mmap::exit_boot_services_with_map(map_buf) {
        Ok(info) => info,
        Err(status) => return status,
    };

    info!("handing off to the kernel at {}", loaded.entry);

    // The ABI discontinuity: this loader is `efiapi` code, the kernel
    // entry is System V. The typed pointer is the entire bridge.
    let entry: KernelEntryFn =
        unsafe { core::mem::transmute(loaded.entry.as_u64() as *const ()) };
    unsafe { entry(core::ptr::from_mut(handoff).cast_const()) }
}
