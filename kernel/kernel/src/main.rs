//! # Kernel Entry
//!
//! The loader jumps here with a pointer to the [`LoaderHandoff`] record
//! and firmware permanently out of the picture. Before any higher-level
//! kernel code can run, this path takes ownership of the machine in a
//! fixed order:
//!
//! 1. diagnostics up (QEMU debug console logger);
//! 2. interrupts off, and they stay off for the rest of this core's scope;
//! 3. own descriptor tables (GDT + TSS) installed;
//! 4. frame allocator and identity page tables built from the handoff
//!    memory map, then activated.
//!
//! Nothing returns. A failure past `ExitBootServices` has nowhere to
//! report to except the debug console, after which the core halts.

#![no_std]
#![no_main]
#![allow(unsafe_code)]

mod memory;

use kernel_cpu::gdt::CpuTables;
use kernel_handoff::boot::LoaderHandoff;
use kernel_qemu::{DebugConLogger, debug_out};
use log::{LevelFilter, error, info};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    // The logger may not exist yet; write to the port directly.
    debug_out!("kernel panic: {info}\n");
    halt()
}

/// The bootstrap CPU's descriptor tables. The instance lives here, in the
/// kernel image, for the life of the CPU; setup routines only ever borrow
/// it.
static mut CPU_TABLES: CpuTables = CpuTables::new();

/// Kernel entry point, invoked by the loader across the ABI boundary.
///
/// # Safety
/// Called exactly once, with `handoff` pointing at the record the loader
/// leaked before `ExitBootServices`.
#[unsafe(no_mangle)]
pub unsafe extern "sysv64" fn uefi_start(handoff: *const LoaderHandoff) -> ! {
    let _ = DebugConLogger::new(LevelFilter::Debug).init();

    // SAFETY: per contract, the loader hands over a valid, leaked record.
    let handoff = unsafe { &*handoff };

    info!("kernel entered, image base {:#x}", handoff.debug_base);
    info!(
        "framebuffer {:#x}, {}x{} stride {}",
        handoff.fb.ptr, handoff.fb.width, handoff.fb.height, handoff.fb.stride
    );

    // No interrupt model exists yet; nothing may fire while the
    // descriptor tables and the address space are replaced.
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack, preserves_flags));
    }

    // SAFETY: single core, single pass through this function; the static
    // is borrowed exactly once and lives forever.
    let tables = unsafe { &mut *&raw mut CPU_TABLES };
    unsafe {
        tables.install();
    }
    info!("descriptor tables installed");

    let memory = match memory::bring_up(handoff) {
        Ok(memory) => memory,
        Err(e) => {
            error!("memory bring-up failed: {e}");
            halt();
        }
    };

    // The point of no return: the firmware's address space ends here.
    unsafe {
        memory.activate();
    }
    info!("identity page tables active");

    info!("bring-up complete, halting");
    halt()
}

fn halt() -> ! {
    loop {
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }
}
