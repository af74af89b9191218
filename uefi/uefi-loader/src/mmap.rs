//! Firmware memory-map capture around `ExitBootServices`.
//!
//! The buffer is sized *before* the exit via the doubling acquisition
//! loop ([`kernel_handoff::acquire`]); allocation is impossible
//! afterwards. The final map returned by `ExitBootServices` itself is
//! then copied into that buffer; the uefi crate performs the map-key
//! handshake, and a map that outgrew the buffer in between is fatal,
//! never retried (the key it would take to retry is already stale).

extern crate alloc;

use alloc::vec::Vec;
use kernel_handoff::acquire::{MapFillError, MapMeta, MapSource};
use kernel_handoff::boot::MemoryMapInfo;
use log::{error, info};
use uefi::boot::{self, MemoryType};
use uefi::mem::memory_map::MemoryMap;
use uefi::Status;

/// Initial buffer size for the acquisition loop, doubled as needed.
pub const INITIAL_MMAP_BUFFER_LEN: usize = 4096;

/// Slack for descriptors that appear between sizing and the exit call.
const EXTRA_DESCS: usize = 32;

/// Live Boot Services as a [`MapSource`].
pub struct BootServicesMapSource;

impl MapSource for BootServicesMapSource {
    type Error = Status;

    fn fill(&mut self, buf: &mut [u8]) -> Result<MapMeta, MapFillError<Status>> {
        let map = boot::memory_map(MemoryType::LOADER_DATA)
            .map_err(|e| MapFillError::Firmware(e.status()))?;

        let len = map.buffer().len();
        let desc_size = map.meta().desc_size;

        // Demand headroom beyond the current size: the map keeps changing
        // while the loader allocates, including for this very buffer.
        let needed = len + EXTRA_DESCS * desc_size;
        if buf.len() < needed {
            return Err(MapFillError::TooSmall { required: needed });
        }

        buf[..len].copy_from_slice(map.buffer());
        Ok(MapMeta { len, desc_size })
    }
}

/// Leave Boot Services and capture the final memory map into `buf`.
///
/// After this returns, firmware services are permanently unavailable; the
/// buffer is leaked because the kernel owns it from here on.
///
/// # Errors
/// `Status::BUFFER_TOO_SMALL` if the final map no longer fits; fatal by
/// design, see the module docs.
pub fn exit_boot_services_with_map(mut buf: Vec<u8>) -> Result<MemoryMapInfo, Status> {
    info!("exiting boot services");

    // SAFETY: no Boot Services call is made past this point; the only
    // allocation left alive is `buf`, which is intentionally leaked.
    let final_map = unsafe { boot::exit_boot_services(None) };

    let bytes = final_map.buffer();
    if bytes.len() > buf.len() {
        error!(
            "memory map grew past its buffer during exit ({} > {})",
            bytes.len(),
            buf.len()
        );
        return Err(Status::BUFFER_TOO_SMALL);
    }
    buf[..bytes.len()].copy_from_slice(bytes);

    let info = MemoryMapInfo {
        ptr: buf.as_ptr() as u64,
        len: bytes.len() as u64,
        desc_size: final_map.meta().desc_size as u64,
    };

    // The kernel reads this buffer for the rest of its life.
    core::mem::forget(buf);
    Ok(info)
}
