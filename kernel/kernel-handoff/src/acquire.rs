//! Memory-map acquisition with the one retry loop in the boot pipeline.
//!
//! `GetMemoryMap` is the only firmware call allowed to fail recoverably:
//! a too-small buffer is answered by freeing it and retrying with (at
//! least) double the size. Doubling rather than trusting the reported
//! requirement matters because allocating the next buffer can itself grow
//! the map. Every other failure is fatal to the boot attempt.
//!
//! The policy lives behind [`MapSource`] so it can be exercised without
//! firmware; the loader supplies the real implementation.

use alloc::vec;
use alloc::vec::Vec;
use log::trace;

/// Shape of a successfully captured map snapshot.
#[derive(Copy, Clone, Debug)]
pub struct MapMeta {
    /// Bytes of descriptor data written into the buffer.
    pub len: usize,
    /// Firmware-chosen descriptor stride.
    pub desc_size: usize,
}

/// Outcome of one snapshot attempt.
#[derive(Debug)]
pub enum MapFillError<E> {
    /// The buffer cannot hold the current map. `required` is the size the
    /// firmware reported at the time of the call; the next attempt must be
    /// at least that large.
    TooSmall { required: usize },
    /// Any other firmware failure. Fatal; never retried.
    Firmware(E),
}

/// A provider of raw memory-map snapshots.
pub trait MapSource {
    type Error;

    /// Capture a fresh snapshot of the memory map into `buf`.
    fn fill(&mut self, buf: &mut [u8]) -> Result<MapMeta, MapFillError<Self::Error>>;
}

/// Acquire the memory map into a freshly grown buffer.
///
/// Starts at `initial_len` bytes and doubles on every `TooSmall` answer
/// until the snapshot fits. Bounded only by available memory, like the
/// underlying firmware call.
///
/// # Errors
/// Propagates the first non-capacity failure from the source.
pub fn acquire_map_buffer<S: MapSource>(
    source: &mut S,
    initial_len: usize,
) -> Result<(Vec<u8>, MapMeta), S::Error> {
    let mut len = initial_len.max(1);
    loop {
        let mut buf = vec![0u8; len];
        match source.fill(&mut buf) {
            Ok(meta) => return Ok((buf, meta)),
            Err(MapFillError::TooSmall { required }) => {
                trace!("memory map needs {required} bytes, buffer was {len}; retrying");
                len = (len * 2).max(required);
            }
            Err(MapFillError::Firmware(e)) => return Err(e),
        }
    }
}
