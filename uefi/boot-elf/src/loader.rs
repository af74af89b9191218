//! Image loading: reserve, zero, copy, resolve the entry point.

extern crate alloc;

use crate::parser::{EHDR_LEN, parse_header, parse_load_segments};
use crate::{ImageError, ImagePlacement};
use alloc::vec;
use core::ptr::NonNull;
use core::{ptr, slice};
use kernel_addresses::PhysicalAddress;
use log::info;

/// Positioned byte-range read over the image file.
pub trait ImageSource {
    type Error;

    /// Read exactly `buf.len()` bytes starting at `offset`. Short reads
    /// are the implementation's problem; returning means `buf` is full.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Self::Error>;
}

/// Contiguous physical page reservation for the image.
pub trait ImageArena {
    type Error;

    /// Reserve `page_count` contiguous pages and return their base. The
    /// loader tags these with the private kernel-image memory type so
    /// later memory-map scans can recognize them. Content is *not*
    /// assumed zeroed.
    fn reserve(&mut self, page_count: u64) -> Result<NonNull<u8>, Self::Error>;
}

/// A fully placed image, ready for the handoff.
#[derive(Debug, Clone, Copy)]
pub struct LoadedImage {
    /// Physical base the image was placed at.
    pub base: PhysicalAddress,
    /// Pages reserved at `base`.
    pub page_count: u64,
    /// Physical entry point: `base + (e_entry - image_begin)`.
    pub entry: PhysicalAddress,
    /// The virtual-address union the offsets were derived from.
    pub placement: ImagePlacement,
}

/// Load an ELF64 image: header → program headers → placement → one page
/// reservation → zero → per-segment copy → entry resolution.
///
/// The magic check happens before the arena is touched; a malformed image
/// never allocates. Bytes between segments and `[filesz, memsz)` tails
/// read as zero afterwards because the whole reservation is cleared
/// first; firmware does not guarantee zeroed allocations.
///
/// # Errors
/// Everything is fatal; see [`ImageError`].
pub fn load_image<S, A, E>(source: &mut S, arena: &mut A) -> Result<LoadedImage, ImageError<E>>
where
    S: ImageSource<Error = E>,
    A: ImageArena<Error = E>,
{
    // Fixed-size header first; nothing else is trusted before this.
    let mut ehdr = [0u8; EHDR_LEN];
    source.read_at(0, &mut ehdr).map_err(ImageError::Read)?;
    let header = parse_header(&ehdr)?;

    // Program-header table, separately allocated at the declared geometry.
    let table_len = usize::from(header.phnum) * usize::from(header.phentsize);
    let mut table = vec![0u8; table_len];
    source
        .read_at(header.phoff, &mut table)
        .map_err(ImageError::Read)?;
    let segments = parse_load_segments(&header, &table)?;

    let placement = ImagePlacement::of_segments(&segments)?;
    let image_len =
        usize::try_from(placement.byte_len()).map_err(|_| ImageError::AddressArithmetic)?;

    let base = arena
        .reserve(placement.page_count())
        .map_err(ImageError::Reserve)?;

    // SAFETY: the arena handed out `page_count` pages at `base`, and
    // `image_len <= page_count * PAGE_SIZE` by construction of the
    // placement.
    unsafe {
        ptr::write_bytes(base.as_ptr(), 0, image_len);
    }

    for seg in &segments {
        if seg.filesz == 0 {
            continue;
        }
        let in_image =
            usize::try_from(placement.offset_of(seg.vaddr)).map_err(|_| ImageError::AddressArithmetic)?;
        let filesz = usize::try_from(seg.filesz).map_err(|_| ImageError::AddressArithmetic)?;

        // SAFETY: `in_image + filesz` stays inside the reservation: the
        // placement union covers every segment's `[vaddr, vaddr + memsz)`
        // and `filesz <= memsz` for well-formed images.
        let dst = unsafe { slice::from_raw_parts_mut(base.as_ptr().add(in_image), filesz) };
        source.read_at(seg.offset, dst).map_err(ImageError::Read)?;
        // `[filesz, memsz)` stays zero from the blanket clear above.
    }

    let entry_offset = header
        .entry
        .checked_sub(placement.begin)
        .ok_or(ImageError::AddressArithmetic)?;
    let entry = PhysicalAddress::from_nonnull(base) + entry_offset;

    info!(
        "image loaded: {} pages at {}, entry {}",
        placement.page_count(),
        PhysicalAddress::from_nonnull(base),
        entry
    );

    Ok(LoadedImage {
        base: PhysicalAddress::from_nonnull(base),
        page_count: placement.page_count(),
        entry,
        placement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec::Vec;

    const PHOFF: usize = 64;
    const PHENTSIZE: usize = 56;

    struct SegSpec {
        vaddr: u64,
        align: u64,
        memsz: u64,
        data: Vec<u8>,
        flags: u32,
    }

    fn put(bytes: &mut [u8], off: usize, value: u64, len: usize) {
        bytes[off..off + len].copy_from_slice(&value.to_le_bytes()[..len]);
    }

    /// Assemble a minimal valid ELF64 executable image.
    fn build_elf(entry: u64, segs: &[SegSpec]) -> Vec<u8> {
        let mut file = vec![0u8; PHOFF + segs.len() * PHENTSIZE];

        file[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        file[4] = 2; // ELF64
        file[5] = 1; // little-endian
        file[6] = 1; // version
        put(&mut file, 16, 2, 2); // e_type = EXEC
        put(&mut file, 18, 62, 2); // e_machine = x86-64
        put(&mut file, 20, 1, 4); // e_version
        put(&mut file, 24, entry, 8);
        put(&mut file, 32, PHOFF as u64, 8);
        put(&mut file, 52, 64, 2); // e_ehsize
        put(&mut file, 54, PHENTSIZE as u64, 2);
        put(&mut file, 56, segs.len() as u64, 2);

        for (i, seg) in segs.iter().enumerate() {
            let offset = file.len() as u64;
            let ph = PHOFF + i * PHENTSIZE;
            put(&mut file, ph, 1, 4); // PT_LOAD
            put(&mut file, ph + 4, u64::from(seg.flags), 4);
            put(&mut file, ph + 8, offset, 8);
            put(&mut file, ph + 16, seg.vaddr, 8);
            put(&mut file, ph + 24, seg.vaddr, 8); // paddr, unused
            put(&mut file, ph + 32, seg.data.len() as u64, 8);
            put(&mut file, ph + 40, seg.memsz, 8);
            put(&mut file, ph + 48, seg.align, 8);
            file.extend_from_slice(&seg.data);
        }
        file
    }

    struct VecSource(Vec<u8>);

    impl ImageSource for VecSource {
        type Error = &'static str;

        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), &'static str> {
            let off = usize::try_from(offset).map_err(|_| "offset out of range")?;
            let src = self
                .0
                .get(off..off + buf.len())
                .ok_or("read past end of file")?;
            buf.copy_from_slice(src);
            Ok(())
        }
    }

    /// Hands out deliberately dirty buffers so the zeroing is observable.
    struct TestArena {
        backing: Vec<Box<[u8]>>,
        reserve_calls: usize,
    }

    impl TestArena {
        fn new() -> Self {
            Self {
                backing: Vec::new(),
                reserve_calls: 0,
            }
        }

        fn image(&self) -> &[u8] {
            &self.backing[0]
        }
    }

    impl ImageArena for TestArena {
        type Error = &'static str;

        fn reserve(&mut self, page_count: u64) -> Result<NonNull<u8>, &'static str> {
            self.reserve_calls += 1;
            let mut buf = vec![0xCCu8; usize::try_from(page_count * 4096).unwrap()].into_boxed_slice();
            let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
            self.backing.push(buf);
            Ok(ptr)
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn two_segment_image_loads_end_to_end() {
        // One R+X segment at 0x1000 spanning 0x2000 bytes, one R+W segment
        // at 0x4000 with a 0x10-byte payload and a 0x1000-byte footprint.
        let text = pattern(0x2000);
        let data: Vec<u8> = (0..0x10u8).collect();
        let file = build_elf(
            0x1008,
            &[
                SegSpec {
                    vaddr: 0x1000,
                    align: 0x1000,
                    memsz: 0x2000,
                    data: text.clone(),
                    flags: 0b101, // R+X
                },
                SegSpec {
                    vaddr: 0x4000,
                    align: 0x1000,
                    memsz: 0x1000,
                    data: data.clone(),
                    flags: 0b110, // R+W
                },
            ],
        );

        let mut source = VecSource(file);
        let mut arena = TestArena::new();
        let loaded = load_image(&mut source, &mut arena).unwrap();

        // Four pages of physical footprint.
        assert_eq!(loaded.placement.begin, 0x1000);
        assert_eq!(loaded.placement.end, 0x5000);
        assert_eq!(loaded.page_count, 4);

        // Entry 0x1008 resolves to load base + 0x8.
        assert_eq!(loaded.entry.as_u64(), loaded.base.as_u64() + 0x8);

        let image = arena.image();
        assert_eq!(image.len(), 0x4000);

        // Segment payloads land at vaddr - image_begin.
        assert_eq!(&image[0x0000..0x2000], &text[..]);
        assert_eq!(&image[0x3000..0x3010], &data[..]);

        // The gap between the segments and the memsz tail read as zero,
        // even though the arena handed out dirty pages.
        assert!(image[0x2000..0x3000].iter().all(|&b| b == 0));
        assert!(image[0x3010..0x4000].iter().all(|&b| b == 0));
    }

    #[test]
    fn segment_bytes_match_the_file_bytes() {
        let payload = pattern(0x321);
        let file = build_elf(
            0x7000,
            &[SegSpec {
                vaddr: 0x7000,
                align: 0x1000,
                memsz: 0x1000,
                data: payload.clone(),
                flags: 0b101,
            }],
        );
        // The payload lives at this file offset by construction.
        let payload_offset = PHOFF + PHENTSIZE;
        assert_eq!(&file[payload_offset..payload_offset + 0x321], &payload[..]);

        let mut arena = TestArena::new();
        let loaded = load_image(&mut VecSource(file), &mut arena).unwrap();
        assert_eq!(loaded.page_count, 1);
        assert_eq!(&arena.image()[0..0x321], &payload[..]);
    }

    #[test]
    fn bad_magic_aborts_before_any_reservation() {
        let mut file = build_elf(
            0x1000,
            &[SegSpec {
                vaddr: 0x1000,
                align: 0x1000,
                memsz: 0x1000,
                data: pattern(16),
                flags: 0b101,
            }],
        );
        file[1] = b'X'; // first byte 0x7F, second byte wrong

        let mut arena = TestArena::new();
        let result = load_image(&mut VecSource(file), &mut arena);
        assert!(matches!(result, Err(ImageError::BadMagic)));
        assert_eq!(arena.reserve_calls, 0, "allocation before validation");
    }

    #[test]
    fn truncated_file_is_a_fatal_read_error() {
        let mut file = build_elf(
            0x1000,
            &[SegSpec {
                vaddr: 0x1000,
                align: 0x1000,
                memsz: 0x1000,
                data: pattern(64),
                flags: 0b101,
            }],
        );
        file.truncate(file.len() - 32);

        let mut arena = TestArena::new();
        let result = load_image(&mut VecSource(file), &mut arena);
        assert!(matches!(result, Err(ImageError::Read("read past end of file"))));
    }

    #[test]
    fn image_without_loadable_segments_is_rejected() {
        let file = build_elf(0x1000, &[]);
        let mut arena = TestArena::new();
        let result = load_image(&mut VecSource(file), &mut arena);
        assert!(matches!(result, Err(ImageError::NoLoadableSegments)));
        assert_eq!(arena.reserve_calls, 0);
    }
}
