//! Image placement: the alignment-rounded union of the loadable segments.

use crate::{ImageError, parser::LoadSegment};
use kernel_addresses::{PAGE_SIZE, align_down, align_up};

/// Derived placement of an image in memory: `[begin, end)` covers every
/// loadable segment after rounding each one to its own alignment.
///
/// Segments are not assumed to share one global alignment: the start is
/// masked down by each segment's alignment and the end rounded up by it,
/// and the tightest union over all segments is kept.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ImagePlacement {
    /// Lowest aligned virtual address of any loadable segment.
    pub begin: u64,
    /// Highest aligned end address of any loadable segment.
    pub end: u64,
}

impl ImagePlacement {
    /// Compute the union over the loadable segments.
    ///
    /// # Errors
    /// - [`ImageError::NoLoadableSegments`] for an empty set.
    /// - [`ImageError::BadAlignment`] if a segment alignment is not a
    ///   power of two (zero counts as "no alignment" and is treated as 1).
    /// - [`ImageError::AddressArithmetic`] if a segment end overflows.
    pub fn of_segments<E>(segments: &[LoadSegment]) -> Result<Self, ImageError<E>> {
        let mut begin = u64::MAX;
        let mut end = 0u64;
        let mut any = false;

        for seg in segments {
            let align = seg.align.max(1);
            if !align.is_power_of_two() {
                return Err(ImageError::BadAlignment);
            }

            let seg_begin = align_down(seg.vaddr, align);
            let seg_end = seg
                .vaddr
                .checked_add(seg.memsz)
                .ok_or(ImageError::AddressArithmetic)?;
            let seg_end = align_up(seg_end, align);

            begin = begin.min(seg_begin);
            end = end.max(seg_end);
            any = true;
        }

        if !any {
            return Err(ImageError::NoLoadableSegments);
        }
        Ok(Self { begin, end })
    }

    #[must_use]
    pub const fn byte_len(&self) -> u64 {
        self.end - self.begin
    }

    /// Contiguous pages needed to hold the image.
    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.byte_len() / PAGE_SIZE
    }

    /// Offset of a segment virtual address from the image start.
    #[must_use]
    pub const fn offset_of(&self, vaddr: u64) -> u64 {
        vaddr - self.begin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SegmentFlags;

    fn seg(vaddr: u64, memsz: u64, align: u64) -> LoadSegment {
        LoadSegment {
            vaddr,
            offset: 0,
            filesz: memsz,
            memsz,
            align,
            flags: SegmentFlags::new().with_read(true),
        }
    }

    #[test]
    fn union_uses_each_segments_own_alignment() {
        let segments = [
            // Masked down to 0x1000, rounded up to 0x3000.
            seg(0x1800, 0x1000, 0x1000),
            // Different alignment: masked to 0x4000, up to 0x8000.
            seg(0x5000, 0x2000, 0x4000),
        ];
        let p = ImagePlacement::of_segments::<()>(&segments).unwrap();
        assert_eq!(p.begin, 0x1000);
        assert_eq!(p.end, 0x8000);
        assert_eq!(p.byte_len(), 0x7000);
        assert!(p.end > p.begin);
    }

    #[test]
    fn single_segment_bounds() {
        let p = ImagePlacement::of_segments::<()>(&[seg(0x40_1234, 0x100, 0x1000)]).unwrap();
        assert_eq!(p.begin, 0x40_1000);
        assert_eq!(p.end, 0x40_2000);
        assert_eq!(p.page_count(), 1);
    }

    #[test]
    fn empty_set_is_rejected() {
        let result = ImagePlacement::of_segments::<()>(&[]);
        assert!(matches!(result, Err(ImageError::NoLoadableSegments)));
    }

    #[test]
    fn non_power_of_two_alignment_is_rejected() {
        let result = ImagePlacement::of_segments::<()>(&[seg(0x1000, 0x100, 0x3000)]);
        assert!(matches!(result, Err(ImageError::BadAlignment)));
    }

    #[test]
    fn zero_alignment_means_byte_alignment() {
        let p = ImagePlacement::of_segments::<()>(&[seg(0x1001, 0xFF, 0)]).unwrap();
        assert_eq!(p.begin, 0x1001);
        assert_eq!(p.end, 0x1100);
    }
}
