//! # ELF64 Image Loading
//!
//! Turns a kernel executable on a firmware-visible volume into a runnable
//! physical memory image: parse the ELF64 header, collect the loadable
//! segments, compute their alignment-rounded union, reserve one contiguous
//! page range, and copy the segments into place.
//!
//! The firmware side is abstracted behind two traits so the whole pipeline
//! runs in host tests:
//!
//! - [`ImageSource`]: a positioned byte-range read (the UEFI file
//!   protocol in the loader, a byte buffer in tests).
//! - [`ImageArena`]: the contiguous page reservation (UEFI
//!   `AllocatePages` with the private kernel memory type in the loader, a
//!   heap buffer in tests).
//!
//! Loading is all-or-nothing: any read, validation, or reservation failure
//! aborts the boot attempt. There is no partial-success state to clean up.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod loader;
mod parser;
mod placement;

pub use loader::{ImageArena, ImageSource, LoadedImage, load_image};
pub use parser::{LoadSegment, SegmentFlags};
pub use placement::ImagePlacement;

/// Errors of the image-loading pipeline.
///
/// `E` is the error type of the firmware seams ([`ImageSource`] /
/// [`ImageArena`]); the loader binary instantiates it with `uefi::Status`.
/// All variants are fatal; the only distinction that matters is between
/// *invalid input* (the image is at fault) and *firmware call* failures
/// (the platform is).
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ImageError<E> {
    /// The 4-byte ELF magic did not match. Detected before any page
    /// allocation happens.
    #[error("not an ELF image (bad magic)")]
    BadMagic,

    /// Magic matched but the image is not little-endian ELF64 for x86-64.
    #[error("unsupported image: not a little-endian x86-64 ELF64")]
    NotElf64,

    /// Program-header geometry is inconsistent with this ELF class.
    #[error("malformed program header table")]
    MalformedProgramHeaders,

    /// The image has no loadable segment; there is nothing to run.
    #[error("image contains no loadable segments")]
    NoLoadableSegments,

    /// A segment alignment was not a power of two.
    #[error("segment alignment is not a power of two")]
    BadAlignment,

    /// Address computation over- or underflowed.
    #[error("segment address arithmetic out of range")]
    AddressArithmetic,

    /// A read from the image source failed.
    #[error("failed to read the image")]
    Read(E),

    /// The page reservation for the image failed.
    #[error("failed to reserve pages for the image")]
    Reserve(E),
}
