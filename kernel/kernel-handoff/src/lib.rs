//! # Loader → Kernel Handoff Contract
//!
//! The one-way, one-shot data contract between the UEFI loader and the
//! kernel entry point, plus read-only views over the raw firmware memory
//! map it carries.
//!
//! The [`boot::LoaderHandoff`] record is assembled by the loader while boot
//! services are still available, leaked into memory that survives
//! `ExitBootServices`, and from then on only ever read by the kernel. There
//! is no return path and no second handoff.
//!
//! ## ABI
//!
//! Everything crossing the boundary is `#[repr(C)]` with fixed-size
//! integers. The loader is a PE/COFF application running under the
//! Microsoft x64 calling convention; the kernel uses System V. The single
//! place where that discontinuity is crossed is the typed
//! [`boot::KernelEntryFn`] pointer, never an implicit cast.

#![cfg_attr(not(any(test, doctest)), no_std)]

#[cfg(feature = "acquire")]
extern crate alloc;

pub mod boot;
pub mod mmap;

#[cfg(feature = "acquire")]
pub mod acquire;
