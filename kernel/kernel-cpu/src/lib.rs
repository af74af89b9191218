//! # Privilege-Segment State (GDT / TSS)
//!
//! The descriptor tables the kernel must own before the firmware's can be
//! trusted no further: a statically laid-out GDT with kernel, user, and
//! firmware-compatibility segments, and the zero-initialized 64-bit TSS
//! its two-slot system descriptor points at.
//!
//! Construction is plain data manipulation and runs anywhere, including
//! host tests; the single privileged step ([`gdt::CpuTables::install`])
//! is isolated and irreversible.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod gdt;
pub mod tss;
