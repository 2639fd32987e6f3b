//! # IA-32 Interrupt-Vector Management
//!
//! Allocation of interrupt vectors by priority, synthesis of the dispatch
//! stubs that bridge hardware interrupt delivery to C-callable handlers,
//! and installation of those stubs into the interrupt descriptor table.
//!
//! ## Vector Layout
//!
//! ```text
//! Vector Range   Purpose                      Notes
//! ──────────────────────────────────────────────────────────────
//! 0x00-0x1F      CPU Exceptions               IA-32 reserved; boot code
//!                                             reserves them in the bitmap
//! 0x20-0xFF      Allocatable interrupts       16 vectors per priority level
//! ```
//!
//! Priorities map onto the table as `vector = priority * 16 + n`,
//! `n in 0..16`. Within one priority level a higher vector number is a
//! higher priority, so user interrupt priorities range from 2 to 15 once
//! the reserved exception range is accounted for.
//!
//! ## Startup sequencing
//!
//! The allocator and installer are ready as soon as the process starts, but
//! boot code must, in order and before the first interrupt can fire:
//!
//! 1. call [`idt::init`] with the table location handed over by the
//!    boot/link environment,
//! 2. reserve the architecture-reserved range with [`vectors::reserve_vector`]
//!    for vectors `0..RESERVED_VECTORS`.

pub mod entries;
pub mod idt;
pub mod stub;
pub mod vectors;

pub use entries::{interrupt_gate, Dpl, GateAttributes, KERNEL_CODE_SELECTOR};
pub use idt::{install_descriptor, IdtConfig, ENTRY_SIZE};
pub use stub::{InterruptStub, StubBuilder, STUB_CAPACITY};
pub use vectors::{
    allocate_vector, release_vector, reserve_vector, CheckMode, VectorBitmap, VectorError,
};

// =============================================================================
// Constants
// =============================================================================

/// Number of interrupt descriptor table entries
pub const NUM_VECTORS: usize = 256;

/// Vectors `0..RESERVED_VECTORS` are reserved by the IA-32 architecture for
/// CPU exceptions and are never handed out by the allocator once boot code
/// has marked them allocated.
pub const RESERVED_VECTORS: usize = 32;

/// Vectors per priority level
pub const VECTORS_PER_PRIORITY: usize = 16;
