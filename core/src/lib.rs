//! # Corten Kernel Core
//!
//! The kernel-facing orchestration layer over `corten-hal`. This repository
//! slice carries the interrupt-connection service: boards describe how an
//! IRQ reaches the CPU, drivers hand over a C-callable handler, and this
//! crate welds the two together by allocating a vector, synthesizing the
//! dispatch stub and installing it into the descriptor table.
//!
//! ## Philosophy
//!
//! The core is **policy-free** about boards: everything board-specific
//! (interrupt-controller programming, callout routines, the IRQ-to-vector
//! decision) enters through the [`interrupts::BoardInterrupts`] contract
//! registered at boot.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod interrupts;
