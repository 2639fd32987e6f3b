//! # Board Support Contract
//!
//! The interface a board support package implements so the kernel can
//! connect handlers to its interrupt controllers.

use core::ffi::c_void;

use corten_hal::interrupts::VectorError;

/// A C-callable interrupt routine taking one opaque parameter
pub type IsrRoutine = unsafe extern "C" fn(*mut c_void);

/// One begin- or end-of-interrupt callout
///
/// Callouts acknowledge interrupt-controller state around the main handler.
/// Whether the routine expects its parameter on the stack is the board's
/// call; parameterless controller routines keep the stub two instructions
/// shorter.
#[derive(Debug, Clone, Copy)]
pub struct Callout {
    /// The routine to invoke
    pub routine: IsrRoutine,
    /// Parameter pushed for the routine, when required
    pub parameter: *mut c_void,
    /// Whether `parameter` must be pushed before the call
    pub needs_parameter: bool,
}

/// Everything the board decided for one connected IRQ
#[derive(Debug, Clone, Copy)]
pub struct IrqAssignment {
    /// The allocated interrupt vector
    pub vector: u32,
    /// Begin-of-interrupt callout, invoked before the handler
    pub begin: Option<Callout>,
    /// End-of-interrupt callout, invoked after the handler
    pub end: Option<Callout>,
}

/// Board-side interrupt-controller knowledge
///
/// The `irq` handed to [`allocate_for_irq`](Self::allocate_for_irq) is a
/// virtualized line: boards present IRQs `0..N` across all their interrupt
/// controller devices and own the mapping to physical lines.
///
/// An implementation is expected to:
///
/// 1. allocate a vector satisfying `priority` (normally through
///    [`corten_hal::interrupts::allocate_vector`]),
/// 2. program its interrupt controller so asserting `irq` presents that
///    vector to the CPU,
/// 3. report the begin/end-of-interrupt callouts the controller needs.
///
/// Boards whose controllers fix the vector per line cannot honour
/// `priority`; they return the controller's preassigned vector instead, and
/// the caller's priority request is advisory only.
pub trait BoardInterrupts: Sync {
    /// Allocate and program a vector for `irq` at `priority`
    fn allocate_for_irq(&self, irq: u32, priority: u32) -> Result<IrqAssignment, VectorError>;
}
