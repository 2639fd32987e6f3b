//! # Interrupt Connection Service
//!
//! Connects C-callable interrupt handlers to virtualized IRQ lines.
//!
//! ## Connection Flow
//!
//! ```text
//!   driver ──connect_interrupt(irq, priority, handler, parameter, stub)──┐
//!                                                                        │
//!   board support ◄── allocate_for_irq ──────────────────────────────────┤
//!     │  vector + begin/end-of-interrupt callouts                        │
//!     ▼                                                                  │
//!   stub synthesis (corten-hal StubBuilder)                              │
//!     │  enter → [BOI] → handler → [EOI] → cleanup → exit                │
//!     ▼                                                                  │
//!   descriptor install (corten-hal IdtConfig) ── vector ─────────────────┘
//! ```
//!
//! When the connected device asserts its interrupt, the synthesized stub
//! runs: the kernel's interrupt-enter routine saves the preempted context,
//! the callouts and handler execute with their parameters, and the
//! interrupt-exit routine resumes or reschedules. A connection is one-shot
//! per stub buffer; connecting the same buffer from two contexts at once is
//! a usage error, while concurrent connections with distinct buffers are
//! fine.

mod board;

pub use board::{BoardInterrupts, Callout, IrqAssignment, IsrRoutine};

// Re-exported so the kernel-facing surface carries the full vector API.
pub use corten_hal::interrupts::{
    allocate_vector, install_descriptor, release_vector, reserve_vector, VectorError,
};

use core::ffi::c_void;
use core::fmt;

use corten_hal::interrupts::{Dpl, IdtConfig, InterruptStub, StubBuilder};
use spin::Once;

// =============================================================================
// Dispatcher
// =============================================================================

/// Addresses of the kernel's fixed interrupt-entry and interrupt-exit
/// routines
///
/// Both live in the kernel's assembly entry code; the boot environment
/// hands their addresses over at [`init`] time. Every synthesized stub
/// calls `enter` first and leaves through `exit`.
#[derive(Debug, Clone, Copy)]
pub struct Trampolines {
    /// Context-save routine every stub calls first
    pub enter: usize,
    /// Context-restore/reschedule routine every stub jumps to last
    pub exit: usize,
}

/// The interrupt connection service
///
/// Owns the injected collaborators a connection needs: the board contract,
/// the descriptor-table location and the enter/exit trampolines. One
/// process-wide instance is registered via [`init`]; tests construct their
/// own against fakes.
pub struct IrqDispatcher<'a> {
    board: &'a dyn BoardInterrupts,
    idt: IdtConfig,
    trampolines: Trampolines,
}

impl<'a> IrqDispatcher<'a> {
    /// A dispatcher over the given collaborators
    pub fn new(board: &'a dyn BoardInterrupts, idt: IdtConfig, trampolines: Trampolines) -> Self {
        Self {
            board,
            idt,
            trampolines,
        }
    }

    /// Connect `routine` to the virtualized `irq` at `priority`
    ///
    /// Asks the board for a vector and its callout metadata, synthesizes
    /// the dispatch stub into `stub`, and only then installs the stub into
    /// the allocated vector at the most privileged level; the descriptor
    /// never points at a half-built stub. Returns the vector.
    ///
    /// The handler runs with interrupts masked, on the interrupt stack,
    /// after the kernel has saved the preempted context; it receives
    /// `parameter` as its only argument.
    ///
    /// # Safety
    ///
    /// - `stub` must outlive the installed vector (not stack-scoped), and
    ///   must not be connected concurrently from another context;
    /// - the dispatcher's `IdtConfig` must describe the live, writable
    ///   descriptor table covering the vectors the board allocates;
    /// - the trampoline addresses and every routine the board reports must
    ///   stay valid dispatch targets while the vector is installed.
    pub unsafe fn connect(
        &self,
        irq: u32,
        priority: u32,
        routine: IsrRoutine,
        parameter: *mut c_void,
        stub: &mut InterruptStub,
    ) -> Result<u32, VectorError> {
        let assignment = self.board.allocate_for_irq(irq, priority)?;

        let mut code = StubBuilder::new(stub);
        code.call(self.trampolines.enter as u32);

        if let Some(begin) = assignment.begin {
            if begin.needs_parameter {
                code.push(begin.parameter as u32);
            }
            code.call(begin.routine as usize as u32);
        }

        // Handler parameter and call are always present.
        code.push(parameter as u32);
        code.call(routine as usize as u32);

        if let Some(end) = assignment.end {
            if end.needs_parameter {
                code.push(end.parameter as u32);
            }
            code.call(end.routine as usize as u32);
        }

        code.pop_parameters();
        code.jump(self.trampolines.exit as u32);
        let length = code.finish();

        // SAFETY: table liveness forwarded from the caller contract; the
        // stub is fully synthesized before the vector goes live.
        unsafe {
            self.idt
                .install(assignment.vector, stub.entry_address(), Dpl::Kernel);
        }

        log::trace!(
            "IRQ: irq {} -> vector {}, {}-byte stub at {:#010x}",
            irq,
            assignment.vector,
            length,
            stub.entry_address()
        );

        Ok(assignment.vector)
    }
}

impl fmt::Debug for IrqDispatcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqDispatcher")
            .field("idt", &self.idt)
            .field("trampolines", &self.trampolines)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Process-Wide Service
// =============================================================================

/// The registered connection service
static DISPATCHER: Once<IrqDispatcher<'static>> = Once::new();

/// Register the board, descriptor table and trampolines during boot
///
/// Must complete before any interrupt can fire and before the first
/// [`connect_interrupt`] call. Boot code is also expected to reserve the
/// architecture-reserved vector range with [`reserve_vector`] beforehand.
/// Later calls are ignored.
pub fn init(board: &'static dyn BoardInterrupts, idt: IdtConfig, trampolines: Trampolines) {
    corten_hal::interrupts::idt::init(idt);
    DISPATCHER.call_once(|| IrqDispatcher::new(board, idt, trampolines));
    log::debug!(
        "IRQ: connection service ready, enter {:#010x} exit {:#010x}",
        trampolines.enter,
        trampolines.exit
    );
}

/// Connect `routine` to `irq` at `priority` through the registered service
///
/// # Safety
///
/// [`init`] must have run; see [`IrqDispatcher::connect`] for the rest of
/// the contract.
pub unsafe fn connect_interrupt(
    irq: u32,
    priority: u32,
    routine: IsrRoutine,
    parameter: *mut c_void,
    stub: &mut InterruptStub,
) -> Result<u32, VectorError> {
    let dispatcher = DISPATCHER
        .get()
        .expect("connect_interrupt before interrupts::init");

    // SAFETY: forwarded caller contract.
    unsafe { dispatcher.connect(irq, priority, routine, parameter, stub) }
}

// =============================================================================
// Tests
// =============================================================================
