//! # Interrupt-Gate Descriptor Encoding
//!
//! Bit-level layout of one IA-32 interrupt descriptor table entry. Each
//! entry is a 64-bit interrupt gate:
//!
//! ```text
//! Bits    Field
//! ─────────────────────────────────────
//! 0-15    Routine offset, low half
//! 16-31   Code segment selector
//! 32-39   Reserved (zero)
//! 40-47   Attributes: P | DPL | type
//! 48-63   Routine offset, high half
//! ```
//!
//! The installer in [`super::idt`] selects the slot; this module owns the
//! bit pattern that goes into it.

use core::ptr;

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Code segment selector the gates dispatch through (kernel flat code
/// segment, GDT entry 1).
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// Requested privilege level of a gate descriptor
///
/// Hardware interrupts and exceptions use [`Dpl::Kernel`]; gates reachable
/// from user-mode software interrupts use [`Dpl::User`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Dpl {
    /// Ring 0, the most privileged level
    Kernel = 0,
    /// Ring 3, reachable from user mode
    User   = 3,
}

bitflags! {
    /// Attribute byte of a gate descriptor (bits 40-47 of the entry)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GateAttributes: u8 {
        /// Segment-present flag
        const PRESENT           = 1 << 7;
        /// 32-bit interrupt gate (interrupts masked on entry)
        const TYPE_INTERRUPT_32 = 0x0E;
    }
}

impl GateAttributes {
    /// Attribute byte for a present 32-bit interrupt gate at `dpl`
    ///
    /// The DPL field occupies bits 5-6 of the attribute byte.
    #[inline]
    pub const fn interrupt(dpl: Dpl) -> Self {
        Self::from_bits_retain(
            Self::PRESENT.bits() | Self::TYPE_INTERRUPT_32.bits() | ((dpl as u8) << 5),
        )
    }
}

// The canonical attribute bytes; a change here is a change to the gate
// format itself.
const_assert_eq!(GateAttributes::interrupt(Dpl::Kernel).bits(), 0x8E);
const_assert_eq!(GateAttributes::interrupt(Dpl::User).bits(), 0xEE);

/// Encode an interrupt gate dispatching to `routine` at privilege `dpl`
#[inline]
pub const fn interrupt_gate(routine: u32, selector: u16, dpl: Dpl) -> u64 {
    let offset_low = (routine & 0xFFFF) as u64;
    let offset_high = (routine >> 16) as u64;
    let attributes = GateAttributes::interrupt(dpl).bits() as u64;

    (offset_high << 48) | (attributes << 40) | ((selector as u64) << 16) | offset_low
}

/// Write an encoded gate into a descriptor-table slot
///
/// The write makes no alignment assumption about `slot`.
///
/// # Safety
///
/// `slot` must point to 8 writable bytes inside a descriptor table.
#[inline]
pub unsafe fn write_gate(slot: *mut u64, gate: u64) {
    // SAFETY: caller guarantees `slot` addresses a writable entry.
    unsafe {
        ptr::write_unaligned(slot, gate);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_bytes() {
        assert_eq!(GateAttributes::interrupt(Dpl::Kernel).bits(), 0x8E);
        assert_eq!(GateAttributes::interrupt(Dpl::User).bits(), 0xEE);
    }

    #[test]
    fn test_offset_split() {
        let gate = interrupt_gate(0xDEAD_BEEF, KERNEL_CODE_SELECTOR, Dpl::Kernel);

        assert_eq!(gate & 0xFFFF, 0xBEEF);
        assert_eq!(gate >> 48, 0xDEAD);
    }

    #[test]
    fn test_selector_and_reserved_fields() {
        let gate = interrupt_gate(0x1234_5678, 0x08, Dpl::Kernel);

        assert_eq!((gate >> 16) & 0xFFFF, 0x08);
        // Bits 32-39 are reserved and must stay zero.
        assert_eq!((gate >> 32) & 0xFF, 0);
        assert_eq!((gate >> 40) & 0xFF, 0x8E);
    }

    #[test]
    fn test_write_gate_is_alignment_agnostic() {
        let mut backing = [0u8; 16];
        let gate = interrupt_gate(0xCAFE_F00D, KERNEL_CODE_SELECTOR, Dpl::User);

        // Deliberately misaligned destination.
        let slot = unsafe { backing.as_mut_ptr().add(1) } as *mut u64;
        unsafe { write_gate(slot, gate) };

        assert_eq!(u64::from_le_bytes(backing[1..9].try_into().unwrap()), gate);
    }
}
