//! # Descriptor-Table Installation
//!
//! Writes single entries of the interrupt descriptor table so that a given
//! vector dispatches to a given routine at a given privilege level.
//!
//! The table itself is owned by the boot/link environment: its base address
//! is fixed before the kernel runs and handed to [`init`] during startup.
//! This module only selects the right 8-byte slot and delegates the bit
//! pattern to [`super::entries`].

use spin::Once;

use super::entries::{self, Dpl, KERNEL_CODE_SELECTOR};

/// Size in bytes of one descriptor-table entry
pub const ENTRY_SIZE: usize = 8;

static_assertions::const_assert_eq!(ENTRY_SIZE, core::mem::size_of::<u64>());

// =============================================================================
// Table Configuration
// =============================================================================

/// Location and extent of the interrupt descriptor table
///
/// Injected rather than discovered so the installer can be pointed at a
/// fake table in tests and at the linker-provided one on hardware.
#[derive(Debug, Clone, Copy)]
pub struct IdtConfig {
    /// Base address of the table
    pub base: usize,
    /// Number of entries the table was sized for
    pub entries: usize,
}

impl IdtConfig {
    /// Describe a table at `base` with `entries` slots
    #[inline]
    pub const fn new(base: usize, entries: usize) -> Self {
        Self { base, entries }
    }

    /// Address of the slot for `vector`
    #[inline]
    pub const fn slot_address(&self, vector: u32) -> usize {
        self.base + vector as usize * ENTRY_SIZE
    }

    /// Install an interrupt gate for `vector` dispatching to `routine`
    ///
    /// `vector` must be below the configured entry count; this primitive
    /// performs no validation (range checking belongs to the callers, which
    /// obtain vectors from the allocator).
    ///
    /// No instruction/data cache synchronization is needed after the write
    /// on this target: IA-32 keeps the caches coherent for self-modifying
    /// and cross-modifying code of this shape.
    ///
    /// # Safety
    ///
    /// `self.base` must be the address of a live, writable descriptor table
    /// covering `vector`, and `routine` must remain a valid dispatch target
    /// for as long as the entry is installed.
    pub unsafe fn install(&self, vector: u32, routine: usize, dpl: Dpl) {
        let slot = self.slot_address(vector) as *mut u64;
        let gate = entries::interrupt_gate(routine as u32, KERNEL_CODE_SELECTOR, dpl);

        // SAFETY: slot math above stays inside the caller-guaranteed table.
        unsafe {
            entries::write_gate(slot, gate);
        }
    }
}

// =============================================================================
// Process-Wide Table
// =============================================================================

/// The boot-supplied descriptor-table location
static IDT_CONFIG: Once<IdtConfig> = Once::new();

/// Record the descriptor-table location handed over by the boot environment
///
/// Must run before any [`install_descriptor`] call; later calls are ignored.
pub fn init(config: IdtConfig) {
    IDT_CONFIG.call_once(|| config);
    log::debug!(
        "IDT: table at {:#010x}, {} entries",
        config.base,
        config.entries
    );
}

/// The recorded descriptor-table location, if [`init`] has run
#[inline]
pub fn config() -> Option<&'static IdtConfig> {
    IDT_CONFIG.get()
}

/// Install an interrupt gate into the process-wide table
///
/// # Safety
///
/// [`init`] must have recorded the live table first; see
/// [`IdtConfig::install`] for the remaining contract.
pub unsafe fn install_descriptor(vector: u32, routine: usize, dpl: Dpl) {
    let config = IDT_CONFIG
        .get()
        .expect("install_descriptor before idt::init");

    // SAFETY: forwarded caller contract.
    unsafe {
        config.install(vector, routine, dpl);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::x86::interrupts::NUM_VECTORS;

    #[test]
    fn test_slot_address_math() {
        let config = IdtConfig::new(0x1000, NUM_VECTORS);

        assert_eq!(config.slot_address(0), 0x1000);
        assert_eq!(config.slot_address(1), 0x1008);
        assert_eq!(config.slot_address(47), 0x1000 + 47 * 8);
    }

    #[test]
    fn test_install_writes_only_the_selected_slot() {
        let mut table = [0u64; 64];
        let config = IdtConfig::new(table.as_mut_ptr() as usize, table.len());

        unsafe { config.install(33, 0x0040_2000, Dpl::Kernel) };

        let expected = entries::interrupt_gate(0x0040_2000, KERNEL_CODE_SELECTOR, Dpl::Kernel);
        for (vector, slot) in table.iter().enumerate() {
            if vector == 33 {
                assert_eq!(*slot, expected);
            } else {
                assert_eq!(*slot, 0, "vector {vector} was touched");
            }
        }
    }

    #[test]
    fn test_global_config_is_recorded_once() {
        static TABLE: [u64; 4] = [0; 4];

        init(IdtConfig::new(TABLE.as_ptr() as usize, TABLE.len()));
        // A second init must not displace the boot-supplied table.
        init(IdtConfig::new(0xDEAD_0000, 1));

        let recorded = config().expect("config recorded");
        assert_eq!(recorded.base, TABLE.as_ptr() as usize);
        assert_eq!(recorded.entries, 4);
    }

    #[test]
    fn test_reinstall_overwrites_in_place() {
        let mut table = [0u64; 8];
        let config = IdtConfig::new(table.as_mut_ptr() as usize, table.len());

        unsafe { config.install(5, 0x1111_1111, Dpl::Kernel) };
        unsafe { config.install(5, 0x2222_2222, Dpl::User) };

        assert_eq!(
            table[5],
            entries::interrupt_gate(0x2222_2222, KERNEL_CODE_SELECTOR, Dpl::User)
        );
    }
}
