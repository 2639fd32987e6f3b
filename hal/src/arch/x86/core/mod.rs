//! # IA-32 Core Module
//!
//! Fundamental CPU control for 32-bit x86: interrupt-flag manipulation and
//! the interrupt-masking lock built on top of it.
//!
//! ## Interrupt-flag control
//!
//! The kernel runs a single flat execution context that hardware interrupts
//! preempt asynchronously, so any state an interrupt handler may touch is
//! protected by masking interrupts for the duration of the access. The
//! save/restore pair is nestable: `restore_interrupts` re-enables only when
//! the flag was set at the matching `disable_interrupts_save`, so a caller
//! that was entered with interrupts already masked leaves them masked.
//!
//! ## Host emulation
//!
//! `cli`/`sti`/`pushfd` are privileged or meaningless off-target, so when
//! not compiling for bare-metal IA-32 the interrupt flag is emulated with
//! an atomic. The nesting contract is identical on both back ends, which is
//! what the unit tests exercise.

use core::fmt;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

use cfg_if::cfg_if;

// =============================================================================
// Interrupt-Flag Control
// =============================================================================

cfg_if! {
    if #[cfg(all(target_arch = "x86", target_os = "none"))] {
        /// EFLAGS.IF: maskable interrupts enabled
        const EFLAGS_IF: u32 = 1 << 9;

        /// Check if maskable interrupts are enabled
        #[inline]
        pub fn interrupts_enabled() -> bool {
            let flags: u32;
            // SAFETY: reading EFLAGS has no side effects.
            unsafe {
                core::arch::asm!(
                    "pushfd",
                    "pop {}",
                    out(reg) flags,
                    options(nomem, preserves_flags),
                );
            }
            flags & EFLAGS_IF != 0
        }

        /// Enable maskable interrupts
        #[inline]
        pub fn enable_interrupts() {
            // SAFETY: `sti` only sets EFLAGS.IF.
            unsafe {
                core::arch::asm!("sti", options(nomem, nostack));
            }
        }

        /// Disable maskable interrupts
        #[inline]
        pub fn disable_interrupts() {
            // SAFETY: `cli` only clears EFLAGS.IF.
            unsafe {
                core::arch::asm!("cli", options(nomem, nostack));
            }
        }
    } else {
        use core::sync::atomic::{AtomicBool, Ordering};

        /// Emulated interrupt flag for non-bare-metal builds (unit tests).
        static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(true);

        /// Check if maskable interrupts are enabled
        #[inline]
        pub fn interrupts_enabled() -> bool {
            INTERRUPT_FLAG.load(Ordering::SeqCst)
        }

        /// Enable maskable interrupts
        #[inline]
        pub fn enable_interrupts() {
            INTERRUPT_FLAG.store(true, Ordering::SeqCst);
        }

        /// Disable maskable interrupts
        #[inline]
        pub fn disable_interrupts() {
            INTERRUPT_FLAG.store(false, Ordering::SeqCst);
        }
    }
}

/// Disable maskable interrupts and return the previous state
#[inline]
pub fn disable_interrupts_save() -> bool {
    let was_enabled = interrupts_enabled();
    disable_interrupts();
    was_enabled
}

/// Restore interrupt state saved by [`disable_interrupts_save`]
///
/// Re-enables only if interrupts were enabled at the matching save, so
/// nested critical sections restore the outermost caller's state.
#[inline]
pub fn restore_interrupts(was_enabled: bool) {
    if was_enabled {
        enable_interrupts();
    }
}

// =============================================================================
// Interrupt-Masking Lock
// =============================================================================

/// Spinlock whose critical section also masks interrupts.
///
/// Guards state that interrupt handlers read or write: the lock first saves
/// and clears EFLAGS.IF, then takes the spin mutex, so the critical section
/// cannot be preempted by a handler that would spin on the same lock from
/// the same CPU. Release order is the exact reverse.
///
/// Critical sections under this lock must stay short (a handful of
/// read-modify-write operations); the interrupt latency of the whole system
/// is bounded by the longest one.
pub struct InterruptLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> InterruptLock<T> {
    /// Create a new lock wrapping `value`
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    /// Mask interrupts and acquire the lock
    pub fn lock(&self) -> InterruptLockGuard<'_, T> {
        let was_enabled = disable_interrupts_save();
        InterruptLockGuard {
            inner: ManuallyDrop::new(self.inner.lock()),
            was_enabled,
        }
    }
}

impl<T> fmt::Debug for InterruptLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptLock").finish_non_exhaustive()
    }
}

/// Guard returned by [`InterruptLock::lock`]
///
/// Dropping the guard releases the spin mutex first, then restores the
/// interrupt state captured at acquisition.
pub struct InterruptLockGuard<'a, T> {
    inner: ManuallyDrop<spin::MutexGuard<'a, T>>,
    was_enabled: bool,
}

impl<T> Deref for InterruptLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for InterruptLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for InterruptLockGuard<'_, T> {
    fn drop(&mut self) {
        // Unlock before unmasking: an interrupt taken between the two steps
        // must not find the lock held.
        // SAFETY: the guard is dropped exactly once, here.
        unsafe {
            ManuallyDrop::drop(&mut self.inner);
        }
        restore_interrupts(self.was_enabled);
    }
}

impl<T> fmt::Debug for InterruptLockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptLockGuard")
            .field("was_enabled", &self.was_enabled)
            .finish_non_exhaustive()
    }
}

/// Serializes tests that touch the process-global emulated interrupt flag.
#[cfg(test)]
pub(crate) static INTERRUPT_FLAG_TEST_LOCK: spin::Mutex<()> = spin::Mutex::new(());

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_flag_nesting_and_lock() {
        let _serial = INTERRUPT_FLAG_TEST_LOCK.lock();

        enable_interrupts();
        assert!(interrupts_enabled());

        // Outer critical section.
        let outer = disable_interrupts_save();
        assert!(outer);
        assert!(!interrupts_enabled());

        // Nested critical section: saves "already disabled".
        let inner = disable_interrupts_save();
        assert!(!inner);
        assert!(!interrupts_enabled());

        // Inner restore must not re-enable.
        restore_interrupts(inner);
        assert!(!interrupts_enabled());

        // Outer restore re-enables.
        restore_interrupts(outer);
        assert!(interrupts_enabled());

        // Scoped lock: masked inside, prior state restored after.
        let lock = InterruptLock::new(7u32);
        {
            let mut guard = lock.lock();
            assert!(!interrupts_enabled());
            *guard += 1;
        }
        assert!(interrupts_enabled());
        assert_eq!(*lock.lock(), 8);
        assert!(interrupts_enabled());
    }
}
