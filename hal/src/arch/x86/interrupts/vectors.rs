//! # Interrupt-Vector Allocation
//!
//! Tracks which interrupt vectors are free and hands them out by priority.
//!
//! One 32-bit bitmap word covers the vectors of two adjacent priority
//! levels: the even level owns the low half of the word and allocates
//! upward from the least significant bit, the odd level owns the high half
//! and allocates downward from the most significant bit. Within a priority
//! level a higher vector number is a higher priority, so the downward scan
//! hands the odd level its best vector first while the even level grows
//! toward its own ceiling.
//!
//! Interrupt controllers on this target prioritize on a per-vector basis
//! (the local APIC's IRR/ISR are a bit per vector), which is what makes the
//! `priority = vector / 16` mapping meaningful.
//!
//! ## Validation and the unchecked hazard
//!
//! Whether exhaustion and range errors are detected is a property of the
//! bitmap ([`CheckMode`]), defaulted from the build profile: debug builds
//! check, release builds do not. An unchecked scan of an exhausted bucket
//! inherits the historical behavior of this subsystem: the 1-based
//! bit-scan convention returns 0 for an empty word, the unchecked
//! decrement wraps, and the caller receives the junk vector one below the
//! bucket base while bit 31 of the bucket word is cleared. That weak
//! release-mode contract is deliberate (the checks are a size/latency
//! trade-off) and is pinned by a test rather than silently strengthened.

use core::fmt;

use crate::arch::x86::core::InterruptLock;

use super::NUM_VECTORS;

/// Bitmap words needed to cover the vector range
const VECTOR_WORDS: usize = (NUM_VECTORS + 31) / 32;

// =============================================================================
// Errors
// =============================================================================

/// Vector allocation failures, detected in [`CheckMode::Checked`] only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorError {
    /// The requested priority maps to vectors beyond the configured table
    PriorityOutOfRange,
    /// Every vector of the requested priority level is allocated
    NoVectorAvailable,
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriorityOutOfRange => {
                write!(f, "priority maps beyond the configured vector table")
            },
            Self::NoVectorAvailable => {
                write!(f, "no free vector in the requested priority level")
            },
        }
    }
}

// =============================================================================
// Check Mode
// =============================================================================

/// Whether allocation validates its inputs and scan results
///
/// A runtime-consultable flag rather than two compiled code paths, so both
/// contracts stay testable from one implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Detect `PriorityOutOfRange` and `NoVectorAvailable`
    Checked,
    /// Assume success; exhausted or out-of-range requests yield undefined
    /// vector selection (see the module docs)
    Unchecked,
}

impl CheckMode {
    /// The mode matching the build profile: checked when debug assertions
    /// are compiled in
    #[inline]
    pub const fn default_for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }

    #[inline]
    const fn is_checked(self) -> bool {
        matches!(self, Self::Checked)
    }
}

// =============================================================================
// Bit Scans
// =============================================================================

/// 1-based position of the least significant set bit, 0 if none
#[inline]
const fn find_first_set(word: u32) -> u32 {
    if word == 0 {
        0
    } else {
        word.trailing_zeros() + 1
    }
}

/// 1-based position of the most significant set bit, 0 if none
#[inline]
const fn find_last_set(word: u32) -> u32 {
    if word == 0 {
        0
    } else {
        32 - word.leading_zeros()
    }
}

// =============================================================================
// Vector Bitmap
// =============================================================================

/// Free/allocated state of every interrupt vector, one bit per vector
/// (1 = free)
///
/// The struct itself is not synchronized; the process-wide instance behind
/// [`allocate_vector`] and friends lives under an [`InterruptLock`] so a
/// preempting interrupt handler can never observe a torn update.
#[derive(Debug, Clone)]
pub struct VectorBitmap {
    words: [u32; VECTOR_WORDS],
    checks: CheckMode,
}

impl VectorBitmap {
    /// A fully-free bitmap with the build-profile [`CheckMode`]
    ///
    /// Boot code is expected to [`mark_allocated`](Self::mark_allocated)
    /// the architecture-reserved vectors before the first allocation.
    pub const fn new() -> Self {
        Self::with_check_mode(CheckMode::default_for_build())
    }

    /// A fully-free bitmap with an explicit [`CheckMode`]
    pub const fn with_check_mode(checks: CheckMode) -> Self {
        Self {
            words: [u32::MAX; VECTOR_WORDS],
            checks,
        }
    }

    /// Allocate a free vector satisfying `priority`
    ///
    /// Scans the bitmap word shared by `priority` and its partner level:
    /// from the least significant bit for an even priority, from the most
    /// significant bit for an odd one. The found bit is cleared and
    /// `word_index * 32 + bit` returned.
    ///
    /// In [`CheckMode::Unchecked`] the error cases go undetected: an
    /// exhausted bucket yields the junk vector described in the module
    /// docs, and a priority mapping outside the table indexes outside the
    /// bitmap (which panics rather than corrupting neighbouring state).
    pub fn allocate(&mut self, priority: u32) -> Result<u32, VectorError> {
        if self.checks.is_checked() && (priority as u64) * 16 + 15 >= NUM_VECTORS as u64 {
            return Err(VectorError::PriorityOutOfRange);
        }

        let entry = (priority >> 1) as usize;
        let word = self.words[entry];

        let set_bit = if priority % 2 == 0 {
            find_first_set(word)
        } else {
            find_last_set(word)
        };

        if self.checks.is_checked() {
            // The even level owns bit positions 1..=16, the odd level
            // 17..=32; a scan landing outside the requester's half (or
            // finding nothing) means the level is exhausted.
            let exhausted = if priority % 2 == 0 {
                set_bit == 0 || set_bit > 16
            } else {
                set_bit < 17
            };
            if exhausted {
                return Err(VectorError::NoVectorAvailable);
            }
        }

        // Back from the 1-based scan convention. Unchecked mode wraps on
        // an empty word; the shift and add below wrap with it, preserving
        // the documented junk result instead of halting a release kernel.
        let bit = set_bit.wrapping_sub(1);
        self.words[entry] &= !1u32.wrapping_shl(bit);

        Ok(((entry as u32) << 5).wrapping_add(bit))
    }

    /// Mark `vector` allocated, regardless of how it was assigned
    ///
    /// Idempotent. Used to reserve vectors assigned by means other than
    /// [`allocate`](Self::allocate), such as the architecture-reserved
    /// exception range.
    pub fn mark_allocated(&mut self, vector: u32) {
        self.words[vector as usize / 32] &= !(1 << (vector % 32));
    }

    /// Mark `vector` free for future allocation
    ///
    /// Idempotent.
    pub fn mark_free(&mut self, vector: u32) {
        self.words[vector as usize / 32] |= 1 << (vector % 32);
    }

    /// Whether `vector` is currently free
    #[inline]
    pub fn is_free(&self, vector: u32) -> bool {
        self.words[vector as usize / 32] & (1 << (vector % 32)) != 0
    }
}

impl Default for VectorBitmap {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Process-Wide Pool
// =============================================================================

/// The process-wide vector pool
///
/// Lives for the process lifetime; every access is a short, interrupt-
/// masked read-modify-write of a single word.
static VECTOR_POOL: InterruptLock<VectorBitmap> = InterruptLock::new(VectorBitmap::new());

/// Allocate a vector satisfying `priority` from the process-wide pool
pub fn allocate_vector(priority: u32) -> Result<u32, VectorError> {
    VECTOR_POOL.lock().allocate(priority)
}

/// Mark `vector` allocated in the process-wide pool
pub fn reserve_vector(vector: u32) {
    VECTOR_POOL.lock().mark_allocated(vector);
}

/// Mark `vector` free in the process-wide pool
pub fn release_vector(vector: u32) {
    VECTOR_POOL.lock().mark_free(vector);
}

// =============================================================================
// Tests
// =============================================================================
