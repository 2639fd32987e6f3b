//! # Interrupt-Stub Synthesis
//!
//! Runtime synthesis of the short machine-code sequence an interrupt vector
//! dispatches to. A stub bridges hardware interrupt delivery to a
//! C-callable handler: it announces the interrupt to the kernel, performs
//! the optional begin-of-interrupt callout, invokes the handler with its
//! parameter, performs the optional end-of-interrupt callout, drops the
//! pushed parameters and leaves through the kernel's interrupt-exit path.
//!
//! The fullest stub this module can emit:
//!
//! ```text
//! 0x00  call  <interrupt enter>        E8 rel32
//! 0x05  push  <BOI parameter>          68 imm32
//! 0x0a  call  <BOI routine>            E8 rel32
//! 0x0f  push  <handler parameter>      68 imm32
//! 0x14  call  <handler routine>        E8 rel32
//! 0x19  push  <EOI parameter>          68 imm32
//! 0x1e  call  <EOI routine>            E8 rel32
//! 0x23  add   esp, 4 * pushed          83 C4 imm8
//! 0x26  jmp   <interrupt exit>         E9 rel32
//! ```
//!
//! Every call and jump encodes a displacement relative to the instruction's
//! own end, so the stub is position-dependent: displacements are computed
//! against the address of the buffer the bytes land in. All multi-byte
//! fields are emitted bytewise; the destination buffer needs no particular
//! alignment.

use core::fmt;

use static_assertions::const_assert_eq;

// =============================================================================
// Opcodes
// =============================================================================

/// `call rel32`
const OPCODE_CALL: u8 = 0xE8;
/// `jmp rel32`
const OPCODE_JMP: u8 = 0xE9;
/// `push imm32`
const OPCODE_PUSH: u8 = 0x68;
/// `add esp, imm8` (opcode and ModR/M)
const OPCODE_ADD_ESP: [u8; 2] = [0x83, 0xC4];

/// Length of an emitted `call`/`jmp`/`push`
const INSN_LEN: usize = 5;
/// Length of the emitted stack cleanup
const CLEANUP_LEN: usize = 3;

// =============================================================================
// Stub Buffer
// =============================================================================

/// Capacity of an [`InterruptStub`], sized for the fullest stub: the enter
/// call, three push+call pairs (begin-of-interrupt, handler,
/// end-of-interrupt), the stack cleanup and the exit jump.
pub const STUB_CAPACITY: usize = INSN_LEN + 3 * (INSN_LEN + INSN_LEN) + CLEANUP_LEN + INSN_LEN;

const_assert_eq!(STUB_CAPACITY, 43);

/// Memory an interrupt stub is synthesized into.
///
/// The buffer is caller-owned and must outlive the installed vector: the
/// descriptor-table entry for the vector points straight at these bytes, so
/// a stack-scoped stub whose frame unwinds leaves the vector dispatching
/// into dead memory. Declaring a `static` of this type provides a suitable
/// area. The contents need no initialization; synthesis overwrites them.
#[repr(C)]
pub struct InterruptStub {
    code: [u8; STUB_CAPACITY],
}

impl InterruptStub {
    /// A zeroed stub buffer
    #[inline]
    pub const fn new() -> Self {
        Self {
            code: [0; STUB_CAPACITY],
        }
    }

    /// Address the descriptor-table entry dispatches to
    #[inline]
    pub fn entry_address(&self) -> usize {
        self.code.as_ptr() as usize
    }

    /// The synthesized bytes
    #[inline]
    pub fn bytes(&self) -> &[u8; STUB_CAPACITY] {
        &self.code
    }
}

impl Default for InterruptStub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InterruptStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptStub")
            .field("entry_address", &self.entry_address())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Instruction-Sequence Builder
// =============================================================================

/// Appends the stub instruction sequence into an [`InterruptStub`].
///
/// Each primitive computes its own relative displacement from the buffer's
/// actual address, and the builder counts pushed parameters so
/// [`pop_parameters`](Self::pop_parameters) can drop exactly what the
/// sequence pushed. Appending more than [`STUB_CAPACITY`] bytes is a
/// builder-usage bug and panics.
pub struct StubBuilder<'a> {
    stub: &'a mut InterruptStub,
    len: usize,
    pushed: u8,
}

impl<'a> StubBuilder<'a> {
    /// Start a fresh sequence at the beginning of `stub`
    pub fn new(stub: &'a mut InterruptStub) -> Self {
        Self {
            stub,
            len: 0,
            pushed: 0,
        }
    }

    /// Address the next instruction will be emitted at (IA-32 address width)
    #[inline]
    fn cursor(&self) -> u32 {
        (self.stub.entry_address() as u32).wrapping_add(self.len as u32)
    }

    #[inline]
    fn emit(&mut self, byte: u8) {
        self.stub.code[self.len] = byte;
        self.len += 1;
    }

    /// Bytewise little-endian emission; keeps the displacement and
    /// immediate fields free of alignment assumptions.
    #[inline]
    fn emit_u32(&mut self, value: u32) {
        for byte in value.to_le_bytes() {
            self.emit(byte);
        }
    }

    /// Append `call target`
    pub fn call(&mut self, target: u32) {
        let next = self.cursor().wrapping_add(INSN_LEN as u32);
        self.emit(OPCODE_CALL);
        self.emit_u32(target.wrapping_sub(next));
    }

    /// Append `push parameter`, counting it for the stack cleanup
    pub fn push(&mut self, parameter: u32) {
        self.emit(OPCODE_PUSH);
        self.emit_u32(parameter);
        self.pushed += 1;
    }

    /// Append `add esp, 4 * pushed`, dropping every parameter pushed so far
    pub fn pop_parameters(&mut self) {
        self.emit(OPCODE_ADD_ESP[0]);
        self.emit(OPCODE_ADD_ESP[1]);
        self.emit(4 * self.pushed);
    }

    /// Append `jmp target`
    ///
    /// A jump rather than a call: the interrupt-exit routine returns to the
    /// interrupted context itself (or reschedules), so the stub must not
    /// grow the stack under it.
    pub fn jump(&mut self, target: u32) {
        let next = self.cursor().wrapping_add(INSN_LEN as u32);
        self.emit(OPCODE_JMP);
        self.emit_u32(target.wrapping_sub(next));
    }

    /// Parameters pushed so far
    #[inline]
    pub fn pushed_parameters(&self) -> u8 {
        self.pushed
    }

    /// Finish the sequence, returning its length in bytes
    pub fn finish(self) -> usize {
        self.len
    }
}

impl fmt::Debug for StubBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubBuilder")
            .field("len", &self.len)
            .field("pushed", &self.pushed)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    /// Absolute target a rel32 field at `offset + 1` resolves to.
    fn resolve_rel32(stub: &InterruptStub, offset: usize) -> u32 {
        let next = (stub.entry_address() as u32).wrapping_add(offset as u32 + 5);
        next.wrapping_add(read_u32(stub.bytes(), offset + 1))
    }

    const ENTER: u32 = 0x0010_0000;
    const EXIT: u32 = 0x0010_0400;
    const HANDLER: u32 = 0x0020_0000;

    fn build_minimal(stub: &mut InterruptStub, parameter: u32) -> usize {
        let mut code = StubBuilder::new(stub);
        code.call(ENTER);
        code.push(parameter);
        code.call(HANDLER);
        code.pop_parameters();
        code.jump(EXIT);
        code.finish()
    }

    #[test]
    fn test_minimal_sequence_layout() {
        let mut stub = InterruptStub::new();
        let len = build_minimal(&mut stub, 0xAABB_CCDD);
        let bytes = stub.bytes();

        assert_eq!(len, 23);
        assert_eq!(bytes[0], 0xE8);
        assert_eq!(bytes[5], 0x68);
        assert_eq!(read_u32(bytes, 6), 0xAABB_CCDD);
        assert_eq!(bytes[10], 0xE8);
        assert_eq!(&bytes[15..18], &[0x83, 0xC4, 0x04]);
        assert_eq!(bytes[18], 0xE9);
    }

    #[test]
    fn test_displacements_resolve_to_their_targets() {
        let mut stub = InterruptStub::new();
        build_minimal(&mut stub, 7);

        assert_eq!(resolve_rel32(&stub, 0), ENTER);
        assert_eq!(resolve_rel32(&stub, 10), HANDLER);
        assert_eq!(resolve_rel32(&stub, 18), EXIT);
    }

    #[test]
    fn test_identical_inputs_differ_only_in_displacements() {
        let mut first = InterruptStub::new();
        let mut second = InterruptStub::new();
        let len_a = build_minimal(&mut first, 42);
        let len_b = build_minimal(&mut second, 42);

        assert_eq!(len_a, len_b);
        // Opcodes and immediates are byte-identical.
        for offset in [0usize, 5, 10, 15, 16, 17, 18] {
            assert_eq!(first.bytes()[offset], second.bytes()[offset]);
        }
        assert_eq!(read_u32(first.bytes(), 6), read_u32(second.bytes(), 6));
        // Displacements differ with the buffer address but resolve to the
        // same absolute targets.
        for offset in [0usize, 10, 18] {
            assert_eq!(resolve_rel32(&first, offset), resolve_rel32(&second, offset));
        }
    }

    #[test]
    fn test_cleanup_counts_every_pushed_parameter() {
        let mut stub = InterruptStub::new();
        let mut code = StubBuilder::new(&mut stub);
        code.call(ENTER);
        code.push(1);
        code.call(0x3000);
        code.push(2);
        code.call(HANDLER);
        code.pop_parameters();
        code.jump(EXIT);
        let len = code.finish();

        assert_eq!(stub.bytes()[len - 6], 4 * 2);
    }

    #[test]
    fn test_fullest_sequence_exactly_fills_capacity() {
        let mut stub = InterruptStub::new();
        let mut code = StubBuilder::new(&mut stub);
        code.call(ENTER);
        for target in [0x3000u32, HANDLER, 0x4000] {
            code.push(0);
            code.call(target);
        }
        code.pop_parameters();
        code.jump(EXIT);

        assert_eq!(code.pushed_parameters(), 3);
        assert_eq!(code.finish(), STUB_CAPACITY);
    }
}
