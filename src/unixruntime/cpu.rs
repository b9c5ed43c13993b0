//! Boundary to the virtual CPU.
//!
//! The runtime never interprets instructions. It drives an
//! [`ExecutionUnit`] until it traps, services the trap, and writes the result
//! back. Images come from an [`ImageCompiler`] that turns ELF bytes into
//! something that can be instantiated with an argument vector.

use crate::interface::{GuestMemory, MemoryFault};
use std::sync::Arc;

/// Architectural state needed to resume a unit after fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub pc: u32,
    pub gpr: [u32; 32],
    pub hi: u32,
    pub lo: u32,
}

impl Default for RegisterSnapshot {
    fn default() -> Self {
        RegisterSnapshot {
            pc: 0,
            gpr: [0; 32],
            hi: 0,
            lo: 0,
        }
    }
}

/// Why `run` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    /// The guest executed a syscall instruction.
    Syscall { number: i32, args: [i32; 6] },
    /// The unit yielded without trapping; call `run` again.
    Paused,
    /// The guest touched unmapped memory or executed an illegal instruction.
    Fault(MemoryFault),
}

pub trait ExecutionUnit: GuestMemory + Send {
    /// Executes until the next trap.
    fn run(&mut self) -> Trap;

    /// Stores `result` in the return register and steps past the trapping
    /// instruction.
    fn complete_syscall(&mut self, result: i32);

    fn registers(&self) -> RegisterSnapshot;

    fn set_registers(&mut self, regs: &RegisterSnapshot);

    /// A full copy of this unit's address space and state, or `None` when the
    /// memory cannot be duplicated.
    fn duplicate(&self) -> Option<Box<dyn ExecutionUnit>>;
}

/// A compiled program that can be started any number of times.
pub trait ExecutableImage: Send + Sync {
    fn instantiate(&self, argv: &[String], envp: &[String]) -> Result<Box<dyn ExecutionUnit>, i32>;
}

/// Turns the bytes of an ELF file into an image. Errors are negative errnos
/// (ENOEXEC for a bad image, EIO for a failed read).
pub trait ImageCompiler: Send + Sync {
    fn compile(&self, elf: &[u8]) -> Result<Arc<dyn ExecutableImage>, i32>;
}
