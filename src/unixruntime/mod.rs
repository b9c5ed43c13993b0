//! The UnixRuntime process model.
//!
//! ## Layout
//!
//! - [`globalstate`]: the pid table, the mount table and the exec cache shared
//!   by every task of one machine.
//! - [`task`]: one emulated process, its descriptor table and child sets.
//! - [`syscalls`]: the system calls, as methods on [`task::Task`].
//! - [`dispatcher`]: decodes syscall traps against guest memory.
//! - [`driver`]: runs an execution unit for a task until it exits.
//! - [`filesystem`]: the host and device filesystem backends and the open
//!   file objects behind descriptors.
//! - [`execcache`]: exec's binary sniffing and its mtime/size checked cache.
//! - [`cpu`]: the traits the virtual CPU implements.

pub mod config;
pub mod cpu;
pub mod dispatcher;
pub mod driver;
pub mod execcache;
pub mod filesystem;
pub mod globalstate;
pub mod path;
pub mod syscall_numbers;
pub mod syscalls;
pub mod task;

pub use config::RuntimeConfig;
pub use globalstate::GlobalState;
pub use task::Task;
