//! Module definitions for the runtime interface
//!
//! ## Interface Module
//!
//! Everything that touches the host or the guest's memory goes through this
//! module: errno translation, host files and sockets, the in-memory pipe, and
//! the guest data layouts. The process model in
//! [`unixruntime`](crate::unixruntime) only reaches the host through here.

mod comm;
pub mod errnos;
mod file;
mod misc;
mod pipe;
pub mod types;
pub use comm::*;
pub use errnos::*;
pub use file::*;
pub use misc::*;
pub use pipe::*;
pub use types::*;
