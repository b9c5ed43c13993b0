//! System call implementations, one method per call on
//! [`Task`](crate::unixruntime::task::Task), divided into filesystem,
//! process and network calls.
//!
//! The methods take arguments already copied out of guest memory and return
//! a non-negative result or a negated errno. Decoding and copying back is the
//! dispatcher's job.

pub mod fs_calls;
pub mod fs_constants;
pub mod net_calls;
pub mod net_constants;
pub mod sys_calls;
pub mod sys_constants;
pub use fs_calls::*;
pub use fs_constants::*;
pub use net_constants::*;
pub use sys_constants::*;
