// Misc functions for interface
// Locks, shared handles, threads, etc.

pub use dashmap::DashMap as RustDashMap;
pub use parking_lot::{Condvar as RustCondvar, Mutex as RustMutex, RwLock as RustLock};
pub use std::sync::atomic::{AtomicI32 as RustAtomicI32, AtomicU32 as RustAtomicU32, Ordering as RustAtomicOrdering};

use std::io;
use std::thread;

/// Gives up the host thread's timeslice.
pub fn runtime_yield() {
    thread::yield_now();
}

/// Spawns a named host thread for an emulated task.
pub fn spawn_task_thread<F>(name: String, body: F) -> io::Result<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name).spawn(body)
}
