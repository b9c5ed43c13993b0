//! The execution loop of one task.
//!
//! `run_task` owns the task's execution unit. It runs the unit until it
//! traps, dispatches syscalls, and then acts on whatever state change the
//! syscall left in the task: a successful exec swaps in the successor unit
//! without completing the trap, an exit ends the loop.

use crate::interface::{syscall_error, Errno};
use crate::unixruntime::cpu::{ExecutionUnit, Trap};
use crate::unixruntime::dispatcher;
use crate::unixruntime::globalstate::GlobalState;
use crate::unixruntime::path;
use crate::unixruntime::syscalls::sys_constants::*;
use crate::unixruntime::task::{Task, Transition};
use std::sync::Arc;

/// Runs `unit` as `task` until the task exits, then releases its
/// descriptors and reports the exit to its parent.
///
/// Returns the exit status.
pub fn run_task(task: Arc<Task>, mut unit: Box<dyn ExecutionUnit>) -> u8 {
    if let Err(e) = task._started() {
        tracing::warn!(errno = e, "task could not be registered");
        task.mark_exited(EXIT_FAILURE as u8);
        task.close_all_fds();
        return EXIT_FAILURE as u8;
    }

    let status = loop {
        match unit.run() {
            Trap::Syscall { number, args } => {
                let result = dispatcher::dispatch(&task, unit.as_mut(), number, args);
                task.deliver_pending_signal();
                match task.take_transition() {
                    Transition::Continue => unit.complete_syscall(result),
                    Transition::Resumed => {
                        tracing::warn!(pid = task.pid(), "paused task resumed");
                        unit.complete_syscall(result);
                    }
                    Transition::Exec(successor) => unit = successor,
                    Transition::Exit(status) => break status,
                }
            }
            Trap::Paused => {
                task.deliver_pending_signal();
                match task.take_transition() {
                    Transition::Exit(status) => break status,
                    Transition::Resumed => tracing::warn!(pid = task.pid(), "paused task resumed"),
                    Transition::Continue | Transition::Exec(_) => {}
                }
            }
            Trap::Fault(fault) => {
                tracing::warn!(pid = task.pid(), addr = fault.addr, "guest fault");
                task.mark_exited((128 + SIGSEGV) as u8);
                break task.exit_status().unwrap_or((128 + SIGSEGV) as u8);
            }
        }
    };

    drop(unit);
    task.close_all_fds();
    task._exited();
    status
}

/// Loads `path` as the first program of a fresh task and runs it on the
/// calling thread.
///
/// ### Returns
///
/// The exit status of the task, or the negative errno if the program could
/// not be started.
pub fn spawn(gs: &Arc<GlobalState>, path: &str, argv: Vec<String>, envp: Vec<String>) -> Result<u8, i32> {
    let task = Task::new(gs.clone());
    let unit = load_initial(&task, path, argv, envp)?;
    Ok(run_task(task, unit))
}

/// Resolves `path` with the exec machinery on a task that has not started
/// yet, returning the unit it would run.
pub fn load_initial(task: &Arc<Task>, path: &str, argv: Vec<String>, envp: Vec<String>) -> Result<Box<dyn ExecutionUnit>, i32> {
    let ret = task.exec_syscall(path, argv, envp);
    if ret < 0 {
        return Err(ret);
    }
    match task.take_transition() {
        Transition::Exec(unit) => Ok(unit),
        _ => Err(syscall_error(
            Errno::ENOEXEC,
            "spawn",
            &format!("{} did not produce a program", path::normalize(path)),
        )),
    }
}
