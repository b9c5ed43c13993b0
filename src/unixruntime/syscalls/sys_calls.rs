//! Process related system calls.
//!
//! ## Notes:
//!
//! These are methods on [`Task`]. fork and exec never create host
//! processes: fork duplicates the calling execution unit and runs the copy
//! on a new host thread, exec swaps the unit the driver is running.
//!
//! - [fork_syscall](crate::unixruntime::task::Task::fork_syscall)
//! - [exec_syscall](crate::unixruntime::task::Task::exec_syscall)
//! - [waitpid_syscall](crate::unixruntime::task::Task::waitpid_syscall)
//! - [kill_syscall](crate::unixruntime::task::Task::kill_syscall)
//! - [exit_syscall](crate::unixruntime::task::Task::exit_syscall)
//! - [getpid_syscall](crate::unixruntime::task::Task::getpid_syscall)
//! - [getppid_syscall](crate::unixruntime::task::Task::getppid_syscall)

use super::sys_constants::*;
use crate::interface::{self, syscall_error, Errno};
use crate::unixruntime::cpu::ExecutionUnit;
use crate::unixruntime::driver;
use crate::unixruntime::execcache::Executable;
use crate::unixruntime::path;
use crate::unixruntime::task::Task;
use std::sync::Arc;

impl Task {
    /// ### Description
    ///
    /// `fork_syscall` creates a child task running a copy of the caller.
    /// The caller's registers are snapshotted, its execution unit duplicated,
    /// and the child gets a fresh pid, an edge to the caller, the caller's cwd
    /// and a descriptor table sharing the caller's open files. The child's
    /// unit resumes after the trap with a return value of 0 on its own host
    /// thread.
    ///
    /// ### Returns
    ///
    /// The child's pid in the parent.
    ///
    /// ### Errors
    ///
    /// * `ENOMEM` - the unit could not be duplicated, the pid table is full,
    ///   or the host refused a new thread. Nothing is left registered.
    ///
    /// [fork(2)](https://man7.org/linux/man-pages/man2/fork.2.html)
    pub fn fork_syscall(self: &Arc<Self>, unit: &dyn ExecutionUnit) -> i32 {
        let regs = unit.registers();
        let mut child_unit = match unit.duplicate() {
            Some(u) => u,
            None => return syscall_error(Errno::ENOMEM, "fork", "could not duplicate the address space"),
        };

        let child = self.clone_for_fork();
        let child_pid = match self.gs().register_task(child.clone()) {
            Ok(pid) => pid,
            Err(e) => return e,
        };
        child.set_pid(child_pid);
        self.add_active_child(child_pid);

        child_unit.set_registers(&regs);
        child_unit.complete_syscall(0);

        let runner = child.clone();
        let spawned = interface::spawn_task_thread(format!("task-{}", child_pid), move || {
            driver::run_task(runner, child_unit);
        });
        if let Err(e) = spawned {
            self.remove_active_child(child_pid);
            self.gs().release_pid(child_pid);
            return syscall_error(Errno::ENOMEM, "fork", &format!("could not start task thread: {}", e));
        }

        tracing::debug!(parent = self.pid(), child = child_pid, "forked");
        child_pid
    }

    /// ### Description
    ///
    /// `exec_syscall` replaces the program of the calling task. The path is
    /// resolved against the cwd and looked up through the exec cache. A
    /// native image is instantiated with `argv` and `envp`; a `#!` script
    /// re-executes its interpreter with argv rewritten to
    /// `[basename(interpreter), arg?, "/" + path, argv[1..]]`.
    ///
    /// On success close-on-exec descriptors are closed and the task is left
    /// in the `Execed` state; the driver switches units and the call never
    /// returns to the old program. pid, parent, children, cwd and the
    /// remaining descriptors carry over.
    ///
    /// ### Errors
    ///
    /// * `ENOENT` - the file does not exist
    /// * `EACCES` - the file is a directory
    /// * `ENOEXEC` - not an ELF image or script, or no compiler configured
    /// * `EIO` - reading the file failed
    /// * `ELOOP` - scripts name interpreters that are scripts too deeply
    ///
    /// [execve(2)](https://man7.org/linux/man-pages/man2/execve.2.html)
    pub fn exec_syscall(&self, path: &str, argv: Vec<String>, envp: Vec<String>) -> i32 {
        let argv = if argv.is_empty() { vec![String::new()] } else { argv };
        match self.exec_at_depth(path, argv, &envp, 0) {
            Ok(()) => 0,
            Err(e) => e,
        }
    }

    fn exec_at_depth(&self, path: &str, argv: Vec<String>, envp: &[String], depth: usize) -> Result<(), i32> {
        if depth > MAX_INTERPRETER_DEPTH {
            return Err(syscall_error(Errno::ELOOP, "exec", "interpreter nesting too deep"));
        }
        let normalized = path::resolve(&self.cwd(), path);
        match self.gs().resolve_executable(self, &normalized)? {
            Executable::Image(image) => {
                let successor = image.instantiate(&argv, envp)?;
                self.close_cloexec_fds();
                self.mark_execed(successor);
                tracing::info!(pid = self.pid(), path = %normalized, "exec");
                Ok(())
            }
            Executable::Script { interpreter, arg } => {
                let mut script_argv = Vec::with_capacity(argv.len() + 2);
                script_argv.push(path::basename(&interpreter).to_string());
                if let Some(arg) = arg {
                    script_argv.push(arg);
                }
                script_argv.push(format!("/{}", normalized));
                script_argv.extend(argv.into_iter().skip(1));
                self.exec_at_depth(&interpreter, script_argv, envp, depth + 1)
            }
        }
    }

    /// ### Description
    ///
    /// `waitpid_syscall` reaps an exited child. `pid == -1` takes any exited
    /// child, `pid > 0` that child only. Without `WNOHANG` the caller blocks
    /// until a matching child exits.
    ///
    /// ### Returns
    ///
    /// The reaped pid with `status` set to `exit_status << 8`, or 0 under
    /// `WNOHANG` when nothing has exited yet.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - an option other than `WNOHANG`
    /// * `ECHILD` - `pid` is not a child, or there are no children to block
    ///   on; process groups (`pid == 0`, `pid < -1`) are not supported and
    ///   also report `ECHILD`
    ///
    /// [waitpid(2)](https://man7.org/linux/man-pages/man2/waitpid.2.html)
    pub fn waitpid_syscall(&self, pid: i32, status: &mut i32, options: i32) -> i32 {
        if options & !WNOHANG != 0 {
            return syscall_error(Errno::EINVAL, "waitpid", "unsupported options");
        }
        if pid == 0 || pid < -1 {
            tracing::warn!(pid = self.pid(), target = pid, "waitpid on a process group is not supported");
            return syscall_error(Errno::ECHILD, "waitpid", "process groups are not supported");
        }
        self.wait_for_child(pid, options & WNOHANG != 0, status)
    }

    /// ### Description
    ///
    /// `kill_syscall` maps a signal onto the target's state. Signal 0 only
    /// probes for existence. Stop signals pause the target, SIGCONT, SIGCHLD,
    /// SIGIO and SIGWINCH are ignored, and everything else terminates it with
    /// status `128 + signal`. A signal to the caller acts before the call
    /// returns; another task acts on it at its next trap.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - signal outside `[0, 32)`
    /// * `ESRCH` - no task with that pid
    ///
    /// [kill(2)](https://man7.org/linux/man-pages/man2/kill.2.html)
    pub fn kill_syscall(&self, pid: i32, signal: i32) -> i32 {
        if !(0..NSIG).contains(&signal) {
            return syscall_error(Errno::EINVAL, "kill", "invalid signal");
        }
        if pid == self.pid() {
            self.apply_signal(signal);
            return 0;
        }
        let target = match self.gs().get_task(pid) {
            Some(t) => t,
            None => return syscall_error(Errno::ESRCH, "kill", "no such process"),
        };
        if signal != 0 && !target.is_exited() {
            target.post_signal(signal);
        }
        0
    }

    /// Terminates the caller with the low 8 bits of `status`.
    pub fn exit_syscall(&self, status: i32) -> i32 {
        self.mark_exited((status & 0xff) as u8);
        status
    }

    pub fn getpid_syscall(&self) -> i32 {
        self.pid()
    }

    /// The parent's pid, or 1 once orphaned.
    pub fn getppid_syscall(&self) -> i32 {
        match self.parent() {
            Some(parent) => parent.pid(),
            None => INIT_PID,
        }
    }

    pub fn sched_yield_syscall(&self) -> i32 {
        interface::runtime_yield();
        0
    }

    /// Stops the caller until the driver resumes it.
    pub fn pause_syscall(&self) -> i32 {
        self.apply_signal(SIGSTOP);
        0
    }
}
