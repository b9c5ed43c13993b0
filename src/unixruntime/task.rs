//! Emulated processes.
//!
//! ## Task
//!
//! A [`Task`] is one guest process: a pid, a weak edge to its parent, a
//! descriptor table, a working directory and an execution state. Tasks do
//! not own their execution unit; the driver loop does, and learns about exec
//! and exit through [`TaskState`].
//!
//! ## Child tracking
//!
//! Each task keeps the pids of its children that are still running and of
//! those that exited but have not been reaped. Both sets live under one mutex
//! with a condition variable; a child moves itself from `active` to `exited`
//! and notifies, and `waitpid` rechecks its predicate after every wakeup.
//! After `_started` a task is in exactly one of its parent's two sets until
//! the parent exits.

use crate::interface::{self, syscall_error, Errno};
use crate::unixruntime::cpu::ExecutionUnit;
use crate::unixruntime::filesystem::{OpenFile, SecurityManager};
use crate::unixruntime::globalstate::GlobalState;
use crate::unixruntime::syscalls::fs_constants::*;
use crate::unixruntime::syscalls::sys_constants::*;
use std::mem;
use std::sync::{Arc, Weak};

pub enum TaskState {
    Running,
    /// Stopped by a signal; the driver resumes it at the next trap.
    Paused,
    /// exec succeeded; the driver must continue with this unit.
    Execed(Box<dyn ExecutionUnit>),
    Exited(u8),
}

impl TaskState {
    fn name(&self) -> &'static str {
        match self {
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Execed(_) => "execed",
            TaskState::Exited(_) => "exited",
        }
    }
}

fn is_stop(signal: i32) -> bool {
    matches!(signal, SIGSTOP | SIGTSTP | SIGTTIN | SIGTTOU)
}

/// Every signal that neither stops the task nor is ignored ends it.
fn is_fatal(signal: i32) -> bool {
    signal != 0 && !is_stop(signal) && !matches!(signal, SIGCONT | SIGCHLD | SIGIO | SIGWINCH)
}

/// What the driver must do after a trap has been serviced.
pub enum Transition {
    Continue,
    Resumed,
    Exec(Box<dyn ExecutionUnit>),
    Exit(u8),
}

#[derive(Clone)]
pub struct FdEntry {
    pub file: Arc<dyn OpenFile>,
    pub cloexec: bool,
}

/// Descriptor slots `0..OPEN_MAX`.
#[derive(Clone)]
pub struct FdTable {
    slots: Vec<Option<FdEntry>>,
}

impl Default for FdTable {
    fn default() -> Self {
        FdTable {
            slots: vec![None; OPEN_MAX],
        }
    }
}

impl FdTable {
    pub fn get(&self, fd: i32) -> Option<&FdEntry> {
        if fd < 0 {
            return None;
        }
        self.slots.get(fd as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, fd: i32) -> Option<&mut FdEntry> {
        if fd < 0 {
            return None;
        }
        self.slots.get_mut(fd as usize).and_then(|s| s.as_mut())
    }

    /// Lowest free slot at or above `start`.
    pub fn lowest_free(&self, start: i32) -> Option<i32> {
        if start < 0 {
            return None;
        }
        (start as usize..OPEN_MAX).find(|i| self.slots[*i].is_none()).map(|i| i as i32)
    }

    /// Installs into `fd`, returning whatever was there.
    pub fn replace(&mut self, fd: i32, entry: FdEntry) -> Option<FdEntry> {
        self.slots[fd as usize].replace(entry)
    }

    pub fn take(&mut self, fd: i32) -> Option<FdEntry> {
        if fd < 0 || fd as usize >= OPEN_MAX {
            return None;
        }
        self.slots[fd as usize].take()
    }

    pub fn open_fds(&self) -> Vec<i32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| i as i32)
            .collect()
    }
}

#[derive(Default)]
struct ChildSets {
    active: Vec<i32>,
    exited: Vec<i32>,
}

pub struct Task {
    pid: interface::RustAtomicI32,
    parent: interface::RustMutex<Option<Weak<Task>>>,
    pub(crate) fdtable: interface::RustMutex<FdTable>,
    cwd: interface::RustLock<String>,
    state: interface::RustMutex<TaskState>,
    children: interface::RustMutex<ChildSets>,
    child_exited: interface::RustCondvar,
    // bit n set while signal n is queued
    pending_signals: interface::RustAtomicU32,
    gs: Arc<GlobalState>,
    security: Option<Arc<dyn SecurityManager>>,
}

impl Task {
    /// A parentless task with an empty descriptor table rooted at `/`. It gets
    /// its pid from `_started`.
    pub fn new(gs: Arc<GlobalState>) -> Arc<Task> {
        Task::new_with_security(gs, None)
    }

    pub fn new_with_security(gs: Arc<GlobalState>, security: Option<Arc<dyn SecurityManager>>) -> Arc<Task> {
        Arc::new(Task {
            pid: interface::RustAtomicI32::new(0),
            parent: interface::RustMutex::new(None),
            fdtable: interface::RustMutex::new(FdTable::default()),
            cwd: interface::RustLock::new(String::new()),
            state: interface::RustMutex::new(TaskState::Running),
            children: interface::RustMutex::new(ChildSets::default()),
            child_exited: interface::RustCondvar::new(),
            pending_signals: interface::RustAtomicU32::new(0),
            gs,
            security,
        })
    }

    /// The bookkeeping half of fork: fresh identity, a new edge to `self`,
    /// empty child sets, and a copy of the descriptor table whose slots share
    /// the parent's open file descriptions.
    pub(crate) fn clone_for_fork(self: &Arc<Self>) -> Arc<Task> {
        Arc::new(Task {
            pid: interface::RustAtomicI32::new(0),
            parent: interface::RustMutex::new(Some(Arc::downgrade(self))),
            fdtable: interface::RustMutex::new(self.fdtable.lock().clone()),
            cwd: interface::RustLock::new(self.cwd()),
            state: interface::RustMutex::new(TaskState::Running),
            children: interface::RustMutex::new(ChildSets::default()),
            child_exited: interface::RustCondvar::new(),
            pending_signals: interface::RustAtomicU32::new(0),
            gs: self.gs.clone(),
            security: self.security.clone(),
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid.load(interface::RustAtomicOrdering::Acquire)
    }

    pub(crate) fn set_pid(&self, pid: i32) {
        self.pid.store(pid, interface::RustAtomicOrdering::Release);
    }

    pub fn parent(&self) -> Option<Arc<Task>> {
        self.parent.lock().as_ref().and_then(|w| w.upgrade())
    }

    pub fn gs(&self) -> &Arc<GlobalState> {
        &self.gs
    }

    pub fn security(&self) -> Option<&dyn SecurityManager> {
        self.security.as_deref()
    }

    /// Normalized working directory, `""` at the root.
    pub fn cwd(&self) -> String {
        self.cwd.read().clone()
    }

    pub(crate) fn set_cwd(&self, cwd: String) {
        *self.cwd.write() = cwd;
    }

    pub fn state_name(&self) -> &'static str {
        self.state.lock().name()
    }

    pub fn exit_status(&self) -> Option<u8> {
        match &*self.state.lock() {
            TaskState::Exited(status) => Some(*status),
            _ => None,
        }
    }

    pub fn is_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    pub fn active_children(&self) -> Vec<i32> {
        self.children.lock().active.clone()
    }

    pub fn exited_children(&self) -> Vec<i32> {
        self.children.lock().exited.clone()
    }

    // ---------------- descriptor table ----------------

    pub fn get_fd(&self, fd: i32) -> Option<Arc<dyn OpenFile>> {
        self.fdtable.lock().get(fd).map(|e| e.file.clone())
    }

    pub fn open_fds(&self) -> Vec<i32> {
        self.fdtable.lock().open_fds()
    }

    /// Puts `file` in the lowest free slot at or above `start`.
    pub fn install_fd(&self, file: Arc<dyn OpenFile>, start: i32, cloexec: bool) -> Result<i32, i32> {
        let mut table = self.fdtable.lock();
        match table.lowest_free(start) {
            Some(fd) => {
                table.replace(fd, FdEntry { file, cloexec });
                Ok(fd)
            }
            None => Err(syscall_error(Errno::EMFILE, "open", "descriptor table is full")),
        }
    }

    /// Removes `fd`. The description itself is released when its last
    /// reference drops, outside the table lock.
    pub fn close_fd(&self, fd: i32) -> Result<(), i32> {
        let removed = self.fdtable.lock().take(fd);
        match removed {
            Some(entry) => {
                drop(entry);
                Ok(())
            }
            None => Err(syscall_error(Errno::EBADF, "close", "invalid file descriptor")),
        }
    }

    pub(crate) fn close_cloexec_fds(&self) {
        let mut released = Vec::new();
        {
            let mut table = self.fdtable.lock();
            for fd in table.open_fds() {
                if table.get(fd).map_or(false, |e| e.cloexec) {
                    released.extend(table.take(fd));
                }
            }
        }
        drop(released);
    }

    pub(crate) fn close_all_fds(&self) {
        let released = mem::take(&mut *self.fdtable.lock());
        drop(released);
    }

    // ---------------- state machine ----------------

    /// Records termination. The first recorded status wins.
    pub(crate) fn mark_exited(&self, status: u8) {
        let mut state = self.state.lock();
        if !matches!(*state, TaskState::Exited(_)) {
            *state = TaskState::Exited(status);
        }
    }

    pub(crate) fn mark_paused(&self) {
        let mut state = self.state.lock();
        if matches!(*state, TaskState::Running) {
            *state = TaskState::Paused;
        }
    }

    pub(crate) fn mark_execed(&self, successor: Box<dyn ExecutionUnit>) {
        let mut state = self.state.lock();
        match *state {
            TaskState::Running | TaskState::Paused => *state = TaskState::Execed(successor),
            TaskState::Execed(_) => panic!("task {} execed twice within one trap", self.pid()),
            TaskState::Exited(_) => {}
        }
    }

    /// Consumes the state change a syscall left behind. Exec and pause both
    /// return the task to `Running`; exit is terminal.
    pub(crate) fn take_transition(&self) -> Transition {
        let mut state = self.state.lock();
        match mem::replace(&mut *state, TaskState::Running) {
            TaskState::Running => Transition::Continue,
            TaskState::Paused => Transition::Resumed,
            TaskState::Execed(unit) => Transition::Exec(unit),
            TaskState::Exited(status) => {
                *state = TaskState::Exited(status);
                Transition::Exit(status)
            }
        }
    }

    /// Queues a signal sent by another task; the target's driver delivers it
    /// at its next trap. Signals already queued stay queued.
    pub(crate) fn post_signal(&self, signal: i32) {
        if (1..NSIG).contains(&signal) {
            self.pending_signals.fetch_or(1 << signal, interface::RustAtomicOrdering::AcqRel);
        }
    }

    /// Applies every queued signal. A terminating signal wins over stop and
    /// ignored ones; among several, the lowest numbered is reported.
    pub(crate) fn deliver_pending_signal(&self) {
        let pending = self.pending_signals.swap(0, interface::RustAtomicOrdering::AcqRel);
        if pending == 0 {
            return;
        }
        let queued = (1..NSIG).filter(|signal| pending & (1 << signal) != 0);
        let mut stop = None;
        for signal in queued {
            if is_fatal(signal) {
                self.apply_signal(signal);
                return;
            }
            if is_stop(signal) && stop.is_none() {
                stop = Some(signal);
            }
        }
        if let Some(signal) = stop {
            self.apply_signal(signal);
        }
    }

    /// Maps a signal onto the state machine.
    pub(crate) fn apply_signal(&self, signal: i32) {
        match signal {
            0 => {}
            s if is_stop(s) => {
                tracing::debug!(pid = self.pid(), signal, "task paused by signal");
                self.mark_paused();
            }
            s if !is_fatal(s) => {}
            _ => {
                tracing::debug!(pid = self.pid(), signal, "task terminated by signal");
                self.mark_exited((128 + signal) as u8);
            }
        }
    }

    // ---------------- lifecycle ----------------

    /// Called by the driver before the first instruction. A task created
    /// with `Task::new` receives its pid here.
    pub fn _started(self: &Arc<Self>) -> Result<(), i32> {
        if self.pid() == 0 {
            let pid = self.gs.register_task(self.clone())?;
            self.set_pid(pid);
        }
        tracing::debug!(pid = self.pid(), "task started");
        Ok(())
    }

    /// Called by the driver once the task has exited and its descriptors are
    /// closed.
    ///
    /// Unreaped children are dropped from the pid table, since nobody can
    /// wait for them any more; running children are orphaned. Then the task
    /// either hands itself to its parent's exited set or, if the parent is
    /// gone or has already disowned it, frees its own pid.
    pub fn _exited(&self) {
        let pid = self.pid();
        let status = self.exit_status().unwrap_or(0);

        let (active, exited) = {
            let mut children = self.children.lock();
            (mem::take(&mut children.active), mem::take(&mut children.exited))
        };
        for zombie in exited {
            if let Some(child) = self.gs.release_pid(zombie) {
                tracing::info!(
                    pid = zombie,
                    parent = pid,
                    status = child.exit_status().unwrap_or(0),
                    "discarding status of unreaped child"
                );
            }
        }
        for orphan in active {
            if let Some(child) = self.gs.get_task(orphan) {
                *child.parent.lock() = None;
            }
        }

        let parent = self.parent.lock().take().and_then(|w| w.upgrade());
        let adopted = match parent {
            Some(parent) => {
                let mut children = parent.children.lock();
                if children.exited.contains(&pid) {
                    panic!("task {} registered twice as an exited child of {}", pid, parent.pid());
                }
                match children.active.iter().position(|c| *c == pid) {
                    Some(i) => {
                        children.active.remove(i);
                        children.exited.push(pid);
                        parent.child_exited.notify_all();
                        true
                    }
                    None => false,
                }
            }
            None => false,
        };
        if !adopted {
            self.gs.release_pid(pid);
        }
        tracing::debug!(pid, status, "task exited");
    }

    pub(crate) fn add_active_child(&self, pid: i32) {
        self.children.lock().active.push(pid);
    }

    pub(crate) fn remove_active_child(&self, pid: i32) {
        self.children.lock().active.retain(|c| *c != pid);
    }

    /// The wait half of waitpid. Returns the reaped pid, 0 when nothing is
    /// ready and `nohang` is set, or a negative errno.
    pub(crate) fn wait_for_child(&self, pid: i32, nohang: bool, status: &mut i32) -> i32 {
        let mut children = self.children.lock();
        let reaped = loop {
            let found = if pid == -1 {
                if children.exited.is_empty() {
                    None
                } else {
                    Some(children.exited.remove(0))
                }
            } else if let Some(i) = children.exited.iter().position(|c| *c == pid) {
                Some(children.exited.remove(i))
            } else if children.active.contains(&pid) {
                None
            } else {
                return syscall_error(Errno::ECHILD, "waitpid", "pid is not a child of the caller");
            };

            if let Some(child) = found {
                break child;
            }
            if nohang {
                return 0;
            }
            if children.active.is_empty() {
                return syscall_error(Errno::ECHILD, "waitpid", "no children to wait for");
            }
            self.child_exited.wait(&mut children);
        };
        drop(children);

        let child = match self.gs.release_pid(reaped) {
            Some(child) => child,
            None => panic!("exited child {} of {} missing from the pid table", reaped, self.pid()),
        };
        let code = match child.exit_status() {
            Some(code) => code,
            None => panic!("child {} reaped while still {}", reaped, child.state_name()),
        };
        *status = (code as i32) << 8;
        tracing::debug!(pid = self.pid(), child = reaped, code, "reaped child");
        reaped
    }
}
