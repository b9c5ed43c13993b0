//! Filesystem and descriptor system calls.
//!
//! ## Notes:
//!
//! These calls are methods on [`Task`]. Paths are resolved against the
//! task's cwd and dispatched through the mount table of its
//! [`GlobalState`](crate::unixruntime::globalstate::GlobalState).
//! Descriptor slots hold shared open file descriptions, so `dup`, `dup2`,
//! `fcntl(F_DUPFD)` and fork all share offsets and pipe ends.
//!
//! - [open_syscall](crate::unixruntime::task::Task::open_syscall)
//! - [close_syscall](crate::unixruntime::task::Task::close_syscall)
//! - [read_syscall](crate::unixruntime::task::Task::read_syscall)
//! - [write_syscall](crate::unixruntime::task::Task::write_syscall)
//! - [lseek_syscall](crate::unixruntime::task::Task::lseek_syscall)
//! - [stat_syscall](crate::unixruntime::task::Task::stat_syscall)
//! - [lstat_syscall](crate::unixruntime::task::Task::lstat_syscall)
//! - [fstat_syscall](crate::unixruntime::task::Task::fstat_syscall)
//! - [mkdir_syscall](crate::unixruntime::task::Task::mkdir_syscall)
//! - [unlink_syscall](crate::unixruntime::task::Task::unlink_syscall)
//! - [chdir_syscall](crate::unixruntime::task::Task::chdir_syscall)
//! - [getcwd_syscall](crate::unixruntime::task::Task::getcwd_syscall)
//! - [getdents_syscall](crate::unixruntime::task::Task::getdents_syscall)
//! - [dup_syscall](crate::unixruntime::task::Task::dup_syscall)
//! - [dup2_syscall](crate::unixruntime::task::Task::dup2_syscall)
//! - [pipe_syscall](crate::unixruntime::task::Task::pipe_syscall)
//! - [fcntl_syscall](crate::unixruntime::task::Task::fcntl_syscall)
//! - [access_syscall](crate::unixruntime::task::Task::access_syscall)

use super::fs_constants::*;
use crate::interface::{self, syscall_error, Errno, StatData};
use crate::unixruntime::filesystem::{new_pipe_pair, OpenFile};
use crate::unixruntime::path;
use crate::unixruntime::task::{FdEntry, Task};
use std::sync::Arc;

// Pipes live in no filesystem; this only tells them apart in fstat.
static NEXT_PIPE_INODE: interface::RustAtomicU32 = interface::RustAtomicU32::new(1);

/// Read and write ends of a new pipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeArray {
    pub readfd: i32,
    pub writefd: i32,
}

impl Task {
    fn fd_or_ebadf(&self, fd: i32, syscall: &str) -> Result<Arc<dyn OpenFile>, i32> {
        self.get_fd(fd)
            .ok_or_else(|| syscall_error(Errno::EBADF, syscall, "invalid file descriptor"))
    }

    /// Normalized absolute form of a guest path.
    pub fn resolve_path(&self, path: &str) -> String {
        path::resolve(&self.cwd(), path)
    }

    /// ### Description
    ///
    /// `open_syscall` opens `path` through the mount table and installs the
    /// result in the lowest free descriptor.
    ///
    /// ### Errors
    ///
    /// * `ENOENT` - no such file and `O_CREAT` not given
    /// * `EEXIST` - `O_CREAT | O_EXCL` on an existing file
    /// * `EISDIR` - a directory opened for writing
    /// * `EACCES` - denied by the security manager
    /// * `EMFILE` - the descriptor table is full
    /// * `EROFS` - creating on the device filesystem
    ///
    /// [open(2)](https://man7.org/linux/man-pages/man2/open.2.html)
    pub fn open_syscall(&self, path: &str, flags: i32, mode: u32) -> i32 {
        let normalized = self.resolve_path(path);
        let file = match self.gs().open(self, &normalized, flags, mode) {
            Ok(f) => f,
            Err(e) => return e,
        };
        match self.install_fd(file, 0, false) {
            Ok(fd) => fd,
            Err(e) => e,
        }
    }

    pub fn close_syscall(&self, fd: i32) -> i32 {
        match self.close_fd(fd) {
            Ok(()) => 0,
            Err(e) => e,
        }
    }

    /// Reads into `buf`. Blocks on empty pipes and sockets.
    pub fn read_syscall(&self, fd: i32, buf: &mut [u8]) -> i32 {
        match self.fd_or_ebadf(fd, "read") {
            Ok(file) => file.read(buf),
            Err(e) => e,
        }
    }

    pub fn write_syscall(&self, fd: i32, buf: &[u8]) -> i32 {
        match self.fd_or_ebadf(fd, "write") {
            Ok(file) => file.write(buf),
            Err(e) => e,
        }
    }

    pub fn lseek_syscall(&self, fd: i32, offset: i32, whence: i32) -> i32 {
        match self.fd_or_ebadf(fd, "lseek") {
            Ok(file) => file.seek(offset as i64, whence),
            Err(e) => e,
        }
    }

    pub fn stat_syscall(&self, path: &str, statbuf: &mut StatData) -> i32 {
        match self.gs().stat(self, &self.resolve_path(path)) {
            Ok(stat) => {
                *statbuf = stat.to_stat_data();
                0
            }
            Err(e) => e,
        }
    }

    /// Like `stat_syscall` but does not follow a final symlink.
    pub fn lstat_syscall(&self, path: &str, statbuf: &mut StatData) -> i32 {
        match self.gs().lstat(self, &self.resolve_path(path)) {
            Ok(stat) => {
                *statbuf = stat.to_stat_data();
                0
            }
            Err(e) => e,
        }
    }

    pub fn fstat_syscall(&self, fd: i32, statbuf: &mut StatData) -> i32 {
        match self.fd_or_ebadf(fd, "fstat") {
            Ok(file) => {
                *statbuf = file.fstat().to_stat_data();
                0
            }
            Err(e) => e,
        }
    }

    pub fn mkdir_syscall(&self, path: &str, mode: u32) -> i32 {
        match self.gs().mkdir(self, &self.resolve_path(path), mode) {
            Ok(()) => 0,
            Err(e) => e,
        }
    }

    pub fn unlink_syscall(&self, path: &str) -> i32 {
        match self.gs().unlink(self, &self.resolve_path(path)) {
            Ok(()) => 0,
            Err(e) => e,
        }
    }

    /// ### Errors
    ///
    /// * `ENOENT` - no such directory
    /// * `ENOTDIR` - the path names something else
    pub fn chdir_syscall(&self, path: &str) -> i32 {
        let normalized = self.resolve_path(path);
        match self.gs().stat(self, &normalized) {
            Ok(stat) if stat.is_dir() => {
                self.set_cwd(normalized);
                0
            }
            Ok(_) => syscall_error(Errno::ENOTDIR, "chdir", "not a directory"),
            Err(e) => e,
        }
    }

    /// ### Description
    ///
    /// Writes `"/" + cwd` and a terminating NUL to the start of `buf`.
    /// The dispatcher returns the guest buffer address on success.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - `buf` is empty
    /// * `ERANGE` - the path and terminator do not fit
    ///
    /// [getcwd(3)](https://man7.org/linux/man-pages/man3/getcwd.3.html)
    pub fn getcwd_syscall(&self, buf: &mut [u8]) -> i32 {
        if buf.is_empty() {
            return syscall_error(Errno::EINVAL, "getcwd", "size of the specified buffer is 0");
        }
        let cwd = self.cwd();
        let length = cwd.len() + 2;
        if buf.len() < length {
            return syscall_error(Errno::ERANGE, "getcwd", "buffer too small for the working directory");
        }
        buf[0] = b'/';
        buf[1..length - 1].copy_from_slice(cwd.as_bytes());
        buf[length - 1] = 0;
        0
    }

    /// Fills `buf` with directory records; see
    /// [`parse_dirents`](crate::interface::parse_dirents) for the layout.
    /// Returns 0 once the directory is exhausted.
    pub fn getdents_syscall(&self, fd: i32, buf: &mut [u8]) -> i32 {
        match self.fd_or_ebadf(fd, "getdents") {
            Ok(file) => file.getdents(buf),
            Err(e) => e,
        }
    }

    /// Duplicates `fd` into the lowest free slot. The copy does not inherit
    /// close-on-exec.
    pub fn dup_syscall(&self, fd: i32) -> i32 {
        self.dup_from(fd, 0, "dup")
    }

    fn dup_from(&self, fd: i32, start: i32, syscall: &str) -> i32 {
        let mut table = self.fdtable.lock();
        let file = match table.get(fd) {
            Some(entry) => entry.file.clone(),
            None => return syscall_error(Errno::EBADF, syscall, "invalid file descriptor"),
        };
        match table.lowest_free(start) {
            Some(newfd) => {
                table.replace(newfd, FdEntry { file, cloexec: false });
                newfd
            }
            None => syscall_error(Errno::EMFILE, syscall, "descriptor table is full"),
        }
    }

    /// ### Description
    ///
    /// Makes `newfd` refer to the same open file as `oldfd`, closing
    /// whatever `newfd` held. The check, the close and the install happen
    /// under one hold of the table lock, so sibling syscalls never see
    /// `newfd` empty in between. The displaced file is released after the
    /// lock is dropped.
    ///
    /// ### Returns
    ///
    /// 0 on success.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `oldfd` is not open or `newfd` is out of range
    ///
    /// [dup2(2)](https://man7.org/linux/man-pages/man2/dup2.2.html)
    pub fn dup2_syscall(&self, oldfd: i32, newfd: i32) -> i32 {
        if newfd < 0 || newfd as usize >= OPEN_MAX {
            return syscall_error(Errno::EBADF, "dup2", "provided file descriptor is out of range");
        }
        let displaced = {
            let mut table = self.fdtable.lock();
            let file = match table.get(oldfd) {
                Some(entry) => entry.file.clone(),
                None => return syscall_error(Errno::EBADF, "dup2", "invalid old file descriptor"),
            };
            if oldfd == newfd {
                return 0;
            }
            table.replace(newfd, FdEntry { file, cloexec: false })
        };
        drop(displaced);
        0
    }

    /// ### Description
    ///
    /// Creates a pipe and stores its read and write descriptors in
    /// `pipefd`.
    ///
    /// ### Errors
    ///
    /// * `EMFILE` - fewer than two free descriptors
    ///
    /// [pipe(2)](https://man7.org/linux/man-pages/man2/pipe.2.html)
    pub fn pipe_syscall(&self, pipefd: &mut PipeArray) -> i32 {
        let inode = NEXT_PIPE_INODE.fetch_add(1, interface::RustAtomicOrdering::Relaxed);
        let (reader, writer) = new_pipe_pair(inode);
        let mut table = self.fdtable.lock();
        let readfd = match table.lowest_free(0) {
            Some(fd) => fd,
            None => return syscall_error(Errno::EMFILE, "pipe", "descriptor table is full"),
        };
        let writefd = match table.lowest_free(readfd + 1) {
            Some(fd) => fd,
            None => return syscall_error(Errno::EMFILE, "pipe", "descriptor table is full"),
        };
        table.replace(readfd, FdEntry { file: Arc::new(reader), cloexec: false });
        table.replace(writefd, FdEntry { file: Arc::new(writer), cloexec: false });
        pipefd.readfd = readfd;
        pipefd.writefd = writefd;
        0
    }

    /// ### Description
    ///
    /// Supports `F_DUPFD`, `F_GETFD`/`F_SETFD` (the close-on-exec flag) and
    /// `F_GETFL`/`F_SETFL` (`O_APPEND` and `O_NONBLOCK`).
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `fd` is not open
    /// * `EINVAL` - unknown command or `F_DUPFD` start out of range
    ///
    /// [fcntl(2)](https://man7.org/linux/man-pages/man2/fcntl.2.html)
    pub fn fcntl_syscall(&self, fd: i32, cmd: i32, arg: i32) -> i32 {
        match cmd {
            F_DUPFD => {
                if arg < 0 || arg as usize >= OPEN_MAX {
                    return syscall_error(Errno::EINVAL, "fcntl", "start descriptor out of range");
                }
                self.dup_from(fd, arg, "fcntl")
            }
            F_GETFD => match self.fdtable.lock().get(fd) {
                Some(entry) => {
                    if entry.cloexec {
                        FD_CLOEXEC
                    } else {
                        0
                    }
                }
                None => syscall_error(Errno::EBADF, "fcntl", "invalid file descriptor"),
            },
            F_SETFD => match self.fdtable.lock().get_mut(fd) {
                Some(entry) => {
                    entry.cloexec = arg & FD_CLOEXEC != 0;
                    0
                }
                None => syscall_error(Errno::EBADF, "fcntl", "invalid file descriptor"),
            },
            F_GETFL => match self.fd_or_ebadf(fd, "fcntl") {
                Ok(file) => file.flags(),
                Err(e) => e,
            },
            F_SETFL => match self.fd_or_ebadf(fd, "fcntl") {
                Ok(file) => match file.set_status_flags(arg) {
                    Ok(()) => 0,
                    Err(e) => e,
                },
                Err(e) => e,
            },
            _ => syscall_error(Errno::EINVAL, "fcntl", "unsupported command"),
        }
    }

    /// Existence check plus a coarse check against the owner permission
    /// bits.
    pub fn access_syscall(&self, path: &str, amode: i32) -> i32 {
        if amode & !(R_OK | W_OK | X_OK) != 0 {
            return syscall_error(Errno::EINVAL, "access", "invalid mode");
        }
        let stat = match self.gs().stat(self, &self.resolve_path(path)) {
            Ok(stat) => stat,
            Err(e) => return e,
        };
        let owner = (stat.mode >> 6) & 0o7;
        let wanted = ((amode & R_OK != 0) as u32) << 2 | ((amode & W_OK != 0) as u32) << 1 | (amode & X_OK != 0) as u32;
        if owner & wanted != wanted {
            return syscall_error(Errno::EACCES, "access", "permission denied");
        }
        0
    }
}
