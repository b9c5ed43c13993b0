//! Virtual filesystem capabilities.
//!
//! A mounted filesystem implements [`FilesystemBackend`]; every object a
//! descriptor can refer to implements [`OpenFile`]. Descriptors are
//! `Arc<dyn OpenFile>` so `dup`, `fork` and `/dev/fd/<n>` share one open
//! file description, and the resource is released when the last reference
//! drops.

pub mod devfs;
pub mod files;
pub mod hostfs;

pub use devfs::DeviceFilesystem;
pub use files::*;
pub use hostfs::HostFilesystem;

use crate::interface::{self, syscall_error, Errno, StatData};
use crate::unixruntime::syscalls::fs_constants::*;
use crate::unixruntime::task::Task;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    CharDevice,
    Regular,
    Fifo,
    Socket,
    Symlink,
}

impl FileKind {
    pub fn type_bits(&self) -> u32 {
        match self {
            FileKind::Directory => S_IFDIR,
            FileKind::CharDevice => S_IFCHR,
            FileKind::Regular => S_IFREG,
            FileKind::Fifo => S_IFIFO,
            FileKind::Socket => S_IFSOCK,
            FileKind::Symlink => S_IFLNK,
        }
    }
}

/// Metadata snapshot returned by stat, lstat and fstat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FStat {
    pub kind: FileKind,
    /// Permission bits only; the type comes from `kind`.
    pub mode: u32,
    pub nlink: u32,
    pub inode: u32,
    pub dev: u32,
    pub size: u64,
    /// Nanoseconds since the epoch.
    pub mtime: u64,
}

impl FStat {
    pub fn synthetic(kind: FileKind, mode: u32, inode: u32, dev: u32) -> FStat {
        FStat {
            kind,
            mode,
            nlink: 1,
            inode,
            dev,
            size: 0,
            mtime: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn to_stat_data(&self) -> StatData {
        let size = self.size.min(u32::MAX as u64) as u32;
        let mtime = (self.mtime / 1_000_000_000).min(u32::MAX as u64) as u32;
        StatData {
            st_dev: self.dev,
            st_ino: self.inode,
            st_mode: self.kind.type_bits() | (self.mode & 0o7777),
            st_nlink: self.nlink,
            st_uid: 0,
            st_gid: 0,
            st_rdev: 0,
            st_size: size,
            st_atime: mtime,
            st_mtime: mtime,
            st_ctime: mtime,
            st_blksize: DEFAULT_BLKSIZE,
            st_blocks: (size + DEFAULT_BLKSIZE - 1) / DEFAULT_BLKSIZE,
        }
    }
}

/// An open file description. Operations return a non-negative count or a
/// negative errno, like the syscalls they back.
pub trait OpenFile: Send + Sync {
    fn read(&self, _buf: &mut [u8]) -> i32 {
        syscall_error(Errno::EBADF, "read", "descriptor not open for reading")
    }

    fn write(&self, _buf: &[u8]) -> i32 {
        syscall_error(Errno::EBADF, "write", "descriptor not open for writing")
    }

    fn seek(&self, _offset: i64, _whence: i32) -> i32 {
        syscall_error(Errno::ESPIPE, "lseek", "descriptor is not seekable")
    }

    /// Fills `buf` with getdents records.
    fn getdents(&self, _buf: &mut [u8]) -> i32 {
        syscall_error(Errno::ENOTDIR, "getdents", "descriptor is not a directory")
    }

    fn fstat(&self) -> FStat;

    /// Open flags (access mode plus status flags).
    fn flags(&self) -> i32;

    /// Replaces the status flags F_SETFL may change.
    fn set_status_flags(&self, _flags: i32) -> Result<(), i32> {
        Ok(())
    }

    fn as_socket(&self) -> Option<&interface::HostSocket> {
        None
    }
}

/// Optional per-task permission hook consulted by the backends.
pub trait SecurityManager: Send + Sync {
    fn allow_read(&self, _path: &str) -> bool {
        true
    }
    fn allow_write(&self, _path: &str) -> bool {
        true
    }
    fn allow_stat(&self, _path: &str) -> bool {
        true
    }
    fn allow_unlink(&self, _path: &str) -> bool {
        true
    }
}

/// A mountable filesystem. Paths are relative to the mount point, normalized,
/// with no leading slash; the mount point itself is `""`.
///
/// `Ok(None)` from `open`, `stat` or `lstat` means "no such file" and is
/// reported to the guest as ENOENT by the mount table.
pub trait FilesystemBackend: Send + Sync {
    fn open(&self, task: &Task, path: &str, flags: i32, mode: u32) -> Result<Option<Arc<dyn OpenFile>>, i32>;

    fn stat(&self, task: &Task, path: &str) -> Result<Option<FStat>, i32>;

    fn lstat(&self, task: &Task, path: &str) -> Result<Option<FStat>, i32> {
        self.stat(task, path)
    }

    fn mkdir(&self, task: &Task, path: &str, mode: u32) -> Result<(), i32>;

    fn unlink(&self, task: &Task, path: &str) -> Result<(), i32>;

    /// Device number assigned by the mount table.
    fn devno(&self) -> u32;

    fn set_devno(&self, devno: u32);
}

/// A directory listing captured at open time. Positions -2 and -1 are `.`
/// and `..`, then the entries in order.
pub struct DirectoryHandle {
    entries: Vec<(u32, String)>,
    self_inode: Option<u32>,
    parent_inode: Option<u32>,
    pos: interface::RustMutex<i64>,
    stat: FStat,
}

impl DirectoryHandle {
    pub fn new(
        stat: FStat,
        self_inode: Option<u32>,
        parent_inode: Option<u32>,
        entries: Vec<(u32, String)>,
    ) -> DirectoryHandle {
        DirectoryHandle {
            entries,
            self_inode,
            parent_inode,
            pos: interface::RustMutex::new(-2),
            stat,
        }
    }

    fn entry_at(&self, pos: i64) -> Option<(u32, &str)> {
        match pos {
            -2 => self.self_inode.map(|i| (i, ".")),
            -1 => self.parent_inode.map(|i| (i, "..")),
            n => self.entries.get(n as usize).map(|(i, name)| (*i, name.as_str())),
        }
    }
}

impl OpenFile for DirectoryHandle {
    fn read(&self, _buf: &mut [u8]) -> i32 {
        syscall_error(Errno::EISDIR, "read", "descriptor is a directory")
    }

    fn getdents(&self, buf: &mut [u8]) -> i32 {
        let mut pos = self.pos.lock();
        let mut out = Vec::with_capacity(buf.len());
        while *pos < self.entries.len() as i64 {
            if let Some((inode, name)) = self.entry_at(*pos) {
                if out.len() + interface::dirent_reclen(name) > buf.len() {
                    break;
                }
                interface::encode_dirent(&mut out, inode, name);
            }
            *pos += 1;
        }
        if out.is_empty() && *pos < self.entries.len() as i64 {
            return syscall_error(Errno::EINVAL, "getdents", "buffer too small for the next entry");
        }
        buf[..out.len()].copy_from_slice(&out);
        out.len() as i32
    }

    fn fstat(&self) -> FStat {
        self.stat
    }

    fn flags(&self) -> i32 {
        O_RDONLY
    }
}
