//! Host filesystem bridge.
//!
//! Maps backend-relative paths onto a directory of the host filesystem.
//! Inode numbers are handed out on first sight of a host path and cached so
//! repeated stats of one file agree.

use super::{DirectoryHandle, FStat, FileKind, FilesystemBackend, HostFile, OpenFile};
use crate::interface::{self, host_error, syscall_error, Errno, RustPath, RustPathBuf};
use crate::unixruntime::syscalls::fs_constants::*;
use crate::unixruntime::task::Task;
use std::fs::{self, DirBuilder, Metadata};
use std::io;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::sync::Arc;

const FIRST_INODE: u32 = 2;

pub struct HostFilesystem {
    root: RustPathBuf,
    inodes: interface::RustDashMap<RustPathBuf, u32>,
    next_inode: interface::RustAtomicU32,
    devno: interface::RustAtomicU32,
}

impl HostFilesystem {
    pub fn new<P: AsRef<RustPath>>(root: P) -> HostFilesystem {
        HostFilesystem {
            root: root.as_ref().to_path_buf(),
            inodes: interface::RustDashMap::new(),
            next_inode: interface::RustAtomicU32::new(FIRST_INODE),
            devno: interface::RustAtomicU32::new(0),
        }
    }

    pub fn root(&self) -> &RustPath {
        &self.root
    }

    fn host_path(&self, path: &str) -> RustPathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    /// Stable inode number for a host path.
    pub fn inode(&self, host: &RustPath) -> u32 {
        *self
            .inodes
            .entry(host.to_path_buf())
            .or_insert_with(|| self.next_inode.fetch_add(1, interface::RustAtomicOrdering::Relaxed))
    }

    fn fstat_from(&self, host: &RustPath, meta: &Metadata) -> FStat {
        let ft = meta.file_type();
        let kind = if ft.is_dir() {
            FileKind::Directory
        } else if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_file() {
            FileKind::Regular
        } else {
            use std::os::unix::fs::FileTypeExt;
            if ft.is_fifo() {
                FileKind::Fifo
            } else if ft.is_socket() {
                FileKind::Socket
            } else {
                FileKind::CharDevice
            }
        };
        FStat {
            kind,
            mode: meta.permissions().mode() & 0o7777,
            nlink: meta.nlink() as u32,
            inode: self.inode(host),
            dev: self.devno(),
            size: meta.len(),
            mtime: interface::mtime_nanos(meta),
        }
    }

    fn stat_with(
        &self,
        task: &Task,
        path: &str,
        lookup: fn(&RustPath) -> io::Result<Metadata>,
        syscall: &str,
    ) -> Result<Option<FStat>, i32> {
        if let Some(sm) = task.security() {
            if !sm.allow_stat(path) {
                return Ok(None);
            }
        }
        let host = self.host_path(path);
        match lookup(&host) {
            Ok(meta) => Ok(Some(self.fstat_from(&host, &meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(host_error(&e, syscall)),
        }
    }

    fn open_directory(&self, path: &str, host: &RustPath, meta: &Metadata) -> Result<Arc<dyn OpenFile>, i32> {
        let mut names = Vec::new();
        let listing = fs::read_dir(host).map_err(|e| host_error(&e, "open"))?;
        for entry in listing {
            let entry = entry.map_err(|e| host_error(&e, "open"))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let entries = names
            .into_iter()
            .map(|name| (self.inode(&host.join(&name)), name))
            .collect();
        let self_inode = self.inode(host);
        let parent_inode = if path.is_empty() {
            self_inode
        } else {
            self.inode(&self.host_path(crate::unixruntime::path::parent(path)))
        };
        let stat = self.fstat_from(host, meta);
        Ok(Arc::new(DirectoryHandle::new(stat, Some(self_inode), Some(parent_inode), entries)))
    }
}

impl FilesystemBackend for HostFilesystem {
    fn open(&self, task: &Task, path: &str, flags: i32, mode: u32) -> Result<Option<Arc<dyn OpenFile>>, i32> {
        let accmode = flags & O_ACCMODE;
        let wants_write = accmode != O_RDONLY || flags & (O_CREAT | O_TRUNC) != 0;
        if let Some(sm) = task.security() {
            let allowed = if wants_write {
                sm.allow_write(path)
            } else {
                sm.allow_read(path)
            };
            if !allowed {
                return Err(syscall_error(Errno::EACCES, "open", "access denied by security manager"));
            }
        }

        let host = self.host_path(path);
        let existing = match fs::metadata(&host) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(host_error(&e, "open")),
        };

        match &existing {
            Some(_) if flags & O_CREAT != 0 && flags & O_EXCL != 0 => {
                return Err(syscall_error(Errno::EEXIST, "open", "file already exists"));
            }
            Some(meta) if meta.is_dir() => {
                if accmode != O_RDONLY {
                    return Err(syscall_error(Errno::EISDIR, "open", "cannot open a directory for writing"));
                }
                return self.open_directory(path, &host, meta).map(Some);
            }
            None if flags & O_CREAT == 0 => return Ok(None),
            _ => {}
        }

        let open_mode = interface::OpenMode {
            read: accmode != O_WRONLY,
            write: accmode != O_RDONLY,
            append: flags & O_APPEND != 0,
            create: flags & O_CREAT != 0,
            truncate: flags & O_TRUNC != 0,
            exclusive: flags & O_EXCL != 0,
            mode,
        };
        let file = interface::EmulatedFile::open(&host, open_mode).map_err(|e| host_error(&e, "open"))?;
        let inode = self.inode(&host);
        let kept_flags = flags & (O_ACCMODE | O_SETFL_MASK);
        Ok(Some(Arc::new(HostFile::new(file, kept_flags, inode, self.devno()))))
    }

    fn stat(&self, task: &Task, path: &str) -> Result<Option<FStat>, i32> {
        self.stat_with(task, path, |p| fs::metadata(p), "stat")
    }

    fn lstat(&self, task: &Task, path: &str) -> Result<Option<FStat>, i32> {
        self.stat_with(task, path, |p| fs::symlink_metadata(p), "lstat")
    }

    fn mkdir(&self, task: &Task, path: &str, mode: u32) -> Result<(), i32> {
        if let Some(sm) = task.security() {
            if !sm.allow_write(path) {
                return Err(syscall_error(Errno::EACCES, "mkdir", "access denied by security manager"));
            }
        }
        let host = self.host_path(path);
        match fs::metadata(&host) {
            Ok(meta) if meta.is_dir() => {
                return Err(syscall_error(Errno::EEXIST, "mkdir", "directory already exists"));
            }
            Ok(_) => return Err(syscall_error(Errno::ENOTDIR, "mkdir", "path exists and is not a directory")),
            Err(_) => {}
        }
        if let Some(parent) = host.parent() {
            match fs::metadata(parent) {
                Ok(meta) if meta.is_dir() => {}
                _ => {
                    return Err(syscall_error(Errno::ENOTDIR, "mkdir", "parent is missing or not a directory"));
                }
            }
        }
        let mode = if mode == 0 { S_IRWXA } else { mode & 0o7777 };
        DirBuilder::new()
            .mode(mode)
            .create(&host)
            .map_err(|e| syscall_error(Errno::EIO, "mkdir", &e.to_string()))
    }

    fn unlink(&self, task: &Task, path: &str) -> Result<(), i32> {
        if let Some(sm) = task.security() {
            if !sm.allow_unlink(path) {
                return Err(syscall_error(Errno::EPERM, "unlink", "unlink denied by security manager"));
            }
        }
        let host = self.host_path(path);
        match fs::symlink_metadata(&host) {
            Ok(meta) if meta.is_dir() => {
                return Err(syscall_error(Errno::EISDIR, "unlink", "cannot unlink a directory"));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(syscall_error(Errno::ENOENT, "unlink", "no such file"));
            }
            Err(e) => return Err(host_error(&e, "unlink")),
        }
        fs::remove_file(&host).map_err(|e| host_error(&e, "unlink"))?;
        self.inodes.remove(&host);
        Ok(())
    }

    fn devno(&self) -> u32 {
        self.devno.load(interface::RustAtomicOrdering::Relaxed)
    }

    fn set_devno(&self, devno: u32) {
        self.devno.store(devno, interface::RustAtomicOrdering::Relaxed);
    }
}
