//! Synthetic device filesystem, normally mounted at `/dev`.
//!
//! Entries: `null`, `zero`, and `fd`, a directory of the calling task's open
//! descriptors where `fd/<n>` refers to descriptor `n` itself.

use super::{DirectoryHandle, FStat, FileKind, FilesystemBackend, NullDevice, OpenFile, ZeroDevice};
use crate::interface::{self, syscall_error, Errno};
use crate::unixruntime::syscalls::fs_constants::*;
use crate::unixruntime::task::Task;
use std::sync::Arc;

const ROOT_INODE: u32 = 1;
const NULL_INODE: u32 = 2;
const ZERO_INODE: u32 = 3;
const FD_INODE: u32 = 4;
const FD_INODE_BASE: u32 = 32;

#[derive(Debug, PartialEq, Eq)]
enum DevNode {
    Root,
    Null,
    Zero,
    FdDir,
    Fd(i32),
}

fn lookup(path: &str) -> Option<DevNode> {
    match path {
        "" => Some(DevNode::Root),
        "null" => Some(DevNode::Null),
        "zero" => Some(DevNode::Zero),
        "fd" => Some(DevNode::FdDir),
        _ => {
            let n = path.strip_prefix("fd/")?;
            // reject forms like "+1" or "01" that parse but name nothing
            if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) || (n.len() > 1 && n.starts_with('0')) {
                return None;
            }
            n.parse::<i32>().ok().map(DevNode::Fd)
        }
    }
}

#[derive(Default)]
pub struct DeviceFilesystem {
    devno: interface::RustAtomicU32,
}

impl DeviceFilesystem {
    pub fn new() -> DeviceFilesystem {
        DeviceFilesystem::default()
    }

    fn node_stat(&self, node: &DevNode) -> FStat {
        let dev = self.devno();
        match node {
            DevNode::Root => FStat::synthetic(FileKind::Directory, 0o555, ROOT_INODE, dev),
            DevNode::FdDir => FStat::synthetic(FileKind::Directory, 0o555, FD_INODE, dev),
            DevNode::Null => FStat::synthetic(FileKind::CharDevice, 0o666, NULL_INODE, dev),
            DevNode::Zero => FStat::synthetic(FileKind::CharDevice, 0o666, ZERO_INODE, dev),
            DevNode::Fd(n) => FStat::synthetic(FileKind::CharDevice, 0o666, FD_INODE_BASE + *n as u32, dev),
        }
    }
}

impl FilesystemBackend for DeviceFilesystem {
    fn open(&self, task: &Task, path: &str, flags: i32, _mode: u32) -> Result<Option<Arc<dyn OpenFile>>, i32> {
        let node = match lookup(path) {
            Some(node) => node,
            None => return Ok(None),
        };
        let accmode = flags & O_ACCMODE;
        let stat = self.node_stat(&node);
        match node {
            DevNode::Null => Ok(Some(Arc::new(NullDevice { stat, flags: accmode }))),
            DevNode::Zero => Ok(Some(Arc::new(ZeroDevice { stat, flags: accmode }))),
            DevNode::Fd(n) => Ok(task.get_fd(n)),
            DevNode::Root | DevNode::FdDir if accmode != O_RDONLY => {
                Err(syscall_error(Errno::EISDIR, "open", "cannot open a directory for writing"))
            }
            DevNode::Root => {
                let entries = vec![
                    (NULL_INODE, "null".to_string()),
                    (ZERO_INODE, "zero".to_string()),
                    (FD_INODE, "fd".to_string()),
                ];
                Ok(Some(Arc::new(DirectoryHandle::new(stat, Some(ROOT_INODE), None, entries))))
            }
            DevNode::FdDir => {
                let entries = task
                    .open_fds()
                    .into_iter()
                    .map(|fd| (FD_INODE_BASE + fd as u32, fd.to_string()))
                    .collect();
                Ok(Some(Arc::new(DirectoryHandle::new(stat, Some(FD_INODE), Some(ROOT_INODE), entries))))
            }
        }
    }

    fn stat(&self, task: &Task, path: &str) -> Result<Option<FStat>, i32> {
        match lookup(path) {
            Some(DevNode::Fd(n)) => Ok(task.get_fd(n).map(|f| f.fstat())),
            Some(node) => Ok(Some(self.node_stat(&node))),
            None => Ok(None),
        }
    }

    fn mkdir(&self, _task: &Task, _path: &str, _mode: u32) -> Result<(), i32> {
        Err(syscall_error(Errno::EROFS, "mkdir", "device filesystem is read-only"))
    }

    fn unlink(&self, _task: &Task, _path: &str) -> Result<(), i32> {
        Err(syscall_error(Errno::EROFS, "unlink", "device filesystem is read-only"))
    }

    fn devno(&self) -> u32 {
        self.devno.load(interface::RustAtomicOrdering::Relaxed)
    }

    fn set_devno(&self, devno: u32) {
        self.devno.store(devno, interface::RustAtomicOrdering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_names() {
        assert_eq!(lookup(""), Some(DevNode::Root));
        assert_eq!(lookup("null"), Some(DevNode::Null));
        assert_eq!(lookup("fd/12"), Some(DevNode::Fd(12)));
        assert_eq!(lookup("fd/"), None);
        assert_eq!(lookup("fd/+1"), None);
        assert_eq!(lookup("fd/01"), None);
        assert_eq!(lookup("tty"), None);
    }
}
