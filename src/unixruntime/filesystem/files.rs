// Open file descriptions that are not directories

use super::{FStat, FileKind, OpenFile};
use crate::interface::{self, host_error, mtime_nanos, syscall_error, Errno};
use crate::unixruntime::syscalls::fs_constants::*;
use std::io::SeekFrom;
use std::sync::Arc;

/// A regular host file opened through `HostFilesystem`.
pub struct HostFile {
    file: interface::EmulatedFile,
    flags: interface::RustAtomicI32,
    inode: u32,
    dev: u32,
}

impl HostFile {
    pub fn new(file: interface::EmulatedFile, flags: i32, inode: u32, dev: u32) -> HostFile {
        HostFile {
            file,
            flags: interface::RustAtomicI32::new(flags),
            inode,
            dev,
        }
    }
}

impl OpenFile for HostFile {
    fn read(&self, buf: &mut [u8]) -> i32 {
        if self.flags() & O_ACCMODE == O_WRONLY {
            return syscall_error(Errno::EBADF, "read", "file not open for reading");
        }
        match self.file.read(buf) {
            Ok(n) => n as i32,
            Err(e) => host_error(&e, "read"),
        }
    }

    fn write(&self, buf: &[u8]) -> i32 {
        if self.flags() & O_ACCMODE == O_RDONLY {
            return syscall_error(Errno::EBADF, "write", "file not open for writing");
        }
        match self.file.write(buf) {
            Ok(n) => n as i32,
            Err(e) => host_error(&e, "write"),
        }
    }

    fn seek(&self, offset: i64, whence: i32) -> i32 {
        let pos = match whence {
            SEEK_SET => {
                if offset < 0 {
                    return syscall_error(Errno::EINVAL, "lseek", "negative offset");
                }
                SeekFrom::Start(offset as u64)
            }
            SEEK_CUR => SeekFrom::Current(offset),
            SEEK_END => SeekFrom::End(offset),
            _ => return syscall_error(Errno::EINVAL, "lseek", "invalid whence"),
        };
        match self.file.seek(pos) {
            Ok(n) if n > i32::MAX as u64 => syscall_error(Errno::EOVERFLOW, "lseek", "offset does not fit"),
            Ok(n) => n as i32,
            Err(e) => host_error(&e, "lseek"),
        }
    }

    fn fstat(&self) -> FStat {
        let (size, mtime, mode) = match self.file.metadata() {
            Ok(meta) => {
                use std::os::unix::fs::PermissionsExt;
                (meta.len(), mtime_nanos(&meta), meta.permissions().mode() & 0o7777)
            }
            Err(_) => (0, 0, 0o644),
        };
        FStat {
            kind: FileKind::Regular,
            mode,
            nlink: 1,
            inode: self.inode,
            dev: self.dev,
            size,
            mtime,
        }
    }

    fn flags(&self) -> i32 {
        self.flags.load(interface::RustAtomicOrdering::Relaxed)
    }

    fn set_status_flags(&self, flags: i32) -> Result<(), i32> {
        let current = self.flags();
        let updated = (current & !O_SETFL_MASK) | (flags & O_SETFL_MASK);
        self.flags.store(updated, interface::RustAtomicOrdering::Relaxed);
        Ok(())
    }
}

fn pipe_stat(inode: u32) -> FStat {
    FStat::synthetic(FileKind::Fifo, 0o600, inode, 0)
}

/// Read end of a pipe. Dropping the last reference closes the end.
pub struct PipeReader {
    pipe: Arc<interface::EmulatedPipe>,
    flags: interface::RustAtomicI32,
    inode: u32,
}

/// Write end of a pipe. Dropping the last reference closes the end.
pub struct PipeWriter {
    pipe: Arc<interface::EmulatedPipe>,
    flags: interface::RustAtomicI32,
    inode: u32,
}

/// Creates both ends of a fresh pipe. `inode` only identifies the pipe in
/// fstat output.
pub fn new_pipe_pair(inode: u32) -> (PipeReader, PipeWriter) {
    let pipe = Arc::new(interface::new_pipe());
    (
        PipeReader {
            pipe: pipe.clone(),
            flags: interface::RustAtomicI32::new(O_RDONLY),
            inode,
        },
        PipeWriter {
            pipe,
            flags: interface::RustAtomicI32::new(O_WRONLY),
            inode,
        },
    )
}

impl OpenFile for PipeReader {
    fn read(&self, buf: &mut [u8]) -> i32 {
        let nonblocking = self.flags() & O_NONBLOCK != 0;
        self.pipe.read_from_pipe(buf, nonblocking)
    }

    fn fstat(&self) -> FStat {
        let mut stat = pipe_stat(self.inode);
        stat.size = self.pipe.len() as u64;
        stat
    }

    fn flags(&self) -> i32 {
        self.flags.load(interface::RustAtomicOrdering::Relaxed)
    }

    fn set_status_flags(&self, flags: i32) -> Result<(), i32> {
        self.flags.store(O_RDONLY | (flags & O_NONBLOCK), interface::RustAtomicOrdering::Relaxed);
        Ok(())
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.pipe.close_read();
    }
}

impl OpenFile for PipeWriter {
    fn write(&self, buf: &[u8]) -> i32 {
        let nonblocking = self.flags() & O_NONBLOCK != 0;
        self.pipe.write_to_pipe(buf, nonblocking)
    }

    fn fstat(&self) -> FStat {
        pipe_stat(self.inode)
    }

    fn flags(&self) -> i32 {
        self.flags.load(interface::RustAtomicOrdering::Relaxed)
    }

    fn set_status_flags(&self, flags: i32) -> Result<(), i32> {
        self.flags.store(O_WRONLY | (flags & O_NONBLOCK), interface::RustAtomicOrdering::Relaxed);
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.pipe.close_write();
    }
}

/// A stream socket; listening and connected roles share this handle.
pub struct SocketFile {
    socket: interface::HostSocket,
    flags: interface::RustAtomicI32,
}

impl SocketFile {
    pub fn new(socket: interface::HostSocket) -> SocketFile {
        SocketFile {
            socket,
            flags: interface::RustAtomicI32::new(O_RDWR),
        }
    }
}

impl OpenFile for SocketFile {
    fn read(&self, buf: &mut [u8]) -> i32 {
        match self.socket.read(buf) {
            Ok(n) => n as i32,
            Err(e) => host_error(&e, "read"),
        }
    }

    fn write(&self, buf: &[u8]) -> i32 {
        match self.socket.write(buf) {
            Ok(n) => n as i32,
            Err(e) => host_error(&e, "write"),
        }
    }

    fn fstat(&self) -> FStat {
        FStat::synthetic(FileKind::Socket, 0o600, 0, 0)
    }

    fn flags(&self) -> i32 {
        self.flags.load(interface::RustAtomicOrdering::Relaxed)
    }

    fn set_status_flags(&self, flags: i32) -> Result<(), i32> {
        if let Err(e) = self.socket.set_nonblocking(flags & O_NONBLOCK != 0) {
            return Err(host_error(&e, "fcntl"));
        }
        self.flags.store(O_RDWR | (flags & O_NONBLOCK), interface::RustAtomicOrdering::Relaxed);
        Ok(())
    }

    fn as_socket(&self) -> Option<&interface::HostSocket> {
        Some(&self.socket)
    }
}

/// `/dev/null`: reads hit end of file, writes vanish.
pub struct NullDevice {
    pub stat: FStat,
    pub flags: i32,
}

impl OpenFile for NullDevice {
    fn read(&self, _buf: &mut [u8]) -> i32 {
        0
    }

    fn write(&self, buf: &[u8]) -> i32 {
        buf.len() as i32
    }

    fn seek(&self, _offset: i64, _whence: i32) -> i32 {
        0
    }

    fn fstat(&self) -> FStat {
        self.stat
    }

    fn flags(&self) -> i32 {
        self.flags
    }
}

/// `/dev/zero`: reads fill the buffer with zeros, writes vanish.
pub struct ZeroDevice {
    pub stat: FStat,
    pub flags: i32,
}

impl OpenFile for ZeroDevice {
    fn read(&self, buf: &mut [u8]) -> i32 {
        buf.fill(0);
        buf.len() as i32
    }

    fn write(&self, buf: &[u8]) -> i32 {
        buf.len() as i32
    }

    fn seek(&self, _offset: i64, _whence: i32) -> i32 {
        0
    }

    fn fstat(&self) -> FStat {
        self.stat
    }

    fn flags(&self) -> i32 {
        self.flags
    }
}
