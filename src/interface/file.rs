// File related interface
//
// Host files behind guest descriptors. The cursor is the host file's own
// offset, so every descriptor sharing one `EmulatedFile` shares the offset.

use parking_lot::Mutex;
use std::fs::{File, Metadata, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::io::{self, Read, Seek, SeekFrom, Write};
pub use std::path::{Path as RustPath, PathBuf as RustPathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
    /// Permission bits for a newly created file.
    pub mode: u32,
}

impl OpenMode {
    fn writable(&self) -> bool {
        self.write || self.append
    }

    fn options(&self) -> OpenOptions {
        let mut opts = OpenOptions::new();
        opts.read(self.read || !self.writable())
            .write(self.write && !self.append)
            .append(self.append)
            .mode(creation_mode(self.mode));
        if self.writable() {
            if self.exclusive && self.create {
                opts.create_new(true);
            } else {
                opts.create(self.create);
            }
        }
        // the host refuses truncation in append mode
        if self.truncate && self.write && !self.append {
            opts.truncate(true);
        }
        opts
    }
}

// mode 0 would leave a file the runtime itself cannot reopen
fn creation_mode(mode: u32) -> u32 {
    if mode == 0 {
        0o666
    } else {
        mode & 0o7777
    }
}

pub struct EmulatedFile {
    file: Mutex<File>,
}

impl EmulatedFile {
    pub fn open(path: &RustPath, mode: OpenMode) -> io::Result<EmulatedFile> {
        // the host cannot create through a read-only handle
        if mode.create && !mode.writable() {
            let mut create = OpenOptions::new();
            create.write(true).mode(creation_mode(mode.mode));
            if mode.exclusive {
                create.create_new(true);
            } else {
                create.create(true);
            }
            create.open(path)?;
        }
        let file = mode.options().open(path)?;
        Ok(EmulatedFile {
            file: Mutex::new(file),
        })
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.lock().read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    pub fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        self.file.lock().seek(pos)
    }

    pub fn metadata(&self) -> io::Result<Metadata> {
        self.file.lock().metadata()
    }
}

/// Nanoseconds since the epoch; pre-epoch and unsupported stamps read as 0.
pub fn mtime_nanos(meta: &Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}
