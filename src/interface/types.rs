// Guest data layouts and argument extraction
//
// Guest memory is big-endian and addressed with 32-bit words. Everything that
// crosses the syscall boundary as a pointer is copied in or out through the
// `GuestMemory` capability of the execution unit.

use crate::interface::errnos::{syscall_error, Errno};

/// Longest path accepted from the guest, terminator excluded.
pub const PATH_MAX: usize = 1024;
/// Longest single argv/envp string accepted by exec.
pub const ARG_MAX: usize = 128 * 1024;
/// Most argv/envp entries accepted by exec.
pub const ARGV_MAX: usize = 1024;

/// Size of the newlib `struct stat` written by stat/lstat/fstat.
pub const STAT_SIZE: usize = 60;
pub const DIRENT_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFault {
    pub addr: u32,
}

/// Byte-addressed access to an execution unit's address space.
pub trait GuestMemory {
    fn read_memory(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryFault>;
    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryFault>;
}

fn fault(syscall: &str, f: MemoryFault) -> i32 {
    syscall_error(
        Errno::EFAULT,
        syscall,
        &format!("guest address {:#x} is not mapped", f.addr),
    )
}

pub fn copy_in<M: GuestMemory + ?Sized>(mem: &M, addr: u32, len: usize, syscall: &str) -> Result<Vec<u8>, i32> {
    let mut buf = vec![0u8; len];
    if len > 0 {
        mem.read_memory(addr, &mut buf).map_err(|f| fault(syscall, f))?;
    }
    Ok(buf)
}

pub fn copy_out<M: GuestMemory + ?Sized>(mem: &mut M, addr: u32, data: &[u8], syscall: &str) -> Result<(), i32> {
    if data.is_empty() {
        return Ok(());
    }
    mem.write_memory(addr, data).map_err(|f| fault(syscall, f))
}

pub fn read_word<M: GuestMemory + ?Sized>(mem: &M, addr: u32, syscall: &str) -> Result<u32, i32> {
    let mut word = [0u8; 4];
    mem.read_memory(addr, &mut word).map_err(|f| fault(syscall, f))?;
    Ok(u32::from_be_bytes(word))
}

pub fn write_word<M: GuestMemory + ?Sized>(mem: &mut M, addr: u32, value: u32, syscall: &str) -> Result<(), i32> {
    copy_out(mem, addr, &value.to_be_bytes(), syscall)
}

/// Reads a NUL terminated string of at most `limit` bytes.
pub fn get_cstr<M: GuestMemory + ?Sized>(mem: &M, addr: u32, limit: usize, syscall: &str) -> Result<String, i32> {
    if addr == 0 {
        return Err(syscall_error(Errno::EFAULT, syscall, "null string pointer"));
    }
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let at = addr.wrapping_add(bytes.len() as u32);
        mem.read_memory(at, &mut byte).map_err(|f| fault(syscall, f))?;
        if byte[0] == 0 {
            break;
        }
        if bytes.len() == limit {
            return Err(syscall_error(Errno::ENAMETOOLONG, syscall, "string exceeds limit"));
        }
        bytes.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn get_path<M: GuestMemory + ?Sized>(mem: &M, addr: u32, syscall: &str) -> Result<String, i32> {
    get_cstr(mem, addr, PATH_MAX, syscall)
}

/// Reads a NULL terminated array of string pointers, as passed to exec.
/// A null array pointer reads as an empty array.
pub fn get_cstrarr<M: GuestMemory + ?Sized>(mem: &M, addr: u32, syscall: &str) -> Result<Vec<String>, i32> {
    let mut strings = Vec::new();
    if addr == 0 {
        return Ok(strings);
    }
    loop {
        let slot = addr.wrapping_add(4 * strings.len() as u32);
        let ptr = read_word(mem, slot, syscall)?;
        if ptr == 0 {
            return Ok(strings);
        }
        if strings.len() == ARGV_MAX {
            return Err(syscall_error(Errno::E2BIG, syscall, "too many arguments"));
        }
        strings.push(get_cstr(mem, ptr, ARG_MAX, syscall)?);
    }
}

/// Field values for the newlib `struct stat`. Narrow fields are truncated
/// on encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatData {
    pub st_dev: u32,
    pub st_ino: u32,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u32,
    pub st_size: u32,
    pub st_atime: u32,
    pub st_mtime: u32,
    pub st_ctime: u32,
    pub st_blksize: u32,
    pub st_blocks: u32,
}

impl StatData {
    pub fn encode(&self) -> [u8; STAT_SIZE] {
        let mut out = [0u8; STAT_SIZE];
        let words = [
            (self.st_dev << 16) | (self.st_ino & 0xffff),
            self.st_mode,
            (self.st_nlink << 16) | (self.st_uid & 0xffff),
            (self.st_gid << 16) | (self.st_rdev & 0xffff),
            self.st_size,
            self.st_atime,
            0,
            self.st_mtime,
            0,
            self.st_ctime,
            0,
            self.st_blksize,
            self.st_blocks,
            0,
            0,
        ];
        for (i, w) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_be_bytes());
        }
        out
    }
}

/// Length of the getdents record for `name`, padded to a multiple of 4.
pub fn dirent_reclen(name: &str) -> usize {
    (DIRENT_HEADER_SIZE + name.len() + 1 + 3) & !3
}

/// Appends one getdents record to `out`.
pub fn encode_dirent(out: &mut Vec<u8>, inode: u32, name: &str) {
    let reclen = dirent_reclen(name);
    out.extend_from_slice(&(reclen as u32).to_be_bytes());
    out.extend_from_slice(&inode.to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out.resize(out.len() + reclen - DIRENT_HEADER_SIZE - name.len(), 0);
}

/// Splits a getdents buffer back into (inode, name) pairs. Stops at the
/// first malformed record.
pub fn parse_dirents(buf: &[u8]) -> Vec<(u32, String)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + DIRENT_HEADER_SIZE <= buf.len() {
        let reclen = u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]) as usize;
        if reclen <= DIRENT_HEADER_SIZE || reclen % 4 != 0 || pos + reclen > buf.len() {
            break;
        }
        let inode = u32::from_be_bytes([buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]]);
        let name_area = &buf[pos + DIRENT_HEADER_SIZE..pos + reclen];
        let name_len = match name_area.iter().position(|b| *b == 0) {
            Some(n) => n,
            None => break,
        };
        entries.push((inode, String::from_utf8_lossy(&name_area[..name_len]).into_owned()));
        pos += reclen;
    }
    entries
}
