//! Exec cache and binary sniffing.
//!
//! exec resolves a path to an [`Executable`]: either a compiled image or an
//! interpreter line from a `#!` script. Results are cached per normalized
//! path together with the file's mtime and size, and an entry is reused only
//! while a fresh stat reports both unchanged.

use crate::interface::{self, syscall_error, Errno};
use crate::unixruntime::cpu::ExecutableImage;
use crate::unixruntime::filesystem::OpenFile;
use crate::unixruntime::globalstate::GlobalState;
use crate::unixruntime::syscalls::fs_constants::*;
use crate::unixruntime::syscalls::sys_constants::EXEC_SNIFF_SIZE;
use crate::unixruntime::task::Task;
use std::sync::Arc;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

#[derive(Clone)]
pub enum Executable {
    Image(Arc<dyn ExecutableImage>),
    Script {
        interpreter: String,
        arg: Option<String>,
    },
}

#[derive(Clone)]
struct CacheEntry {
    mtime: u64,
    size: u64,
    executable: Executable,
}

#[derive(Default)]
pub struct ExecCache {
    entries: interface::RustDashMap<String, CacheEntry>,
}

impl ExecCache {
    pub fn new() -> ExecCache {
        ExecCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, normalized: &str) -> bool {
        self.entries.contains_key(normalized)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub(crate) fn resolve(&self, gs: &GlobalState, task: &Task, normalized: &str) -> Result<Executable, i32> {
        let stat = gs.stat(task, normalized)?;
        if stat.is_dir() {
            return Err(syscall_error(Errno::EACCES, "exec", "cannot execute a directory"));
        }

        if let Some(entry) = self.entries.get(normalized) {
            if entry.mtime == stat.mtime && entry.size == stat.size {
                return Ok(entry.executable.clone());
            }
        }
        if self.entries.remove(normalized).is_some() {
            tracing::debug!(path = normalized, "exec cache entry is stale");
        }

        let file = gs.open(task, normalized, O_RDONLY, 0)?;
        let executable = sniff(gs, file.as_ref(), normalized)?;
        self.entries.insert(
            normalized.to_string(),
            CacheEntry {
                mtime: stat.mtime,
                size: stat.size,
                executable: executable.clone(),
            },
        );
        Ok(executable)
    }
}

/// Reads until `buf` is full or the file ends.
fn read_up_to(file: &dyn OpenFile, buf: &mut [u8]) -> Result<usize, i32> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..]);
        if n < 0 {
            return Err(syscall_error(Errno::EIO, "exec", "read failed while loading executable"));
        }
        if n == 0 {
            break;
        }
        total += n as usize;
    }
    Ok(total)
}

fn sniff(gs: &GlobalState, file: &dyn OpenFile, normalized: &str) -> Result<Executable, i32> {
    let mut head = vec![0u8; EXEC_SNIFF_SIZE];
    let n = read_up_to(file, &mut head)?;
    head.truncate(n);

    if head.len() >= 4 && head[..4] == ELF_MAGIC {
        let compiler = match gs.compiler() {
            Some(c) => c,
            None => return Err(syscall_error(Errno::ENOEXEC, "exec", "no compiler for native images")),
        };
        let mut image = head;
        let mut chunk = vec![0u8; EXEC_SNIFF_SIZE];
        loop {
            let n = read_up_to(file, &mut chunk)?;
            if n == 0 {
                break;
            }
            image.extend_from_slice(&chunk[..n]);
        }
        tracing::debug!(path = normalized, bytes = image.len(), "compiling image");
        return compiler.compile(&image).map(Executable::Image);
    }

    if head.len() >= 2 && head[0] == b'#' && head[1] == b'!' {
        return parse_shebang(&head);
    }

    Err(syscall_error(Errno::ENOEXEC, "exec", "unrecognized executable format"))
}

/// Parses `#!interpreter [arg]`. Everything after the interpreter up to the
/// end of the line is one argument. The line must end within the sniffed
/// buffer unless the file itself ends first.
pub fn parse_shebang(head: &[u8]) -> Result<Executable, i32> {
    let body = &head[2..];
    let line = match body.iter().position(|b| *b == b'\n') {
        Some(end) => &body[..end],
        None if head.len() < EXEC_SNIFF_SIZE => body,
        None => return Err(syscall_error(Errno::ENOEXEC, "exec", "interpreter line too long")),
    };
    let line = String::from_utf8_lossy(line);
    let line = line.trim_matches(|c: char| c == ' ' || c == '\t' || c == '\r');

    let (interpreter, rest) = match line.find(|c: char| c == ' ' || c == '\t') {
        Some(i) => (&line[..i], line[i..].trim_matches(|c: char| c == ' ' || c == '\t')),
        None => (line, ""),
    };
    if interpreter.is_empty() {
        return Err(syscall_error(Errno::ENOEXEC, "exec", "empty interpreter line"));
    }
    Ok(Executable::Script {
        interpreter: interpreter.to_string(),
        arg: if rest.is_empty() { None } else { Some(rest.to_string()) },
    })
}
