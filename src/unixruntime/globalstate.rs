//! The process table and mount table shared by every task of one machine.
//!
//! Both tables sit behind a single mutex. Mounts are kept sorted by
//! descending path length so the first component-wise prefix match during
//! resolution is the longest one. The root filesystem is held apart from the
//! mount list and always has device number 1; other mounts receive increasing
//! numbers starting at 2.

use crate::interface::{self, syscall_error, Errno};
use crate::unixruntime::config::RuntimeConfig;
use crate::unixruntime::cpu::ImageCompiler;
use crate::unixruntime::execcache::{ExecCache, Executable};
use crate::unixruntime::filesystem::{DeviceFilesystem, FStat, FilesystemBackend, HostFilesystem, OpenFile};
use crate::unixruntime::path;
use crate::unixruntime::task::Task;
use std::sync::Arc;

const ROOT_DEVNO: u32 = 1;
const FIRST_MOUNT_DEVNO: u32 = 2;

struct Mount {
    /// Normalized, so `/dev` is stored as `dev`.
    path: String,
    fs: Arc<dyn FilesystemBackend>,
}

struct Tables {
    /// Indexed by pid; slot 0 is never handed out.
    tasks: Vec<Option<Arc<Task>>>,
    next_pid: usize,
    root: Option<Arc<dyn FilesystemBackend>>,
    mounts: Vec<Mount>,
    next_devno: u32,
}

pub struct GlobalState {
    tables: interface::RustMutex<Tables>,
    exec_cache: ExecCache,
    compiler: Option<Arc<dyn ImageCompiler>>,
}

impl GlobalState {
    /// An empty machine with `max_tasks` pid slots and no filesystems.
    pub fn new(max_tasks: usize, compiler: Option<Arc<dyn ImageCompiler>>) -> Arc<GlobalState> {
        Arc::new(GlobalState {
            tables: interface::RustMutex::new(Tables {
                tasks: vec![None; max_tasks + 1],
                next_pid: 1,
                root: None,
                mounts: Vec::new(),
                next_devno: FIRST_MOUNT_DEVNO,
            }),
            exec_cache: ExecCache::new(),
            compiler,
        })
    }

    /// The default machine layout: a host directory at `/` and, unless
    /// disabled, the device filesystem at `/dev`.
    pub fn from_config(config: &RuntimeConfig, compiler: Option<Arc<dyn ImageCompiler>>) -> Result<Arc<GlobalState>, i32> {
        let gs = GlobalState::new(config.max_tasks, compiler);
        gs.add_mount("/", Arc::new(HostFilesystem::new(&config.root)))?;
        if config.mount_dev {
            gs.add_mount("/dev", Arc::new(DeviceFilesystem::new()))?;
        }
        tracing::info!(root = %config.root.display(), max_tasks = config.max_tasks, "runtime initialized");
        Ok(gs)
    }

    pub fn compiler(&self) -> Option<&dyn ImageCompiler> {
        self.compiler.as_deref()
    }

    pub fn exec_cache(&self) -> &ExecCache {
        &self.exec_cache
    }

    // ---------------- process table ----------------

    /// Assigns the first free pid at or after the rotating hint, wrapping
    /// around once.
    pub fn register_task(&self, task: Arc<Task>) -> Result<i32, i32> {
        let mut tables = self.tables.lock();
        let slots = tables.tasks.len();
        let start = tables.next_pid;
        for offset in 0..slots - 1 {
            let pid = 1 + (start - 1 + offset) % (slots - 1);
            if tables.tasks[pid].is_none() {
                tables.tasks[pid] = Some(task);
                tables.next_pid = if pid + 1 >= slots { 1 } else { pid + 1 };
                return Ok(pid as i32);
            }
        }
        Err(syscall_error(Errno::ENOMEM, "fork", "process table is full"))
    }

    pub fn get_task(&self, pid: i32) -> Option<Arc<Task>> {
        if pid <= 0 {
            return None;
        }
        self.tables.lock().tasks.get(pid as usize).and_then(|t| t.clone())
    }

    /// Frees a pid slot, returning the task that held it.
    pub fn release_pid(&self, pid: i32) -> Option<Arc<Task>> {
        if pid <= 0 {
            return None;
        }
        let mut tables = self.tables.lock();
        let released = tables.tasks.get_mut(pid as usize).and_then(|t| t.take());
        if let Some(task) = &released {
            if task.pid() != pid {
                panic!("pid slot {} held by task {}", pid, task.pid());
            }
        }
        released
    }

    pub fn task_count(&self) -> usize {
        self.tables.lock().tasks.iter().filter(|t| t.is_some()).count()
    }

    pub fn live_pids(&self) -> Vec<i32> {
        self.tables
            .lock()
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_some())
            .map(|(pid, _)| pid as i32)
            .collect()
    }

    // ---------------- mount table ----------------

    /// Mounts `fs` at the absolute path `mountpoint`; `/` installs the root.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - the path is not absolute
    /// * `EBUSY` - something is already mounted there
    pub fn add_mount(&self, mountpoint: &str, fs: Arc<dyn FilesystemBackend>) -> Result<(), i32> {
        if !mountpoint.starts_with('/') {
            return Err(syscall_error(Errno::EINVAL, "mount", "mount point must be absolute"));
        }
        let normalized = path::normalize(mountpoint);
        let mut tables = self.tables.lock();
        if normalized.is_empty() {
            if tables.root.is_some() {
                return Err(syscall_error(Errno::EBUSY, "mount", "root is already mounted"));
            }
            fs.set_devno(ROOT_DEVNO);
            tables.root = Some(fs);
        } else {
            if tables.mounts.iter().any(|m| m.path == normalized) {
                return Err(syscall_error(Errno::EBUSY, "mount", "mount point is busy"));
            }
            let devno = tables.next_devno;
            tables.next_devno += 1;
            fs.set_devno(devno);
            let at = tables
                .mounts
                .iter()
                .position(|m| m.path.len() < normalized.len())
                .unwrap_or(tables.mounts.len());
            tables.mounts.insert(at, Mount { path: normalized, fs });
        }
        tracing::info!(mountpoint, "filesystem mounted");
        Ok(())
    }

    /// Unmounts whatever is mounted at `mountpoint`.
    pub fn remove_mount(&self, mountpoint: &str) -> Result<Arc<dyn FilesystemBackend>, i32> {
        let normalized = path::normalize(mountpoint);
        let mut tables = self.tables.lock();
        let removed = if normalized.is_empty() {
            tables.root.take()
        } else {
            tables
                .mounts
                .iter()
                .position(|m| m.path == normalized)
                .map(|i| tables.mounts.remove(i).fs)
        };
        match removed {
            Some(fs) => {
                tracing::info!(mountpoint, "filesystem unmounted");
                Ok(fs)
            }
            None => Err(syscall_error(Errno::EINVAL, "umount", "nothing mounted there")),
        }
    }

    /// Unmounts every mount of `fs`, returning whether any existed.
    pub fn remove_mount_fs(&self, fs: &Arc<dyn FilesystemBackend>) -> bool {
        let mut tables = self.tables.lock();
        let before = tables.mounts.len();
        tables.mounts.retain(|m| !Arc::ptr_eq(&m.fs, fs));
        let mut removed = tables.mounts.len() != before;
        if tables.root.as_ref().map_or(false, |r| Arc::ptr_eq(r, fs)) {
            tables.root = None;
            removed = true;
        }
        removed
    }

    /// Picks the filesystem for a normalized path and the path relative to
    /// its mount point. A mount matches only on a whole component.
    pub fn resolve(&self, normalized: &str) -> Result<(Arc<dyn FilesystemBackend>, String), i32> {
        let tables = self.tables.lock();
        if !normalized.is_empty() {
            for mount in &tables.mounts {
                if let Some(rest) = normalized.strip_prefix(mount.path.as_str()) {
                    if rest.is_empty() {
                        return Ok((mount.fs.clone(), String::new()));
                    }
                    if let Some(rel) = rest.strip_prefix('/') {
                        return Ok((mount.fs.clone(), rel.to_string()));
                    }
                }
            }
        }
        match &tables.root {
            Some(root) => Ok((root.clone(), normalized.to_string())),
            None => Err(syscall_error(Errno::ENOENT, "resolve", "no root filesystem mounted")),
        }
    }

    // ---------------- dispatch ----------------
    // Paths here are already normalized by the caller.

    pub fn open(&self, task: &Task, normalized: &str, flags: i32, mode: u32) -> Result<Arc<dyn OpenFile>, i32> {
        let (fs, rel) = self.resolve(normalized)?;
        match fs.open(task, &rel, flags, mode)? {
            Some(file) => Ok(file),
            None => Err(syscall_error(Errno::ENOENT, "open", "no such file or directory")),
        }
    }

    pub fn stat(&self, task: &Task, normalized: &str) -> Result<FStat, i32> {
        let (fs, rel) = self.resolve(normalized)?;
        match fs.stat(task, &rel)? {
            Some(stat) => Ok(stat),
            None => Err(syscall_error(Errno::ENOENT, "stat", "no such file or directory")),
        }
    }

    pub fn lstat(&self, task: &Task, normalized: &str) -> Result<FStat, i32> {
        let (fs, rel) = self.resolve(normalized)?;
        match fs.lstat(task, &rel)? {
            Some(stat) => Ok(stat),
            None => Err(syscall_error(Errno::ENOENT, "lstat", "no such file or directory")),
        }
    }

    pub fn mkdir(&self, task: &Task, normalized: &str, mode: u32) -> Result<(), i32> {
        let (fs, rel) = self.resolve(normalized)?;
        fs.mkdir(task, &rel, mode)
    }

    pub fn unlink(&self, task: &Task, normalized: &str) -> Result<(), i32> {
        let (fs, rel) = self.resolve(normalized)?;
        fs.unlink(task, &rel)
    }

    /// What exec should run for a normalized path, via the exec cache.
    pub fn resolve_executable(&self, task: &Task, normalized: &str) -> Result<Executable, i32> {
        self.exec_cache.resolve(self, task, normalized)
    }
}
