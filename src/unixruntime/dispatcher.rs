//! Binds syscall traps to [`Task`] methods.
//!
//! Arguments arrive as six 32-bit words. Pointers are decoded against the
//! trapping unit's memory before the call and results are copied back after
//! it. Any fault while doing so is reported as EFAULT.

use crate::interface::{self, syscall_error, Errno, SockaddrV4, StatData, PATH_MAX, SOCKADDR_IN_SIZE};
use crate::unixruntime::cpu::ExecutionUnit;
use crate::unixruntime::syscall_numbers::*;
use crate::unixruntime::syscalls::fs_constants::GETDENTS_MAX;
use crate::unixruntime::syscalls::PipeArray;
use crate::unixruntime::task::Task;
use std::sync::Arc;

// Largest single read or write buffer handed to a backend; larger requests
// complete partially.
const MAX_IO_CHUNK: usize = 1 << 20;

// Takes a syscall invocation (task.name_syscall) and its arguments, any of
// which may be a Result. The first Err is returned as the syscall result,
// otherwise the method is called with the unwrapped values.
macro_rules! check_and_dispatch {
    ( $task:ident . $func:ident, $($arg:expr),* ) => {
        match (|| Ok($task.$func( $($arg?),* )))() {
            Ok(i) => i, Err(i) => i
        }
    };
}

// Unwraps one decoded argument or returns its errno from the dispatcher.
macro_rules! get_onearg {
    ($arg:expr) => {
        match $arg {
            Ok(okval) => okval,
            Err(e) => return e,
        }
    };
}

fn flatten(result: Result<i32, i32>) -> i32 {
    match result {
        Ok(i) => i,
        Err(i) => i,
    }
}

fn io_len(count: i32, syscall: &str) -> Result<usize, i32> {
    if count < 0 {
        return Err(syscall_error(Errno::EINVAL, syscall, "negative count"));
    }
    Ok((count as usize).min(MAX_IO_CHUNK))
}

/// Services one syscall trap for `task`. Process-model calls are matched
/// first, everything else falls through to the base table.
pub fn dispatch(task: &Arc<Task>, unit: &mut dyn ExecutionUnit, number: i32, args: [i32; 6]) -> i32 {
    let [a0, a1, a2, a3, a4, _] = args;
    match number {
        FORK_SYSCALL => task.fork_syscall(&*unit),
        EXEC_SYSCALL => {
            let path = get_onearg!(interface::get_path(&*unit, a0 as u32, "exec"));
            check_and_dispatch!(
                task.exec_syscall,
                Ok::<&str, i32>(&path),
                interface::get_cstrarr(&*unit, a1 as u32, "exec"),
                interface::get_cstrarr(&*unit, a2 as u32, "exec")
            )
        }
        WAITPID_SYSCALL => flatten(sys_waitpid(task, unit, a0, a1 as u32, a2)),
        KILL_SYSCALL => task.kill_syscall(a0, a1),
        GETPPID_SYSCALL => task.getppid_syscall(),
        PIPE_SYSCALL => flatten(sys_pipe(task, unit, a0 as u32)),
        DUP_SYSCALL => task.dup_syscall(a0),
        DUP2_SYSCALL => task.dup2_syscall(a0, a1),
        STAT_SYSCALL => flatten(sys_stat(task, unit, a0 as u32, a1 as u32, false)),
        LSTAT_SYSCALL => flatten(sys_stat(task, unit, a0 as u32, a1 as u32, true)),
        MKDIR_SYSCALL => {
            let path = get_onearg!(interface::get_path(&*unit, a0 as u32, "mkdir"));
            task.mkdir_syscall(&path, a1 as u32)
        }
        UNLINK_SYSCALL => {
            let path = get_onearg!(interface::get_path(&*unit, a0 as u32, "unlink"));
            task.unlink_syscall(&path)
        }
        GETCWD_SYSCALL => flatten(sys_getcwd(task, unit, a0 as u32, a1)),
        CHDIR_SYSCALL => {
            let path = get_onearg!(interface::get_path(&*unit, a0 as u32, "chdir"));
            task.chdir_syscall(&path)
        }
        GETDENTS_SYSCALL => flatten(sys_getdents(task, unit, a0, a1 as u32, a2)),
        SOCKET_SYSCALL => task.socket_syscall(a0, a1, a2),
        BIND_SYSCALL => flatten(sys_sockaddr_call(task, unit, a0, a1 as u32, a2, "bind")),
        CONNECT_SYSCALL => flatten(sys_sockaddr_call(task, unit, a0, a1 as u32, a2, "connect")),
        LISTEN_SYSCALL => task.listen_syscall(a0, a1),
        ACCEPT_SYSCALL => flatten(sys_accept(task, unit, a0, a1 as u32, a2 as u32)),
        SHUTDOWN_SYSCALL => task.shutdown_syscall(a0, a1),
        SETSOCKOPT_SYSCALL => flatten(sys_setsockopt(task, unit, a0, a1, a2, a3 as u32, a4)),
        GETSOCKOPT_SYSCALL => flatten(sys_getsockopt(task, unit, a0, a1, a2, a3 as u32, a4 as u32)),
        GETSOCKNAME_SYSCALL => flatten(sys_getsockname(task, unit, a0, a1 as u32, a2 as u32)),
        RESOLVE_HOSTNAME_SYSCALL => flatten(sys_resolve_hostname(task, unit, a0 as u32, a1 as u32, a2 as u32)),
        _ => dispatch_base(task, unit, number, args),
    }
}

fn dispatch_base(task: &Arc<Task>, unit: &mut dyn ExecutionUnit, number: i32, args: [i32; 6]) -> i32 {
    let [a0, a1, a2, _, _, _] = args;
    match number {
        EXIT_SYSCALL => task.exit_syscall(a0),
        PAUSE_SYSCALL => task.pause_syscall(),
        OPEN_SYSCALL => {
            let path = get_onearg!(interface::get_path(&*unit, a0 as u32, "open"));
            task.open_syscall(&path, a1, a2 as u32)
        }
        CLOSE_SYSCALL => task.close_syscall(a0),
        READ_SYSCALL => flatten(sys_read(task, unit, a0, a1 as u32, a2)),
        WRITE_SYSCALL => flatten(sys_write(task, unit, a0, a1 as u32, a2)),
        LSEEK_SYSCALL => task.lseek_syscall(a0, a1, a2),
        FSTAT_SYSCALL => flatten(sys_fstat(task, unit, a0, a1 as u32)),
        GETPID_SYSCALL => task.getpid_syscall(),
        FCNTL_SYSCALL => task.fcntl_syscall(a0, a1, a2),
        ACCESS_SYSCALL => {
            let path = get_onearg!(interface::get_path(&*unit, a0 as u32, "access"));
            task.access_syscall(&path, a1)
        }
        SCHED_YIELD_SYSCALL => task.sched_yield_syscall(),
        _ => {
            tracing::warn!(pid = task.pid(), number, "unknown syscall");
            syscall_error(Errno::ENOSYS, "dispatch", "unknown syscall")
        }
    }
}

fn sys_read(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, addr: u32, count: i32) -> Result<i32, i32> {
    let mut buf = vec![0u8; io_len(count, "read")?];
    let n = task.read_syscall(fd, &mut buf);
    if n > 0 {
        interface::copy_out(unit, addr, &buf[..n as usize], "read")?;
    }
    Ok(n)
}

fn sys_write(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, addr: u32, count: i32) -> Result<i32, i32> {
    let buf = interface::copy_in(&*unit, addr, io_len(count, "write")?, "write")?;
    Ok(task.write_syscall(fd, &buf))
}

fn sys_stat(task: &Task, unit: &mut dyn ExecutionUnit, path_addr: u32, buf_addr: u32, lstat: bool) -> Result<i32, i32> {
    let syscall = if lstat { "lstat" } else { "stat" };
    let path = interface::get_path(&*unit, path_addr, syscall)?;
    let mut statbuf = StatData::default();
    let ret = if lstat {
        task.lstat_syscall(&path, &mut statbuf)
    } else {
        task.stat_syscall(&path, &mut statbuf)
    };
    if ret == 0 {
        interface::copy_out(unit, buf_addr, &statbuf.encode(), syscall)?;
    }
    Ok(ret)
}

fn sys_fstat(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, buf_addr: u32) -> Result<i32, i32> {
    let mut statbuf = StatData::default();
    let ret = task.fstat_syscall(fd, &mut statbuf);
    if ret == 0 {
        interface::copy_out(unit, buf_addr, &statbuf.encode(), "fstat")?;
    }
    Ok(ret)
}

/// The status word is checked before the wait so a bad pointer fails with
/// EFAULT while the child is still unreaped.
fn sys_waitpid(task: &Task, unit: &mut dyn ExecutionUnit, pid: i32, status_addr: u32, options: i32) -> Result<i32, i32> {
    if status_addr != 0 {
        let current = interface::read_word(&*unit, status_addr, "waitpid")?;
        interface::write_word(unit, status_addr, current, "waitpid")?;
    }
    let mut status = 0;
    let ret = task.waitpid_syscall(pid, &mut status, options);
    if ret > 0 && status_addr != 0 {
        interface::write_word(unit, status_addr, status as u32, "waitpid")?;
    }
    Ok(ret)
}

fn sys_pipe(task: &Task, unit: &mut dyn ExecutionUnit, addr: u32) -> Result<i32, i32> {
    let mut pipefd = PipeArray::default();
    let ret = task.pipe_syscall(&mut pipefd);
    if ret == 0 {
        let written = interface::write_word(unit, addr, pipefd.readfd as u32, "pipe")
            .and_then(|_| interface::write_word(unit, addr.wrapping_add(4), pipefd.writefd as u32, "pipe"));
        if let Err(e) = written {
            task.close_syscall(pipefd.readfd);
            task.close_syscall(pipefd.writefd);
            return Err(e);
        }
    }
    Ok(ret)
}

fn sys_getcwd(task: &Task, unit: &mut dyn ExecutionUnit, addr: u32, size: i32) -> Result<i32, i32> {
    if size < 0 {
        return Err(syscall_error(Errno::EINVAL, "getcwd", "negative size"));
    }
    let mut buf = vec![0u8; (size as usize).min(PATH_MAX + 2)];
    let ret = task.getcwd_syscall(&mut buf);
    if ret < 0 {
        return Ok(ret);
    }
    let end = buf.iter().position(|b| *b == 0).map_or(buf.len(), |n| n + 1);
    interface::copy_out(unit, addr, &buf[..end], "getcwd")?;
    Ok(addr as i32)
}

/// `getdents(fd, buf, count, seekptr)`; `seekptr` is ignored.
fn sys_getdents(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, addr: u32, count: i32) -> Result<i32, i32> {
    if count < 0 {
        return Err(syscall_error(Errno::EINVAL, "getdents", "negative count"));
    }
    let mut buf = vec![0u8; (count as usize).min(GETDENTS_MAX)];
    let n = task.getdents_syscall(fd, &mut buf);
    if n > 0 {
        interface::copy_out(unit, addr, &buf[..n as usize], "getdents")?;
    }
    Ok(n)
}

fn read_sockaddr(unit: &dyn ExecutionUnit, addr: u32, len: i32, syscall: &str) -> Result<SockaddrV4, i32> {
    if len < 0 {
        return Err(syscall_error(Errno::EINVAL, syscall, "negative address length"));
    }
    let raw = interface::copy_in(unit, addr, (len as usize).min(SOCKADDR_IN_SIZE), syscall)?;
    SockaddrV4::decode(&raw).ok_or_else(|| syscall_error(Errno::EINVAL, syscall, "address too short"))
}

/// Writes a socket address, truncated to the guest's buffer length, and
/// stores the full length back through `len_addr`.
fn write_sockaddr(unit: &mut dyn ExecutionUnit, sockaddr: &SockaddrV4, addr: u32, len_addr: u32, syscall: &str) -> Result<(), i32> {
    if addr == 0 || len_addr == 0 {
        return Ok(());
    }
    let room = interface::read_word(&*unit, len_addr, syscall)? as usize;
    let encoded = sockaddr.encode();
    interface::copy_out(unit, addr, &encoded[..room.min(SOCKADDR_IN_SIZE)], syscall)?;
    interface::write_word(unit, len_addr, SOCKADDR_IN_SIZE as u32, syscall)
}

fn sys_sockaddr_call(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, addr: u32, len: i32, syscall: &str) -> Result<i32, i32> {
    let sockaddr = read_sockaddr(&*unit, addr, len, syscall)?;
    Ok(if syscall == "bind" {
        task.bind_syscall(fd, &sockaddr)
    } else {
        task.connect_syscall(fd, &sockaddr)
    })
}

fn sys_accept(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, addr: u32, len_addr: u32) -> Result<i32, i32> {
    let mut peer = SockaddrV4::from_host(std::net::SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0));
    let newfd = task.accept_syscall(fd, &mut peer);
    if newfd >= 0 {
        if let Err(e) = write_sockaddr(unit, &peer, addr, len_addr, "accept") {
            task.close_syscall(newfd);
            return Err(e);
        }
    }
    Ok(newfd)
}

fn sys_getsockname(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, addr: u32, len_addr: u32) -> Result<i32, i32> {
    let mut local = SockaddrV4::from_host(std::net::SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0));
    let ret = task.getsockname_syscall(fd, &mut local);
    if ret == 0 {
        write_sockaddr(unit, &local, addr, len_addr, "getsockname")?;
    }
    Ok(ret)
}

fn sys_setsockopt(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, level: i32, optname: i32, optval: u32, optlen: i32) -> Result<i32, i32> {
    if optlen < 4 {
        return Err(syscall_error(Errno::EINVAL, "setsockopt", "option value too short"));
    }
    let value = interface::read_word(&*unit, optval, "setsockopt")? as i32;
    Ok(task.setsockopt_syscall(fd, level, optname, value))
}

fn sys_getsockopt(task: &Task, unit: &mut dyn ExecutionUnit, fd: i32, level: i32, optname: i32, optval: u32, optlen_addr: u32) -> Result<i32, i32> {
    let mut value = 0;
    let ret = task.getsockopt_syscall(fd, level, optname, &mut value);
    if ret == 0 {
        interface::write_word(unit, optval, value as u32, "getsockopt")?;
        if optlen_addr != 0 {
            interface::write_word(unit, optlen_addr, 4, "getsockopt")?;
        }
    }
    Ok(ret)
}

/// `resolve_hostname(name, addrs, size)`: `*size` is the byte capacity of
/// `addrs` on entry and the number of bytes written on return.
fn sys_resolve_hostname(task: &Task, unit: &mut dyn ExecutionUnit, name: u32, addrs_addr: u32, size_addr: u32) -> Result<i32, i32> {
    let host = interface::get_cstr(&*unit, name, PATH_MAX, "resolve_hostname")?;
    let capacity = interface::read_word(&*unit, size_addr, "resolve_hostname")? as usize;
    let mut addrs = Vec::new();
    let ret = task.resolve_hostname_syscall(&host, capacity / 4, &mut addrs);
    if ret == 0 {
        let bytes: Vec<u8> = addrs.iter().flatten().copied().collect();
        interface::copy_out(unit, addrs_addr, &bytes, "resolve_hostname")?;
        interface::write_word(unit, size_addr, bytes.len() as u32, "resolve_hostname")?;
    }
    Ok(ret)
}
