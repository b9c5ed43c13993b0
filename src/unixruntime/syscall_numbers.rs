// Syscall numbers of the guest C library
#![allow(dead_code)]

pub const EXIT_SYSCALL: i32 = 1;
pub const PAUSE_SYSCALL: i32 = 2;
pub const OPEN_SYSCALL: i32 = 3;
pub const CLOSE_SYSCALL: i32 = 4;
pub const READ_SYSCALL: i32 = 5;
pub const WRITE_SYSCALL: i32 = 6;
pub const FSTAT_SYSCALL: i32 = 8;
pub const LSEEK_SYSCALL: i32 = 10;
pub const KILL_SYSCALL: i32 = 11;
pub const GETPID_SYSCALL: i32 = 12;
pub const STAT_SYSCALL: i32 = 14;
pub const MKDIR_SYSCALL: i32 = 18;
pub const UNLINK_SYSCALL: i32 = 20;
pub const CHDIR_SYSCALL: i32 = 22;
pub const PIPE_SYSCALL: i32 = 23;
pub const DUP2_SYSCALL: i32 = 24;
pub const FORK_SYSCALL: i32 = 25;
pub const WAITPID_SYSCALL: i32 = 26;
pub const GETCWD_SYSCALL: i32 = 27;
pub const EXEC_SYSCALL: i32 = 28;
pub const FCNTL_SYSCALL: i32 = 29;
pub const LSTAT_SYSCALL: i32 = 33;
pub const GETDENTS_SYSCALL: i32 = 36;
pub const DUP_SYSCALL: i32 = 39;
pub const GETPPID_SYSCALL: i32 = 46;

pub const SOCKET_SYSCALL: i32 = 56;
pub const CONNECT_SYSCALL: i32 = 57;
pub const RESOLVE_HOSTNAME_SYSCALL: i32 = 58;
pub const ACCEPT_SYSCALL: i32 = 59;
pub const SETSOCKOPT_SYSCALL: i32 = 60;
pub const GETSOCKOPT_SYSCALL: i32 = 61;
pub const LISTEN_SYSCALL: i32 = 62;
pub const BIND_SYSCALL: i32 = 63;
pub const SHUTDOWN_SYSCALL: i32 = 64;

pub const ACCESS_SYSCALL: i32 = 78;
pub const GETSOCKNAME_SYSCALL: i32 = 84;
pub const SCHED_YIELD_SYSCALL: i32 = 100;
