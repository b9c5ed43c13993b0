// System related constants, newlib numbering
#![allow(dead_code)]

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

// waitpid options
pub const WNOHANG: i32 = 1;

// Signals
pub const NSIG: i32 = 32;
pub const SIGHUP: i32 = 1;
pub const SIGINT: i32 = 2;
pub const SIGQUIT: i32 = 3;
pub const SIGILL: i32 = 4;
pub const SIGTRAP: i32 = 5;
pub const SIGABRT: i32 = 6;
pub const SIGEMT: i32 = 7;
pub const SIGFPE: i32 = 8;
pub const SIGKILL: i32 = 9;
pub const SIGBUS: i32 = 10;
pub const SIGSEGV: i32 = 11;
pub const SIGSYS: i32 = 12;
pub const SIGPIPE: i32 = 13;
pub const SIGALRM: i32 = 14;
pub const SIGTERM: i32 = 15;
pub const SIGURG: i32 = 16;
pub const SIGSTOP: i32 = 17;
pub const SIGTSTP: i32 = 18;
pub const SIGCONT: i32 = 19;
pub const SIGCHLD: i32 = 20;
pub const SIGTTIN: i32 = 21;
pub const SIGTTOU: i32 = 22;
pub const SIGIO: i32 = 23;
pub const SIGXCPU: i32 = 24;
pub const SIGXFSZ: i32 = 25;
pub const SIGVTALRM: i32 = 26;
pub const SIGPROF: i32 = 27;
pub const SIGWINCH: i32 = 28;
pub const SIGUSR1: i32 = 30;
pub const SIGUSR2: i32 = 31;

// Pid reported to orphans by getppid
pub const INIT_PID: i32 = 1;

// Default number of pid slots
pub const MAX_TASKS: usize = 256;

// Shebang chains deeper than this fail with ELOOP
pub const MAX_INTERPRETER_DEPTH: usize = 4;

// Exec sniffs this many bytes before deciding
pub const EXEC_SNIFF_SIZE: usize = 4096;
