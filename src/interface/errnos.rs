// Error handling for the runtime interface
//
// Errno values follow the newlib numbering the guest C library is built
// against, which is not the host's numbering. Host failures are translated
// symbolically through `host_errno`.

use std::io;

/// Errno values visible to guest programs. Every syscall failure is reported
/// as the negated discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Errno {
    EPERM = 1,            // Operation not permitted
    ENOENT = 2,           // No such file or directory
    ESRCH = 3,            // No such process
    EINTR = 4,            // Interrupted system call
    EIO = 5,              // I/O error
    ENXIO = 6,            // No such device or address
    E2BIG = 7,            // Argument list too long
    ENOEXEC = 8,          // Exec format error
    EBADF = 9,            // Bad file number
    ECHILD = 10,          // No child processes
    EAGAIN = 11,          // Try again
    ENOMEM = 12,          // Out of memory
    EACCES = 13,          // Permission denied
    EFAULT = 14,          // Bad address
    EBUSY = 16,           // Device or resource busy
    EEXIST = 17,          // File exists
    EXDEV = 18,           // Cross-device link
    ENODEV = 19,          // No such device
    ENOTDIR = 20,         // Not a directory
    EISDIR = 21,          // Is a directory
    EINVAL = 22,          // Invalid argument
    ENFILE = 23,          // File table overflow
    EMFILE = 24,          // Too many open files
    ENOTTY = 25,          // Not a typewriter
    EFBIG = 27,           // File too large
    ENOSPC = 28,          // No space left on device
    ESPIPE = 29,          // Illegal seek
    EROFS = 30,           // Read-only file system
    EMLINK = 31,          // Too many links
    EPIPE = 32,           // Broken pipe
    ERANGE = 34,          // Math result not representable
    EBADFD = 81,          // File descriptor in bad state
    ENOSYS = 88,          // Function not implemented
    ENOTEMPTY = 90,       // Directory not empty
    ENAMETOOLONG = 91,    // File name too long
    ELOOP = 92,           // Too many symbolic links encountered
    EOPNOTSUPP = 95,      // Operation not supported on transport endpoint
    ECONNRESET = 104,     // Connection reset by peer
    ENOBUFS = 105,        // No buffer space available
    EAFNOSUPPORT = 106,   // Address family not supported by protocol
    EPROTOTYPE = 107,     // Protocol wrong type for socket
    ENOTSOCK = 108,       // Socket operation on non-socket
    ENOPROTOOPT = 109,    // Protocol not available
    ECONNREFUSED = 111,   // Connection refused
    EADDRINUSE = 112,     // Address already in use
    ECONNABORTED = 113,   // Software caused connection abort
    ENETUNREACH = 114,    // Network is unreachable
    ENETDOWN = 115,       // Network is down
    ETIMEDOUT = 116,      // Connection timed out
    EHOSTDOWN = 117,      // Host is down
    EHOSTUNREACH = 118,   // No route to host
    EINPROGRESS = 119,    // Operation now in progress
    EALREADY = 120,       // Operation already in progress
    EDESTADDRREQ = 121,   // Destination address required
    EMSGSIZE = 122,       // Message too long
    EPROTONOSUPPORT = 123, // Protocol not supported
    EADDRNOTAVAIL = 125,  // Cannot assign requested address
    ENETRESET = 126,      // Network dropped connection because of reset
    EISCONN = 127,        // Transport endpoint is already connected
    ENOTCONN = 128,       // Transport endpoint is not connected
    ENOTSUP = 134,        // Not supported
    EOVERFLOW = 139,      // Value too large for defined data type
}

/// Logs the failure and returns the negated errno so handlers can
/// `return syscall_error(...)` directly.
pub fn syscall_error(e: Errno, syscall: &str, message: &str) -> i32 {
    tracing::debug!(errno = ?e, syscall, "{}", message);
    -(e as i32)
}

/// Translates a host I/O error into the guest errno table.
pub fn host_errno(err: &io::Error) -> Errno {
    if let Some(raw) = err.raw_os_error() {
        return match raw {
            libc::EPERM => Errno::EPERM,
            libc::ENOENT => Errno::ENOENT,
            libc::EINTR => Errno::EINTR,
            libc::ENXIO => Errno::ENXIO,
            libc::EBADF => Errno::EBADF,
            libc::EAGAIN => Errno::EAGAIN,
            libc::ENOMEM => Errno::ENOMEM,
            libc::EACCES => Errno::EACCES,
            libc::EFAULT => Errno::EFAULT,
            libc::EBUSY => Errno::EBUSY,
            libc::EEXIST => Errno::EEXIST,
            libc::EXDEV => Errno::EXDEV,
            libc::ENODEV => Errno::ENODEV,
            libc::ENOTDIR => Errno::ENOTDIR,
            libc::EISDIR => Errno::EISDIR,
            libc::EINVAL => Errno::EINVAL,
            libc::ENFILE => Errno::ENFILE,
            libc::EMFILE => Errno::EMFILE,
            libc::EFBIG => Errno::EFBIG,
            libc::ENOSPC => Errno::ENOSPC,
            libc::ESPIPE => Errno::ESPIPE,
            libc::EROFS => Errno::EROFS,
            libc::EMLINK => Errno::EMLINK,
            libc::EPIPE => Errno::EPIPE,
            libc::ENAMETOOLONG => Errno::ENAMETOOLONG,
            libc::ENOTEMPTY => Errno::ENOTEMPTY,
            libc::ELOOP => Errno::ELOOP,
            libc::ENOTSOCK => Errno::ENOTSOCK,
            libc::EDESTADDRREQ => Errno::EDESTADDRREQ,
            libc::EMSGSIZE => Errno::EMSGSIZE,
            libc::EPROTOTYPE => Errno::EPROTOTYPE,
            libc::ENOPROTOOPT => Errno::ENOPROTOOPT,
            libc::EPROTONOSUPPORT => Errno::EPROTONOSUPPORT,
            libc::EOPNOTSUPP => Errno::EOPNOTSUPP,
            libc::EAFNOSUPPORT => Errno::EAFNOSUPPORT,
            libc::EADDRINUSE => Errno::EADDRINUSE,
            libc::EADDRNOTAVAIL => Errno::EADDRNOTAVAIL,
            libc::ENETDOWN => Errno::ENETDOWN,
            libc::ENETUNREACH => Errno::ENETUNREACH,
            libc::ENETRESET => Errno::ENETRESET,
            libc::ECONNABORTED => Errno::ECONNABORTED,
            libc::ECONNRESET => Errno::ECONNRESET,
            libc::ENOBUFS => Errno::ENOBUFS,
            libc::EISCONN => Errno::EISCONN,
            libc::ENOTCONN => Errno::ENOTCONN,
            libc::ETIMEDOUT => Errno::ETIMEDOUT,
            libc::ECONNREFUSED => Errno::ECONNREFUSED,
            libc::EHOSTDOWN => Errno::EHOSTDOWN,
            libc::EHOSTUNREACH => Errno::EHOSTUNREACH,
            libc::EALREADY => Errno::EALREADY,
            libc::EINPROGRESS => Errno::EINPROGRESS,
            libc::EOVERFLOW => Errno::EOVERFLOW,
            _ => Errno::EIO,
        };
    }

    // errors synthesized by std carry no os code
    match err.kind() {
        io::ErrorKind::NotFound => Errno::ENOENT,
        io::ErrorKind::PermissionDenied => Errno::EACCES,
        io::ErrorKind::AlreadyExists => Errno::EEXIST,
        io::ErrorKind::WouldBlock => Errno::EAGAIN,
        io::ErrorKind::InvalidInput => Errno::EINVAL,
        io::ErrorKind::BrokenPipe => Errno::EPIPE,
        io::ErrorKind::ConnectionRefused => Errno::ECONNREFUSED,
        io::ErrorKind::ConnectionReset => Errno::ECONNRESET,
        io::ErrorKind::ConnectionAborted => Errno::ECONNABORTED,
        io::ErrorKind::NotConnected => Errno::ENOTCONN,
        io::ErrorKind::AddrInUse => Errno::EADDRINUSE,
        io::ErrorKind::AddrNotAvailable => Errno::EADDRNOTAVAIL,
        io::ErrorKind::TimedOut => Errno::ETIMEDOUT,
        _ => Errno::EIO,
    }
}

/// `syscall_error` for a failed host operation.
pub fn host_error(err: &io::Error, syscall: &str) -> i32 {
    syscall_error(host_errno(err), syscall, &err.to_string())
}
