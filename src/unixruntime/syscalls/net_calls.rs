//! Socket system calls.
//!
//! Guest sockets are IPv4 stream sockets passed straight through to the host
//! TCP stack. Host failures are translated to guest errnos by
//! [`host_error`](crate::interface::host_error).

use super::net_constants::*;
use crate::interface::{self, host_error, syscall_error, Errno, HostSocket, SockaddrV4};
use crate::unixruntime::filesystem::SocketFile;
use crate::unixruntime::task::Task;
use std::net::Shutdown;
use std::sync::Arc;

impl Task {
    fn with_socket<F>(&self, fd: i32, syscall: &str, op: F) -> i32
    where
        F: FnOnce(&HostSocket) -> i32,
    {
        let file = match self.get_fd(fd) {
            Some(f) => f,
            None => return syscall_error(Errno::EBADF, syscall, "invalid file descriptor"),
        };
        match file.as_socket() {
            Some(socket) => op(socket),
            None => syscall_error(Errno::ENOTSOCK, syscall, "descriptor is not a socket"),
        }
    }

    /// ### Description
    ///
    /// Creates an unconnected TCP socket.
    ///
    /// ### Errors
    ///
    /// * `EAFNOSUPPORT` - domain other than `AF_INET`
    /// * `EPROTONOSUPPORT` - type other than `SOCK_STREAM`, or a protocol
    ///   other than TCP
    /// * `EMFILE` - the descriptor table is full
    ///
    /// [socket(2)](https://man7.org/linux/man-pages/man2/socket.2.html)
    pub fn socket_syscall(&self, domain: i32, socktype: i32, protocol: i32) -> i32 {
        if domain != AF_INET {
            return syscall_error(Errno::EAFNOSUPPORT, "socket", "only AF_INET is supported");
        }
        if socktype != SOCK_STREAM {
            return syscall_error(Errno::EPROTONOSUPPORT, "socket", "only SOCK_STREAM is supported");
        }
        if protocol != IPPROTO_IP && protocol != IPPROTO_TCP {
            return syscall_error(Errno::EPROTONOSUPPORT, "socket", "unsupported protocol");
        }
        match self.install_fd(Arc::new(SocketFile::new(HostSocket::new())), 0, false) {
            Ok(fd) => fd,
            Err(e) => e,
        }
    }

    /// Records the local address; the host socket is created at `listen`.
    pub fn bind_syscall(&self, fd: i32, addr: &SockaddrV4) -> i32 {
        if addr.sin_family != interface::AF_INET {
            return syscall_error(Errno::EAFNOSUPPORT, "bind", "address family not supported");
        }
        self.with_socket(fd, "bind", |socket| match socket.bind(addr.to_host()) {
            Ok(()) => 0,
            Err(e) => host_error(&e, "bind"),
        })
    }

    /// Opens a host TCP connection. Blocks until it is established.
    ///
    /// [connect(2)](https://man7.org/linux/man-pages/man2/connect.2.html)
    pub fn connect_syscall(&self, fd: i32, addr: &SockaddrV4) -> i32 {
        if addr.sin_family != interface::AF_INET {
            return syscall_error(Errno::EAFNOSUPPORT, "connect", "address family not supported");
        }
        self.with_socket(fd, "connect", |socket| match socket.connect(addr.to_host()) {
            Ok(()) => 0,
            Err(e) => host_error(&e, "connect"),
        })
    }

    /// The backlog is left to the host.
    pub fn listen_syscall(&self, fd: i32, _backlog: i32) -> i32 {
        self.with_socket(fd, "listen", |socket| match socket.listen() {
            Ok(()) => 0,
            Err(e) => host_error(&e, "listen"),
        })
    }

    /// ### Description
    ///
    /// Waits for a connection on a listening socket and installs it as a new
    /// descriptor. The peer address is stored in `peer`.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - the socket is not listening
    /// * `ENOTSOCK` - `fd` is not a socket
    /// * `EMFILE` - the descriptor table is full
    ///
    /// [accept(2)](https://man7.org/linux/man-pages/man2/accept.2.html)
    pub fn accept_syscall(&self, fd: i32, peer: &mut SockaddrV4) -> i32 {
        let accepted = self.with_socket(fd, "accept", |socket| {
            if !socket.is_listening() {
                return syscall_error(Errno::EINVAL, "accept", "socket is not listening");
            }
            match socket.accept() {
                Ok((conn, addr)) => {
                    *peer = SockaddrV4::from_host(addr);
                    match self.install_fd(Arc::new(SocketFile::new(conn)), 0, false) {
                        Ok(newfd) => newfd,
                        Err(e) => e,
                    }
                }
                Err(e) => host_error(&e, "accept"),
            }
        });
        if accepted >= 0 {
            tracing::debug!(pid = self.pid(), fd, newfd = accepted, "accepted connection");
        }
        accepted
    }

    pub fn shutdown_syscall(&self, fd: i32, how: i32) -> i32 {
        let how = match how {
            SHUT_RD => Shutdown::Read,
            SHUT_WR => Shutdown::Write,
            SHUT_RDWR => Shutdown::Both,
            _ => return syscall_error(Errno::EINVAL, "shutdown", "invalid shutdown mode"),
        };
        self.with_socket(fd, "shutdown", |socket| match socket.shutdown(how) {
            Ok(()) => 0,
            Err(e) => host_error(&e, "shutdown"),
        })
    }

    /// ### Description
    ///
    /// Sets `SO_REUSEADDR` or `SO_KEEPALIVE` at `SOL_SOCKET`, or
    /// `TCP_NODELAY` at `IPPROTO_TCP`. A non-zero value turns the option on.
    ///
    /// ### Errors
    ///
    /// * `ENOPROTOOPT` - any other level or option
    ///
    /// [setsockopt(2)](https://man7.org/linux/man-pages/man2/setsockopt.2.html)
    pub fn setsockopt_syscall(&self, fd: i32, level: i32, optname: i32, value: i32) -> i32 {
        self.with_socket(fd, "setsockopt", |socket| {
            let mut options = socket.options();
            let on = value != 0;
            match (level, optname) {
                (SOL_SOCKET, SO_REUSEADDR) => options.reuseaddr = on,
                (SOL_SOCKET, SO_KEEPALIVE) => options.keepalive = on,
                (IPPROTO_TCP, TCP_NODELAY) => options.nodelay = on,
                _ => return syscall_error(Errno::ENOPROTOOPT, "setsockopt", "unsupported option"),
            }
            match socket.set_options(options) {
                Ok(()) => 0,
                Err(e) => host_error(&e, "setsockopt"),
            }
        })
    }

    pub fn getsockopt_syscall(&self, fd: i32, level: i32, optname: i32, value: &mut i32) -> i32 {
        self.with_socket(fd, "getsockopt", |socket| {
            let options = socket.options();
            let on = match (level, optname) {
                (SOL_SOCKET, SO_REUSEADDR) => options.reuseaddr,
                (SOL_SOCKET, SO_KEEPALIVE) => options.keepalive,
                (IPPROTO_TCP, TCP_NODELAY) => options.nodelay,
                _ => return syscall_error(Errno::ENOPROTOOPT, "getsockopt", "unsupported option"),
            };
            *value = on as i32;
            0
        })
    }

    pub fn getsockname_syscall(&self, fd: i32, addr: &mut SockaddrV4) -> i32 {
        self.with_socket(fd, "getsockname", |socket| match socket.local_addr() {
            Ok(local) => {
                *addr = SockaddrV4::from_host(local);
                0
            }
            Err(e) => host_error(&e, "getsockname"),
        })
    }

    /// ### Description
    ///
    /// Looks up the IPv4 addresses of `host` through the host resolver,
    /// keeping at most `max` of them.
    ///
    /// ### Returns
    ///
    /// 0 with `addrs` filled, or 1 when the name does not resolve.
    pub fn resolve_hostname_syscall(&self, host: &str, max: usize, addrs: &mut Vec<[u8; 4]>) -> i32 {
        match interface::resolve_ipv4(host) {
            Ok(found) if !found.is_empty() => {
                addrs.extend(found.into_iter().take(max).map(|ip| ip.octets()));
                0
            }
            Ok(_) => 1,
            Err(e) => {
                tracing::debug!(host, error = %e, "hostname lookup failed");
                1
            }
        }
    }
}
