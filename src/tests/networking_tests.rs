#[cfg(test)]
pub mod networking_tests {
    use super::super::*;
    use crate::interface::{self, Errno, SockaddrV4, StatData};
    use crate::unixruntime::syscalls::*;
    use crate::unixruntime::Task;

    fn errno(e: Errno) -> i32 {
        -(e as i32)
    }

    fn loopback(port: u16) -> SockaddrV4 {
        SockaddrV4 {
            sin_family: interface::AF_INET,
            sin_port: port,
            sin_addr: [127, 0, 0, 1],
        }
    }

    /// A listening socket on an ephemeral loopback port and that port.
    fn listener(task: &Task) -> (i32, u16) {
        let fd = task.socket_syscall(AF_INET, SOCK_STREAM, 0);
        assert!(fd >= 0);
        assert_eq!(task.bind_syscall(fd, &loopback(0)), 0);
        assert_eq!(task.listen_syscall(fd, 4), 0);
        let mut local = SockaddrV4::default();
        assert_eq!(task.getsockname_syscall(fd, &mut local), 0);
        assert_ne!(local.sin_port, 0);
        (fd, local.sin_port)
    }

    #[test]
    pub fn ut_unix_socket_errors() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);

        assert_eq!(task.socket_syscall(AF_UNIX, SOCK_STREAM, 0), errno(Errno::EAFNOSUPPORT));
        assert_eq!(task.socket_syscall(AF_INET6, SOCK_STREAM, 0), errno(Errno::EAFNOSUPPORT));
        assert_eq!(task.socket_syscall(AF_INET, SOCK_DGRAM, 0), errno(Errno::EPROTONOSUPPORT));
        assert_eq!(task.socket_syscall(AF_INET, SOCK_STREAM, IPPROTO_UDP), errno(Errno::EPROTONOSUPPORT));
        assert_eq!(task.socket_syscall(AF_INET, SOCK_STREAM, IPPROTO_TCP), 0);

        let file = task.open_syscall("/dev/null", O_RDONLY, 0);
        assert_eq!(task.listen_syscall(file, 1), errno(Errno::ENOTSOCK));
        assert_eq!(task.bind_syscall(9, &loopback(0)), errno(Errno::EBADF));

        let mut wrong = loopback(0);
        wrong.sin_family = 1;
        assert_eq!(task.bind_syscall(0, &wrong), errno(Errno::EAFNOSUPPORT));

        // not listening yet
        let mut peer = SockaddrV4::default();
        assert_eq!(task.accept_syscall(0, &mut peer), errno(Errno::EINVAL));
        // never connected
        let mut buf = sizecbuf(4);
        assert_eq!(task.read_syscall(0, &mut buf), errno(Errno::ENOTCONN));
        assert_eq!(task.shutdown_syscall(0, SHUT_RDWR), errno(Errno::ENOTCONN));
        assert_eq!(task.shutdown_syscall(0, 9), errno(Errno::EINVAL));

        let mut statbuf = StatData::default();
        assert_eq!(task.fstat_syscall(0, &mut statbuf), 0);
        assert_eq!(statbuf.st_mode & S_IFMT, S_IFSOCK);
    }

    #[test]
    pub fn ut_unix_socket_bind_twice() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);
        let fd = task.socket_syscall(AF_INET, SOCK_STREAM, 0);
        assert_eq!(task.bind_syscall(fd, &loopback(0)), 0);
        assert_eq!(task.bind_syscall(fd, &loopback(0)), errno(Errno::EINVAL));

        // before listen the socket reports the address it was given
        let mut local = SockaddrV4::default();
        assert_eq!(task.getsockname_syscall(fd, &mut local), 0);
        assert_eq!(local, loopback(0));
    }

    #[test]
    pub fn ut_unix_socket_loopback_exchange() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);
        let (server, port) = listener(&task);
        assert_eq!(task.listen_syscall(server, 4), 0);

        let client = task.socket_syscall(AF_INET, SOCK_STREAM, 0);
        assert_eq!(task.connect_syscall(client, &loopback(port)), 0);
        assert_eq!(task.connect_syscall(client, &loopback(port)), errno(Errno::EISCONN));

        let mut peer = SockaddrV4::default();
        let conn = task.accept_syscall(server, &mut peer);
        assert!(conn >= 0);
        assert_eq!(peer.sin_addr, [127, 0, 0, 1]);
        assert_eq!(peer.sin_family, interface::AF_INET);

        let mut client_local = SockaddrV4::default();
        assert_eq!(task.getsockname_syscall(client, &mut client_local), 0);
        assert_eq!(client_local.sin_port, peer.sin_port);

        assert_eq!(task.write_syscall(client, b"ping"), 4);
        let mut buf = sizecbuf(16);
        assert_eq!(task.read_syscall(conn, &mut buf), 4);
        assert_eq!(cbuf2str(&buf[..4]), "ping");

        assert_eq!(task.write_syscall(conn, b"pong!"), 5);
        assert_eq!(task.read_syscall(client, &mut buf), 5);
        assert_eq!(cbuf2str(&buf[..5]), "pong!");

        // the peer sees end of stream after a write shutdown
        assert_eq!(task.shutdown_syscall(client, SHUT_WR), 0);
        assert_eq!(task.read_syscall(conn, &mut buf), 0);

        // connecting a listener is refused
        assert_eq!(task.connect_syscall(server, &loopback(port)), errno(Errno::EINVAL));
    }

    #[test]
    pub fn ut_unix_socket_nonblocking_accept() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);
        let (server, _port) = listener(&task);
        assert_eq!(task.fcntl_syscall(server, F_SETFL, O_NONBLOCK), 0);
        assert_eq!(task.fcntl_syscall(server, F_GETFL, 0) & O_NONBLOCK, O_NONBLOCK);
        let mut peer = SockaddrV4::default();
        assert_eq!(task.accept_syscall(server, &mut peer), errno(Errno::EAGAIN));
    }

    #[test]
    pub fn ut_unix_socket_options() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);
        let fd = task.socket_syscall(AF_INET, SOCK_STREAM, 0);

        let mut value = -1;
        assert_eq!(task.getsockopt_syscall(fd, SOL_SOCKET, SO_REUSEADDR, &mut value), 0);
        assert_eq!(value, 0);
        assert_eq!(task.setsockopt_syscall(fd, SOL_SOCKET, SO_REUSEADDR, 1), 0);
        assert_eq!(task.getsockopt_syscall(fd, SOL_SOCKET, SO_REUSEADDR, &mut value), 0);
        assert_eq!(value, 1);

        assert_eq!(task.setsockopt_syscall(fd, SOL_SOCKET, SO_KEEPALIVE, 5), 0);
        assert_eq!(task.getsockopt_syscall(fd, SOL_SOCKET, SO_KEEPALIVE, &mut value), 0);
        assert_eq!(value, 1);
        assert_eq!(task.getsockopt_syscall(fd, IPPROTO_TCP, TCP_NODELAY, &mut value), 0);
        assert_eq!(value, 0);

        assert_eq!(task.setsockopt_syscall(fd, SOL_SOCKET, 0x1234, 1), errno(Errno::ENOPROTOOPT));
        assert_eq!(task.getsockopt_syscall(fd, IPPROTO_TCP, SO_REUSEADDR, &mut value), errno(Errno::ENOPROTOOPT));

        // options set before connecting reach the host stream
        let (server, port) = listener(&task);
        assert_eq!(task.setsockopt_syscall(fd, IPPROTO_TCP, TCP_NODELAY, 1), 0);
        assert_eq!(task.connect_syscall(fd, &loopback(port)), 0);
        assert_eq!(task.getsockopt_syscall(fd, IPPROTO_TCP, TCP_NODELAY, &mut value), 0);
        assert_eq!(value, 1);
        let mut peer = SockaddrV4::default();
        assert!(task.accept_syscall(server, &mut peer) >= 0);
    }

    #[test]
    pub fn ut_unix_sockaddr_layout() {
        let addr = SockaddrV4 {
            sin_family: interface::AF_INET,
            sin_port: 0x1f90,
            sin_addr: [10, 0, 0, 7],
        };
        let raw = addr.encode();
        assert_eq!(raw.len(), interface::SOCKADDR_IN_SIZE);
        assert_eq!(&raw[..8], &[0, 2, 0x1f, 0x90, 10, 0, 0, 7]);
        assert!(raw[8..].iter().all(|b| *b == 0));
        assert_eq!(SockaddrV4::decode(&raw), Some(addr));
        assert_eq!(SockaddrV4::decode(&raw[..6]), None);
        assert_eq!(addr.to_host().to_string(), "10.0.0.7:8080");
    }

    #[test]
    pub fn ut_unix_resolve_hostname() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);

        let mut addrs = Vec::new();
        assert_eq!(task.resolve_hostname_syscall("127.0.0.1", 4, &mut addrs), 0);
        assert_eq!(addrs, vec![[127, 0, 0, 1]]);

        let mut none = Vec::new();
        assert_eq!(task.resolve_hostname_syscall("127.0.0.1", 0, &mut none), 0);
        assert!(none.is_empty());

        let mut missing = Vec::new();
        assert_eq!(task.resolve_hostname_syscall("no-such-host.invalid", 4, &mut missing), 1);
        assert!(missing.is_empty());
    }
}
