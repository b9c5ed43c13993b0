// Host networking interface
//
// Guest sockets are thin wrappers over host TCP sockets. The only address
// family is AF_INET; guest `sockaddr_in` values are big-endian
// {u16 family, u16 port, u8[4] addr, u8[8] zero}.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use parking_lot::Mutex;

pub const AF_INET: u16 = 2;
pub const SOCKADDR_IN_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SockaddrV4 {
    pub sin_family: u16,
    pub sin_port: u16,
    pub sin_addr: [u8; 4],
}

impl SockaddrV4 {
    pub fn from_host(addr: SocketAddrV4) -> SockaddrV4 {
        SockaddrV4 {
            sin_family: AF_INET,
            sin_port: addr.port(),
            sin_addr: addr.ip().octets(),
        }
    }

    pub fn to_host(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.sin_addr), self.sin_port)
    }

    /// Parses the guest layout; `None` when the buffer is short.
    pub fn decode(buf: &[u8]) -> Option<SockaddrV4> {
        if buf.len() < 8 {
            return None;
        }
        Some(SockaddrV4 {
            sin_family: u16::from_be_bytes([buf[0], buf[1]]),
            sin_port: u16::from_be_bytes([buf[2], buf[3]]),
            sin_addr: [buf[4], buf[5], buf[6], buf[7]],
        })
    }

    pub fn encode(&self) -> [u8; SOCKADDR_IN_SIZE] {
        let mut out = [0u8; SOCKADDR_IN_SIZE];
        out[0..2].copy_from_slice(&self.sin_family.to_be_bytes());
        out[2..4].copy_from_slice(&self.sin_port.to_be_bytes());
        out[4..8].copy_from_slice(&self.sin_addr);
        out
    }
}

fn v4_only(addr: SocketAddr) -> io::Result<SocketAddrV4> {
    match addr {
        SocketAddr::V4(v4) => Ok(v4),
        SocketAddr::V6(_) => Err(io::Error::from_raw_os_error(libc::EAFNOSUPPORT)),
    }
}

/// Looks up the IPv4 addresses of `host`.
pub fn resolve_ipv4(host: &str) -> io::Result<Vec<Ipv4Addr>> {
    let addrs = (host, 0u16).to_socket_addrs()?;
    Ok(addrs
        .filter_map(|a| match a {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketOptions {
    pub reuseaddr: bool,
    pub keepalive: bool,
    pub nodelay: bool,
}

enum SocketState {
    Fresh { bound: Option<SocketAddrV4> },
    Connected(Arc<TcpStream>),
    Listening(Arc<TcpListener>),
}

/// A guest stream socket. It starts unconnected and turns into either a
/// connected stream or a listener; the same handle serves both roles.
pub struct HostSocket {
    state: Mutex<SocketState>,
    options: Mutex<SocketOptions>,
    nonblocking: Mutex<bool>,
}

impl Default for HostSocket {
    fn default() -> Self {
        HostSocket::new()
    }
}

impl HostSocket {
    pub fn new() -> HostSocket {
        HostSocket {
            state: Mutex::new(SocketState::Fresh { bound: None }),
            options: Mutex::new(SocketOptions::default()),
            nonblocking: Mutex::new(false),
        }
    }

    fn from_stream(stream: TcpStream) -> io::Result<HostSocket> {
        stream.set_nonblocking(false)?;
        Ok(HostSocket {
            state: Mutex::new(SocketState::Connected(Arc::new(stream))),
            options: Mutex::new(SocketOptions::default()),
            nonblocking: Mutex::new(false),
        })
    }

    fn stream(&self) -> io::Result<Arc<TcpStream>> {
        match &*self.state.lock() {
            SocketState::Connected(s) => Ok(s.clone()),
            _ => Err(io::Error::from_raw_os_error(libc::ENOTCONN)),
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(&*self.state.lock(), SocketState::Listening(_))
    }

    pub fn bind(&self, addr: SocketAddrV4) -> io::Result<()> {
        let mut state = self.state.lock();
        match &mut *state {
            SocketState::Fresh { bound } if bound.is_none() => {
                *bound = Some(addr);
                Ok(())
            }
            _ => Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
    }

    pub fn connect(&self, addr: SocketAddrV4) -> io::Result<()> {
        let mut state = self.state.lock();
        match &*state {
            SocketState::Fresh { .. } => {}
            SocketState::Connected(_) => return Err(io::Error::from_raw_os_error(libc::EISCONN)),
            SocketState::Listening(_) => return Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
        let stream = TcpStream::connect(addr)?;
        self.apply_stream_options(&stream)?;
        stream.set_nonblocking(*self.nonblocking.lock())?;
        *state = SocketState::Connected(Arc::new(stream));
        Ok(())
    }

    /// Starts listening on the bound address, or an ephemeral port on all
    /// interfaces if the socket was never bound. The host backlog is fixed.
    pub fn listen(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        let addr = match &*state {
            SocketState::Fresh { bound } => bound.unwrap_or_else(|| SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            SocketState::Listening(_) => return Ok(()),
            SocketState::Connected(_) => return Err(io::Error::from_raw_os_error(libc::EISCONN)),
        };
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(*self.nonblocking.lock())?;
        *state = SocketState::Listening(Arc::new(listener));
        Ok(())
    }

    /// Blocks for an incoming connection without holding the state lock.
    pub fn accept(&self) -> io::Result<(HostSocket, SocketAddrV4)> {
        let listener = match &*self.state.lock() {
            SocketState::Listening(l) => l.clone(),
            _ => return Err(io::Error::from_raw_os_error(libc::EINVAL)),
        };
        let (stream, peer) = listener.accept()?;
        let peer = v4_only(peer)?;
        Ok((HostSocket::from_stream(stream)?, peer))
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let stream = self.stream()?;
        let mut s: &TcpStream = &stream;
        s.read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let stream = self.stream()?;
        let mut s: &TcpStream = &stream;
        s.write(buf)
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.stream()?.shutdown(how)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddrV4> {
        match &*self.state.lock() {
            SocketState::Fresh { bound } => Ok(bound.unwrap_or_else(|| SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))),
            SocketState::Connected(s) => v4_only(s.local_addr()?),
            SocketState::Listening(l) => v4_only(l.local_addr()?),
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        *self.nonblocking.lock() = nonblocking;
        match &*self.state.lock() {
            SocketState::Fresh { .. } => Ok(()),
            SocketState::Connected(s) => s.set_nonblocking(nonblocking),
            SocketState::Listening(l) => l.set_nonblocking(nonblocking),
        }
    }

    pub fn options(&self) -> SocketOptions {
        *self.options.lock()
    }

    pub fn set_options(&self, options: SocketOptions) -> io::Result<()> {
        *self.options.lock() = options;
        if let SocketState::Connected(s) = &*self.state.lock() {
            self.apply_stream_options(s)?;
        }
        Ok(())
    }

    fn apply_stream_options(&self, stream: &TcpStream) -> io::Result<()> {
        let options = *self.options.lock();
        stream.set_nodelay(options.nodelay)?;
        set_keepalive(stream, options.keepalive)
    }
}

// std has no keepalive setter
fn set_keepalive(stream: &TcpStream, on: bool) -> io::Result<()> {
    let value: libc::c_int = on as libc::c_int;
    let ret = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
