//! In-Memory Pipe Implementation for the runtime interface
//!
//! ## Pipe Module
//!
//! Bounded byte channel shared between the two ends of a guest pipe. Storage
//! is a `ringbuf` ring split into a producer and a consumer half; both halves
//! live under one mutex together with the open/closed state of each end, and
//! two condition variables wake blocked readers and writers.

/// To learn more about pipes
/// [pipe(7)](https://man7.org/linux/man-pages/man7/pipe.7.html)
use crate::interface::errnos::{syscall_error, Errno};

use parking_lot::{Condvar, Mutex};
use ringbuf::{Consumer, Producer, RingBuffer};
use std::cmp::min;
use std::fmt;

/// Writes of at most this many bytes are never split or interleaved.
pub const PIPE_BUF: usize = 4096;
pub const PIPE_CAPACITY: usize = 4 * PIPE_BUF;

struct PipeState {
    write_end: Producer<u8>,
    read_end: Consumer<u8>,
    reader_open: bool,
    writer_open: bool,
}

/// # Description
/// In-memory pipe struct
///
/// # Fields
///
/// * `state` - Ring buffer halves and end flags behind a single lock.
/// * `readable` - Signalled when bytes arrive or the writer closes.
/// * `writable` - Signalled when bytes drain or the reader closes.
/// * `size` - Size of pipe buffer in bytes.
pub struct EmulatedPipe {
    state: Mutex<PipeState>,
    readable: Condvar,
    writable: Condvar,
    size: usize,
}

pub fn new_pipe() -> EmulatedPipe {
    EmulatedPipe::new_with_capacity(PIPE_CAPACITY)
}

impl EmulatedPipe {
    /// # Description
    /// Creates an in-memory pipe object
    ///
    /// # Arguments
    ///
    /// * `size` - Size of the ring buffer, at least `PIPE_BUF`
    ///
    /// # Panics
    ///
    /// A capacity below `PIPE_BUF` could never satisfy an atomic write.
    pub fn new_with_capacity(size: usize) -> EmulatedPipe {
        assert!(size >= PIPE_BUF, "pipe capacity below PIPE_BUF");
        let rb = RingBuffer::<u8>::new(size);
        let (prod, cons) = rb.split();
        EmulatedPipe {
            state: Mutex::new(PipeState {
                write_end: prod,
                read_end: cons,
                reader_open: true,
                writer_open: true,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.state.lock().read_end.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks the read end closed; blocked and future writers get EPIPE.
    pub fn close_read(&self) {
        let mut state = self.state.lock();
        state.reader_open = false;
        self.writable.notify_all();
    }

    /// Marks the write end closed; readers drain what is left then see EOF.
    pub fn close_write(&self) {
        let mut state = self.state.lock();
        state.writer_open = false;
        self.readable.notify_all();
    }

    /// ### Description
    ///
    /// write_to_pipe copies bytes from `buf` into the ring buffer.
    ///
    /// A write of at most `PIPE_BUF` bytes waits until the whole write fits
    /// and is then deposited in one step, so concurrent writers never
    /// interleave inside it. A longer write waits for `PIPE_BUF` free bytes,
    /// deposits whatever fits and reports the short count.
    ///
    /// ### Returns
    ///
    /// The number of bytes written, or a negative errno.
    ///
    /// ### Errors
    ///
    /// * `EAGAIN` - Non-blocking is enabled and the write cannot start now.
    /// * `EPIPE` - The read end has been closed.
    ///
    /// [write(2)](https://man7.org/linux/man-pages/man2/write.2.html)
    pub fn write_to_pipe(&self, buf: &[u8], nonblocking: bool) -> i32 {
        if buf.is_empty() {
            return 0;
        }
        let needed = min(buf.len(), PIPE_BUF);

        let mut state = self.state.lock();
        loop {
            if !state.reader_open {
                return syscall_error(Errno::EPIPE, "write", "broken pipe");
            }
            if state.write_end.remaining() >= needed {
                break;
            }
            if nonblocking {
                return syscall_error(
                    Errno::EAGAIN,
                    "write",
                    "there is no space available right now, try again later",
                );
            }
            self.writable.wait(&mut state);
        }

        let bytes_to_write = min(buf.len(), state.write_end.remaining());
        let written = state.write_end.push_slice(&buf[..bytes_to_write]);
        self.readable.notify_all();
        written as i32
    }

    /// ### Description
    ///
    /// read_from_pipe moves up to `buf.len()` buffered bytes into `buf`,
    /// blocking while the pipe is empty and the writer is still open.
    ///
    /// ### Returns
    ///
    /// The number of bytes read, 0 at end of file, or a negative errno.
    ///
    /// ### Errors
    ///
    /// * `EAGAIN` - Non-blocking is enabled and there is no data in the pipe.
    ///
    /// [read(2)](https://man7.org/linux/man-pages/man2/read.2.html)
    pub fn read_from_pipe(&self, buf: &mut [u8], nonblocking: bool) -> i32 {
        if buf.is_empty() {
            return 0;
        }

        let mut state = self.state.lock();
        while state.read_end.is_empty() {
            if !state.writer_open {
                return 0;
            }
            if nonblocking {
                return syscall_error(
                    Errno::EAGAIN,
                    "read",
                    "there is no data available right now, try again later",
                );
            }
            self.readable.wait(&mut state);
        }

        let read = state.read_end.pop_slice(buf);
        self.writable.notify_all();
        read as i32
    }
}

impl fmt::Debug for EmulatedPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EmulatedPipe")
            .field("buffered", &state.read_end.len())
            .field("reader_open", &state.reader_open)
            .field("writer_open", &state.writer_open)
            .field("size", &self.size)
            .finish()
    }
}
