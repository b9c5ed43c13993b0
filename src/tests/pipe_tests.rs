#[cfg(test)]
pub mod pipe_tests {
    use super::super::*;
    use crate::interface::{self, Errno, EmulatedPipe, StatData, PIPE_BUF};
    use crate::unixruntime::syscalls::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn errno(e: Errno) -> i32 {
        -(e as i32)
    }

    #[test]
    pub fn ut_unix_pipe_atomic_writes() {
        let pipe = EmulatedPipe::new_with_capacity(PIPE_BUF);
        assert_eq!(pipe.capacity(), PIPE_BUF);
        assert_eq!(pipe.write_to_pipe(&[1u8; 3000], true), 3000);

        // a small write that does not fit entirely is refused, not split
        assert_eq!(pipe.write_to_pipe(&[2u8; 2000], true), errno(Errno::EAGAIN));
        assert_eq!(pipe.len(), 3000);
        assert_eq!(pipe.write_to_pipe(&[2u8; PIPE_BUF - 3000], true), (PIPE_BUF - 3000) as i32);

        let mut buf = vec![0u8; PIPE_BUF];
        assert_eq!(pipe.read_from_pipe(&mut buf, true), PIPE_BUF as i32);
        assert!(buf[..3000].iter().all(|b| *b == 1));
        assert!(buf[3000..].iter().all(|b| *b == 2));
        assert!(pipe.is_empty());
        assert_eq!(pipe.read_from_pipe(&mut buf, true), errno(Errno::EAGAIN));
    }

    #[test]
    pub fn ut_unix_pipe_large_write_is_short() {
        let pipe = interface::new_pipe();
        let big = vec![7u8; pipe.capacity() + 1000];
        assert_eq!(pipe.write_to_pipe(&big, true), pipe.capacity() as i32);
        assert_eq!(pipe.write_to_pipe(&[0u8; 1], true), errno(Errno::EAGAIN));
        assert_eq!(pipe.write_to_pipe(&[], true), 0);
    }

    #[test]
    pub fn ut_unix_pipe_end_closing() {
        let pipe = interface::new_pipe();
        assert_eq!(pipe.write_to_pipe(b"tail", false), 4);
        pipe.close_write();
        let mut buf = [0u8; 8];
        assert_eq!(pipe.read_from_pipe(&mut buf, false), 4);
        assert_eq!(&buf[..4], b"tail");
        assert_eq!(pipe.read_from_pipe(&mut buf, false), 0);

        let pipe = interface::new_pipe();
        pipe.close_read();
        assert_eq!(pipe.write_to_pipe(b"lost", false), errno(Errno::EPIPE));
    }

    #[test]
    pub fn ut_unix_pipe_blocked_reader_wakes() {
        let pipe = Arc::new(interface::new_pipe());
        let reader = {
            let pipe = pipe.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                let n = pipe.read_from_pipe(&mut buf, false);
                buf[..n as usize].to_vec()
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(pipe.write_to_pipe(b"wake", false), 4);
        assert_eq!(reader.join().unwrap(), b"wake".to_vec());

        // a blocked reader sees end of file when the writer goes away
        let reader = {
            let pipe = pipe.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                pipe.read_from_pipe(&mut buf, false)
            })
        };
        thread::sleep(Duration::from_millis(50));
        pipe.close_write();
        assert_eq!(reader.join().unwrap(), 0);
    }

    #[test]
    pub fn ut_unix_pipe_blocked_writer() {
        let pipe = Arc::new(EmulatedPipe::new_with_capacity(PIPE_BUF));
        assert_eq!(pipe.write_to_pipe(&vec![1u8; PIPE_BUF], false), PIPE_BUF as i32);
        let writer = {
            let pipe = pipe.clone();
            thread::spawn(move || pipe.write_to_pipe(&[2u8; 10], false))
        };
        thread::sleep(Duration::from_millis(50));
        let mut buf = vec![0u8; 100];
        assert_eq!(pipe.read_from_pipe(&mut buf, false), 100);
        assert_eq!(writer.join().unwrap(), 10);
        assert_eq!(pipe.len(), PIPE_BUF - 100 + 10);

        // closing the reader fails a blocked writer
        assert_eq!(pipe.write_to_pipe(&vec![3u8; 90], false), 90);
        let writer = {
            let pipe = pipe.clone();
            thread::spawn(move || pipe.write_to_pipe(&[4u8; 10], false))
        };
        thread::sleep(Duration::from_millis(50));
        pipe.close_read();
        assert_eq!(writer.join().unwrap(), errno(Errno::EPIPE));
    }

    #[test]
    pub fn ut_unix_pipe_writers_do_not_interleave() {
        const WRITES: usize = 64;
        let pipe = Arc::new(interface::new_pipe());
        let writers: Vec<_> = [b'a', b'b']
            .into_iter()
            .map(|fill| {
                let pipe = pipe.clone();
                thread::spawn(move || {
                    let chunk = vec![fill; PIPE_BUF];
                    for _ in 0..WRITES {
                        assert_eq!(pipe.write_to_pipe(&chunk, false), PIPE_BUF as i32);
                    }
                })
            })
            .collect();

        let total = 2 * WRITES * PIPE_BUF;
        let mut stream = Vec::with_capacity(total);
        let mut buf = vec![0u8; 3000];
        while stream.len() < total {
            let n = pipe.read_from_pipe(&mut buf, false);
            assert!(n > 0);
            stream.extend_from_slice(&buf[..n as usize]);
        }
        for writer in writers {
            writer.join().unwrap();
        }
        for chunk in stream.chunks(PIPE_BUF) {
            assert!(chunk.iter().all(|b| *b == chunk[0]));
        }
    }

    #[test]
    pub fn ut_unix_pipe_syscall() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);
        let mut fds = PipeArray::default();
        assert_eq!(task.pipe_syscall(&mut fds), 0);
        assert_eq!((fds.readfd, fds.writefd), (0, 1));

        assert_eq!(task.write_syscall(fds.writefd, b"hi"), 2);
        let mut statbuf = StatData::default();
        assert_eq!(task.fstat_syscall(fds.readfd, &mut statbuf), 0);
        assert_eq!(statbuf.st_mode & S_IFMT, S_IFIFO);
        assert_eq!(statbuf.st_size, 2);
        assert_eq!(task.lseek_syscall(fds.readfd, 0, SEEK_CUR), errno(Errno::ESPIPE));
        assert_eq!(task.write_syscall(fds.readfd, b"x"), errno(Errno::EBADF));

        let mut buf = sizecbuf(8);
        assert_eq!(task.read_syscall(fds.writefd, &mut buf), errno(Errno::EBADF));
        assert_eq!(task.read_syscall(fds.readfd, &mut buf), 2);
        assert_eq!(cbuf2str(&buf[..2]), "hi");

        assert_eq!(task.fcntl_syscall(fds.readfd, F_SETFL, O_NONBLOCK), 0);
        assert_eq!(task.fcntl_syscall(fds.readfd, F_GETFL, 0), O_RDONLY | O_NONBLOCK);
        assert_eq!(task.read_syscall(fds.readfd, &mut buf), errno(Errno::EAGAIN));

        assert_eq!(task.close_syscall(fds.writefd), 0);
        assert_eq!(task.read_syscall(fds.readfd, &mut buf), 0);
    }

    #[test]
    pub fn ut_unix_pipe_reader_closed() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);
        let mut fds = PipeArray::default();
        assert_eq!(task.pipe_syscall(&mut fds), 0);
        let extra = task.dup_syscall(fds.readfd);
        assert_eq!(task.close_syscall(fds.readfd), 0);
        // the dup still holds the read end open
        assert_eq!(task.write_syscall(fds.writefd, b"ok"), 2);
        assert_eq!(task.close_syscall(extra), 0);
        assert_eq!(task.write_syscall(fds.writefd, b"no"), errno(Errno::EPIPE));
    }

    #[test]
    pub fn ut_unix_pipe_needs_two_slots() {
        let (_dir, gs) = test_machine();
        let task = started_task(&gs);
        for _ in 0..OPEN_MAX - 1 {
            assert!(task.open_syscall("/dev/null", O_RDONLY, 0) >= 0);
        }
        let mut fds = PipeArray::default();
        assert_eq!(task.pipe_syscall(&mut fds), errno(Errno::EMFILE));
        assert_eq!(task.open_fds().len(), OPEN_MAX - 1);
    }

    #[test]
    pub fn ut_unix_pipe_shared_across_fork() {
        let (_dir, gs) = test_machine();
        let parent = started_task(&gs);
        let mut fds = PipeArray::default();
        assert_eq!(parent.pipe_syscall(&mut fds), 0);
        let child = fork_task(&parent);

        assert_eq!(child.write_syscall(fds.writefd, b"from child"), 10);
        let mut buf = sizecbuf(32);
        assert_eq!(parent.read_syscall(fds.readfd, &mut buf), 10);
        assert_eq!(cbuf2str(&buf[..10]), "from child");

        // end of file only once every copy of the write end is closed
        assert_eq!(parent.close_syscall(fds.writefd), 0);
        assert_eq!(parent.fcntl_syscall(fds.readfd, F_SETFL, O_NONBLOCK), 0);
        assert_eq!(parent.read_syscall(fds.readfd, &mut buf), errno(Errno::EAGAIN));
        assert_eq!(child.close_syscall(fds.writefd), 0);
        assert_eq!(parent.read_syscall(fds.readfd, &mut buf), 0);
    }

    #[test]
    pub fn ut_unix_pipe_blocking_read_across_tasks() {
        let (_dir, gs) = test_machine();
        let parent = started_task(&gs);
        let mut fds = PipeArray::default();
        assert_eq!(parent.pipe_syscall(&mut fds), 0);
        let child = fork_task(&parent);

        let reader = {
            let parent = parent.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                let n = parent.read_syscall(fds.readfd, &mut buf);
                buf[..n.max(0) as usize].to_vec()
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(child.write_syscall(fds.writefd, b"late"), 4);
        assert_eq!(reader.join().unwrap(), b"late".to_vec());
    }
}
