/* Benchmarks for the runtime. Results are not checked here to avoid adding
 * bias to the timings. */

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use rustunix::interface::PIPE_BUF;
use rustunix::unixruntime::syscalls::*;
use rustunix::unixruntime::{GlobalState, RuntimeConfig, Task};

mod global_criterion_settings;

pub fn run_benchmark(c: &mut Criterion) {
    let root = tempfile::tempdir().unwrap();
    let config = RuntimeConfig {
        root: root.path().to_path_buf(),
        ..RuntimeConfig::default()
    };
    let gs = GlobalState::from_config(&config, None).unwrap();
    let task = Task::new(gs);
    task._started().unwrap();

    let mut fds = PipeArray::default();
    assert_eq!(task.pipe_syscall(&mut fds), 0);

    // --- write then drain one chunk through a pipe, by chunk size ---
    let mut group = c.benchmark_group("pipe write+read");
    for size in [16usize, 512, PIPE_BUF] {
        let chunk = vec![b'x'; size];
        let mut buf = vec![0u8; size];
        group.bench_with_input(BenchmarkId::new("TP01: runtime pipe", size), &size, |b, _| {
            b.iter(|| {
                task.write_syscall(fds.writefd, &chunk);
                task.read_syscall(fds.readfd, &mut buf);
            })
        });
    }
    group.finish();
}

criterion_group!(name=benches;
                 config=global_criterion_settings::get_criterion();
                 targets=run_benchmark);
criterion_main!(benches);
