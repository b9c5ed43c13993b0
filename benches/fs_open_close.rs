/* Benchmarks for the runtime. Results are not checked here to avoid adding
 * bias to the timings, beyond making sure the calls succeed. */

use criterion::{criterion_group, criterion_main, Criterion};

use rustunix::unixruntime::syscalls::*;
use rustunix::unixruntime::{GlobalState, RuntimeConfig, Task};

use std::ffi::CString;

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

    // --- COMPARING open / close ACROSS the runtime + native kernel ---
    let mut group = c.benchmark_group("Compare fs:open+close");

    // Should be similar. Use a linear scale.
    group.plot_config(
        criterion::PlotConfiguration::default().summary_scale(criterion::AxisScale::Linear),
    );

    group.bench_function("TF01: runtime open+close", |b| {
        b.iter(|| {
            let fd = task.open_syscall("/foo", O_CREAT | O_TRUNC | O_WRONLY, S_IRWXA);
            assert!(fd >= 0);
            assert_eq!(task.close_syscall(fd), 0);
        })
    });

    group.bench_function("TF01: runtime /dev/null open+close", |b| {
        b.iter(|| {
            let fd = task.open_syscall("/dev/null", O_RDWR, 0);
            assert!(fd >= 0);
            assert_eq!(task.close_syscall(fd), 0);
        })
    });

    let native = CString::new(root.path().join("native").to_string_lossy().into_owned()).unwrap();
    group.bench_function("TF01: Native OS kernel open+close", |b| {
        b.iter(|| unsafe {
            let fd = libc::open(native.as_ptr(), libc::O_CREAT | libc::O_TRUNC | libc::O_WRONLY, 0o700);
            assert!(fd > 2);
            assert_eq!(libc::close(fd), 0);
        })
    });
    group.finish();
}

criterion_group!(name=benches;
                 config=global_criterion_settings::get_criterion();
                 targets=run_benchmark);
criterion_main!(benches);
