#[cfg(test)]
mod mock_cpu;
mod networking_tests;
mod pipe_tests;

#[cfg(test)]
use crate::unixruntime::{GlobalState, RuntimeConfig, Task};
#[cfg(test)]
use std::sync::Arc;

/// A machine rooted at a fresh temporary directory, with `/dev` mounted.
#[cfg(test)]
pub fn test_machine() -> (tempfile::TempDir, Arc<GlobalState>) {
    test_machine_with(None)
}

#[cfg(test)]
pub fn test_machine_with(
    compiler: Option<Arc<dyn crate::unixruntime::cpu::ImageCompiler>>,
) -> (tempfile::TempDir, Arc<GlobalState>) {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig {
        root: dir.path().to_path_buf(),
        ..RuntimeConfig::default()
    };
    let gs = GlobalState::from_config(&config, compiler).unwrap();
    (dir, gs)
}

/// A registered task with no parent.
#[cfg(test)]
pub fn started_task(gs: &Arc<GlobalState>) -> Arc<Task> {
    let task = Task::new(gs.clone());
    task._started().unwrap();
    task
}

/// Fork bookkeeping without an execution unit: registers a child of
/// `parent` and returns it.
#[cfg(test)]
pub fn fork_task(parent: &Arc<Task>) -> Arc<Task> {
    let child = parent.clone_for_fork();
    let pid = parent.gs().register_task(child.clone()).unwrap();
    child.set_pid(pid);
    parent.add_active_child(pid);
    child
}

#[cfg(test)]
pub fn sizecbuf(size: usize) -> Box<[u8]> {
    vec![0u8; size].into_boxed_slice()
}

#[cfg(test)]
pub fn cbuf2str(buf: &[u8]) -> &str {
    std::str::from_utf8(buf).unwrap()
}
