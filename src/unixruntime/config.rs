// Runtime configuration

use crate::unixruntime::syscalls::sys_constants::MAX_TASKS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for building a [`GlobalState`](super::globalstate::GlobalState).
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Host directory mounted at `/`.
    pub root: PathBuf,
    /// Mount the device filesystem at `/dev`.
    pub mount_dev: bool,
    /// Number of pid slots.
    pub max_tasks: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            root: PathBuf::from("."),
            mount_dev: true,
            max_tasks: MAX_TASKS,
        }
    }
}
