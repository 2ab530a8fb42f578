//! Named task threads.
//!
//! Every long-running task body returns `Result<()>`; the supervisor joins
//! the handle and treats an `Err` or a panic as a fatal task failure.

use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};

/// Default stack for task threads; the bodies are shallow.
pub const TASK_STACK_KB: usize = 64;

/// Spawn `body` on a named thread.
pub fn spawn_task<F>(name: &'static str, body: F) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    log::info!("Spawning '{}' (stack={}KB)", name, TASK_STACK_KB);
    thread::Builder::new()
        .name(name.into())
        .stack_size(TASK_STACK_KB * 1024)
        .spawn(body)
        .map_err(|_| Error::Task("thread creation failed"))
}
