use std::fmt::{Debug, Display, Formatter};

/// Enums used to describe pool state
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PoolState {
    ///The pool is created, tasks are queued but not executed.
    Created,
    ///The workers are running.
    Running,
    ///The pool no longer accepts tasks and is draining the queue.
    Stopping,
    ///The pool is stopped.
    Stopped,
}

impl Display for PoolState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
