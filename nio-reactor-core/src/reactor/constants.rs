use std::fmt::{Debug, Display, Formatter};

/// Enums used to describe reactor state
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReactorState {
    ///The reactor is created, its thread is not started yet.
    NotStarted,
    ///The reactor thread is polling.
    Running,
    ///The reactor has been asked to stop.
    Stopping,
    ///The reactor thread has exited.
    Stopped,
}

impl Display for ReactorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// The default reactor wait timeout in ms.
pub const DEFAULT_SELECT_TIMEOUT_MS: u64 = 1000;
