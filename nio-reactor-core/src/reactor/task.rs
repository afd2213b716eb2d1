use crate::channel::Channel;
use crate::selector::{Interest, Registration, Selector};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io::{Error, ErrorKind};
use std::time::Duration;

/// A mutation of a reactor's registration table, executed by the reactor
/// thread itself.
#[derive(Debug)]
pub(crate) enum RegistrationTask {
    Register {
        channel: Channel,
        interest: Interest,
        reply: Sender<std::io::Result<Registration>>,
    },
    Interest {
        key: usize,
        interest: Interest,
        reply: Sender<std::io::Result<Registration>>,
    },
    Cancel {
        key: usize,
        reply: Sender<std::io::Result<()>>,
    },
}

impl RegistrationTask {
    pub(crate) fn run(self, selector: &mut Selector) {
        match self {
            RegistrationTask::Register {
                channel,
                interest,
                reply,
            } => {
                let result = selector.register(channel, interest);
                if let Err(e) = &result {
                    crate::warn!("{} register failed:{e}", selector.get_name());
                }
                // the submitter may have given up waiting
                _ = reply.send(result);
            }
            RegistrationTask::Interest {
                key,
                interest,
                reply,
            } => {
                _ = reply.send(selector.reregister(key, interest));
            }
            RegistrationTask::Cancel { key, reply } => {
                _ = reply.send(selector.cancel(key));
            }
        }
    }
}

/// Waits for the result of a task submitted to a reactor.
#[derive(Debug)]
pub struct RegisterHandle<T>(Receiver<std::io::Result<T>>);

impl<T> RegisterHandle<T> {
    pub(crate) fn new(receiver: Receiver<std::io::Result<T>>) -> Self {
        RegisterHandle(receiver)
    }

    /// Block until the owning reactor executed the task.
    ///
    /// # Errors
    /// if the task failed, or the reactor stopped before executing it.
    pub fn join(self) -> std::io::Result<T> {
        self.0
            .recv()
            .map_err(|_| Error::new(ErrorKind::BrokenPipe, "reactor dropped the task"))?
    }

    /// Block until the owning reactor executed the task, up to `dur`.
    ///
    /// # Errors
    /// if timeout, see `join` for the others.
    pub fn timeout_join(&self, dur: Duration) -> std::io::Result<T> {
        match self.0.recv_timeout(dur) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::new(ErrorKind::TimedOut, "join timeout")),
            Err(RecvTimeoutError::Disconnected) => Err(Error::new(
                ErrorKind::BrokenPipe,
                "reactor dropped the task",
            )),
        }
    }
}
