use crate::common::Named;
use crate::pool::constants::PoolState;
use crate::pool::task::BusinessTask;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::fmt::{Debug, Formatter};
use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// Constants.
pub mod constants;

/// Task abstraction and impl.
pub mod task;

/// Business handler abstraction and the default impl.
pub mod business;


/// A fixed-size thread pool running business tasks away from the reactors.
///
/// The task queue is bounded; when it is full `submit` fails with
/// `ErrorKind::WouldBlock` instead of blocking the caller.
pub struct WorkerPool {
    name: String,
    size: usize,
    state: Mutex<PoolState>,
    sender: RwLock<Option<Sender<BusinessTask>>>,
    receiver: Receiver<BusinessTask>,
    //已启动的worker数
    spawned: AtomicUsize,
    //正在执行任务的worker数
    running: AtomicUsize,
    completed: AtomicUsize,
    //已退出的worker数
    exited: Arc<(Mutex<usize>, Condvar)>,
}

impl Debug for WorkerPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("state", &self.get_state())
            .field("queued", &self.queued())
            .field("running", &self.get_running_size())
            .field("completed", &self.get_completed())
            .finish_non_exhaustive()
    }
}

impl Named for WorkerPool {
    fn get_name(&self) -> &str {
        &self.name
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(format!("nio-reactor-worker-{}", uuid::Uuid::new_v4()), 10, 1024)
    }
}

impl WorkerPool {
    /// Create a pool of `size` workers, the workers are spawned by `start`.
    #[must_use]
    pub fn new(name: impl Into<String>, size: usize, capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        WorkerPool {
            name: name.into(),
            size: size.max(1),
            state: Mutex::new(PoolState::Created),
            sender: RwLock::new(Some(sender)),
            receiver,
            spawned: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            exited: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    /// Gets the current state of this pool.
    #[must_use]
    pub fn get_state(&self) -> PoolState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the number of workers.
    #[must_use]
    pub fn get_size(&self) -> usize {
        self.size
    }

    /// Gets the number of tasks currently executing.
    #[must_use]
    pub fn get_running_size(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Gets the number of finished tasks, panicked ones included.
    #[must_use]
    pub fn get_completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    /// Submit a new task to this pool.
    ///
    /// # Errors
    /// `WouldBlock` if the queue is full, `BrokenPipe` if the pool is stopped.
    pub fn submit(
        &self,
        name: Option<String>,
        func: impl FnOnce() + Send + 'static,
    ) -> std::io::Result<()> {
        self.submit_raw(BusinessTask::new(
            name.unwrap_or_else(|| format!("{}|{}", self.name, uuid::Uuid::new_v4())),
            func,
        ))
    }

    /// Submit a new task to this pool.
    ///
    /// # Errors
    /// see `submit`.
    pub fn submit_raw(&self, task: BusinessTask) -> std::io::Result<()> {
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(Error::new(
                ErrorKind::BrokenPipe,
                format!("{} is stopped", self.name),
            ));
        };
        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) => Err(Error::new(
                ErrorKind::WouldBlock,
                format!("{} is saturated, reject {}", self.name, task.get_name()),
            )),
            Err(TrySendError::Disconnected(_)) => Err(Error::new(
                ErrorKind::BrokenPipe,
                format!("{} is stopped", self.name),
            )),
        }
    }

    /// Spawn the workers.
    ///
    /// # Errors
    /// if create the worker threads failed.
    pub fn start(self) -> std::io::Result<Arc<Self>> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if PoolState::Created != *state {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("{} can't start in state {}", self.name, *state),
                ));
            }
            *state = PoolState::Running;
        }
        let arc = Arc::new(self);
        for i in 0..arc.size {
            let consumer = arc.clone();
            // exits once the sender is dropped and the queue is drained
            _ = std::thread::Builder::new()
                .name(format!("{}-{i}", arc.name))
                .spawn(move || consumer.work())
                .map_err(|e| Error::new(ErrorKind::Other, format!("{e:?}")))?;
            _ = arc.spawned.fetch_add(1, Ordering::Release);
        }
        Ok(arc)
    }

    fn work(&self) {
        while let Ok(task) = self.receiver.recv() {
            _ = self.running.fetch_add(1, Ordering::Release);
            _ = task.run();
            _ = self.running.fetch_sub(1, Ordering::Release);
            _ = self.completed.fetch_add(1, Ordering::Release);
        }
        let (lock, cvar) = &*self.exited;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        cvar.notify_all();
    }

    /// Stop accepting tasks, let the workers drain the queue and wait up to
    /// `wait_time` for them to exit.
    ///
    /// # Errors
    /// if timeout.
    pub fn stop(&self, wait_time: Duration) -> std::io::Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                PoolState::Stopped => return Ok(()),
                PoolState::Created => {
                    *state = PoolState::Stopped;
                    drop(self.sender.write().unwrap_or_else(PoisonError::into_inner).take());
                    // nobody will ever run them
                    while self.receiver.try_recv().is_ok() {}
                    return Ok(());
                }
                PoolState::Running | PoolState::Stopping => *state = PoolState::Stopping,
            }
        }
        drop(self.sender.write().unwrap_or_else(PoisonError::into_inner).take());
        let spawned = self.spawned.load(Ordering::Acquire);
        let (lock, cvar) = &*self.exited;
        let result = cvar
            .wait_timeout_while(
                lock.lock().unwrap_or_else(PoisonError::into_inner),
                wait_time,
                |exited| *exited < spawned,
            )
            .unwrap_or_else(PoisonError::into_inner);
        if result.1.timed_out() {
            return Err(Error::new(ErrorKind::TimedOut, "stop timeout !"));
        }
        drop(result);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = PoolState::Stopped;
        crate::info!("{} stopped", self.name);
        Ok(())
    }
}
