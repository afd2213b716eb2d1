use crate::channel::{Channel, ChannelState};
use crate::common::Named;
use crate::config::Config;
use crate::reactor::constants::ReactorState;
use crate::reactor::task::{RegisterHandle, RegistrationTask};
use crate::selector::{Interest, ReadinessEvent, Registration, Selector};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use crossbeam_utils::Backoff;
use polling::Poller;
use std::fmt::{Debug, Formatter};
use std::io::{Error, ErrorKind};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, TryLockError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Constants.
pub mod constants;

/// Registration task abstraction and impl.
pub mod task;

/// The acceptor role.
pub mod acceptor;

/// The io role.
pub mod io;


/// The role specific behavior bound into a [`ReactorThread`].
pub trait Handler: Debug + Send + Sync {
    /// Handle a ready channel on the reactor thread.
    ///
    /// Returning `Ok(ChannelState::Closed)` or an error cancels the
    /// registration and closes the channel.
    ///
    /// # Errors
    /// if an io error occurred on this channel.
    fn handle(&self, channel: &mut Channel) -> std::io::Result<ChannelState>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn handle(&self, channel: &mut Channel) -> std::io::Result<ChannelState> {
        (**self).handle(channel)
    }
}

/// Counts consecutive multiplexer failures of a reactor thread.
#[derive(Debug)]
pub(crate) struct SelectFailures {
    consecutive: usize,
    max: usize,
}

impl SelectFailures {
    pub(crate) fn new(max: usize) -> Self {
        SelectFailures {
            consecutive: 0,
            max: max.max(1),
        }
    }

    pub(crate) fn succeeded(&mut self) {
        self.consecutive = 0;
    }

    /// Returns `true` once the thread should retire.
    pub(crate) fn failed(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.max
    }

    pub(crate) fn consecutive(&self) -> usize {
        self.consecutive
    }
}

/// A thread owning one readiness multiplexer and dispatching its ready
/// channels to a [`Handler`].
pub struct ReactorThread {
    name: String,
    cpu: Option<usize>,
    handler: Box<dyn Handler>,
    poller: Arc<Poller>,
    //taken when the reactor stops, nothing can be queued afterwards
    sender: RwLock<Option<Sender<RegistrationTask>>>,
    receiver: Mutex<Option<Receiver<RegistrationTask>>>,
    state: (Mutex<ReactorState>, Condvar),
    registered: AtomicUsize,
    select_timeout: Duration,
    max_select_failures: usize,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Debug for ReactorThread {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorThread")
            .field("name", &self.name)
            .field("cpu", &self.cpu)
            .field("handler", &self.handler)
            .field("state", &self.get_state())
            .field("registered", &self.registered_count())
            .field("pending", &self.pending_tasks())
            .finish_non_exhaustive()
    }
}

impl Named for ReactorThread {
    fn get_name(&self) -> &str {
        &self.name
    }
}

impl ReactorThread {
    /// Create a reactor, the thread is spawned by `start`.
    ///
    /// # Errors
    /// if the os multiplexer can't be created.
    pub fn new(
        name: String,
        cpu: usize,
        handler: impl Handler + 'static,
        config: &Config,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(config.get_task_queue_capacity());
        Ok(ReactorThread {
            name,
            cpu: config.get_bind_cpu().then_some(cpu),
            handler: Box::new(handler),
            poller: Arc::new(Poller::new()?),
            sender: RwLock::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            state: (Mutex::new(ReactorState::NotStarted), Condvar::new()),
            registered: AtomicUsize::new(0),
            select_timeout: config.get_select_timeout(),
            max_select_failures: config.get_max_select_failures(),
            join_handle: Mutex::new(None),
        })
    }

    /// Gets the current state of this reactor.
    #[must_use]
    pub fn get_state(&self) -> ReactorState {
        *self.state.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The number of channels registered with this reactor's multiplexer,
    /// as last published by the reactor thread.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registered.load(Ordering::Acquire)
    }

    /// The number of tasks waiting in the queue.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Sender::len)
    }

    /// Spawn the reactor thread. Calling it on a started reactor does nothing.
    ///
    /// # Errors
    /// if spawn the thread failed.
    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let mut state = self.state.0.lock().unwrap_or_else(PoisonError::into_inner);
        if ReactorState::NotStarted != *state {
            return Ok(());
        }
        let Some(receiver) = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };
        *state = ReactorState::Running;
        drop(state);
        let consumer = self.clone();
        let queue = receiver.clone();
        let join_handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || consumer.event_loop(&receiver))
            .map_err(|e| {
                self.close_queue(&queue);
                _ = self.change_state(ReactorState::Stopped);
                Error::new(ErrorKind::Other, format!("{e:?}"))
            })?;
        *self
            .join_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(join_handle);
        Ok(())
    }

    fn change_state(&self, state: ReactorState) -> ReactorState {
        let (lock, cvar) = &self.state;
        let previous = std::mem::replace(
            &mut *lock.lock().unwrap_or_else(PoisonError::into_inner),
            state,
        );
        cvar.notify_all();
        previous
    }

    fn event_loop(&self, receiver: &Receiver<RegistrationTask>) {
        if let Some(cpu) = self.cpu {
            crate::common::bind_current(cpu);
        }
        let mut selector = Selector::new(self.name.clone(), self.poller.clone());
        let mut failures = SelectFailures::new(self.max_select_failures);
        crate::info!("{} started", self.name);
        while ReactorState::Running == self.get_state() {
            while let Ok(task) = receiver.try_recv() {
                task.run(&mut selector);
            }
            self.registered.store(selector.len(), Ordering::Release);
            let events = match selector.select(Some(self.select_timeout)) {
                Ok(events) => {
                    failures.succeeded();
                    events
                }
                Err(e) if ErrorKind::Interrupted == e.kind() => continue,
                Err(e) => {
                    let retire = failures.failed();
                    crate::error!(
                        "{} select failed {} times:{e}",
                        self.name,
                        failures.consecutive()
                    );
                    if retire {
                        crate::error!("{} retired after repeated select failures", self.name);
                        break;
                    }
                    continue;
                }
            };
            for event in events {
                self.dispatch(&mut selector, event);
            }
            self.registered.store(selector.len(), Ordering::Release);
        }
        // fail the queued tasks before closing the channels
        self.close_queue(receiver);
        drop(selector);
        self.registered.store(0, Ordering::Release);
        _ = self.change_state(ReactorState::Stopped);
        crate::warn!("{} has exited", self.name);
    }

    fn dispatch(&self, selector: &mut Selector, event: ReadinessEvent) {
        let Some(channel) = selector.channel_mut(event.key) else {
            return;
        };
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            channel.set_nonblocking(true)?;
            self.handler.handle(channel)
        }));
        let cancel = match result {
            Ok(Ok(state)) => ChannelState::Closed == state || !channel.is_open(),
            Ok(Err(e)) => {
                crate::debug!("{} channel {} failed:{e}", self.name, event.key);
                true
            }
            Err(e) => {
                let message = e
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| e.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("handler panicked without message");
                crate::error!("{} channel {} panicked:{message}", self.name, event.key);
                true
            }
        };
        if cancel {
            if let Err(e) = selector.cancel(event.key) {
                crate::warn!("{} cancel {} failed:{e}", self.name, event.key);
            }
        } else if let Err(e) = selector.rearm(event.key) {
            crate::warn!("{} rearm {} failed:{e}", self.name, event.key);
            _ = selector.cancel(event.key);
        }
    }

    /// Revoke the sender and drop every queued task, their joiners observe
    /// `BrokenPipe`.
    ///
    /// Submitters blocked on a full queue hold the read lock, so the queue is
    /// drained while waiting for the write lock.
    fn close_queue(&self, receiver: &Receiver<RegistrationTask>) {
        let backoff = Backoff::new();
        loop {
            while let Ok(task) = receiver.try_recv() {
                drop(task);
            }
            let mut sender = match self.sender.try_write() {
                Ok(sender) => sender,
                Err(TryLockError::Poisoned(e)) => e.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    backoff.snooze();
                    continue;
                }
            };
            drop(sender.take());
            break;
        }
        while let Ok(task) = receiver.try_recv() {
            drop(task);
        }
    }

    fn stopped(&self) -> Error {
        Error::new(ErrorKind::BrokenPipe, format!("{} stopped", self.name))
    }

    fn submit(&self, task: RegistrationTask) -> std::io::Result<()> {
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        sender
            .as_ref()
            .ok_or_else(|| self.stopped())?
            .send(task)
            .map_err(|_| self.stopped())?;
        drop(sender);
        // wake the wait so the task is drained at once
        _ = self.poller.notify();
        Ok(())
    }

    /// Hand a channel to this reactor, callable from any thread.
    ///
    /// Blocks while the task queue is full, the returned handle resolves once
    /// the reactor thread registered the channel.
    ///
    /// # Errors
    /// if the reactor is stopped.
    pub fn register(
        &self,
        channel: Channel,
        interest: Interest,
    ) -> std::io::Result<RegisterHandle<Registration>> {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        self.submit(RegistrationTask::Register {
            channel,
            interest,
            reply,
        })?;
        Ok(RegisterHandle::new(receiver))
    }

    /// Like `register`, but fails with `WouldBlock` instead of waiting for a
    /// free slot in the task queue.
    ///
    /// # Errors
    /// if the queue is full or the reactor is stopped.
    pub fn try_register(
        &self,
        channel: Channel,
        interest: Interest,
    ) -> std::io::Result<RegisterHandle<Registration>> {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let sender = sender.as_ref().ok_or_else(|| self.stopped())?;
        match sender.try_send(RegistrationTask::Register {
            channel,
            interest,
            reply,
        }) {
            Ok(()) => {
                _ = self.poller.notify();
                Ok(RegisterHandle::new(receiver))
            }
            Err(TrySendError::Full(_)) => Err(Error::new(
                ErrorKind::WouldBlock,
                format!("{} task queue is full", self.name),
            )),
            Err(TrySendError::Disconnected(_)) => Err(self.stopped()),
        }
    }

    /// Change the interest of a registration owned by this reactor.
    ///
    /// # Errors
    /// if the reactor is stopped.
    pub fn set_interest(
        &self,
        registration: &Registration,
        interest: Interest,
    ) -> std::io::Result<RegisterHandle<Registration>> {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        self.submit(RegistrationTask::Interest {
            key: registration.key(),
            interest,
            reply,
        })?;
        Ok(RegisterHandle::new(receiver))
    }

    /// Cancel a registration owned by this reactor and close its channel.
    ///
    /// # Errors
    /// if the reactor is stopped.
    pub fn cancel(&self, registration: &Registration) -> std::io::Result<RegisterHandle<()>> {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        self.submit(RegistrationTask::Cancel {
            key: registration.key(),
            reply,
        })?;
        Ok(RegisterHandle::new(receiver))
    }

    /// Stop this reactor: interrupt the wait, close every registered channel
    /// and wait up to `wait_time` for the thread to exit.
    ///
    /// # Errors
    /// if timeout.
    pub fn stop(&self, wait_time: Duration) -> std::io::Result<()> {
        let (lock, cvar) = &self.state;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            ReactorState::Stopped => return Ok(()),
            ReactorState::NotStarted => {
                *state = ReactorState::Stopped;
                drop(state);
                let receiver = self
                    .receiver
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(receiver) = receiver {
                    self.close_queue(&receiver);
                }
                cvar.notify_all();
                return Ok(());
            }
            ReactorState::Running => *state = ReactorState::Stopping,
            ReactorState::Stopping => {}
        }
        drop(state);
        _ = self.poller.notify();
        let result = cvar
            .wait_timeout_while(
                lock.lock().unwrap_or_else(PoisonError::into_inner),
                wait_time,
                |state| ReactorState::Stopped != *state,
            )
            .unwrap_or_else(PoisonError::into_inner);
        if result.1.timed_out() {
            return Err(Error::new(ErrorKind::TimedOut, "stop timeout !"));
        }
        drop(result);
        if let Some(join_handle) = self
            .join_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            _ = join_handle.join();
        }
        Ok(())
    }
}
