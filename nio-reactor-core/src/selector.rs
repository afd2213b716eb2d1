use crate::channel::Channel;
use polling::{Event, Events, PollMode, Poller};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io::{Error, ErrorKind};
use std::ops::BitOr;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

/// The readiness a channel is registered for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    /// Registered, but not interested in anything.
    pub const NONE: Interest = Interest(0);
    /// A listening channel has a pending connection.
    pub const ACCEPT: Interest = Interest(1);
    /// A connected channel has data or eof to read.
    pub const READ: Interest = Interest(1 << 1);
    /// A connected channel can be written.
    pub const WRITE: Interest = Interest(1 << 2);

    /// Whether every bit of `other` is set, `NONE` is never contained.
    #[must_use]
    pub const fn contains(self, other: Interest) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    fn readable(self) -> bool {
        self.contains(Interest::ACCEPT) || self.contains(Interest::READ)
    }

    fn to_event(self, key: usize) -> Event {
        match (self.readable(), self.contains(Interest::WRITE)) {
            (true, true) => Event::all(key),
            (true, false) => Event::readable(key),
            (false, true) => Event::writable(key),
            (false, false) => Event::none(key),
        }
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Self) -> Self::Output {
        Interest(self.0 | rhs.0)
    }
}

/// The association of a channel, its interest and the reactor polling it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Registration {
    key: usize,
    interest: Interest,
    reactor: String,
}

impl Registration {
    /// The key identifying this registration inside its reactor.
    #[must_use]
    pub fn key(&self) -> usize {
        self.key
    }

    /// The readiness the channel is registered for.
    #[must_use]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// The name of the reactor owning this registration.
    #[must_use]
    pub fn reactor(&self) -> &str {
        &self.reactor
    }
}

/// One ready channel reported by a single `select` call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ReadinessEvent {
    /// The registration key.
    pub key: usize,
    /// What the channel is ready for.
    pub ready: Interest,
}

#[derive(Debug)]
struct Entry {
    channel: Channel,
    interest: Interest,
}

/// Wraps the os readiness primitive together with its registration table.
///
/// A selector is bound to the thread that created it. `register`, `select`,
/// `reregister` and `cancel` panic when called from any other thread, the
/// only thing other threads may do is `notify` the shared poller.
pub struct Selector {
    name: String,
    owner: ThreadId,
    poller: Arc<Poller>,
    mode: PollMode,
    next_key: usize,
    table: HashMap<usize, Entry>,
    events: Events,
}

impl Debug for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("mode", &self.mode)
            .field("registered", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl Selector {
    /// Create a selector owned by the current thread.
    #[must_use]
    pub fn new(name: impl Into<String>, poller: Arc<Poller>) -> Self {
        let mode = if poller.supports_level() {
            PollMode::Level
        } else {
            PollMode::Oneshot
        };
        Selector {
            name: name.into(),
            owner: std::thread::current().id(),
            poller,
            mode,
            next_key: 0,
            table: HashMap::new(),
            events: Events::new(),
        }
    }

    fn check_owner(&self) {
        assert_eq!(
            self.owner,
            std::thread::current().id(),
            "selector {} touched from a foreign thread",
            self.name
        );
    }

    /// # Errors
    /// if the channel is already closed or the os refuses it.
    pub fn register(
        &mut self,
        channel: Channel,
        interest: Interest,
    ) -> std::io::Result<Registration> {
        self.check_owner();
        if !channel.is_open() {
            return Err(Error::new(ErrorKind::NotConnected, "channel already closed"));
        }
        let key = self.next_key;
        self.next_key = self.next_key.wrapping_add(1);
        // the entry owns the channel, it is deleted from the poller before
        // being dropped in `cancel` or `drop`
        unsafe {
            self.poller
                .add_with_mode(&channel, interest.to_event(key), self.mode)?;
        }
        _ = self.table.insert(key, Entry { channel, interest });
        Ok(Registration {
            key,
            interest,
            reactor: self.name.clone(),
        })
    }

    /// # Errors
    /// if the key is unknown or the os refuses the change.
    pub fn reregister(&mut self, key: usize, interest: Interest) -> std::io::Result<Registration> {
        self.check_owner();
        let entry = self
            .table
            .get_mut(&key)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "registration not found"))?;
        self.poller
            .modify_with_mode(&entry.channel, interest.to_event(key), self.mode)?;
        entry.interest = interest;
        Ok(Registration {
            key,
            interest,
            reactor: self.name.clone(),
        })
    }

    /// Re-arm a one-shot registration after its event was handled.
    ///
    /// # Errors
    /// if the os refuses the change.
    pub fn rearm(&mut self, key: usize) -> std::io::Result<()> {
        if PollMode::Oneshot != self.mode {
            return Ok(());
        }
        self.check_owner();
        if let Some(entry) = self.table.get(&key) {
            self.poller
                .modify_with_mode(&entry.channel, entry.interest.to_event(key), self.mode)?;
        }
        Ok(())
    }

    /// Wait for readiness events, up to `timeout`.
    ///
    /// # Errors
    /// if the os wait call fails.
    pub fn select(&mut self, timeout: Option<Duration>) -> std::io::Result<Vec<ReadinessEvent>> {
        self.check_owner();
        self.events.clear();
        _ = self.poller.wait(&mut self.events, timeout)?;
        let mut ready = Vec::with_capacity(self.events.len());
        for event in self.events.iter() {
            let Some(entry) = self.table.get(&event.key) else {
                continue;
            };
            // hang-ups are reported whatever was asked for, only keep the
            // readiness the entry is registered for
            let mut interest = Interest::NONE;
            if event.readable {
                if entry.interest.contains(Interest::ACCEPT) {
                    interest = interest | Interest::ACCEPT;
                } else if entry.interest.contains(Interest::READ) {
                    interest = interest | Interest::READ;
                }
            }
            if event.writable && entry.interest.contains(Interest::WRITE) {
                interest = interest | Interest::WRITE;
            }
            if !interest.is_none() {
                ready.push(ReadinessEvent {
                    key: event.key,
                    ready: interest,
                });
            }
        }
        Ok(ready)
    }

    /// Remove the registration and close its channel.
    ///
    /// # Errors
    /// if the key is unknown or the os refuses to delete it.
    pub fn cancel(&mut self, key: usize) -> std::io::Result<()> {
        self.check_owner();
        let mut entry = self
            .table
            .remove(&key)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "registration not found"))?;
        let result = self.poller.delete(&entry.channel);
        entry.channel.close();
        result
    }

    /// Get the channel of a registration.
    pub fn channel_mut(&mut self, key: usize) -> Option<&mut Channel> {
        self.check_owner();
        self.table.get_mut(&key).map(|entry| &mut entry.channel)
    }

    /// Get the interest of a registration.
    #[must_use]
    pub fn interest(&self, key: usize) -> Option<Interest> {
        self.table.get(&key).map(|entry| entry.interest)
    }

    /// The number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[must_use]
    pub fn get_name(&self) -> &str {
        &self.name
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        for (_, mut entry) in self.table.drain() {
            _ = self.poller.delete(&entry.channel);
            entry.channel.close();
        }
    }
}
