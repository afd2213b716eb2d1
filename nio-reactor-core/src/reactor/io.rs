use crate::channel::{Channel, ChannelState};
use crate::config::Config;
use crate::pool::business::{BusinessHandler, LoggingHandler};
use crate::pool::WorkerPool;
use crate::reactor::Handler;
use crossbeam_utils::Backoff;
use std::io::{Error, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reads requests, offloads them to the worker pool and writes the fixed
/// response back.
///
/// A request ends as soon as one read returned at least one byte. This only
/// holds for short requests sent in a single burst, there is no real framing.
#[derive(Debug)]
pub struct IoHandler {
    pool: Arc<WorkerPool>,
    business: Arc<dyn BusinessHandler>,
    response: Arc<[u8]>,
    read_buffer_size: usize,
    write_timeout: Duration,
}

impl IoHandler {
    /// Create a handler whose business tasks only log the requests.
    #[must_use]
    pub fn new(pool: Arc<WorkerPool>, config: &Config) -> Self {
        Self::with_business(pool, Arc::new(LoggingHandler), config)
    }

    /// Create a handler running `business` for every request.
    #[must_use]
    pub fn with_business(
        pool: Arc<WorkerPool>,
        business: Arc<dyn BusinessHandler>,
        config: &Config,
    ) -> Self {
        IoHandler {
            pool,
            business,
            response: Arc::from(config.get_response()),
            read_buffer_size: config.get_read_buffer_size(),
            write_timeout: config.get_write_timeout(),
        }
    }

    /// Fire and forget, a saturated pool is retried briefly and then the
    /// request is dropped.
    fn offload(&self, peer: Option<SocketAddr>, data: Arc<[u8]>) {
        let backoff = Backoff::new();
        loop {
            let business = self.business.clone();
            let request = data.clone();
            match self
                .pool
                .submit(None, move || business.handle(peer, &request))
            {
                Ok(()) => return,
                Err(e) if ErrorKind::WouldBlock == e.kind() && !backoff.is_completed() => {
                    backoff.snooze();
                }
                Err(e) => {
                    crate::warn!("drop business task from {peer:?}:{e}");
                    return;
                }
            }
        }
    }

    fn flush(&self, mut stream: &TcpStream) -> std::io::Result<()> {
        let deadline = Instant::now() + self.write_timeout;
        let backoff = Backoff::new();
        let mut written = 0;
        while written < self.response.len() {
            match stream.write(&self.response[written..]) {
                Ok(0) => return Err(Error::new(ErrorKind::WriteZero, "peer stopped reading")),
                Ok(n) => {
                    written += n;
                    backoff.reset();
                }
                Err(e) if ErrorKind::WouldBlock == e.kind() => {
                    if Instant::now() >= deadline {
                        return Err(Error::new(ErrorKind::TimedOut, "flush response timeout"));
                    }
                    backoff.snooze();
                }
                Err(e) if ErrorKind::Interrupted == e.kind() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Handler for IoHandler {
    fn handle(&self, channel: &mut Channel) -> std::io::Result<ChannelState> {
        let mut stream = channel.as_stream().ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput, "io handler only handles streams")
        })?;
        let mut buffer = vec![0; self.read_buffer_size];
        let read = loop {
            match stream.read(&mut buffer) {
                Ok(n) => break n,
                Err(e) if ErrorKind::Interrupted == e.kind() => {}
                // spurious wakeup
                Err(e) if ErrorKind::WouldBlock == e.kind() => return Ok(ChannelState::Open),
                Err(e) => return Err(e),
            }
        };
        if read == 0 {
            return Ok(ChannelState::Closed);
        }
        buffer.truncate(read);
        let peer = stream.peer_addr().ok();
        crate::debug!(
            "{} received data from {peer:?}:{}",
            std::thread::current().name().unwrap_or_default(),
            String::from_utf8_lossy(&buffer)
        );
        self.offload(peer, Arc::from(buffer));
        self.flush(stream)?;
        Ok(ChannelState::Open)
    }
}
