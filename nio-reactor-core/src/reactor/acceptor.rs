use crate::channel::{Channel, ChannelState};
use crate::reactor::constants::ReactorState;
use crate::reactor::{Handler, ReactorThread};
use crate::selector::Interest;
use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Picks indexes in `0..size` one after another.
#[derive(Debug)]
pub struct RoundRobin {
    index: AtomicUsize,
    size: usize,
}

impl RoundRobin {
    /// # Panics
    /// if `size` is zero.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "round robin over nothing");
        RoundRobin {
            index: AtomicUsize::new(0),
            size,
        }
    }

    /// The next index, always `< size`.
    pub fn next(&self) -> usize {
        self.index.fetch_add(1, Ordering::Relaxed) % self.size
    }

    /// The number of indexes picked from.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Accepts pending connections and hands them to the io reactors.
#[derive(Debug)]
pub struct Acceptor {
    io_reactors: Arc<[Arc<ReactorThread>]>,
    next: RoundRobin,
}

impl Acceptor {
    /// # Panics
    /// if `io_reactors` is empty.
    #[must_use]
    pub fn new(io_reactors: Arc<[Arc<ReactorThread>]>) -> Self {
        let next = RoundRobin::new(io_reactors.len());
        Acceptor { io_reactors, next }
    }

    /// Hand the channel to the next live io reactor, a stopped or stopping
    /// one is skipped.
    fn dispatch(&self, channel: Channel) -> std::io::Result<String> {
        for _ in 0..self.next.size() {
            let io_reactor = &self.io_reactors[self.next.next()];
            if matches!(
                io_reactor.get_state(),
                ReactorState::Stopping | ReactorState::Stopped
            ) {
                continue;
            }
            io_reactor.start()?;
            let registration = io_reactor.register(channel, Interest::READ)?.join()?;
            return Ok(registration.reactor().to_string());
        }
        Err(Error::new(ErrorKind::BrokenPipe, "all io reactors stopped"))
    }
}

impl Handler for Acceptor {
    fn handle(&self, channel: &mut Channel) -> std::io::Result<ChannelState> {
        let listener = channel.as_listener().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                "acceptor only handles listening channels",
            )
        })?;
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if ErrorKind::WouldBlock == e.kind() => return Ok(ChannelState::Open),
            Err(e) => {
                // keep listening, the failure belongs to one connection
                crate::warn!("accept failed:{e}");
                return Ok(ChannelState::Open);
            }
        };
        if let Err(e) = stream.set_nonblocking(true) {
            crate::warn!("drop connection {peer}:{e}");
            return Ok(ChannelState::Open);
        }
        match self.dispatch(Channel::from(stream)) {
            Ok(io_reactor) => {
                crate::info!(
                    "{} accepted new connection:{peer} -> {io_reactor}",
                    std::thread::current().name().unwrap_or_default()
                );
            }
            Err(e) => {
                crate::warn!("drop connection {peer}, handoff failed:{e}");
            }
        }
        Ok(ChannelState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::reactor::io::IoHandler;
    use crate::pool::WorkerPool;
    use std::net::{TcpListener, TcpStream};
    use std::time::{Duration, Instant};

    #[test]
    fn test_round_robin_fairness() {
        for (size, picks) in [(1, 7), (3, 8), (4, 4), (5, 23)] {
            let round_robin = RoundRobin::new(size);
            let mut counts = vec![0; size];
            for _ in 0..picks {
                let index = round_robin.next();
                assert!(index < size);
                counts[index] += 1;
            }
            let floor = picks / size;
            let ceil = picks.div_ceil(size);
            assert!(counts.iter().all(|c| *c == floor || *c == ceil), "{counts:?}");
        }
    }

    #[test]
    fn test_round_robin_wraps() {
        let round_robin = RoundRobin {
            index: AtomicUsize::new(usize::MAX - 1),
            size: 3,
        };
        for _ in 0..6 {
            assert!(round_robin.next() < 3);
        }
    }

    fn io_reactors(size: usize) -> std::io::Result<Arc<[Arc<ReactorThread>]>> {
        let mut config = Config::default();
        _ = config.set_select_timeout(Duration::from_millis(100));
        let pool = Arc::new(WorkerPool::new("test-acceptor-worker", 1, 16));
        (0..size)
            .map(|i| {
                ReactorThread::new(
                    format!("test-acceptor-io-{i}"),
                    i,
                    IoHandler::new(pool.clone(), &config),
                    &config,
                )
                .map(Arc::new)
            })
            .collect()
    }

    #[test]
    fn test_no_pending_connection() -> std::io::Result<()> {
        let acceptor = Acceptor::new(io_reactors(1)?);
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let mut channel = Channel::from(listener);
        assert_eq!(ChannelState::Open, acceptor.handle(&mut channel)?);
        assert_eq!(ReactorState::NotStarted, acceptor.io_reactors[0].get_state());
        Ok(())
    }

    #[test]
    fn test_handoff_starts_io_reactor() -> std::io::Result<()> {
        let io_reactors = io_reactors(2)?;
        let acceptor = Acceptor::new(io_reactors.clone());
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let _client = TcpStream::connect(listener.local_addr()?)?;
        let mut channel = Channel::from(listener);
        channel.set_nonblocking(true)?;
        let deadline = Instant::now() + Duration::from_secs(3);
        while io_reactors[0].registered_count() == 0 && Instant::now() < deadline {
            assert_eq!(ChannelState::Open, acceptor.handle(&mut channel)?);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(ReactorState::Running, io_reactors[0].get_state());
        assert_eq!(1, io_reactors[0].registered_count());
        assert_eq!(ReactorState::NotStarted, io_reactors[1].get_state());
        for io_reactor in io_reactors.iter() {
            io_reactor.stop(Duration::from_secs(3))?;
        }
        Ok(())
    }

    /// Keep accepting on `channel` until `expected` connections were handed off.
    fn accept_all(
        acceptor: &Acceptor,
        channel: &mut Channel,
        expected: usize,
    ) -> std::io::Result<()> {
        let deadline = Instant::now() + Duration::from_secs(3);
        while acceptor
            .io_reactors
            .iter()
            .map(|io_reactor| io_reactor.registered_count())
            .sum::<usize>()
            < expected
            && Instant::now() < deadline
        {
            assert_eq!(ChannelState::Open, acceptor.handle(channel)?);
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    #[test]
    fn test_skips_stopped_io_reactor() -> std::io::Result<()> {
        let io_reactors = io_reactors(3)?;
        io_reactors[1].stop(Duration::from_secs(1))?;
        let acceptor = Acceptor::new(io_reactors.clone());
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let mut channel = Channel::from(listener);
        channel.set_nonblocking(true)?;
        let addr = channel.local_addr()?;
        let _clients = (0..6)
            .map(|_| TcpStream::connect(addr))
            .collect::<std::io::Result<Vec<_>>>()?;
        accept_all(&acceptor, &mut channel, 6)?;
        assert_eq!(3, io_reactors[0].registered_count());
        assert_eq!(0, io_reactors[1].registered_count());
        assert_eq!(3, io_reactors[2].registered_count());
        for io_reactor in io_reactors.iter() {
            io_reactor.stop(Duration::from_secs(3))?;
        }
        Ok(())
    }

    #[test]
    fn test_all_io_reactors_stopped() -> std::io::Result<()> {
        let io_reactors = io_reactors(2)?;
        for io_reactor in io_reactors.iter() {
            io_reactor.stop(Duration::from_secs(1))?;
        }
        let acceptor = Acceptor::new(io_reactors);
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let mut client = TcpStream::connect(listener.local_addr()?)?;
        let (stream, _) = listener.accept()?;
        assert_eq!(
            ErrorKind::BrokenPipe,
            acceptor.dispatch(Channel::from(stream)).unwrap_err().kind()
        );
        // the dropped stream is closed
        client.set_read_timeout(Some(Duration::from_secs(3)))?;
        let mut buffer = [0; 8];
        assert!(matches!(
            std::io::Read::read(&mut client, &mut buffer),
            Ok(0) | Err(_)
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_stream() -> std::io::Result<()> {
        let acceptor = Acceptor::new(io_reactors(1)?);
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let mut channel = Channel::from(TcpStream::connect(listener.local_addr()?)?);
        assert_eq!(
            ErrorKind::InvalidInput,
            acceptor.handle(&mut channel).unwrap_err().kind()
        );
        Ok(())
    }
}
