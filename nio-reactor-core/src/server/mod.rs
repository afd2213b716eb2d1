use crate::channel::Channel;
use crate::config::Config;
use crate::pool::business::{BusinessHandler, LoggingHandler};
use crate::pool::WorkerPool;
use crate::reactor::acceptor::{Acceptor, RoundRobin};
use crate::reactor::io::IoHandler;
use crate::reactor::ReactorThread;
use crate::selector::Interest;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[cfg(test)]
mod tests;

/// A multi-reactor tcp server.
///
/// Owns an acceptor group, an io group and the business worker pool. The
/// reactors are started lazily, an acceptor when the first listener lands on
/// it and an io reactor when the first connection is handed to it.
#[derive(Debug)]
pub struct Server {
    config: Config,
    pool: Arc<WorkerPool>,
    io_reactors: Arc<[Arc<ReactorThread>]>,
    acceptors: Box<[Arc<ReactorThread>]>,
    next_acceptor: RoundRobin,
    listening: Mutex<Vec<SocketAddr>>,
}

impl Server {
    /// Create a server logging every request it receives.
    ///
    /// # Errors
    /// if the os multiplexers or the worker threads can't be created.
    pub fn new(config: Config) -> std::io::Result<Self> {
        Self::with_business(config, Arc::new(LoggingHandler))
    }

    /// Create a server running `business` for every request it receives.
    ///
    /// # Errors
    /// see `new`.
    pub fn with_business(
        config: Config,
        business: Arc<dyn BusinessHandler>,
    ) -> std::io::Result<Self> {
        let pool = WorkerPool::new(
            "nio-reactor-worker",
            config.get_worker_size(),
            config.get_worker_queue_capacity(),
        )
        .start()?;
        let io_reactors = (0..config.get_io_reactor_size())
            .map(|i| {
                ReactorThread::new(
                    format!("nio-reactor-io-{i}"),
                    i,
                    IoHandler::with_business(pool.clone(), business.clone(), &config),
                    &config,
                )
                .map(Arc::new)
            })
            .collect::<std::io::Result<Arc<[_]>>>()?;
        // acceptors are pinned after the io reactors
        let acceptors = (0..config.get_acceptor_size())
            .map(|i| {
                ReactorThread::new(
                    format!("nio-reactor-acceptor-{i}"),
                    io_reactors.len() + i,
                    Acceptor::new(io_reactors.clone()),
                    &config,
                )
                .map(Arc::new)
            })
            .collect::<std::io::Result<Box<[_]>>>()?;
        Ok(Server {
            next_acceptor: RoundRobin::new(acceptors.len()),
            config,
            pool,
            io_reactors,
            acceptors,
            listening: Mutex::new(Vec::new()),
        })
    }

    /// Listen on `0.0.0.0` with the configured port.
    ///
    /// # Errors
    /// see `listen`.
    pub fn bind(&self) -> std::io::Result<SocketAddr> {
        self.listen((Ipv4Addr::UNSPECIFIED, self.config.get_port()))
    }

    /// Bind a listener and hand it to the next acceptor.
    ///
    /// Returns the bound address, port `0` lets the os pick one.
    ///
    /// # Errors
    /// if bind failed or the acceptor is stopped.
    pub fn listen(&self, addr: impl ToSocketAddrs) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let acceptor = &self.acceptors[self.next_acceptor.next()];
        acceptor.start()?;
        let registration = acceptor
            .register(Channel::from(listener), Interest::ACCEPT)?
            .join()?;
        crate::info!("{} listening on {local_addr}", registration.reactor());
        self.listening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(local_addr);
        Ok(local_addr)
    }

    /// The addresses this server listens on.
    #[must_use]
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The settings this server was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The acceptor group.
    #[must_use]
    pub fn acceptors(&self) -> &[Arc<ReactorThread>] {
        &self.acceptors
    }

    /// The io reactor group.
    #[must_use]
    pub fn io_reactors(&self) -> &[Arc<ReactorThread>] {
        &self.io_reactors
    }

    /// The business worker pool.
    #[must_use]
    pub fn worker_pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Stop the acceptors first so no new connection comes in, then the io
    /// reactors, then the worker pool. Each part gets up to `wait_time`.
    ///
    /// # Errors
    /// the first timeout, the remaining parts are still stopped.
    pub fn stop(&self, wait_time: Duration) -> std::io::Result<()> {
        let mut result = Ok(());
        for reactor in self.acceptors.iter().chain(self.io_reactors.iter()) {
            if let Err(e) = reactor.stop(wait_time) {
                crate::error!("stop {reactor:?} failed:{e}");
                result = result.and(Err(e));
            }
        }
        if let Err(e) = self.pool.stop(wait_time) {
            crate::error!("stop {:?} failed:{e}", self.pool);
            result = result.and(Err(e));
        }
        self.listening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        result
    }
}
