use crate::reactor::constants::DEFAULT_SELECT_TIMEOUT_MS;
use std::time::Duration;

/// The default listening port.
pub const DEFAULT_PORT: u16 = 8089;

/// The fixed response written back for every request.
pub const DEFAULT_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nHello World";

/// Runtime settings of a [`crate::server::Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    port: u16,
    acceptor_size: usize,
    io_reactor_size: usize,
    worker_size: usize,
    worker_queue_capacity: usize,
    task_queue_capacity: usize,
    select_timeout: Duration,
    read_buffer_size: usize,
    write_timeout: Duration,
    max_select_failures: usize,
    bind_cpu: bool,
    response: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            acceptor_size: 1,
            io_reactor_size: num_cpus::get(),
            worker_size: 10,
            worker_queue_capacity: 1024,
            task_queue_capacity: 100,
            select_timeout: Duration::from_millis(DEFAULT_SELECT_TIMEOUT_MS),
            read_buffer_size: 1024,
            write_timeout: Duration::from_secs(5),
            max_select_failures: 16,
            bind_cpu: false,
            response: DEFAULT_RESPONSE.to_vec(),
        }
    }
}

impl Config {
    /// Set the listening port, `0` lets the os pick one.
    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    /// The listening port used by `Server::bind`.
    #[must_use]
    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Set the number of acceptor reactors, at least 1.
    pub fn set_acceptor_size(&mut self, acceptor_size: usize) -> &mut Self {
        self.acceptor_size = acceptor_size.max(1);
        self
    }

    /// The number of acceptor reactors.
    #[must_use]
    pub fn get_acceptor_size(&self) -> usize {
        self.acceptor_size
    }

    /// Set the number of io reactors, at least 1.
    pub fn set_io_reactor_size(&mut self, io_reactor_size: usize) -> &mut Self {
        self.io_reactor_size = io_reactor_size.max(1);
        self
    }

    /// The number of io reactors.
    #[must_use]
    pub fn get_io_reactor_size(&self) -> usize {
        self.io_reactor_size
    }

    /// Set the number of business workers, at least 1.
    pub fn set_worker_size(&mut self, worker_size: usize) -> &mut Self {
        self.worker_size = worker_size.max(1);
        self
    }

    /// The number of business workers.
    #[must_use]
    pub fn get_worker_size(&self) -> usize {
        self.worker_size
    }

    /// Set how many business tasks may wait before the pool rejects new ones.
    pub fn set_worker_queue_capacity(&mut self, capacity: usize) -> &mut Self {
        self.worker_queue_capacity = capacity.max(1);
        self
    }

    /// The capacity of the business task queue.
    #[must_use]
    pub fn get_worker_queue_capacity(&self) -> usize {
        self.worker_queue_capacity
    }

    /// Set the capacity of every reactor's registration task queue.
    pub fn set_task_queue_capacity(&mut self, capacity: usize) -> &mut Self {
        self.task_queue_capacity = capacity.max(1);
        self
    }

    /// The capacity of every reactor task queue.
    #[must_use]
    pub fn get_task_queue_capacity(&self) -> usize {
        self.task_queue_capacity
    }

    /// Set the upper bound of a single multiplexer wait.
    pub fn set_select_timeout(&mut self, select_timeout: Duration) -> &mut Self {
        self.select_timeout = select_timeout;
        self
    }

    /// The upper bound of a single multiplexer wait.
    #[must_use]
    pub fn get_select_timeout(&self) -> Duration {
        self.select_timeout
    }

    /// Set the size of the buffer a request burst is read into, at least 1.
    pub fn set_read_buffer_size(&mut self, read_buffer_size: usize) -> &mut Self {
        self.read_buffer_size = read_buffer_size.max(1);
        self
    }

    /// The size of the request read buffer.
    #[must_use]
    pub fn get_read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// Set how long an io reactor keeps flushing a response to a slow peer.
    pub fn set_write_timeout(&mut self, write_timeout: Duration) -> &mut Self {
        self.write_timeout = write_timeout;
        self
    }

    /// How long a response flush may take.
    #[must_use]
    pub fn get_write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Set how many consecutive multiplexer failures retire a reactor thread.
    pub fn set_max_select_failures(&mut self, max_select_failures: usize) -> &mut Self {
        self.max_select_failures = max_select_failures.max(1);
        self
    }

    /// How many consecutive multiplexer failures retire a reactor.
    #[must_use]
    pub fn get_max_select_failures(&self) -> usize {
        self.max_select_failures
    }

    /// Pin every reactor thread to a cpu core.
    pub fn set_bind_cpu(&mut self, bind_cpu: bool) -> &mut Self {
        self.bind_cpu = bind_cpu;
        self
    }

    /// Whether reactor threads are pinned to cpu cores.
    #[must_use]
    pub fn get_bind_cpu(&self) -> bool {
        self.bind_cpu
    }

    /// Set the bytes written back for every request.
    pub fn set_response(&mut self, response: impl Into<Vec<u8>>) -> &mut Self {
        self.response = response.into();
        self
    }

    /// The bytes written back for every request.
    #[must_use]
    pub fn get_response(&self) -> &[u8] {
        &self.response
    }
}
