use std::fmt::Debug;
use std::net::SocketAddr;

/// The pluggable business logic run by the worker pool for every request.
///
/// Its result is never observed by the reactors.
pub trait BusinessHandler: Debug + Send + Sync {
    /// Handle the raw bytes received from `peer`.
    fn handle(&self, peer: Option<SocketAddr>, data: &[u8]);
}

/// Only logs what was received.
#[derive(Debug, Copy, Clone, Default)]
pub struct LoggingHandler;

impl BusinessHandler for LoggingHandler {
    #[allow(unused_variables)]
    fn handle(&self, peer: Option<SocketAddr>, data: &[u8]) {
        crate::debug!(
            "{} handled {} bytes from {peer:?}",
            std::thread::current().name().unwrap_or_default(),
            data.len()
        );
    }
}
